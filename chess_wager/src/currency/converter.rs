//! Rate-limited currency converter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{sync::watch, task::JoinHandle};

use crate::types::Wei;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("Rate lookup failed: {0}")]
    Lookup(String),

    #[error("Malformed rate response: {0}")]
    Malformed(String),
}

/// Converted value of an amount
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rates {
    pub gbp: f64,
    pub usd: f64,
}

/// Last successful conversion, replaced wholesale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateSnapshot {
    pub amount: Wei,
    pub gbp: f64,
    pub usd: f64,
    pub as_of: DateTime<Utc>,
}

/// External price lookup.
#[async_trait]
pub trait RateService: Send + Sync {
    /// Value of `amount` native units in GBP and USD.
    async fn lookup(&self, amount: f64) -> Result<Rates, ConversionError>;
}

/// Converter running a single lookup task per instance.
///
/// At most one lookup starts per cooldown window. Amounts requested while a
/// window is open collapse to the latest one, which is looked up as soon as
/// the window closes.
pub struct CurrencyConverter {
    amounts: watch::Sender<Option<Wei>>,
    snapshots: watch::Receiver<Option<RateSnapshot>>,
    task: JoinHandle<()>,
}

impl CurrencyConverter {
    /// Spawn the lookup task on the current runtime.
    pub fn spawn(service: Arc<dyn RateService>, cooldown: Duration) -> Self {
        let (amounts, amount_rx) = watch::channel(None);
        let (snapshot_tx, snapshots) = watch::channel(None);
        let task = tokio::spawn(run_lookups(service, amount_rx, snapshot_tx, cooldown));

        Self {
            amounts,
            snapshots,
            task,
        }
    }

    /// Request conversion of `amount`. Never blocks and never fails.
    pub fn convert(&self, amount: Wei) {
        self.amounts.send_replace(Some(amount));
    }

    /// Latest successful conversion, possibly stale.
    pub fn snapshot(&self) -> Option<RateSnapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RateSnapshot>> {
        self.snapshots.clone()
    }
}

impl Drop for CurrencyConverter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run_lookups(
    service: Arc<dyn RateService>,
    mut amounts: watch::Receiver<Option<Wei>>,
    snapshots: watch::Sender<Option<RateSnapshot>>,
    cooldown: Duration,
) {
    while amounts.changed().await.is_ok() {
        let Some(amount) = *amounts.borrow_and_update() else {
            continue;
        };

        match service.lookup(amount.to_native_f64()).await {
            Ok(rates) => {
                snapshots.send_replace(Some(RateSnapshot {
                    amount,
                    gbp: rates.gbp,
                    usd: rates.usd,
                    as_of: Utc::now(),
                }));
            }
            Err(e) => log::warn!("Currency lookup for {} failed, keeping last rates: {}", amount, e),
        }

        tokio::time::sleep(cooldown).await;
    }
}
