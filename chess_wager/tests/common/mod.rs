//! Shared fixtures for session integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chess_wager::{
    Address, GameId, LoopbackChannel, MatchIntent, SessionActor, SessionConfig, SessionHandle,
    SessionState, TimeControl, TxHash, Wei,
    channel::ServerEvent,
    escrow::{EscrowError, EscrowResult, EscrowService, NetworkError, WalletSnapshot},
    session::PhaseKind,
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;

pub const PLAYER: &str = "0x00000000000000000000000000000000000000aa";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EscrowCall {
    Create {
        game_id: String,
        wager: Wei,
        value: Wei,
    },
    Join {
        game_id: String,
        value: Wei,
    },
}

/// Escrow contract double recording every transaction.
pub struct MockEscrow {
    calls: Mutex<Vec<EscrowCall>>,
    failure: Mutex<Option<EscrowError>>,
    /// `None` makes gas queries hang forever
    gas_price: Option<Wei>,
    gated: bool,
    release: Notify,
    called: Notify,
    tx_counter: AtomicU64,
}

impl MockEscrow {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            gas_price: Some(Wei(1)),
            gated: false,
            release: Notify::new(),
            called: Notify::new(),
            tx_counter: AtomicU64::new(0),
        }
    }

    /// Transactions stay pending until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        Self {
            gated: true,
            ..Self::new()
        }
    }

    pub fn without_gas() -> Self {
        Self {
            gas_price: None,
            ..Self::new()
        }
    }

    pub fn fail_with(&self, error: EscrowError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn calls(&self) -> Vec<EscrowCall> {
        self.calls.lock().unwrap().clone()
    }

    pub async fn wait_for_call(&self) {
        loop {
            let notified = self.called.notified();
            if !self.calls().is_empty() {
                return;
            }
            notified.await;
        }
    }

    async fn submit(&self, call: EscrowCall) -> EscrowResult<TxHash> {
        self.calls.lock().unwrap().push(call);
        self.called.notify_waiters();
        if self.gated {
            self.release.notified().await;
        }
        if let Some(error) = self.failure.lock().unwrap().clone() {
            return Err(error);
        }
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        Ok(TxHash(format!("0x{n:064x}")))
    }
}

#[async_trait]
impl EscrowService for MockEscrow {
    async fn create_game(&self, game_id: &GameId, wager: Wei, value: Wei) -> EscrowResult<TxHash> {
        self.submit(EscrowCall::Create {
            game_id: game_id.to_string(),
            wager,
            value,
        })
        .await
    }

    async fn join_game(&self, game_id: &GameId, value: Wei) -> EscrowResult<TxHash> {
        self.submit(EscrowCall::Join {
            game_id: game_id.to_string(),
            value,
        })
        .await
    }

    async fn gas_price(&self) -> Result<Wei, NetworkError> {
        match self.gas_price {
            Some(price) => Ok(price),
            None => std::future::pending().await,
        }
    }
}

pub fn native(units: u128) -> Wei {
    Wei::from_native(units).unwrap()
}

pub fn wallet(balance: Wei) -> WalletSnapshot {
    WalletSnapshot::connected(Address::parse(PLAYER).unwrap(), balance)
}

pub fn intent(wager: Wei) -> MatchIntent {
    MatchIntent {
        time_control: TimeControl::Five,
        rounds: 1,
        wager,
        terms_accepted: true,
    }
}

pub fn game(token: &str) -> GameId {
    GameId::new(token).unwrap()
}

pub struct Harness {
    pub handle: SessionHandle,
    pub channel: Arc<LoopbackChannel>,
    pub escrow: Arc<MockEscrow>,
    markers: AtomicU64,
}

impl Harness {
    /// Spawn a session with a funded wallet and wait for its first gas quote.
    pub async fn start(escrow: MockEscrow) -> Self {
        let harness = Self::spawn(escrow);
        harness.handle.update_wallet(wallet(native(100))).await.unwrap();
        harness.wait_until(|s| s.gas_quote().is_some()).await;
        harness
    }

    /// Spawn a session without waiting for anything.
    pub fn spawn(escrow: MockEscrow) -> Self {
        let escrow = Arc::new(escrow);
        let channel = Arc::new(LoopbackChannel::new());
        let handle = SessionActor::spawn(SessionConfig::default(), escrow.clone(), channel.clone());
        Self {
            handle,
            channel,
            escrow,
            markers: AtomicU64::new(0),
        }
    }

    pub async fn wait_until(&self, predicate: impl FnMut(&SessionState) -> bool) -> SessionState {
        tokio::time::timeout(Duration::from_secs(5), self.handle.wait_for(predicate))
            .await
            .expect("timed out waiting for session state")
            .expect("session closed")
    }

    pub async fn wait_phase(&self, phase: PhaseKind) -> SessionState {
        self.wait_until(|s| s.phase() == phase).await
    }

    /// Wait until every event delivered so far has been handled.
    ///
    /// Events are handled in delivery order, so a trailing server error
    /// marks the point reached.
    pub async fn sync_events(&self) -> SessionState {
        let n = self.markers.fetch_add(1, Ordering::SeqCst);
        let marker = format!("sync-{n}");
        self.channel.deliver(ServerEvent::Error(marker.clone()));
        self.wait_until(|s| s.last_error() == Some(marker.as_str())).await
    }

    /// Drive a create through to a funded game awaiting its opponent.
    pub async fn create_funded(&self, token: &str) -> GameId {
        self.handle.submit(intent(native(1))).await.unwrap();
        let game_id = game(token);
        self.channel.deliver(ServerEvent::GameId(game_id.clone()));
        self.wait_phase(PhaseKind::AwaitingOpponent).await;
        game_id
    }
}
