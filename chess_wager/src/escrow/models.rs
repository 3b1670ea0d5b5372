//! Escrow data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Address, GameId, TxHash, Wei};

/// Gas price quote for the fund-game transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasQuote {
    /// Price per unit of gas
    pub price_per_gas: Wei,

    /// Gas ceiling the transaction is submitted with
    pub gas_limit: u64,

    pub fetched_at: DateTime<Utc>,
}

impl GasQuote {
    /// Worst-case network fee for the transaction.
    pub fn estimated_fee(&self) -> Wei {
        Wei(self.price_per_gas.0.saturating_mul(u128::from(self.gas_limit)))
    }
}

/// Confirmed on-chain funding of one side of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowReceipt {
    pub game_id: GameId,
    pub tx_hash: TxHash,
    pub wager: Wei,
    pub commission: Wei,
}

impl EscrowReceipt {
    /// Value that was attached to the transaction.
    pub fn attached_value(&self) -> Wei {
        self.wager.saturating_add(self.commission)
    }
}

/// Cost breakdown of funding a wager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingCost {
    pub wager: Wei,
    pub commission: Wei,
    pub estimated_gas: Wei,
}

impl FundingCost {
    /// Value attached to the contract call.
    pub fn value(&self) -> Wei {
        self.wager.saturating_add(self.commission)
    }

    /// Everything that leaves the wallet, gas included.
    pub fn total(&self) -> Wei {
        self.value().saturating_add(self.estimated_gas)
    }
}

/// Wallet connection as last reported by the wallet integration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub address: Option<Address>,
    pub balance: Wei,
}

impl WalletSnapshot {
    pub fn connected(address: Address, balance: Wei) -> Self {
        Self {
            address: Some(address),
            balance,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }
}

/// `floor(wager × percentage / 100)`
pub fn commission_for(wager: Wei, percentage: u32) -> Wei {
    Wei(wager.0.saturating_mul(u128::from(percentage)) / 100)
}
