//! Escrow error types.

use thiserror::Error;

use crate::types::Wei;

/// Failures of a fund-game transaction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EscrowError {
    /// No wallet account is available to sign
    #[error("Wallet not connected")]
    WalletNotConnected,

    /// Wager, commission and estimated gas exceed the balance
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientFunds { available: Wei, required: Wei },

    /// The wallet owner declined to sign
    #[error("Transaction rejected by user")]
    UserRejected,

    /// Contract-level revert or node rejection
    #[error("Transaction rejected by network: {0}")]
    NetworkRejected(String),

    /// Submission is blocked until a gas quote has loaded
    #[error("Gas price not available yet")]
    GasPriceUnavailable,

    #[error("Invalid game id")]
    InvalidGameId,

    #[error("Invalid wager amount: {0}")]
    InvalidAmount(Wei),
}

impl EscrowError {
    /// User-facing reason, cut down to its first clause.
    pub fn reason(&self) -> String {
        first_clause(&self.to_string())
    }
}

/// Failures of read-only chain queries such as gas estimation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Wallet and node errors arrive as `message (key=value, ...)`; keep only the message.
pub fn first_clause(message: &str) -> String {
    let end = message.find(['(', '\n']).unwrap_or(message.len());
    message[..end].trim().to_string()
}

/// Result type for escrow operations
pub type EscrowResult<T> = Result<T, EscrowError>;
