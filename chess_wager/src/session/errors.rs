//! Session error types.

use thiserror::Error;

use super::state::PhaseKind;
use crate::escrow::EscrowError;
use crate::types::Wei;

/// Local validation failures. These never change session state.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("Connect a wallet first")]
    WalletNotConnected,

    #[error("Gas price still loading, try again shortly")]
    GasPriceUnavailable,

    #[error("Number of rounds must be between 1 and 10, got {0}")]
    InvalidRounds(u32),

    #[error("Wager must be greater than 0 and at most {max}")]
    InvalidWager { max: Wei },

    #[error("Wager must be a whole number of coins")]
    FractionalWager,

    #[error("Wager must be greater than 0")]
    ZeroWager,

    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance { available: Wei, required: Wei },

    #[error("Terms must be accepted before wagering")]
    TermsNotAccepted,

    #[error("A match is already in progress ({0})")]
    SessionBusy(PhaseKind),

    #[error("Can't {action} while {phase}")]
    InvalidAction {
        action: &'static str,
        phase: PhaseKind,
    },

    #[error("Waiting for the server to confirm the cancellation")]
    CancelPending,

    #[error("No game offer to accept")]
    NoJoinOffer,

    #[error("An abandoned escrow transaction is still settling, try again shortly")]
    EscrowSettling,

    #[error("Invalid game code")]
    InvalidGameCode,

    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),
}

impl From<EscrowError> for PreconditionError {
    fn from(err: EscrowError) -> Self {
        match err {
            EscrowError::WalletNotConnected => Self::WalletNotConnected,
            EscrowError::GasPriceUnavailable => Self::GasPriceUnavailable,
            EscrowError::InsufficientFunds {
                available,
                required,
            } => Self::InsufficientBalance {
                available,
                required,
            },
            EscrowError::InvalidAmount(_) => Self::ZeroWager,
            EscrowError::InvalidGameId => Self::InvalidGameCode,
            other => Self::ChannelUnavailable(other.reason()),
        }
    }
}

/// Errors returned by [`SessionHandle`](super::SessionHandle) operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    #[error("Session closed")]
    Closed,
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
