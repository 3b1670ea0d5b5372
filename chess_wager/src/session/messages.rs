//! Session actor message types.

use tokio::sync::oneshot;

use super::{
    errors::PreconditionError,
    state::{ConfirmedOutcome, JoinOffer, MatchIntent, PhaseKind, Score},
};
use crate::{
    escrow::{EscrowError, EscrowReceipt, GasQuote, NetworkError, WalletSnapshot},
    types::GameId,
};

/// Reply to a user command
pub type CommandResponse = oneshot::Sender<Result<(), PreconditionError>>;

/// Messages that can be sent to a SessionActor
#[derive(Debug)]
pub enum SessionMessage {
    /// Open a new match
    Submit {
        intent: MatchIntent,
        response: CommandResponse,
    },

    /// Request the terms of an existing game by code
    Join {
        code: String,
        response: CommandResponse,
    },

    /// Fund and accept the last received join offer
    AcceptJoin { response: CommandResponse },

    OfferDraw { response: CommandResponse },

    AcceptDraw { response: CommandResponse },

    Resign { response: CommandResponse },

    /// Cancel an unstarted game or decline a join offer
    Cancel { response: CommandResponse },

    /// Leave the session
    Close {
        response: oneshot::Sender<CloseReport>,
    },

    /// Wallet integration pushed a new account or balance
    Wallet(WalletSnapshot),

    /// Gas price refresh finished
    GasQuote(Result<GasQuote, NetworkError>),

    /// Escrow transaction of `attempt` settled
    EscrowSettled {
        attempt: u64,
        game_id: GameId,
        result: Result<EscrowReceipt, EscrowError>,
    },
}

/// What closing left behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CloseReport {
    /// False when a server record or wager may still be unsettled.
    pub clean: bool,
    /// Phase the session was in when closed.
    pub phase: PhaseKind,
    /// An escrow transaction is still pending; the actor keeps running
    /// until it resolves and is compensated.
    pub settling: bool,
}

/// User-facing events that are not captured by the state snapshot alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionNotice {
    /// Game funded; the code can be shared with the opponent
    GameCreated(GameId),
    JoinOfferReceived(JoinOffer),
    /// Escrow failed, reason truncated to its first clause
    EscrowFailed(String),
    ServerError(String),
    ChannelError(String),
    Cancelled,
    RoundStarted { round: u32, total_rounds: u32 },
    DrawOffered,
    RoundEnded(Score),
    /// The opponent left mid-match and forfeits it
    OpponentAbandoned,
    MatchEnded(ConfirmedOutcome),
    /// A funding transaction confirmed after the game was abandoned
    CompensatingCancel(GameId),
}
