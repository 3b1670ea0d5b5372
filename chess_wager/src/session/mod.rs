//! Match session lifecycle.
//!
//! One actor task per session owns the state machine
//!
//! ```text
//! Idle -> CreatingEscrow -> AwaitingOpponent -> Starting -> Playing -> {DrawOffered} -> Ended
//! ```
//!
//! and is the only writer of [`SessionState`]. User commands, channel events,
//! escrow completions, gas quotes and wallet updates all pass through its
//! inbox one at a time. The server's start event is the only signal that
//! moves a funded game into play; a confirmed escrow receipt merely
//! authorizes waiting for it.

pub mod actor;
pub mod config;
pub mod errors;
pub mod messages;
pub mod state;

pub use actor::{SessionActor, SessionHandle};
pub use config::SessionConfig;
pub use errors::{PreconditionError, SessionError, SessionResult};
pub use messages::{CloseReport, SessionMessage, SessionNotice};
pub use state::{
    ConfirmedOutcome, Funding, JoinOffer, LocalExit, MatchIntent, MatchProgress, Outcome,
    PhaseKind, Role, Score, SessionPhase, SessionState,
};
