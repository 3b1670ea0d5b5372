//! # Chess Wager
//!
//! Client core for peer-matched chess games played for an on-chain wager.
//!
//! A match moves through a session state machine that coordinates an
//! irreversible escrow transaction with lifecycle events pushed by the
//! matchmaking server. Gameplay never begins before the wager is escrowed,
//! and no settlement is shown before the server confirms the outcome.
//!
//! ## Lifecycle
//!
//! - **Idle**: No match; a new intent or join code is accepted
//! - **CreatingEscrow**: Create sent, escrow transaction pending
//! - **AwaitingOpponent**: Escrow confirmed, game code shareable
//! - **Starting/Playing**: Server started the round; the clock runs
//! - **DrawOffered**: Opponent offered a draw
//! - **Ended**: Local exit or server-confirmed outcome
//!
//! ## Core Modules
//!
//! - [`escrow`]: Fund-game transaction, commission model and gas quotes
//! - [`channel`]: Realtime channel contract and wire messages
//! - [`session`]: Session actor and state machine
//! - [`presenter`]: Countdown, draw prompt and result summary
//! - [`currency`]: Rate-limited fiat conversion for display
//!
//! ## Example
//!
//! ```
//! use chess_wager::session::SessionState;
//! use chess_wager::session::PhaseKind;
//!
//! let state = SessionState::new();
//! assert_eq!(state.phase(), PhaseKind::Idle);
//! assert!(state.accepts_intent());
//! ```

pub mod channel;
pub mod constants;
pub mod currency;
pub mod escrow;
pub mod presenter;
pub mod session;
pub mod types;

pub use channel::{ChannelEvent, ClientCommand, LoopbackChannel, RealtimeChannel, ServerEvent};
pub use escrow::{EscrowClient, EscrowError, EscrowReceipt, EscrowService, GasQuote, WalletSnapshot};
pub use presenter::{SessionPresenter, SessionView};
pub use session::{
    MatchIntent, PhaseKind, PreconditionError, SessionActor, SessionConfig, SessionHandle,
    SessionState,
};
pub use types::{Address, Colour, GameId, TimeControl, TxHash, Wei};
