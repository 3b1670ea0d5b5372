//! Session state model.
//!
//! The whole session is one [`SessionPhase`] value; data that only makes
//! sense in a given phase lives inside that variant, so combinations such as
//! an outcome without a finished match cannot be expressed.

use chrono::{DateTime, Utc};
use std::{fmt, time::Duration};

use super::errors::PreconditionError;
use crate::{
    channel::{GameInfo, MatchResult, StartInfo},
    constants::VALID_ROUNDS_RANGE,
    escrow::{EscrowReceipt, GasQuote, WalletSnapshot},
    types::{Colour, GameId, TimeControl, Wei},
};

/// Phase discriminant, used for history, errors and display.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    Idle,
    CreatingEscrow,
    AwaitingOpponent,
    /// Transient: recorded in history between the start event and play.
    Starting,
    Playing,
    DrawOffered,
    Ended,
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Idle => "idle",
            Self::CreatingEscrow => "creating escrow",
            Self::AwaitingOpponent => "awaiting opponent",
            Self::Starting => "starting",
            Self::Playing => "playing",
            Self::DrawOffered => "draw offered",
            Self::Ended => "ended",
        };
        write!(f, "{repr}")
    }
}

/// A player's request to open a new match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchIntent {
    pub time_control: TimeControl,
    pub rounds: u32,
    pub wager: Wei,
    pub terms_accepted: bool,
}

impl MatchIntent {
    /// Local checks that need neither wallet nor gas quote.
    pub fn validate(&self, max_wager: Wei) -> Result<(), PreconditionError> {
        if !VALID_ROUNDS_RANGE.contains(&self.rounds) {
            return Err(PreconditionError::InvalidRounds(self.rounds));
        }
        if self.wager.is_zero() || self.wager > max_wager {
            return Err(PreconditionError::InvalidWager { max: max_wager });
        }
        // The server only accepts whole-coin wagers
        if self.wager.whole_native().is_none() {
            return Err(PreconditionError::FractionalWager);
        }
        if !self.terms_accepted {
            return Err(PreconditionError::TermsNotAccepted);
        }
        Ok(())
    }
}

/// Terms of an existing game, received in answer to a join request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JoinOffer {
    pub game_id: GameId,
    pub wager: Wei,
    pub time_control: TimeControl,
    pub total_rounds: u32,
}

impl JoinOffer {
    pub fn from_info(game_id: GameId, info: GameInfo) -> Self {
        Self {
            game_id,
            wager: info.wager_amount,
            time_control: info.time_control,
            total_rounds: info.total_rounds,
        }
    }
}

/// Which side of the match this session funded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Creator,
    Joiner,
}

/// What the escrow transaction in flight is paying for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Funding {
    Create(MatchIntent),
    Join(JoinOffer),
}

impl Funding {
    pub fn wager(&self) -> Wei {
        match self {
            Self::Create(intent) => intent.wager,
            Self::Join(offer) => offer.wager,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Create(_) => Role::Creator,
            Self::Join(_) => Role::Joiner,
        }
    }
}

/// Running match score from this player's point of view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Score {
    pub mine: u32,
    pub theirs: u32,
}

impl Score {
    /// Count a decided round for the side that held `winner`, from the
    /// point of view of the player holding `colour`.
    pub fn credit(&mut self, winner: Colour, colour: Colour) {
        if winner == colour {
            self.mine += 1;
        } else {
            self.theirs += 1;
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.mine, self.theirs)
    }
}

/// Live data of a started match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchProgress {
    pub colour: Colour,
    pub round: u32,
    pub total_rounds: u32,
    /// Clock as last reported by the server.
    pub time_remaining: Duration,
    pub score: Score,
    /// Set by a round result, cleared by the next start. Freezes the clock.
    pub between_rounds: bool,
    /// This player already offered a draw in the current round.
    pub draw_offered: bool,
}

impl MatchProgress {
    pub fn from_start(info: &StartInfo) -> Self {
        Self {
            colour: info.colour,
            round: info.round,
            total_rounds: info.total_rounds,
            time_remaining: Duration::from_millis(info.time_remaining),
            score: Score::default(),
            between_rounds: false,
            draw_offered: false,
        }
    }

    /// Begin the next round; colours may have been swapped by the server.
    pub fn next_round(&mut self, info: &StartInfo) {
        self.colour = info.colour;
        self.round = info.round;
        self.total_rounds = info.total_rounds;
        self.time_remaining = Duration::from_millis(info.time_remaining);
        self.between_rounds = false;
        self.draw_offered = false;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Win,
    Loss,
    Draw,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Win => write!(f, "win"),
            Outcome::Loss => write!(f, "loss"),
            Outcome::Draw => write!(f, "draw"),
        }
    }
}

/// How the local player left a match before the server ended it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LocalExit {
    Resigned,
    Abandoned,
}

/// Result of a match as confirmed by the server. Written once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmedOutcome {
    pub outcome: Outcome,
    /// Colour of the overall winner as of the final round.
    pub winner: Option<Colour>,
    pub score: Score,
    pub confirmed_at: DateTime<Utc>,
}

impl ConfirmedOutcome {
    /// Interpret a match result for the player who held `colour` in the
    /// final round. Unknown winner indices yield `None`.
    pub fn from_result(result: &MatchResult, colour: Colour, score: Score) -> Option<Self> {
        let winner = match result.overall_winner {
            None => None,
            Some(index) => Some(Colour::from_player_index(index)?),
        };
        let outcome = match winner {
            None => Outcome::Draw,
            Some(w) if w == colour => Outcome::Win,
            Some(_) => Outcome::Loss,
        };

        Some(Self {
            outcome,
            winner,
            score,
            confirmed_at: Utc::now(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Idle {
        /// Funded game whose cancellation the server has not acknowledged.
        /// A start event for it still wins.
        cancelling: Option<EscrowReceipt>,
        /// Game details requested with a join code.
        requested_join: Option<GameId>,
        join_offer: Option<JoinOffer>,
    },
    CreatingEscrow {
        funding: Funding,
        /// Known once the server issued a token (create) or from the offer (join).
        game_id: Option<GameId>,
        attempt: u64,
    },
    AwaitingOpponent {
        receipt: EscrowReceipt,
        role: Role,
    },
    Playing {
        receipt: EscrowReceipt,
        progress: MatchProgress,
    },
    DrawOffered {
        receipt: EscrowReceipt,
        progress: MatchProgress,
        /// Accept sent, waiting for the server to end the match.
        accepted: bool,
    },
    Ended {
        receipt: EscrowReceipt,
        progress: MatchProgress,
        local_exit: Option<LocalExit>,
        confirmed: Option<ConfirmedOutcome>,
    },
}

impl SessionPhase {
    pub fn idle() -> Self {
        Self::Idle {
            cancelling: None,
            requested_join: None,
            join_offer: None,
        }
    }

    pub fn kind(&self) -> PhaseKind {
        match self {
            Self::Idle { .. } => PhaseKind::Idle,
            Self::CreatingEscrow { .. } => PhaseKind::CreatingEscrow,
            Self::AwaitingOpponent { .. } => PhaseKind::AwaitingOpponent,
            Self::Playing { .. } => PhaseKind::Playing,
            Self::DrawOffered { .. } => PhaseKind::DrawOffered,
            Self::Ended { .. } => PhaseKind::Ended,
        }
    }

    pub fn receipt(&self) -> Option<&EscrowReceipt> {
        match self {
            Self::Idle { cancelling, .. } => cancelling.as_ref(),
            Self::CreatingEscrow { .. } => None,
            Self::AwaitingOpponent { receipt, .. }
            | Self::Playing { receipt, .. }
            | Self::DrawOffered { receipt, .. }
            | Self::Ended { receipt, .. } => Some(receipt),
        }
    }

    pub fn progress(&self) -> Option<&MatchProgress> {
        match self {
            Self::Playing { progress, .. }
            | Self::DrawOffered { progress, .. }
            | Self::Ended { progress, .. } => Some(progress),
            _ => None,
        }
    }

    /// Game that inbound events must be tagged for, if any.
    pub fn game_id(&self) -> Option<&GameId> {
        match self {
            Self::Idle {
                cancelling,
                requested_join,
                join_offer,
            } => cancelling
                .as_ref()
                .map(|r| &r.game_id)
                .or(requested_join.as_ref())
                .or(join_offer.as_ref().map(|o| &o.game_id)),
            Self::CreatingEscrow { game_id, .. } => game_id.as_ref(),
            _ => self.receipt().map(|r| &r.game_id),
        }
    }
}

/// Snapshot of a session, published after every handled signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionState {
    phase: SessionPhase,
    wallet: WalletSnapshot,
    gas_quote: Option<GasQuote>,
    history: Vec<PhaseKind>,
    last_error: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::idle(),
            wallet: WalletSnapshot::default(),
            gas_quote: None,
            history: vec![PhaseKind::Idle],
            last_error: None,
        }
    }

    pub fn phase(&self) -> PhaseKind {
        self.phase.kind()
    }

    pub fn details(&self) -> &SessionPhase {
        &self.phase
    }

    /// Every phase entered so far, oldest first.
    pub fn history(&self) -> &[PhaseKind] {
        &self.history
    }

    pub fn wallet(&self) -> &WalletSnapshot {
        &self.wallet
    }

    pub fn gas_quote(&self) -> Option<&GasQuote> {
        self.gas_quote.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn game_id(&self) -> Option<&GameId> {
        self.phase.game_id()
    }

    pub fn receipt(&self) -> Option<&EscrowReceipt> {
        self.phase.receipt()
    }

    pub fn colour(&self) -> Option<Colour> {
        self.phase.progress().map(|p| p.colour)
    }

    pub fn round(&self) -> Option<u32> {
        self.phase.progress().map(|p| p.round)
    }

    pub fn total_rounds(&self) -> Option<u32> {
        self.phase.progress().map(|p| p.total_rounds)
    }

    pub fn time_remaining(&self) -> Option<Duration> {
        self.phase.progress().map(|p| p.time_remaining)
    }

    /// True while an opponent's draw offer awaits an answer or the server's
    /// verdict. Never true once the match ended.
    pub fn draw_offer_pending(&self) -> bool {
        matches!(self.phase, SessionPhase::DrawOffered { .. })
    }

    /// Server-confirmed outcome. `None` until confirmed, even after a local
    /// resignation.
    pub fn outcome(&self) -> Option<Outcome> {
        self.confirmed().map(|c| c.outcome)
    }

    pub fn winner(&self) -> Option<Colour> {
        self.confirmed().and_then(|c| c.winner)
    }

    /// Confirmed final score once ended, running score while playing.
    pub fn score(&self) -> Option<Score> {
        match &self.phase {
            SessionPhase::Ended {
                confirmed: Some(confirmed),
                ..
            } => Some(confirmed.score),
            other => other.progress().map(|p| p.score),
        }
    }

    pub fn confirmed(&self) -> Option<&ConfirmedOutcome> {
        match &self.phase {
            SessionPhase::Ended { confirmed, .. } => confirmed.as_ref(),
            _ => None,
        }
    }

    pub fn local_exit(&self) -> Option<LocalExit> {
        match &self.phase {
            SessionPhase::Ended { local_exit, .. } => *local_exit,
            _ => None,
        }
    }

    pub fn join_offer(&self) -> Option<&JoinOffer> {
        match &self.phase {
            SessionPhase::Idle { join_offer, .. } => join_offer.as_ref(),
            _ => None,
        }
    }

    /// Nothing is at stake: no server record, no funds in flight and no
    /// match left unfinished.
    pub fn is_settled(&self) -> bool {
        match &self.phase {
            SessionPhase::Idle { cancelling, .. } => cancelling.is_none(),
            SessionPhase::Ended { .. } => true,
            _ => false,
        }
    }

    /// Submitting is allowed from here.
    pub fn accepts_intent(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Idle {
                cancelling: None,
                ..
            } | SessionPhase::Ended { .. }
        )
    }

    pub(crate) fn phase_mut(&mut self) -> &mut SessionPhase {
        &mut self.phase
    }

    /// Move to `phase`, recording it in the history when the kind changes.
    pub(crate) fn enter(&mut self, phase: SessionPhase) {
        let kind = phase.kind();
        if self.history.last() != Some(&kind) {
            self.history.push(kind);
        }
        self.phase = phase;
    }

    /// Record the transient starting step ahead of entering play.
    pub(crate) fn mark_starting(&mut self) {
        self.history.push(PhaseKind::Starting);
    }

    pub(crate) fn set_wallet(&mut self, wallet: WalletSnapshot) {
        self.wallet = wallet;
    }

    pub(crate) fn set_gas_quote(&mut self, quote: GasQuote) {
        self.gas_quote = Some(quote);
    }

    pub(crate) fn set_error(&mut self, error: Option<String>) {
        self.last_error = error;
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
