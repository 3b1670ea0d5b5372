//! Read-only projection of session state for display.
//!
//! The presenter never writes session state; user actions go through the
//! [`SessionHandle`] it exposes.

use std::time::Duration;
use tokio::time::{Instant, interval};

use crate::{
    constants::CLOCK_TICK,
    session::{
        JoinOffer, LocalExit, Outcome, PhaseKind, Role, Score, SessionHandle, SessionPhase,
        SessionState,
    },
    types::{Colour, GameId, Wei},
};

/// Local countdown of the server-reported clock.
///
/// Runs only while playing; frozen on draw offers, between rounds and once
/// the match ended. Re-anchors whenever the server reports a new clock.
#[derive(Debug, Clone)]
pub struct Countdown {
    base: Duration,
    anchor: Instant,
    running: bool,
    source: Option<(u32, Duration)>,
}

impl Countdown {
    pub fn new() -> Self {
        Self {
            base: Duration::ZERO,
            anchor: Instant::now(),
            running: false,
            source: None,
        }
    }

    pub fn sync(&mut self, state: &SessionState) {
        let now = Instant::now();
        let running = matches!(
            state.details(),
            SessionPhase::Playing { progress, .. } if !progress.between_rounds
        );
        let source = state.round().zip(state.time_remaining());

        if source != self.source {
            self.source = source;
            self.base = source.map(|(_, remaining)| remaining).unwrap_or_default();
            self.anchor = now;
        } else if self.running && !running {
            self.base = self.remaining_at(now);
            self.anchor = now;
        } else if !self.running && running {
            self.anchor = now;
        }
        self.running = running;
    }

    pub fn remaining(&self) -> Duration {
        self.remaining_at(Instant::now())
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn remaining_at(&self, now: Instant) -> Duration {
        if self.running {
            self.base.saturating_sub(now.saturating_duration_since(self.anchor))
        } else {
            self.base
        }
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawPrompt {
    /// Opponent offered a draw; accept or keep playing
    Respond,
    /// Accepted, waiting for the server to end the match
    AwaitingServer,
}

/// What the wager settles to. Only derived from a confirmed outcome.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    Won(Wei),
    Lost(Wei),
    Refunded(Wei),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultSummary {
    pub outcome: Outcome,
    pub winner: Option<Colour>,
    pub score: Score,
    pub settlement: Settlement,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionView {
    pub phase: PhaseKind,
    pub status: String,
    pub game_id: Option<GameId>,
    pub colour: Option<Colour>,
    /// `(round, total_rounds)`
    pub round: Option<(u32, u32)>,
    pub clock: Option<String>,
    pub score: Option<Score>,
    pub draw_prompt: Option<DrawPrompt>,
    pub result: Option<ResultSummary>,
    pub join_offer: Option<JoinOffer>,
    /// False while a create is in flight or a match is live
    pub can_submit: bool,
    pub error: Option<String>,
}

/// Project `state` into a view, reading the clock from `countdown`.
pub fn project(state: &SessionState, countdown: &Countdown) -> SessionView {
    let draw_prompt = match state.details() {
        SessionPhase::DrawOffered { accepted, .. } if *accepted => Some(DrawPrompt::AwaitingServer),
        SessionPhase::DrawOffered { .. } => Some(DrawPrompt::Respond),
        _ => None,
    };

    let result = state.confirmed().map(|confirmed| {
        let wager = state.receipt().map(|r| r.wager).unwrap_or_default();
        ResultSummary {
            outcome: confirmed.outcome,
            winner: confirmed.winner,
            score: confirmed.score,
            settlement: match confirmed.outcome {
                Outcome::Win => Settlement::Won(wager),
                Outcome::Loss => Settlement::Lost(wager),
                Outcome::Draw => Settlement::Refunded(wager),
            },
        }
    });

    SessionView {
        phase: state.phase(),
        status: status_line(state),
        game_id: state.game_id().cloned(),
        colour: state.colour(),
        round: state.round().zip(state.total_rounds()),
        clock: state.time_remaining().map(|_| format_clock(countdown.remaining())),
        score: state.score(),
        draw_prompt,
        result,
        join_offer: state.join_offer().cloned(),
        can_submit: state.accepts_intent(),
        error: state.last_error().map(str::to_string),
    }
}

fn status_line(state: &SessionState) -> String {
    match state.details() {
        SessionPhase::Idle {
            cancelling: Some(receipt),
            ..
        } => format!("Cancelling game {}", receipt.game_id),
        SessionPhase::Idle {
            join_offer: Some(offer),
            ..
        } => format!(
            "Game {}: wager {}, {}, {} round(s). Accept to join",
            offer.game_id, offer.wager, offer.time_control, offer.total_rounds
        ),
        SessionPhase::Idle {
            requested_join: Some(game_id),
            ..
        } => format!("Fetching game {game_id}"),
        SessionPhase::Idle { .. } => "Ready".to_string(),
        SessionPhase::CreatingEscrow { game_id: None, .. } => "Creating game".to_string(),
        SessionPhase::CreatingEscrow { .. } => "Funding escrow, confirm in your wallet".to_string(),
        SessionPhase::AwaitingOpponent {
            receipt,
            role: Role::Creator,
        } => format!("Share game code {} with your opponent", receipt.game_id),
        SessionPhase::AwaitingOpponent { .. } => "Waiting for the match to start".to_string(),
        SessionPhase::Playing { progress, .. } if progress.between_rounds => format!(
            "Round {} finished, score {}",
            progress.round, progress.score
        ),
        SessionPhase::Playing { progress, .. } => format!(
            "Round {}/{}, playing {}",
            progress.round, progress.total_rounds, progress.colour
        ),
        SessionPhase::DrawOffered {
            accepted: false, ..
        } => "Opponent offers a draw".to_string(),
        SessionPhase::DrawOffered { .. } => "Draw accepted, waiting for the server".to_string(),
        SessionPhase::Ended {
            confirmed: Some(confirmed),
            ..
        } => format!("Match over: {} ({})", confirmed.outcome, confirmed.score),
        SessionPhase::Ended {
            local_exit: Some(LocalExit::Resigned),
            ..
        } => "Resigned, waiting for the server to confirm the result".to_string(),
        SessionPhase::Ended { .. } => "Left the match, waiting for the server's result".to_string(),
    }
}

/// `mm:ss`, rounded down to the second.
pub fn format_clock(remaining: Duration) -> String {
    let secs = remaining.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Derives views from a session and keeps the countdown ticking.
pub struct SessionPresenter {
    handle: SessionHandle,
    countdown: Countdown,
}

impl SessionPresenter {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            countdown: Countdown::new(),
        }
    }

    /// Handle for the transition-triggering operations.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    pub fn view(&mut self) -> SessionView {
        let state = self.handle.state();
        self.countdown.sync(&state);
        project(&state, &self.countdown)
    }

    /// Render on every state change and clock tick until the session is gone.
    pub async fn run(mut self, mut render: impl FnMut(&SessionView)) {
        let mut states = self.handle.subscribe();
        let mut tick = interval(CLOCK_TICK);

        loop {
            tokio::select! {
                changed = states.changed() => {
                    if changed.is_err() {
                        render(&self.view());
                        break;
                    }
                }
                _ = tick.tick() => {
                    if !self.countdown.is_running() {
                        continue;
                    }
                }
            }
            render(&self.view());
        }
    }
}
