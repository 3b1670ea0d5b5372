//! Plain-text rendering of session views and notices.

use chess_wager::{
    currency::RateSnapshot,
    presenter::{DrawPrompt, ResultSummary, SessionView, Settlement},
    session::{CloseReport, SessionNotice},
};

/// One-line summary printed whenever the session status changes.
pub fn summary_line(view: &SessionView) -> String {
    match &view.error {
        Some(error) => format!("[{}] {} (last error: {})", view.phase, view.status, error),
        None => format!("[{}] {}", view.phase, view.status),
    }
}

/// Full session block for the `status` command.
pub fn render_view(view: &SessionView) -> String {
    let mut lines = vec![summary_line(view)];

    if let Some(game_id) = &view.game_id {
        lines.push(format!("  Game:   {}", game_id));
    }
    if let Some(colour) = view.colour {
        lines.push(format!("  Colour: {}", colour));
    }
    if let Some((round, total)) = view.round {
        lines.push(format!("  Round:  {}/{}", round, total));
    }
    if let Some(clock) = &view.clock {
        lines.push(format!("  Clock:  {}", clock));
    }
    if let Some(score) = view.score {
        lines.push(format!("  Score:  {}", score));
    }
    match view.draw_prompt {
        Some(DrawPrompt::Respond) => {
            lines.push("  Draw offered: 'accept-draw' to accept, or keep playing".to_string())
        }
        Some(DrawPrompt::AwaitingServer) => lines.push("  Draw accepted".to_string()),
        None => {}
    }
    if let Some(result) = &view.result {
        lines.push(format!("  Result: {}", result_line(result)));
    }
    if view.can_submit {
        lines.push("  Type 'create' or 'join' to start a match".to_string());
    }

    lines.join("\n")
}

/// Outcome and what it means for the wager
pub fn result_line(result: &ResultSummary) -> String {
    let settlement = match result.settlement {
        Settlement::Won(wager) => format!("you win the opponent's {} wager", wager),
        Settlement::Lost(wager) => format!("your {} wager goes to the opponent", wager),
        Settlement::Refunded(wager) => format!("your {} wager is refunded", wager),
    };
    match result.winner {
        Some(winner) => format!(
            "{} ({}), {} won; {}",
            result.outcome, result.score, winner, settlement
        ),
        None => format!("{} ({}); {}", result.outcome, result.score, settlement),
    }
}

pub fn notice_line(notice: &SessionNotice) -> String {
    match notice {
        SessionNotice::GameCreated(game_id) => {
            format!("Game funded. Share this code with your opponent: {}", game_id)
        }
        SessionNotice::JoinOfferReceived(offer) => format!(
            "Game {} wagers {} at {} over {} round(s). Type 'accept' to fund and join, or 'decline'",
            offer.game_id, offer.wager, offer.time_control, offer.total_rounds
        ),
        SessionNotice::EscrowFailed(reason) => format!("Escrow failed: {}", reason),
        SessionNotice::ServerError(message) => format!("Server error: {}", message),
        SessionNotice::ChannelError(message) => format!("Connection problem: {}", message),
        SessionNotice::Cancelled => "Game cancelled".to_string(),
        SessionNotice::RoundStarted {
            round,
            total_rounds,
        } => format!("Round {} of {} started", round, total_rounds),
        SessionNotice::DrawOffered => {
            "Your opponent offers a draw. Type 'accept-draw' to accept".to_string()
        }
        SessionNotice::RoundEnded(score) => format!("Round over, score {}", score),
        SessionNotice::OpponentAbandoned => {
            "Your opponent left the match and forfeits it".to_string()
        }
        SessionNotice::MatchEnded(confirmed) => match confirmed.winner {
            Some(winner) => format!(
                "Match over: {} ({}), {} won",
                confirmed.outcome, confirmed.score, winner
            ),
            None => format!("Match over: {} ({})", confirmed.outcome, confirmed.score),
        },
        SessionNotice::CompensatingCancel(game_id) => format!(
            "Funding for abandoned game {} confirmed late; asked the server to refund it",
            game_id
        ),
    }
}

pub fn close_line(report: &CloseReport) -> String {
    if report.settling {
        format!(
            "Left while {}. An escrow transaction is still settling; waiting for it before exiting",
            report.phase
        )
    } else if report.clean {
        "Goodbye".to_string()
    } else {
        format!(
            "Left while {}. The server was notified; settlement follows its verdict",
            report.phase
        )
    }
}

pub fn rates_line(snapshot: &RateSnapshot) -> String {
    format!(
        "{} is about £{:.2} / ${:.2} (as of {})",
        snapshot.amount,
        snapshot.gbp,
        snapshot.usd,
        snapshot.as_of.format("%H:%M:%S")
    )
}
