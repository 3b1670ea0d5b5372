use chess_wager::{MatchIntent, TimeControl, Wei};
use std::fmt;

/// Commands typed at the client prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Open a new match; terms are accepted by the trailing `agree`
    Create(MatchIntent),
    /// Look up a game by the code its creator shared
    Join(String),
    /// Fund and accept the looked-up game
    AcceptJoin,
    /// Decline the looked-up game, or cancel a waiting one
    Cancel,
    OfferDraw,
    AcceptDraw,
    Resign,
    /// Fiat value of an amount
    Quote(Wei),
    Status,
    Help,
    Quit,
}

/// Errors that can occur during command parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Command is missing arguments; carries its usage line.
    MissingArguments(&'static str),
    /// Time control is not one of the offered minutes.
    InvalidTimeControl(String),
    /// Rounds is not a number.
    InvalidRounds(String),
    /// Amount is not a decimal native amount.
    InvalidAmount(String),
    /// Unrecognized command.
    UnrecognizedCommand(String),
}

const CREATE_USAGE: &str = "create MINUTES ROUNDS WAGER agree";
const JOIN_USAGE: &str = "join GAME_CODE";
const QUOTE_USAGE: &str = "quote AMOUNT";

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingArguments(usage) => write!(f, "Missing arguments. Usage: '{}'", usage),
            Self::InvalidTimeControl(value) => write!(
                f,
                "Invalid time control '{}'. Must be 3, 5, 10 or 30 minutes",
                value
            ),
            Self::InvalidRounds(value) => write!(
                f,
                "Invalid rounds '{}'. Must be a whole number (e.g., 'create 5 3 0.5 agree')",
                value
            ),
            Self::InvalidAmount(value) => write!(
                f,
                "Invalid amount '{}'. Must be a decimal amount (e.g., '0.25')",
                value
            ),
            Self::UnrecognizedCommand(cmd) => write!(
                f,
                "Unrecognized command '{}'. Type 'help' to see available commands",
                cmd
            ),
        }
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
Commands:
  create MINUTES ROUNDS WAGER agree   Open a match and fund the escrow
                                      ('agree' accepts the wagering terms)
  join GAME_CODE                      Look up a shared game
  accept                              Fund and accept the looked-up game
  cancel                              Cancel a waiting game or decline an offer
  draw                                Offer a draw
  accept-draw                         Accept the opponent's draw offer
  resign                              Resign the match
  quote AMOUNT                        Show the fiat value of an amount
  status                              Show the session
  help                                Show this help
  quit                                Leave";

/// Parse a command string into a [`Command`].
///
/// # Examples
///
/// ```
/// use cw_client::commands::{Command, parse_command};
///
/// assert_eq!(parse_command("resign"), Ok(Command::Resign));
/// assert!(matches!(parse_command("create 5 3 0.5 agree"), Ok(Command::Create(_))));
/// ```
pub fn parse_command(input: &str) -> Result<Command, ParseError> {
    let trimmed = input.trim();

    // Try single-word commands first
    match trimmed {
        "accept" => return Ok(Command::AcceptJoin),
        "accept-draw" => return Ok(Command::AcceptDraw),
        "cancel" | "decline" => return Ok(Command::Cancel),
        "draw" => return Ok(Command::OfferDraw),
        "help" | "?" => return Ok(Command::Help),
        "quit" | "exit" => return Ok(Command::Quit),
        "resign" => return Ok(Command::Resign),
        "status" => return Ok(Command::Status),
        _ => {}
    }

    let parts: Vec<&str> = trimmed.split_ascii_whitespace().collect();
    match parts.first() {
        Some(&"create") => parse_create_command(&parts),
        Some(&"join") => match parts.get(1) {
            Some(code) => Ok(Command::Join(code.to_string())),
            None => Err(ParseError::MissingArguments(JOIN_USAGE)),
        },
        Some(&"quote") => match parts.get(1) {
            Some(amount) => parse_amount(amount).map(Command::Quote),
            None => Err(ParseError::MissingArguments(QUOTE_USAGE)),
        },
        _ => Err(ParseError::UnrecognizedCommand(trimmed.to_string())),
    }
}

/// Parse a create command: "create MINUTES ROUNDS WAGER [agree]"
///
/// Rounds and wager bounds are left to the session, which owns them.
fn parse_create_command(parts: &[&str]) -> Result<Command, ParseError> {
    let (Some(minutes), Some(rounds), Some(wager)) = (parts.get(1), parts.get(2), parts.get(3))
    else {
        return Err(ParseError::MissingArguments(CREATE_USAGE));
    };

    let time_control = minutes
        .parse::<u32>()
        .ok()
        .and_then(TimeControl::from_minutes)
        .ok_or_else(|| ParseError::InvalidTimeControl(minutes.to_string()))?;
    let rounds = rounds
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidRounds(rounds.to_string()))?;
    let wager = parse_amount(wager)?;

    Ok(Command::Create(MatchIntent {
        time_control,
        rounds,
        wager,
        terms_accepted: parts.get(4) == Some(&"agree"),
    }))
}

fn parse_amount(value: &str) -> Result<Wei, ParseError> {
    Wei::parse_native(value).map_err(|_| ParseError::InvalidAmount(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Single-word command tests ===

    #[test]
    fn test_parse_single_word_commands() {
        assert_eq!(parse_command("accept"), Ok(Command::AcceptJoin));
        assert_eq!(parse_command("accept-draw"), Ok(Command::AcceptDraw));
        assert_eq!(parse_command("cancel"), Ok(Command::Cancel));
        assert_eq!(parse_command("decline"), Ok(Command::Cancel));
        assert_eq!(parse_command("draw"), Ok(Command::OfferDraw));
        assert_eq!(parse_command("resign"), Ok(Command::Resign));
        assert_eq!(parse_command("status"), Ok(Command::Status));
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_with_surrounding_whitespace() {
        assert_eq!(parse_command("  resign  "), Ok(Command::Resign));
    }

    // === Create command tests ===

    #[test]
    fn test_parse_create_with_agreement() {
        let result = parse_command("create 10 3 0.25 agree");
        let Ok(Command::Create(intent)) = result else {
            panic!("Expected Command::Create");
        };
        assert_eq!(intent.time_control, TimeControl::Ten);
        assert_eq!(intent.rounds, 3);
        assert_eq!(intent.wager, Wei::parse_native("0.25").unwrap());
        assert!(intent.terms_accepted);
    }

    #[test]
    fn test_parse_create_without_agreement() {
        let result = parse_command("create 5 1 1");
        assert!(matches!(result, Ok(Command::Create(intent)) if !intent.terms_accepted));
    }

    #[test]
    fn test_parse_create_out_of_range_rounds_left_to_session() {
        let result = parse_command("create 5 11 1 agree");
        assert!(matches!(result, Ok(Command::Create(intent)) if intent.rounds == 11));
    }

    #[test]
    fn test_parse_create_unknown_time_control() {
        let result = parse_command("create 7 1 1 agree");
        assert_eq!(
            result,
            Err(ParseError::InvalidTimeControl("7".to_string()))
        );
    }

    #[test]
    fn test_parse_create_invalid_rounds() {
        let result = parse_command("create 5 two 1 agree");
        assert!(matches!(result, Err(ParseError::InvalidRounds(_))));
    }

    #[test]
    fn test_parse_create_invalid_wager() {
        let result = parse_command("create 5 1 -1 agree");
        assert!(matches!(result, Err(ParseError::InvalidAmount(_))));
    }

    #[test]
    fn test_parse_create_missing_arguments() {
        assert_eq!(
            parse_command("create 5"),
            Err(ParseError::MissingArguments(CREATE_USAGE))
        );
    }

    // === Join and quote tests ===

    #[test]
    fn test_parse_join_keeps_code_verbatim() {
        assert_eq!(
            parse_command("join 7f1b3c1e-2d4f-4a8e-9a51-0c2f0e5d6b7a"),
            Ok(Command::Join("7f1b3c1e-2d4f-4a8e-9a51-0c2f0e5d6b7a".to_string()))
        );
        assert!(matches!(
            parse_command("join"),
            Err(ParseError::MissingArguments(_))
        ));
    }

    #[test]
    fn test_parse_quote() {
        assert_eq!(
            parse_command("quote 2.5"),
            Ok(Command::Quote(Wei::parse_native("2.5").unwrap()))
        );
    }

    // === Error cases ===

    #[test]
    fn test_parse_unrecognized_command() {
        let result = parse_command("castle");
        assert!(matches!(result, Err(ParseError::UnrecognizedCommand(_))));
    }

    #[test]
    fn test_parse_empty_string() {
        let result = parse_command("   ");
        assert!(matches!(result, Err(ParseError::UnrecognizedCommand(_))));
    }

    #[test]
    fn test_error_message_invalid_time_control() {
        let msg = ParseError::InvalidTimeControl("7".to_string()).to_string();
        assert!(msg.contains("'7'"));
        assert!(msg.contains("3, 5, 10 or 30"));
    }

    #[test]
    fn test_error_message_unrecognized_command() {
        let msg = ParseError::UnrecognizedCommand("xyz".to_string()).to_string();
        assert!(msg.contains("Unrecognized command"));
        assert!(msg.contains("help"));
    }
}
