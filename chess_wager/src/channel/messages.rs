//! Wire messages exchanged with the matchmaking server.
//!
//! Frames are JSON objects of the form
//! `{"event": "<name>", "gameId": "<token>"?, "data": <payload>?}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::{collections::BTreeMap, fmt};

use super::errors::{ChannelError, ChannelResult};
use crate::types::{Address, Colour, GameId, TimeControl, Wei};

/// Terms of a game offered to a joining player.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameInfo {
    pub wager_amount: Wei,
    pub time_control: TimeControl,
    pub total_rounds: u32,
}

/// Round start issued once both sides are matched and escrowed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInfo {
    pub colour: Colour,
    /// Clock for this round, in milliseconds.
    pub time_remaining: u64,
    pub round: u32,
    pub total_rounds: u32,
}

/// How a round was decided. Only abandonment changes how the session
/// reacts; every other outcome is kept as the server's text.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RoundOutcome {
    /// A player left mid-match and forfeits it
    Abandoned,
    Decided(String),
}

impl From<String> for RoundOutcome {
    fn from(outcome: String) -> Self {
        if outcome.eq_ignore_ascii_case("abandoned") {
            Self::Abandoned
        } else {
            Self::Decided(outcome)
        }
    }
}

impl From<RoundOutcome> for String {
    fn from(outcome: RoundOutcome) -> String {
        match outcome {
            RoundOutcome::Abandoned => "abandoned".to_string(),
            RoundOutcome::Decided(outcome) => outcome,
        }
    }
}

impl fmt::Display for RoundOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Abandoned => write!(f, "abandoned"),
            Self::Decided(outcome) => write!(f, "{outcome}"),
        }
    }
}

/// Board update relayed by the server. A move that decides the round
/// carries `outcome`; plain moves carry only board fields, which the
/// session does not track.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveUpdate {
    /// Round winner as a player index of the current round (0 black,
    /// 1 white), absent for a drawn round.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RoundOutcome>,
    /// Points per player, keyed by the server's connection ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_score: Option<BTreeMap<String, Number>>,
}

impl MoveUpdate {
    pub fn round_over(winner: Option<u8>, outcome: RoundOutcome) -> Self {
        Self {
            winner,
            outcome: Some(outcome),
            match_score: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// 0 for the player who held black in the final round, 1 for white,
    /// absent for a drawn match.
    pub overall_winner: Option<u8>,
}

/// Events pushed by the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Token for a freshly created game
    GameId(GameId),
    /// Answer to a join request
    GameInfo(GameInfo),
    Start(StartInfo),
    DrawOffer,
    /// Board update; ends the round when it carries an outcome
    Move(MoveUpdate),
    MatchEnded(MatchResult),
    /// Acknowledgement of a cancel request
    GameCancelled,
    Error(String),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GameId(_) => "gameId",
            Self::GameInfo(_) => "gameInfo",
            Self::Start(_) => "start",
            Self::DrawOffer => "drawOffer",
            Self::Move(_) => "move",
            Self::MatchEnded(_) => "matchEnded",
            Self::GameCancelled => "gameCancelled",
            Self::Error(_) => "error",
        }
    }
}

/// An inbound event plus the game it is tagged for, if any.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEvent {
    pub game_id: Option<GameId>,
    pub event: ServerEvent,
}

impl ChannelEvent {
    pub fn untagged(event: ServerEvent) -> Self {
        Self {
            game_id: None,
            event,
        }
    }

    pub fn tagged(game_id: GameId, event: ServerEvent) -> Self {
        Self {
            game_id: Some(game_id),
            event,
        }
    }

    /// Decode a text frame received from the server.
    pub fn decode(frame: &str) -> ChannelResult<Self> {
        let mut object: Map<String, Value> =
            serde_json::from_str(frame).map_err(|e| ChannelError::Decode(e.to_string()))?;

        let game_id = match object.remove("gameId") {
            None | Some(Value::Null) => None,
            Some(value) => Some(
                serde_json::from_value::<GameId>(value)
                    .map_err(|e| ChannelError::Decode(e.to_string()))?,
            ),
        };
        if matches!(object.get("data"), Some(Value::Null)) {
            object.remove("data");
        }

        let event = serde_json::from_value(Value::Object(object))
            .map_err(|e| ChannelError::Decode(e.to_string()))?;

        Ok(Self { game_id, event })
    }

    /// Encode as a text frame. Used by test servers and loopback transports.
    pub fn encode(&self) -> ChannelResult<String> {
        let mut value =
            serde_json::to_value(&self.event).map_err(|e| ChannelError::Encode(e.to_string()))?;
        if let (Some(game_id), Value::Object(object)) = (&self.game_id, &mut value) {
            object.insert("gameId".to_string(), Value::String(game_id.to_string()));
        }
        Ok(value.to_string())
    }
}

/// Create request sent when a player opens a new match.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub time_control: TimeControl,
    pub wager_amount: Wei,
    pub address: Address,
    pub rounds: u32,
}

/// Commands sent to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientCommand {
    Create(CreateRequest),
    #[serde(rename_all = "camelCase")]
    GetGameDetails { game_id: GameId },
    #[serde(rename_all = "camelCase")]
    AcceptGame { game_id: GameId, address: Address },
    /// `created_on_contract` tells the server whether the escrow must be
    /// cashed out on the contract.
    #[serde(rename_all = "camelCase")]
    Cancel { created_on_contract: bool },
    OfferDraw,
    AcceptDraw,
    Resign,
    /// Courtesy notice that the client is leaving mid-session.
    Exit,
}

impl ClientCommand {
    pub fn encode(&self) -> ChannelResult<String> {
        serde_json::to_string(self).map_err(|e| ChannelError::Encode(e.to_string()))
    }

    pub fn decode(frame: &str) -> ChannelResult<Self> {
        serde_json::from_str(frame).map_err(|e| ChannelError::Decode(e.to_string()))
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Create(_) => "create",
            Self::GetGameDetails { .. } => "getGameDetails",
            Self::AcceptGame { .. } => "acceptGame",
            Self::Cancel { .. } => "cancel",
            Self::OfferDraw => "offerDraw",
            Self::AcceptDraw => "acceptDraw",
            Self::Resign => "resign",
            Self::Exit => "exit",
        };
        write!(f, "{repr}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_start_frame() {
        let frame = r#"{"event":"start","gameId":"g-1","data":{"colour":"b","timeRemaining":300000,"round":1,"totalRounds":3}}"#;
        let event = ChannelEvent::decode(frame).unwrap();
        assert_eq!(event.game_id, GameId::new("g-1"));
        assert_eq!(
            event.event,
            ServerEvent::Start(StartInfo {
                colour: Colour::Black,
                time_remaining: 300_000,
                round: 1,
                total_rounds: 3,
            })
        );
    }

    #[test]
    fn test_decode_unit_event_with_null_data() {
        let event = ChannelEvent::decode(r#"{"event":"drawOffer","data":null}"#).unwrap();
        assert_eq!(event, ChannelEvent::untagged(ServerEvent::DrawOffer));
    }

    #[test]
    fn test_decode_match_ended_draw() {
        let event =
            ChannelEvent::decode(r#"{"event":"matchEnded","data":{"overallWinner":null}}"#).unwrap();
        assert_eq!(
            event.event,
            ServerEvent::MatchEnded(MatchResult {
                overall_winner: None
            })
        );
    }

    #[test]
    fn test_decode_game_info_with_integer_wager() {
        let event = ChannelEvent::decode(
            r#"{"event":"gameInfo","data":{"wagerAmount":2,"timeControl":5,"totalRounds":3}}"#,
        )
        .unwrap();
        let ServerEvent::GameInfo(info) = event.event else {
            panic!("expected gameInfo");
        };
        assert_eq!(info.wager_amount, Wei::from_native(2).unwrap());
        assert_eq!(info.time_control, TimeControl::Five);
    }

    #[test]
    fn test_decode_abandonment_move() {
        let frame = r#"{"event":"move","gameId":"g-1","data":{"winner":1,"outcome":"ABANDONED","matchScore":{"sid-a":1,"sid-b":0}}}"#;
        let event = ChannelEvent::decode(frame).unwrap();
        let ServerEvent::Move(update) = event.event else {
            panic!("expected move");
        };
        assert_eq!(update.winner, Some(1));
        assert_eq!(update.outcome, Some(RoundOutcome::Abandoned));
        assert_eq!(update.match_score.map(|score| score.len()), Some(2));
    }

    #[test]
    fn test_decode_plain_move_ignores_board_fields() {
        let frame = r#"{"event":"move","data":{"from":"e2","to":"e4","fen":"rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1"}}"#;
        let event = ChannelEvent::decode(frame).unwrap();
        assert_eq!(event.event, ServerEvent::Move(MoveUpdate::default()));

        let decided = ChannelEvent::decode(
            r#"{"event":"move","data":{"winner":null,"outcome":"stalemate","matchScore":{}}}"#,
        )
        .unwrap();
        let ServerEvent::Move(update) = decided.event else {
            panic!("expected move");
        };
        assert_eq!(update.winner, None);
        assert_eq!(
            update.outcome,
            Some(RoundOutcome::Decided("stalemate".to_string()))
        );
    }

    #[test]
    fn test_decode_rejects_empty_game_id() {
        assert!(matches!(
            ChannelEvent::decode(r#"{"event":"gameId","data":""}"#),
            Err(ChannelError::Decode(_))
        ));
        assert!(matches!(
            ChannelEvent::decode(r#"{"event":"drawOffer","gameId":""}"#),
            Err(ChannelError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_unknown_event() {
        assert!(matches!(
            ChannelEvent::decode(r#"{"event":"teleport"}"#),
            Err(ChannelError::Decode(_))
        ));
    }

    #[test]
    fn test_tagged_event_survives_encoding() {
        let event = ChannelEvent::tagged(GameId::new("g-9").unwrap(), ServerEvent::GameCancelled);
        let frame = event.encode().unwrap();
        assert_eq!(ChannelEvent::decode(&frame).unwrap(), event);
    }

    #[test]
    fn test_encode_cancel_command() {
        let frame = ClientCommand::Cancel {
            created_on_contract: true,
        }
        .encode()
        .unwrap();
        assert_eq!(frame, r#"{"event":"cancel","data":{"createdOnContract":true}}"#);
        assert_eq!(ClientCommand::Resign.encode().unwrap(), r#"{"event":"resign"}"#);
    }

    #[test]
    fn test_encode_create_command() {
        let command = ClientCommand::Create(CreateRequest {
            time_control: TimeControl::Five,
            wager_amount: Wei::from_native(1).unwrap(),
            address: Address::parse("0x00000000000000000000000000000000000000aa").unwrap(),
            rounds: 1,
        });
        let frame = command.encode().unwrap();
        assert!(frame.contains(r#""wagerAmount":1"#), "{frame}");

        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["event"], "create");
        assert_eq!(value["data"]["timeControl"], 5);
        assert!(value["data"]["wagerAmount"].is_u64());
        assert_eq!(value["data"]["rounds"], 1);
    }
}
