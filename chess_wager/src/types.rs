//! Primitive domain types shared by the escrow, channel and session layers.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use std::fmt;
use thiserror::Error;

use crate::constants::NATIVE_DECIMALS;

const WEI_PER_NATIVE: u128 = 10u128.pow(NATIVE_DECIMALS);

/// Errors raised while parsing user-supplied identifiers and amounts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("amount is empty")]
    EmptyAmount,
    #[error("malformed amount '{0}'")]
    MalformedAmount(String),
    #[error("amount '{0}' has more than 18 decimal places")]
    TooPrecise(String),
    #[error("amount '{0}' is too large")]
    Overflow(String),
    #[error("invalid wallet address '{0}'")]
    InvalidAddress(String),
    #[error("invalid game code")]
    InvalidGameCode,
    #[error("game id is empty")]
    EmptyGameId,
}

/// An amount in the chain's base unit (10^-18 of the native asset).
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Wei(pub u128);

impl Wei {
    pub const ZERO: Wei = Wei(0);

    /// Whole native units, e.g. `Wei::from_native(1)` is one full coin.
    pub fn from_native(units: u128) -> Option<Self> {
        units.checked_mul(WEI_PER_NATIVE).map(Wei)
    }

    /// Parse a decimal native amount such as `"1.25"` without losing precision.
    pub fn parse_native(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseError::EmptyAmount);
        }

        let (whole, fraction) = match trimmed.split_once('.') {
            Some((whole, fraction)) => (whole, fraction),
            None => (trimmed, ""),
        };

        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if (whole.is_empty() && fraction.is_empty()) || !digits_only(whole) || !digits_only(fraction)
        {
            return Err(ParseError::MalformedAmount(trimmed.to_string()));
        }
        if fraction.len() > NATIVE_DECIMALS as usize {
            return Err(ParseError::TooPrecise(trimmed.to_string()));
        }

        let overflow = || ParseError::Overflow(trimmed.to_string());
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let fraction: u128 = if fraction.is_empty() {
            0
        } else {
            let scale = 10u128.pow(NATIVE_DECIMALS - fraction.len() as u32);
            fraction.parse::<u128>().map_err(|_| overflow())? * scale
        };

        whole
            .checked_mul(WEI_PER_NATIVE)
            .and_then(|w| w.checked_add(fraction))
            .map(Wei)
            .ok_or_else(overflow)
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Amount in whole native units, or `None` if it has a fractional part.
    pub fn whole_native(self) -> Option<u128> {
        (self.0 % WEI_PER_NATIVE == 0).then(|| self.0 / WEI_PER_NATIVE)
    }

    pub fn checked_add(self, other: Wei) -> Option<Wei> {
        self.0.checked_add(other.0).map(Wei)
    }

    pub fn saturating_add(self, other: Wei) -> Wei {
        Wei(self.0.saturating_add(other.0))
    }

    pub fn saturating_sub(self, other: Wei) -> Wei {
        Wei(self.0.saturating_sub(other.0))
    }

    /// Lossy conversion used only for display-side currency lookups.
    pub fn to_native_f64(self) -> f64 {
        self.0 as f64 / WEI_PER_NATIVE as f64
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / WEI_PER_NATIVE;
        let fraction = self.0 % WEI_PER_NATIVE;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let padded = format!("{fraction:0width$}", width = NATIVE_DECIMALS as usize);
        write!(f, "{whole}.{}", padded.trim_end_matches('0'))
    }
}

// The matchmaking server counts wagers in whole coins, so whole amounts
// travel as JSON integers. Fractions fall back to decimal strings.
impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.whole_native() {
            Some(units) => match u64::try_from(units) {
                Ok(units) => serializer.serialize_u64(units),
                Err(_) => serializer.serialize_u128(units),
            },
            None => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NativeAmount;

        impl de::Visitor<'_> for NativeAmount {
            type Value = Wei;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "a native amount as a decimal string or whole number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Wei, E> {
                Wei::parse_native(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Wei, E> {
                Wei::from_native(u128::from(v)).ok_or_else(|| E::custom("amount overflow"))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Wei, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom("negative amount"))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_any(NativeAmount)
    }
}

/// A `0x`-prefixed 20-byte account address.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let trimmed = input.trim();
        let valid = trimmed.len() == 42
            && trimmed.starts_with("0x")
            && trimmed[2..].bytes().all(|b| b.is_ascii_hexdigit());
        if valid {
            Ok(Self(trimmed.to_lowercase()))
        } else {
            Err(ParseError::InvalidAddress(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque game token issued by the matchmaking server.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GameId(String);

impl GameId {
    /// Wrap a server-issued token. Empty tokens are rejected.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Parse a game code typed in by a joining player. Codes are UUIDs.
    pub fn parse_code(input: &str) -> Result<Self, ParseError> {
        uuid::Uuid::parse_str(input.trim())
            .map(|id| Self(id.to_string()))
            .map_err(|_| ParseError::InvalidGameCode)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GameId {
    type Error = ParseError;

    fn try_from(token: String) -> Result<Self, Self::Error> {
        Self::new(token).ok_or(ParseError::EmptyGameId)
    }
}

impl From<GameId> for String {
    fn from(game_id: GameId) -> String {
        game_id.0
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction hash returned by the chain.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxHash(pub String);

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum Colour {
    #[serde(rename = "w", alias = "white")]
    White,
    #[serde(rename = "b", alias = "black")]
    Black,
}

impl Colour {
    pub fn opponent(self) -> Self {
        match self {
            Colour::White => Colour::Black,
            Colour::Black => Colour::White,
        }
    }

    /// Player index used by the server when announcing a winner: index 0
    /// holds black in the round concerned, index 1 holds white.
    pub fn from_player_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Colour::Black),
            1 => Some(Colour::White),
            _ => None,
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Colour::White => write!(f, "white"),
            Colour::Black => write!(f, "black"),
        }
    }
}

/// Minutes on each player's clock.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum TimeControl {
    Three,
    Five,
    Ten,
    Thirty,
}

impl TimeControl {
    pub fn minutes(self) -> u32 {
        match self {
            TimeControl::Three => 3,
            TimeControl::Five => 5,
            TimeControl::Ten => 10,
            TimeControl::Thirty => 30,
        }
    }

    pub fn from_minutes(minutes: u32) -> Option<Self> {
        match minutes {
            3 => Some(TimeControl::Three),
            5 => Some(TimeControl::Five),
            10 => Some(TimeControl::Ten),
            30 => Some(TimeControl::Thirty),
            _ => None,
        }
    }
}

impl TryFrom<u32> for TimeControl {
    type Error = String;

    fn try_from(minutes: u32) -> Result<Self, Self::Error> {
        Self::from_minutes(minutes).ok_or_else(|| format!("invalid time control {minutes}"))
    }
}

impl From<TimeControl> for u32 {
    fn from(tc: TimeControl) -> u32 {
        tc.minutes()
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.minutes())
    }
}
