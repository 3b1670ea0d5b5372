//! Display-only conversion of wager amounts into fiat currencies.
//!
//! Conversions never influence the session state machine. Lookups are
//! rate limited with a trailing cooldown and a failed lookup keeps the
//! previous snapshot on screen.

pub mod converter;

pub use converter::{ConversionError, CurrencyConverter, RateService, RateSnapshot, Rates};
