//! Escrow module funding wagers through the on-chain game contract.
//!
//! This module implements:
//! - The call contract of the escrow smart contract ([`EscrowService`])
//! - Percentage commission on top of the wager
//! - Affordability checks (wager + commission + estimated gas)
//! - Best-effort gas price estimation
//!
//! A fund call submits exactly one irreversible transaction and never
//! retries; retrying is the caller's decision and requires a new game id.

pub mod client;
pub mod errors;
pub mod models;

pub use client::{EscrowClient, EscrowService};
pub use errors::{EscrowError, EscrowResult, NetworkError, first_clause};
pub use models::{EscrowReceipt, FundingCost, GasQuote, WalletSnapshot, commission_for};
