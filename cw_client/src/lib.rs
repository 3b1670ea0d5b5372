//! Internal modules for the chess wager client.
//!
//! This library provides configuration, logging, command parsing and the
//! network implementations of the session's escrow, channel and rate
//! seams used by the cw_client binary.

pub mod app;
pub mod commands;
pub mod config;
pub mod logging;
pub mod rate_client;
pub mod render;
pub mod rpc_escrow;
pub mod websocket_channel;
