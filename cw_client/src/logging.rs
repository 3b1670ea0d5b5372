//! Structured logging configuration.
//!
//! Library crates log through the `log` facade; the subscriber installed
//! here also captures those records.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "warn,cw_client=info,chess_wager=info";

/// Initialize structured logging
///
/// Log lines go to stderr so they never interleave with the command
/// prompt on stdout. Levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use cw_client::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Client starting");
/// }
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::debug!("Structured logging initialized");
}

/// Log a chain transaction milestone with structured fields
pub fn log_transaction(stage: &str, game_id: &str, tx_hash: Option<&str>) {
    tracing::info!(
        stage = stage,
        game_id = game_id,
        tx_hash = tx_hash,
        "Escrow transaction {}",
        stage
    );
}
