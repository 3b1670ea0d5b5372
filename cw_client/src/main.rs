//! Terminal client for wagered chess matches.
//!
//! The client connects to the matchmaking server over a websocket, funds
//! the escrow contract through a chain node and drives a single match
//! session from typed commands.

use anyhow::{Context, Result};
use chess_wager::{SessionActor, currency::CurrencyConverter};
use ctrlc::set_handler;
use pico_args::Arguments;
use std::sync::Arc;
use tokio::sync::mpsc;

use cw_client::{
    app::App, config::ClientConfig, logging, rate_client::HttpRateService,
    rpc_escrow::RpcEscrow, websocket_channel::WebSocketChannel,
};

const HELP: &str = "\
Play wagered chess matches against peers

USAGE:
  cw_client [OPTIONS]

OPTIONS:
  --server URL          Matchmaking websocket URL  [default: env CHESS_SERVER_URL or ws://127.0.0.1:8000/ws]
  --rpc URL             Chain node JSON-RPC URL    [default: env CHAIN_RPC_URL or http://127.0.0.1:8545]
  --account ADDRESS     Player account             [default: env WALLET_ACCOUNT or the node's first account]

FLAGS:
  -h, --help            Print help information

ENVIRONMENT:
  ESCROW_CONTRACT       Escrow contract address (required)
  RATE_SERVICE_URL      Fiat rate lookup endpoint
  COMMISSION_PERCENTAGE Platform fee on top of the wager [default: 5]
  MAX_WAGER             Largest accepted wager in native units [default: 1000]
  RUST_LOG              Log filter
  (See .env file for all configuration options)
";

struct Args {
    server_url: Option<String>,
    rpc_url: Option<String>,
    account: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        server_url: pargs.opt_value_from_str("--server")?,
        rpc_url: pargs.opt_value_from_str("--rpc")?,
        account: pargs.opt_value_from_str("--account")?,
    };

    logging::init();
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let config = ClientConfig::from_env(args.server_url, args.rpc_url, args.account)
        .context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    tracing::info!(
        server = %config.server_url,
        rpc = %config.chain.rpc_url,
        "Starting chess wager client"
    );

    let escrow = Arc::new(
        RpcEscrow::connect(&config.chain, config.session.gas_limit)
            .await
            .context("Failed to reach chain node")?,
    );
    let wallet = escrow
        .wallet()
        .await
        .context("Failed to read wallet balance")?;
    println!("Playing as {} (balance {})", escrow.account(), wallet.balance);

    let channel = Arc::new(WebSocketChannel::new(config.server_url.clone()));
    let handle = SessionActor::spawn(config.session.clone(), escrow.clone(), channel);
    handle
        .update_wallet(wallet)
        .await
        .context("Session stopped during startup")?;

    let converter = CurrencyConverter::spawn(
        Arc::new(HttpRateService::new(config.rates.url.clone())),
        config.rates.cooldown,
    );

    // Ctrl-C is routed to the command loop, which decides whether leaving is safe
    let (interrupt_tx, interrupts) = mpsc::unbounded_channel();
    set_handler(move || {
        let _ = interrupt_tx.send(());
    })?;

    App::new(handle, escrow, converter, config.chain.balance_refresh)
        .run(interrupts)
        .await
}
