//! Integration tests for cw_client network functionality.
//!
//! Tests the websocket channel, the JSON-RPC escrow and the rate service
//! against local stand-in servers, plus connection failure handling.

mod common;

use async_trait::async_trait;
use chess_wager::{
    Address, GameId, LoopbackChannel, MatchIntent, SessionActor, SessionConfig, TimeControl,
    TxHash, Wei,
    channel::{ChannelError, ClientCommand, ConnectionState, RealtimeChannel, ServerEvent},
    currency::{ConversionError, RateService},
    escrow::{EscrowError, EscrowResult, EscrowService, NetworkError, WalletSnapshot},
    session::PhaseKind,
};
use common::{HttpRequest, WsServer, rpc_error, rpc_result, serve_http};
use cw_client::{
    config::ChainConfig, rate_client::HttpRateService, rpc_escrow::RpcEscrow,
    websocket_channel::WebSocketChannel,
};
use serde_json::json;
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::time::timeout;

const PLAYER: &str = "0x00000000000000000000000000000000000000aa";
const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

fn chain(rpc_url: &str) -> ChainConfig {
    ChainConfig {
        rpc_url: rpc_url.to_string(),
        contract: Address::parse(CONTRACT).unwrap(),
        account: Some(Address::parse(PLAYER).unwrap()),
        receipt_poll: Duration::from_millis(10),
        receipt_timeout: Duration::from_secs(2),
        balance_refresh: Duration::from_secs(15),
    }
}

fn game(token: &str) -> GameId {
    GameId::new(token).unwrap()
}

/// Escrow that confirms every transaction at once
struct InstantEscrow;

#[async_trait]
impl EscrowService for InstantEscrow {
    async fn create_game(&self, _: &GameId, _: Wei, _: Wei) -> EscrowResult<TxHash> {
        Ok(TxHash("0x01".to_string()))
    }

    async fn join_game(&self, _: &GameId, _: Wei) -> EscrowResult<TxHash> {
        Ok(TxHash("0x02".to_string()))
    }

    async fn gas_price(&self) -> Result<Wei, NetworkError> {
        Ok(Wei(1))
    }
}

// ============================================================================
// WebSocket Channel Tests
// ============================================================================

#[tokio::test]
async fn test_websocket_frames_flow_both_ways() {
    let mut server = WsServer::start().await;
    let channel = WebSocketChannel::new(server.url.clone());
    let mut subscription = channel.subscribe();

    channel.connect().await.unwrap();
    assert_eq!(channel.state(), ConnectionState::Connected);

    channel.send(ClientCommand::OfferDraw).await.unwrap();
    let frame = server.next_frame().await;
    assert_eq!(ClientCommand::decode(&frame).unwrap(), ClientCommand::OfferDraw);

    // An undecodable frame is skipped, later ones still arrive
    server.push("not json");
    server.push(r#"{"event":"drawOffer","gameId":"game-ws"}"#);
    let event = timeout(Duration::from_secs(5), subscription.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.game_id, Some(game("game-ws")));
    assert_eq!(event.event, ServerEvent::DrawOffer);

    channel.disconnect().await.unwrap();
    assert_eq!(channel.state(), ConnectionState::Disconnected);
    assert_eq!(
        channel.send(ClientCommand::Resign).await,
        Err(ChannelError::NotConnected)
    );
}

#[tokio::test]
async fn test_websocket_connection_refused() {
    // Nothing listens on the discard port
    let channel = WebSocketChannel::new("ws://127.0.0.1:9");

    let result = channel.connect().await;

    assert!(matches!(result, Err(ChannelError::Connect(_))));
    assert_eq!(channel.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_session_over_websocket_reaches_play() {
    let mut server = WsServer::start().await;
    let channel = Arc::new(WebSocketChannel::new(server.url.clone()));
    let handle = SessionActor::spawn(SessionConfig::default(), Arc::new(InstantEscrow), channel);

    handle
        .update_wallet(WalletSnapshot::connected(
            Address::parse(PLAYER).unwrap(),
            Wei::from_native(100).unwrap(),
        ))
        .await
        .unwrap();
    timeout(
        Duration::from_secs(5),
        handle.wait_for(|s| s.gas_quote().is_some()),
    )
    .await
    .unwrap()
    .unwrap();

    handle
        .submit(MatchIntent {
            time_control: TimeControl::Three,
            rounds: 1,
            wager: Wei::from_native(1).unwrap(),
            terms_accepted: true,
        })
        .await
        .unwrap();
    let frame = server.next_frame().await;
    assert!(frame.contains(r#""wagerAmount":1"#), "{frame}");
    assert!(matches!(
        ClientCommand::decode(&frame).unwrap(),
        ClientCommand::Create(request) if request.time_control == TimeControl::Three
    ));

    server.push(r#"{"event":"gameId","data":"game-ws"}"#);
    timeout(
        Duration::from_secs(5),
        handle.wait_for(|s| s.phase() == PhaseKind::AwaitingOpponent),
    )
    .await
    .unwrap()
    .unwrap();

    server.push(
        r#"{"event":"start","gameId":"game-ws","data":{"colour":"w","timeRemaining":180000,"round":1,"totalRounds":1}}"#,
    );
    let state = timeout(
        Duration::from_secs(5),
        handle.wait_for(|s| s.phase() == PhaseKind::Playing),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(state.game_id(), Some(&game("game-ws")));

    let report = handle.close().await.unwrap();
    assert!(!report.clean);
    assert!(!report.settling);
    let frame = server.next_frame().await;
    assert_eq!(ClientCommand::decode(&frame).unwrap(), ClientCommand::Exit);
    timeout(Duration::from_secs(5), handle.closed()).await.unwrap();
}

#[tokio::test]
async fn test_loopback_and_websocket_share_the_channel_contract() {
    let channels: Vec<Arc<dyn RealtimeChannel>> = vec![
        Arc::new(LoopbackChannel::new()),
        Arc::new(WebSocketChannel::new("ws://127.0.0.1:9")),
    ];
    for channel in channels {
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert_eq!(
            channel.send(ClientCommand::Exit).await,
            Err(ChannelError::NotConnected)
        );
    }
}

// ============================================================================
// JSON-RPC Escrow Tests
// ============================================================================

#[tokio::test]
async fn test_gas_price_and_balance_queries() {
    let (url, _server) = serve_http(|request: &HttpRequest| match request.body["method"].as_str() {
        Some("eth_gasPrice") => rpc_result(request, json!("0x3b9aca00")),
        Some("eth_getBalance") => {
            assert_eq!(request.body["params"][0], PLAYER);
            rpc_result(request, json!("0xde0b6b3a7640000"))
        }
        _ => rpc_error(request, -32601, "method not found"),
    })
    .await;

    let escrow = RpcEscrow::connect(&chain(&url), 300_000).await.unwrap();

    assert_eq!(escrow.gas_price().await.unwrap(), Wei(1_000_000_000));
    let wallet = escrow.wallet().await.unwrap();
    assert!(wallet.is_connected());
    assert_eq!(wallet.balance, Wei::from_native(1).unwrap());
}

#[tokio::test]
async fn test_node_account_used_when_none_configured() {
    let (url, _server) = serve_http(|request: &HttpRequest| match request.body["method"].as_str() {
        Some("eth_accounts") => rpc_result(request, json!([PLAYER])),
        _ => rpc_error(request, -32601, "method not found"),
    })
    .await;

    let mut config = chain(&url);
    config.account = None;
    let escrow = RpcEscrow::connect(&config, 300_000).await.unwrap();

    assert_eq!(escrow.account(), &Address::parse(PLAYER).unwrap());
}

#[tokio::test]
async fn test_create_game_sends_value_and_waits_for_receipt() {
    let polls = Arc::new(AtomicUsize::new(0));
    let seen_polls = polls.clone();
    let (url, _server) = serve_http(move |request: &HttpRequest| {
        match request.body["method"].as_str() {
            Some("eth_sendTransaction") => {
                let tx = &request.body["params"][0];
                assert_eq!(tx["to"], CONTRACT);
                assert_eq!(tx["from"], PLAYER);
                // 1.05 native
                assert_eq!(tx["value"], "0xe92596fd6290000");
                assert!(tx["data"].as_str().unwrap().starts_with("0x6dd5e67c"));
                rpc_result(request, json!("0xfeed"))
            }
            Some("eth_getTransactionReceipt") => {
                // Pending on the first poll
                if seen_polls.fetch_add(1, Ordering::SeqCst) == 0 {
                    rpc_result(request, json!(null))
                } else {
                    rpc_result(request, json!({ "status": "0x1" }))
                }
            }
            _ => rpc_error(request, -32601, "method not found"),
        }
    })
    .await;

    let escrow = RpcEscrow::connect(&chain(&url), 300_000).await.unwrap();
    let hash = escrow
        .create_game(
            &game("game-rpc"),
            Wei::from_native(1).unwrap(),
            Wei::parse_native("1.05").unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(hash, TxHash("0xfeed".to_string()));
    assert!(polls.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn test_reverted_join_is_network_rejection() {
    let (url, _server) = serve_http(|request: &HttpRequest| match request.body["method"].as_str() {
        Some("eth_sendTransaction") => {
            let data = request.body["params"][0]["data"].as_str().unwrap();
            assert!(data.starts_with("0x3d536a2e"));
            rpc_result(request, json!("0xbad"))
        }
        Some("eth_getTransactionReceipt") => rpc_result(request, json!({ "status": "0x0" })),
        _ => rpc_error(request, -32601, "method not found"),
    })
    .await;

    let escrow = RpcEscrow::connect(&chain(&url), 300_000).await.unwrap();
    let result = escrow
        .join_game(&game("game-revert"), Wei::from_native(2).unwrap())
        .await;

    assert_eq!(
        result,
        Err(EscrowError::NetworkRejected("execution reverted".to_string()))
    );
}

#[tokio::test]
async fn test_declined_signature_is_user_rejection() {
    let (url, _server) = serve_http(|request: &HttpRequest| {
        rpc_error(request, 4001, "User rejected the request.")
    })
    .await;

    let escrow = RpcEscrow::connect(&chain(&url), 300_000).await.unwrap();
    let result = escrow
        .create_game(&game("game-no"), Wei(1), Wei(2))
        .await;

    assert_eq!(result, Err(EscrowError::UserRejected));
}

#[tokio::test]
async fn test_node_unreachable() {
    let escrow = RpcEscrow::connect(&chain("http://127.0.0.1:9"), 300_000)
        .await
        .unwrap();

    let result = escrow.gas_price().await;

    assert!(matches!(result, Err(NetworkError::Request(_))));
}

// ============================================================================
// Rate Service Tests
// ============================================================================

#[tokio::test]
async fn test_rate_lookup_passes_amount() {
    let (url, _server) = serve_http(|request: &HttpRequest| {
        assert_eq!(request.method, "GET");
        assert!(request.target.contains("amount=2.5"));
        (200, r#"{"gbp":5.0,"usd":6.25}"#.to_string())
    })
    .await;

    let rates = HttpRateService::new(format!("{}/convert", url))
        .lookup(2.5)
        .await
        .unwrap();

    assert_eq!(rates.gbp, 5.0);
    assert_eq!(rates.usd, 6.25);
}

#[tokio::test]
async fn test_rate_service_error_status() {
    let (url, _server) =
        serve_http(|_: &HttpRequest| (503, r#"{"error":"busy"}"#.to_string())).await;

    let result = HttpRateService::new(url).lookup(1.0).await;

    assert!(matches!(result, Err(ConversionError::Lookup(_))));
}

#[tokio::test]
async fn test_rate_service_malformed_body() {
    let (url, _server) = serve_http(|_: &HttpRequest| (200, r#"{"eur":1.0}"#.to_string())).await;

    let result = HttpRateService::new(url).lookup(1.0).await;

    assert!(matches!(result, Err(ConversionError::Malformed(_))));
}
