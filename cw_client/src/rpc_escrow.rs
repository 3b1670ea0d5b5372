//! Escrow service backed by a chain node's JSON-RPC API.
//!
//! Transactions are signed by the node (`eth_sendTransaction`) on behalf of
//! the configured account, then polled until a receipt shows up.

use async_trait::async_trait;
use chess_wager::{
    Address, GameId, TxHash, Wei,
    escrow::{EscrowError, EscrowResult, EscrowService, NetworkError, WalletSnapshot},
};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use thiserror::Error;
use tokio::time::{Instant, sleep};

use crate::{config::ChainConfig, logging::log_transaction};

/// `createGame(string,uint256)`
const CREATE_GAME_SELECTOR: [u8; 4] = [0x6d, 0xd5, 0xe6, 0x7c];
/// `joinGame(string)`
const JOIN_GAME_SELECTOR: [u8; 4] = [0x3d, 0x53, 0x6a, 0x2e];

/// EIP-1193 code for a request the wallet owner declined
const USER_REJECTED_CODE: i64 = 4001;

const WORD: usize = 32;

/// JSON-RPC failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("{message}")]
    Node { code: i64, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl From<RpcError> for NetworkError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Malformed(message) => NetworkError::Malformed(message),
            other => NetworkError::Request(other.to_string()),
        }
    }
}

impl From<RpcError> for EscrowError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Node { code, .. } if code == USER_REJECTED_CODE => EscrowError::UserRejected,
            RpcError::Node { message, .. } if message.to_lowercase().contains("user denied") => {
                EscrowError::UserRejected
            }
            other => EscrowError::NetworkRejected(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct TransactionReceipt {
    status: Option<String>,
}

/// Minimal JSON-RPC 2.0 client over HTTP
pub struct RpcClient {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Call `method` and decode its result. A `null` result decodes into `Option::None`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Transport(format!("{} returned {}", method, status)));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Malformed(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }

        serde_json::from_value(body.result.unwrap_or(Value::Null))
            .map_err(|e| RpcError::Malformed(format!("{}: {}", method, e)))
    }
}

/// Escrow contract reached through a node that signs for the player
pub struct RpcEscrow {
    rpc: RpcClient,
    contract: Address,
    account: Address,
    gas_limit: u64,
    receipt_poll: Duration,
    receipt_timeout: Duration,
}

impl RpcEscrow {
    /// Connect to the node and resolve the signing account.
    ///
    /// Without a configured account the node's first account is used.
    pub async fn connect(chain: &ChainConfig, gas_limit: u64) -> Result<Self, RpcError> {
        let rpc = RpcClient::new(chain.rpc_url.clone());
        let account = match &chain.account {
            Some(account) => account.clone(),
            None => {
                let accounts: Vec<String> = rpc.call("eth_accounts", json!([])).await?;
                let first = accounts
                    .first()
                    .ok_or_else(|| RpcError::Malformed("node has no accounts".to_string()))?;
                Address::parse(first).map_err(|e| RpcError::Malformed(e.to_string()))?
            }
        };
        log::info!("Using account {} against contract {}", account, chain.contract);

        Ok(Self {
            rpc,
            contract: chain.contract.clone(),
            account,
            gas_limit,
            receipt_poll: chain.receipt_poll,
            receipt_timeout: chain.receipt_timeout,
        })
    }

    pub fn account(&self) -> &Address {
        &self.account
    }

    /// Current balance of the signing account.
    pub async fn wallet(&self) -> Result<WalletSnapshot, NetworkError> {
        let balance: String = self
            .rpc
            .call("eth_getBalance", json!([self.account, "latest"]))
            .await?;
        let balance = parse_quantity(&balance)?;
        Ok(WalletSnapshot::connected(self.account.clone(), balance))
    }

    async fn transact(&self, game_id: &GameId, data: Vec<u8>, value: Wei) -> EscrowResult<TxHash> {
        let transaction = json!({
            "from": self.account,
            "to": self.contract,
            "value": to_quantity(value.0),
            "gas": to_quantity(u128::from(self.gas_limit)),
            "data": format!("0x{}", hex::encode(data)),
        });

        let hash: String = self
            .rpc
            .call("eth_sendTransaction", json!([transaction]))
            .await
            .map_err(|e| {
                log_transaction("rejected", game_id.as_str(), None);
                EscrowError::from(e)
            })?;
        log_transaction("submitted", game_id.as_str(), Some(&hash));

        self.await_receipt(game_id, TxHash(hash)).await
    }

    async fn await_receipt(&self, game_id: &GameId, hash: TxHash) -> EscrowResult<TxHash> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            // The transaction is already out; a failed poll says nothing about it
            let receipt: Option<TransactionReceipt> = match self
                .rpc
                .call("eth_getTransactionReceipt", json!([hash.0]))
                .await
            {
                Ok(receipt) => receipt,
                Err(RpcError::Transport(e)) => {
                    log::warn!("Receipt poll for {} failed: {}", hash, e);
                    None
                }
                Err(e) => return Err(EscrowError::from(e)),
            };

            match receipt {
                Some(TransactionReceipt { status: Some(status) }) if status == "0x0" => {
                    log_transaction("reverted", game_id.as_str(), Some(&hash.0));
                    return Err(EscrowError::NetworkRejected("execution reverted".to_string()));
                }
                Some(_) => {
                    log_transaction("confirmed", game_id.as_str(), Some(&hash.0));
                    return Ok(hash);
                }
                None if Instant::now() >= deadline => {
                    log_transaction("timed out", game_id.as_str(), Some(&hash.0));
                    return Err(EscrowError::NetworkRejected(format!(
                        "no receipt for {} after {}s",
                        hash,
                        self.receipt_timeout.as_secs()
                    )));
                }
                None => sleep(self.receipt_poll).await,
            }
        }
    }
}

#[async_trait]
impl EscrowService for RpcEscrow {
    async fn create_game(&self, game_id: &GameId, wager: Wei, value: Wei) -> EscrowResult<TxHash> {
        self.transact(game_id, encode_create_game(game_id.as_str(), wager), value)
            .await
    }

    async fn join_game(&self, game_id: &GameId, value: Wei) -> EscrowResult<TxHash> {
        self.transact(game_id, encode_join_game(game_id.as_str()), value)
            .await
    }

    async fn gas_price(&self) -> Result<Wei, NetworkError> {
        let price: String = self.rpc.call("eth_gasPrice", json!([])).await?;
        parse_quantity(&price)
    }
}

/// Calldata for `createGame(string gameId, uint256 wager)`
pub fn encode_create_game(game_id: &str, wager: Wei) -> Vec<u8> {
    let mut data = CREATE_GAME_SELECTOR.to_vec();
    // Head: offset of the string, then the wager
    data.extend(uint_word(2 * WORD as u128));
    data.extend(uint_word(wager.0));
    data.extend(string_tail(game_id));
    data
}

/// Calldata for `joinGame(string gameId)`
pub fn encode_join_game(game_id: &str) -> Vec<u8> {
    let mut data = JOIN_GAME_SELECTOR.to_vec();
    data.extend(uint_word(WORD as u128));
    data.extend(string_tail(game_id));
    data
}

fn uint_word(value: u128) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 16..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Length word followed by the bytes, zero-padded to a whole word
fn string_tail(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut tail = uint_word(bytes.len() as u128).to_vec();
    tail.extend_from_slice(bytes);
    let padding = (WORD - bytes.len() % WORD) % WORD;
    tail.resize(tail.len() + padding, 0);
    tail
}

fn to_quantity(value: u128) -> String {
    format!("0x{:x}", value)
}

/// Parse a hex quantity such as `0x3b9aca00`.
pub fn parse_quantity(quantity: &str) -> Result<Wei, NetworkError> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| NetworkError::Malformed(format!("quantity '{}' lacks 0x", quantity)))?;
    if digits.is_empty() {
        return Ok(Wei::ZERO);
    }
    u128::from_str_radix(digits, 16)
        .map(Wei)
        .map_err(|e| NetworkError::Malformed(format!("quantity '{}': {}", quantity, e)))
}
