//! Client configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use chess_wager::{Address, SessionConfig, Wei, constants::RATE_LOOKUP_COOLDOWN};
use std::time::Duration;

/// Complete client configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Matchmaking server websocket URL
    pub server_url: String,
    /// Chain configuration
    pub chain: ChainConfig,
    /// Rate service configuration
    pub rates: RateConfig,
    /// Session parameters handed to the session actor
    pub session: SessionConfig,
}

/// Chain node and escrow contract configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the node signing for the player
    pub rpc_url: String,
    /// Escrow contract address (required)
    pub contract: Address,
    /// Player account; the node's first account when unset
    pub account: Option<Address>,
    /// Delay between transaction receipt polls
    pub receipt_poll: Duration,
    /// Give up waiting for a receipt after this long
    pub receipt_timeout: Duration,
    /// Interval between wallet balance refreshes
    pub balance_refresh: Duration,
}

/// Fiat conversion configuration
#[derive(Debug, Clone)]
pub struct RateConfig {
    /// Rate lookup endpoint
    pub url: String,
    /// Minimum delay between two lookups
    pub cooldown: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `server_override` - Optional server URL override (from CLI args)
    /// * `rpc_override` - Optional node URL override (from CLI args)
    /// * `account_override` - Optional player account override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or invalid
    pub fn from_env(
        server_override: Option<String>,
        rpc_override: Option<String>,
        account_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let server_url = server_override
            .or_else(|| std::env::var("CHESS_SERVER_URL").ok())
            .unwrap_or_else(|| "ws://127.0.0.1:8000/ws".to_string());

        // Chain configuration
        let rpc_url = rpc_override
            .or_else(|| std::env::var("CHAIN_RPC_URL").ok())
            .unwrap_or_else(|| "http://127.0.0.1:8545".to_string());

        let contract = std::env::var("ESCROW_CONTRACT").map_err(|_| ConfigError::MissingRequired {
            var: "ESCROW_CONTRACT".to_string(),
            hint: "Set to the deployed escrow contract address (0x followed by 40 hex digits)"
                .to_string(),
        })?;
        let contract = parse_address("ESCROW_CONTRACT", &contract)?;

        let account = match account_override.or_else(|| std::env::var("WALLET_ACCOUNT").ok()) {
            Some(account) => Some(parse_address("WALLET_ACCOUNT", &account)?),
            None => None,
        };

        let chain = ChainConfig {
            rpc_url,
            contract,
            account,
            receipt_poll: Duration::from_millis(parse_env_or("RECEIPT_POLL_MS", 1_000)),
            receipt_timeout: Duration::from_secs(parse_env_or("RECEIPT_TIMEOUT_SECS", 300)),
            balance_refresh: Duration::from_secs(parse_env_or("BALANCE_REFRESH_SECS", 15)),
        };

        let rates = RateConfig {
            url: std::env::var("RATE_SERVICE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8000/convert".to_string()),
            cooldown: std::env::var("RATE_COOLDOWN_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(RATE_LOOKUP_COOLDOWN),
        };

        // Session parameters
        let defaults = SessionConfig::default();
        let max_wager = match std::env::var("MAX_WAGER") {
            Ok(value) => Wei::parse_native(&value).map_err(|e| ConfigError::Invalid {
                var: "MAX_WAGER".to_string(),
                reason: e.to_string(),
            })?,
            Err(_) => defaults.max_wager,
        };
        let session = SessionConfig {
            commission_percentage: parse_env_or(
                "COMMISSION_PERCENTAGE",
                defaults.commission_percentage,
            ),
            max_wager,
            gas_limit: parse_env_or("GAS_LIMIT", defaults.gas_limit),
            gas_refresh: std::env::var("GAS_REFRESH_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.gas_refresh),
        };

        Ok(ClientConfig {
            server_url,
            chain,
            rates,
            session,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.server_url.starts_with("ws://") && !self.server_url.starts_with("wss://") {
            return Err(ConfigError::Invalid {
                var: "CHESS_SERVER_URL".to_string(),
                reason: "Must be a ws:// or wss:// URL".to_string(),
            });
        }

        for (var, url) in [
            ("CHAIN_RPC_URL", &self.chain.rpc_url),
            ("RATE_SERVICE_URL", &self.rates.url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "Must be an http:// or https:// URL".to_string(),
                });
            }
        }

        if self.session.commission_percentage > 100 {
            return Err(ConfigError::Invalid {
                var: "COMMISSION_PERCENTAGE".to_string(),
                reason: "Must be at most 100".to_string(),
            });
        }

        if self.session.max_wager.is_zero() {
            return Err(ConfigError::Invalid {
                var: "MAX_WAGER".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.session.gas_limit == 0 {
            return Err(ConfigError::Invalid {
                var: "GAS_LIMIT".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        // A zero period would make tokio's interval panic
        for (var, period) in [
            ("GAS_REFRESH_SECS", self.session.gas_refresh),
            ("BALANCE_REFRESH_SECS", self.chain.balance_refresh),
            ("RECEIPT_POLL_MS", self.chain.receipt_poll),
        ] {
            if period.is_zero() {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "Must be greater than 0".to_string(),
                });
            }
        }

        if self.chain.receipt_timeout < self.chain.receipt_poll {
            return Err(ConfigError::Invalid {
                var: "RECEIPT_TIMEOUT_SECS".to_string(),
                reason: "Must not be shorter than the receipt poll interval".to_string(),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn parse_address(var: &str, value: &str) -> Result<Address, ConfigError> {
    Address::parse(value).map_err(|e| ConfigError::Invalid {
        var: var.to_string(),
        reason: e.to_string(),
    })
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
