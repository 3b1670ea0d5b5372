//! Escrow client wrapping the on-chain game contract.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

use super::{
    errors::{EscrowError, EscrowResult, NetworkError},
    models::{EscrowReceipt, FundingCost, GasQuote, WalletSnapshot, commission_for},
};
use crate::types::{GameId, TxHash, Wei};

/// Call contract of the escrow smart contract.
///
/// Implementations submit exactly one transaction per call and resolve once
/// the transaction is confirmed (or has definitively failed).
#[async_trait]
pub trait EscrowService: Send + Sync {
    /// `createGame(gameId, wager)` with `value` attached.
    async fn create_game(&self, game_id: &GameId, wager: Wei, value: Wei) -> EscrowResult<TxHash>;

    /// `joinGame(gameId)` with `value` attached.
    async fn join_game(&self, game_id: &GameId, value: Wei) -> EscrowResult<TxHash>;

    /// Current price per unit of gas.
    async fn gas_price(&self) -> Result<Wei, NetworkError>;
}

/// Escrow client applying the commission model and funding checks
pub struct EscrowClient {
    service: Arc<dyn EscrowService>,
    commission_percentage: u32,
    gas_limit: u64,
}

impl EscrowClient {
    /// Create a new escrow client
    ///
    /// # Arguments
    ///
    /// * `service` - Contract transport
    /// * `commission_percentage` - Platform fee charged on top of the wager
    /// * `gas_limit` - Gas ceiling used for fee estimation
    pub fn new(service: Arc<dyn EscrowService>, commission_percentage: u32, gas_limit: u64) -> Self {
        Self {
            service,
            commission_percentage,
            gas_limit,
        }
    }

    pub fn commission(&self, wager: Wei) -> Wei {
        commission_for(wager, self.commission_percentage)
    }

    /// Check that the wallet can cover wager, commission and gas.
    ///
    /// # Errors
    ///
    /// * `EscrowError::InvalidAmount` - Wager is zero
    /// * `EscrowError::WalletNotConnected` - No account available
    /// * `EscrowError::GasPriceUnavailable` - No quote loaded yet
    /// * `EscrowError::InsufficientFunds` - Total cost is not strictly below the balance
    pub fn check_affordable(
        &self,
        wager: Wei,
        wallet: &WalletSnapshot,
        quote: Option<&GasQuote>,
    ) -> EscrowResult<FundingCost> {
        if wager.is_zero() {
            return Err(EscrowError::InvalidAmount(wager));
        }
        if !wallet.is_connected() {
            return Err(EscrowError::WalletNotConnected);
        }
        let quote = quote.ok_or(EscrowError::GasPriceUnavailable)?;

        let cost = FundingCost {
            wager,
            commission: self.commission(wager),
            estimated_gas: quote.estimated_fee(),
        };

        if cost.total() >= wallet.balance {
            return Err(EscrowError::InsufficientFunds {
                available: wallet.balance,
                required: cost.total(),
            });
        }

        Ok(cost)
    }

    /// Fund the creating side of a match.
    ///
    /// Affordability is checked against the quote and balance passed in, which
    /// must be the ones current at submission time. Never retries.
    pub async fn fund_game(
        &self,
        game_id: &GameId,
        wager: Wei,
        wallet: &WalletSnapshot,
        quote: Option<&GasQuote>,
    ) -> EscrowResult<EscrowReceipt> {
        if game_id.as_str().trim().is_empty() {
            return Err(EscrowError::InvalidGameId);
        }
        let cost = self.check_affordable(wager, wallet, quote)?;

        log::info!(
            "Funding game {}: wager {} + commission {}",
            game_id,
            cost.wager,
            cost.commission
        );

        let tx_hash = self
            .service
            .create_game(game_id, cost.wager, cost.value())
            .await?;

        log::info!("Game {} funded in {}", game_id, tx_hash);

        Ok(EscrowReceipt {
            game_id: game_id.clone(),
            tx_hash,
            wager: cost.wager,
            commission: cost.commission,
        })
    }

    /// Fund the joining side of a match created by the opponent.
    pub async fn join_game(
        &self,
        game_id: &GameId,
        wager: Wei,
        wallet: &WalletSnapshot,
        quote: Option<&GasQuote>,
    ) -> EscrowResult<EscrowReceipt> {
        if game_id.as_str().trim().is_empty() {
            return Err(EscrowError::InvalidGameId);
        }
        let cost = self.check_affordable(wager, wallet, quote)?;

        log::info!("Joining game {} with {}", game_id, cost.value());

        let tx_hash = self.service.join_game(game_id, cost.value()).await?;

        Ok(EscrowReceipt {
            game_id: game_id.clone(),
            tx_hash,
            wager: cost.wager,
            commission: cost.commission,
        })
    }

    /// Best-effort gas quote. Failure leaves the caller without a quote.
    pub async fn estimate_gas_price(&self) -> Result<GasQuote, NetworkError> {
        let price_per_gas = self.service.gas_price().await?;
        Ok(GasQuote {
            price_per_gas,
            gas_limit: self.gas_limit,
            fetched_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingService {
        calls: Mutex<Vec<(String, Wei, Wei)>>,
    }

    #[async_trait]
    impl EscrowService for RecordingService {
        async fn create_game(&self, game_id: &GameId, wager: Wei, value: Wei) -> EscrowResult<TxHash> {
            self.calls
                .lock()
                .unwrap()
                .push((game_id.to_string(), wager, value));
            Ok(TxHash("0xabc".to_string()))
        }

        async fn join_game(&self, game_id: &GameId, value: Wei) -> EscrowResult<TxHash> {
            self.calls
                .lock()
                .unwrap()
                .push((game_id.to_string(), Wei::ZERO, value));
            Ok(TxHash("0xdef".to_string()))
        }

        async fn gas_price(&self) -> Result<Wei, NetworkError> {
            Ok(Wei(10))
        }
    }

    fn wallet(balance: Wei) -> WalletSnapshot {
        WalletSnapshot::connected(
            Address::parse("0x00000000000000000000000000000000000000aa").unwrap(),
            balance,
        )
    }

    fn quote() -> GasQuote {
        GasQuote {
            price_per_gas: Wei(10),
            gas_limit: 100,
            fetched_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_fund_game_attaches_wager_plus_commission() {
        let service = Arc::new(RecordingService::default());
        let client = EscrowClient::new(service.clone(), 5, 100);
        let game_id = GameId::new("game-1").unwrap();

        let receipt = client
            .fund_game(&game_id, Wei(1_000), &wallet(Wei(10_000)), Some(&quote()))
            .await
            .unwrap();

        assert_eq!(receipt.commission, Wei(50));
        assert_eq!(receipt.attached_value(), Wei(1_050));
        let calls = service.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[("game-1".to_string(), Wei(1_000), Wei(1_050))]);
    }

    #[tokio::test]
    async fn test_fund_game_blocked_without_quote() {
        let service = Arc::new(RecordingService::default());
        let client = EscrowClient::new(service.clone(), 5, 100);
        let game_id = GameId::new("game-1").unwrap();

        let result = client
            .fund_game(&game_id, Wei(1_000), &wallet(Wei(10_000)), None)
            .await;

        assert_eq!(result, Err(EscrowError::GasPriceUnavailable));
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_balance_equal_to_cost_is_insufficient() {
        let client = EscrowClient::new(Arc::new(RecordingService::default()), 5, 100);
        // 1000 + 50 commission + 10 * 100 gas
        let result = client.check_affordable(Wei(1_000), &wallet(Wei(2_050)), Some(&quote()));
        assert_eq!(
            result,
            Err(EscrowError::InsufficientFunds {
                available: Wei(2_050),
                required: Wei(2_050),
            })
        );
        assert!(
            client
                .check_affordable(Wei(1_000), &wallet(Wei(2_051)), Some(&quote()))
                .is_ok()
        );
    }

    #[test]
    fn test_disconnected_wallet_rejected() {
        let client = EscrowClient::new(Arc::new(RecordingService::default()), 5, 100);
        let result = client.check_affordable(Wei(1), &WalletSnapshot::default(), Some(&quote()));
        assert_eq!(result, Err(EscrowError::WalletNotConnected));
    }

    #[tokio::test]
    async fn test_estimate_gas_price_uses_configured_limit() {
        let client = EscrowClient::new(Arc::new(RecordingService::default()), 5, 21_000);
        let quote = client.estimate_gas_price().await.unwrap();
        assert_eq!(quote.gas_limit, 21_000);
        assert_eq!(quote.estimated_fee(), Wei(210_000));
    }
}
