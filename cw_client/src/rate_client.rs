//! HTTP rate service used for fiat display of wagers.

use async_trait::async_trait;
use chess_wager::currency::{ConversionError, RateService, Rates};

/// Rate service answering `GET {url}?amount={amount}` with `{"gbp": .., "usd": ..}`
pub struct HttpRateService {
    url: String,
    client: reqwest::Client,
}

impl HttpRateService {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl RateService for HttpRateService {
    async fn lookup(&self, amount: f64) -> Result<Rates, ConversionError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("amount", amount)])
            .send()
            .await
            .map_err(|e| ConversionError::Lookup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ConversionError::Lookup(format!(
                "rate service returned {}",
                status
            )));
        }

        let rates: Rates = response
            .json()
            .await
            .map_err(|e| ConversionError::Malformed(e.to_string()))?;

        if !rates.gbp.is_finite() || !rates.usd.is_finite() {
            return Err(ConversionError::Malformed(
                "non-finite rate in response".to_string(),
            ));
        }
        Ok(rates)
    }
}
