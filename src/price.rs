//! Fiat->BTC price-conversion client, called once at invoice creation. An
//! external collaborator the engine only needs a seam to call through, so
//! it gets the same trait-plus-reqwest-impl shape as the notifier.

use std::future::Future;

use reqwest::Client as ReqwestClient;
use tracing::trace;

use crate::domain::{FiatCurrency, Mode};
use crate::error::PriceError;

pub trait PriceOracle: Send + Sync {
    /// Converts `amount` of `currency` to BTC.
    fn price_to_btc(
        &self,
        amount: f64,
        currency: FiatCurrency,
        mode: Mode,
    ) -> impl Future<Output = Result<f64, PriceError>> + Send;
}

#[derive(serde::Deserialize)]
struct PriceConversionResponse {
    price: f64,
}

/// Reqwest-backed [`PriceOracle`] against the configured proxy.
#[derive(Clone)]
pub struct HttpPriceOracle {
    base_url: String,
    client: ReqwestClient,
}

impl HttpPriceOracle {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), client: ReqwestClient::new() }
    }
}

impl PriceOracle for HttpPriceOracle {
    async fn price_to_btc(&self, amount: f64, currency: FiatCurrency, mode: Mode) -> Result<f64, PriceError> {
        let url = format!("{}/price-conversion", self.base_url);
        trace!(%url, %amount, %currency, %mode, "fetching price conversion");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("amount", amount.to_string()),
                ("src_currency", currency.to_string()),
                ("dst_currency", "btc".to_string()),
                ("mode", mode.to_string()),
            ])
            .send()
            .await
            .map_err(|e| PriceError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PriceError::Status(response.status().as_u16()));
        }

        let body: PriceConversionResponse =
            response.json().await.map_err(|e| PriceError::Request(e.to_string()))?;
        Ok(body.price)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// Returns a fixed BTC price regardless of inputs, for engine scenario
    /// tests that need a deterministic `payAmount`.
    pub struct FixedPriceOracle(pub f64);

    impl PriceOracle for FixedPriceOracle {
        async fn price_to_btc(&self, _amount: f64, _currency: FiatCurrency, _mode: Mode) -> Result<f64, PriceError> {
            Ok(self.0)
        }
    }
}
