use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::PriceSource;
use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
struct BitcoinQuote {
    /// Decimal string, e.g. "65123.45".
    price: String,
    #[serde(default)]
    timestamp: i64,
}

/// BTC/USD index from api-ninjas.com, authenticated with `X-Api-Key`.
pub struct ApiNinjasSource {
    client: reqwest::Client,
    url: Url,
    api_key: String,
}

impl ApiNinjasSource {
    pub fn new(url: Url, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

fn parse_price(body: &str) -> Result<f64> {
    let quote: BitcoinQuote = serde_json::from_str(body)?;
    let price: f64 = quote.price.trim().parse()?;
    tracing::debug!(price, timestamp = quote.timestamp, "[FEED] api_ninjas quote");
    Ok(price)
}

#[async_trait]
impl PriceSource for ApiNinjasSource {
    fn name(&self) -> &'static str {
        "api_ninjas"
    }

    async fn fetch_index_price(&self) -> Result<f64> {
        let resp = self
            .client
            .get(self.url.clone())
            .header("X-Api-Key", self.api_key.as_str())
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(AppError::PriceSource(format!(
                "api_ninjas returned HTTP {status}"
            )));
        }
        let body = resp.text().await?;
        parse_price(&body)
    }
}
