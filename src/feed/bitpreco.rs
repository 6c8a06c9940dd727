use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use super::PriceSource;
use crate::errors::{AppError, Result};

#[derive(Debug, Deserialize)]
struct Ticker {
    success: bool,
    #[serde(default)]
    market: String,
    #[serde(default)]
    last: f64,
}

/// Ticker endpoint of bitpreco.com; no authentication.
pub struct BitPrecoSource {
    client: reqwest::Client,
    url: Url,
}

impl BitPrecoSource {
    pub fn new(url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, url })
    }
}

fn parse_ticker(body: &str) -> Result<f64> {
    let ticker: Ticker = serde_json::from_str(body)?;
    if !ticker.success {
        return Err(AppError::PriceSource(
            "bitpreco returned an unsuccessful response".into(),
        ));
    }
    tracing::debug!(market = %ticker.market, last = ticker.last, "[FEED] bitpreco ticker");
    Ok(ticker.last)
}

#[async_trait]
impl PriceSource for BitPrecoSource {
    fn name(&self) -> &'static str {
        "bitpreco"
    }

    async fn fetch_index_price(&self) -> Result<f64> {
        let body = self
            .client
            .get(self.url.clone())
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_ticker(&body)
    }
}
