//! Reference price ingestion.
//!
//! A single background task polls a [`PriceSource`] and republishes the
//! spread-adjusted [`PriceSnapshot`] through a [`PriceCell`]. Readers only ever
//! see whole snapshots.

pub mod api_ninjas;
pub mod bitpreco;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::{OracleConfig, PriceSourceKind};
use crate::errors::{AppError, Result};
use crate::models::PriceSnapshot;

pub use api_ninjas::ApiNinjasSource;
pub use bitpreco::BitPrecoSource;

/// Anything that can produce one BTC-denominated index price on demand.
#[async_trait]
pub trait PriceSource: Send + Sync {
    fn name(&self) -> &'static str;

    async fn fetch_index_price(&self) -> Result<f64>;
}

/// Build the configured upstream source.
pub fn source_from_config(cfg: &OracleConfig) -> Result<Arc<dyn PriceSource>> {
    let url = cfg.price_url()?;
    let source: Arc<dyn PriceSource> = match cfg.price_source {
        PriceSourceKind::ApiNinjas => {
            let key = cfg.api_key.clone().ok_or_else(|| {
                AppError::Config("api_ninjas source needs an API key".into())
            })?;
            Arc::new(ApiNinjasSource::new(url, key)?)
        }
        PriceSourceKind::BitPreco => Arc::new(BitPrecoSource::new(url)?),
    };
    Ok(source)
}

/// Shared, lock-protected latest snapshot.
#[derive(Debug, Clone, Default)]
pub struct PriceCell {
    inner: Arc<Mutex<PriceSnapshot>>,
}

impl PriceCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time copy.
    pub fn read(&self) -> PriceSnapshot {
        *self.inner.lock()
    }

    /// Only the feed writes; tests inside the crate may seed a value.
    pub(crate) fn replace(&self, snapshot: PriceSnapshot) {
        *self.inner.lock() = snapshot;
    }
}

/// Periodic fetcher that owns the write side of a [`PriceCell`].
pub struct PriceFeed {
    source: Arc<dyn PriceSource>,
    cell: PriceCell,
    spread_bips: f64,
}

impl PriceFeed {
    pub fn new(source: Arc<dyn PriceSource>, spread_bips: f64) -> Self {
        Self {
            source,
            cell: PriceCell::new(),
            spread_bips,
        }
    }

    /// Read handle for consumers.
    pub fn cell(&self) -> PriceCell {
        self.cell.clone()
    }

    /// Fetch once and publish. On error the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<PriceSnapshot> {
        // The network call happens before the lock is taken.
        let index = self.source.fetch_index_price().await?;
        if !index.is_finite() || index <= 0.0 {
            return Err(AppError::PriceSource(format!(
                "{} returned unusable price {index}",
                self.source.name()
            )));
        }
        let snapshot = PriceSnapshot::from_index(index, self.spread_bips);
        self.cell.replace(snapshot);
        info!(
            source = self.source.name(),
            index = snapshot.index,
            ask = snapshot.ask,
            bid = snapshot.bid,
            "[FEED] new reference price"
        );
        Ok(snapshot)
    }

    /// Run forever: `refresh_every` after a good fetch, `retry_every` after a failed one.
    pub fn spawn(
        self,
        refresh_every: Duration,
        retry_every: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let wait = match self.refresh().await {
                    Ok(_) => refresh_every,
                    Err(e) => {
                        warn!(
                            source = self.source.name(),
                            error = %e,
                            retry_secs = retry_every.as_secs(),
                            "[FEED] price fetch failed, keeping last snapshot"
                        );
                        retry_every
                    }
                };
                tokio::time::sleep(wait).await;
            }
        })
    }
}
