//! Price oracle answering the market maker's rate queries.
//!
//! Rejections the counter-party should see are returned inside
//! [`QuoteRateResponse`]; only a request that cannot be interpreted at all
//! surfaces as an `Err`.

use std::fmt;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::OracleConfig;
use crate::errors::{AppError, Result};
use crate::feed::PriceCell;
use crate::models::BTC_ASSET_ID_HEX;
use crate::rates::{FixedPoint, asset_rate_from_price};
use crate::utils::unix_now;

/// Identifies an asset by id or group key, in raw or hex form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetSpecifier {
    pub asset_id: Vec<u8>,
    pub asset_id_str: String,
    pub group_key: Vec<u8>,
    pub group_key_str: String,
}

impl AssetSpecifier {
    pub fn btc() -> Self {
        Self {
            asset_id: vec![0u8; 32],
            ..Self::default()
        }
    }

    pub fn from_asset_id(asset_id: Vec<u8>) -> Self {
        Self {
            asset_id,
            ..Self::default()
        }
    }

    pub fn from_asset_id_str(asset_id_str: impl Into<String>) -> Self {
        Self {
            asset_id_str: asset_id_str.into(),
            ..Self::default()
        }
    }

    /// Lower-case hex id, preferring the raw bytes when both forms are given.
    pub fn asset_id_hex(&self) -> String {
        if self.asset_id.is_empty() {
            self.asset_id_str.to_ascii_lowercase()
        } else {
            hex::encode(&self.asset_id)
        }
    }

    fn has_group_key(&self) -> bool {
        !self.group_key.is_empty() || !self.group_key_str.is_empty()
    }

    /// The native unit: an all-zero 32-byte id and no group key.
    pub fn is_btc(&self) -> bool {
        let zero_bytes = self.asset_id.len() == 32 && self.asset_id.iter().all(|b| *b == 0);
        let zero_str = self.asset_id_str.eq_ignore_ascii_case(BTC_ASSET_ID_HEX);
        (zero_bytes || zero_str) && !self.has_group_key()
    }
}

impl fmt::Display for AssetSpecifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.asset_id_hex();
        if id.is_empty() {
            write!(f, "group:{}", self.group_key_str)
        } else {
            f.write_str(&id)
        }
    }
}

/// Direction of the trade from the requester's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    /// Requester pays sats for asset units; quoted at the ask.
    Purchase,
    /// Requester pays asset units for sats; quoted at the bid.
    Sale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteRateRequest {
    pub transaction_type: TransactionType,
    pub subject_asset: Option<AssetSpecifier>,
    pub subject_asset_max_amount: u64,
    pub payment_asset: Option<AssetSpecifier>,
    pub payment_asset_max_amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRates {
    /// Subject asset units per BTC.
    pub subject_asset_rate: FixedPoint,
    pub expiry_timestamp: u64,
}

/// Declines reported back to the counter-party in the response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateRejection {
    UnsupportedPaymentAsset { requested: String },
    UnsupportedSubjectAsset { requested: String, supported: Vec<String> },
    AmountExceedsMax { requested: u64, max: u64 },
    PriceUnavailable,
}

impl fmt::Display for RateRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateRejection::UnsupportedPaymentAsset { requested } => write!(
                f,
                "unsupported payment asset: {requested}, only BTC ({BTC_ASSET_ID_HEX}) is accepted"
            ),
            RateRejection::UnsupportedSubjectAsset {
                requested,
                supported,
            } => write!(
                f,
                "unsupported subject asset: {requested}, supported ids: {supported:?}"
            ),
            RateRejection::AmountExceedsMax { requested, max } => write!(
                f,
                "subject asset amount ({requested}) exceeds max value: {max}"
            ),
            RateRejection::PriceUnavailable => f.write_str("no reference price available yet"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuoteRateResponse {
    Ok(AssetRates),
    Rejected(RateRejection),
}

/// Read-only rate engine over the feed's latest snapshot.
#[derive(Debug, Clone)]
pub struct PriceOracleService {
    prices: PriceCell,
    allowed_asset_ids: Vec<String>,
    max_asset_trade_amount: u64,
    decimal_display: u8,
    quote_expiry: Duration,
    ticker: String,
}

impl PriceOracleService {
    pub fn new(cfg: &OracleConfig, prices: PriceCell) -> Self {
        Self {
            prices,
            allowed_asset_ids: cfg
                .allowed_asset_ids
                .iter()
                .map(|id| id.to_ascii_lowercase())
                .collect(),
            max_asset_trade_amount: cfg.max_asset_trade_amount,
            decimal_display: cfg.decimal_display,
            quote_expiry: cfg.quote_expiry,
            ticker: cfg.ticker.clone(),
        }
    }

    pub fn quote_rate(&self, req: &QuoteRateRequest) -> Result<QuoteRateResponse> {
        self.quote_rate_at(req, unix_now())
    }

    /// Same as [`quote_rate`](Self::quote_rate) with an explicit clock.
    pub fn quote_rate_at(&self, req: &QuoteRateRequest, now: u64) -> Result<QuoteRateResponse> {
        let payment_is_btc = req.payment_asset.as_ref().is_some_and(AssetSpecifier::is_btc);
        if !payment_is_btc {
            let requested = req
                .payment_asset
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "unset".to_string());
            return Ok(self.reject(RateRejection::UnsupportedPaymentAsset { requested }));
        }

        let subject = req
            .subject_asset
            .as_ref()
            .ok_or_else(|| AppError::InvalidRequest("subject asset is not set".into()))?;

        let subject_id = subject.asset_id_hex();
        let allowed =
            self.allowed_asset_ids.is_empty() || self.allowed_asset_ids.contains(&subject_id);
        if !allowed {
            return Ok(self.reject(RateRejection::UnsupportedSubjectAsset {
                requested: subject.to_string(),
                supported: self.allowed_asset_ids.clone(),
            }));
        }

        if req.subject_asset_max_amount > self.max_asset_trade_amount {
            return Ok(self.reject(RateRejection::AmountExceedsMax {
                requested: req.subject_asset_max_amount,
                max: self.max_asset_trade_amount,
            }));
        }

        let snapshot = self.prices.read();
        let price = match req.transaction_type {
            TransactionType::Purchase => snapshot.ask,
            TransactionType::Sale => snapshot.bid,
        };
        if snapshot.is_empty() || price <= 0.0 {
            return Ok(self.reject(RateRejection::PriceUnavailable));
        }

        let subject_asset_rate = asset_rate_from_price(price, self.decimal_display)?;
        info!(
            ty = ?req.transaction_type,
            ticker = %self.ticker,
            price,
            rate = %subject_asset_rate,
            "[ORACLE] quoted rate per BTC"
        );
        Ok(QuoteRateResponse::Ok(AssetRates {
            subject_asset_rate,
            expiry_timestamp: now.saturating_add(self.quote_expiry.as_secs()),
        }))
    }

    fn reject(&self, why: RateRejection) -> QuoteRateResponse {
        warn!(reason = %why, "[ORACLE] quote declined");
        QuoteRateResponse::Rejected(why)
    }
}
