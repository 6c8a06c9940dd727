//! Configuration loader and application settings.
//!
//! Everything is read from environment variables (a `.env` file is honored by
//! the binary through `dotenvy`). Unset variables fall back to the defaults
//! below; malformed values are reported as [`AppError::Config`].

use std::env;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::errors::{AppError, Result};

pub const API_NINJAS_URL: &str = "https://api.api-ninjas.com/v1/bitcoin";

/// Longest validity the oracle will stamp on a quoted rate.
pub const MAX_QUOTE_EXPIRY: Duration = Duration::from_secs(24 * 60 * 60);

/// Upstream reference price provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSourceKind {
    ApiNinjas,
    BitPreco,
}

impl FromStr for PriceSourceKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api_ninjas" | "apininjas" => Ok(Self::ApiNinjas),
            "bitpreco" => Ok(Self::BitPreco),
            other => Err(AppError::Config(format!("unknown price source: {other}"))),
        }
    }
}

/// Price oracle settings.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub price_source: PriceSourceKind,
    pub price_url: String,
    pub api_key: Option<String>,
    /// Display name of the quoted asset, used in logs only.
    pub ticker: String,
    pub decimal_display: u8,
    /// Upper bound on the subject asset amount of a single quote request.
    pub max_asset_trade_amount: u64,
    pub spread_bips: f64,
    /// Hex asset ids the oracle quotes; empty means any asset.
    pub allowed_asset_ids: Vec<String>,
    pub refresh_interval: Duration,
    pub retry_interval: Duration,
    pub quote_expiry: Duration,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            price_source: PriceSourceKind::ApiNinjas,
            price_url: API_NINJAS_URL.to_string(),
            api_key: None,
            ticker: "USDT".to_string(),
            decimal_display: 2,
            max_asset_trade_amount: 10_000_000,
            spread_bips: 0.0,
            allowed_asset_ids: Vec::new(),
            refresh_interval: Duration::from_secs(300),
            retry_interval: Duration::from_secs(5),
            quote_expiry: Duration::from_secs(300),
        }
    }
}

impl OracleConfig {
    /// Load oracle configuration from `ORACLE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let price_source = match env::var("ORACLE_PRICE_SOURCE").ok() {
            Some(s) => s.parse()?,
            None => defaults.price_source,
        };
        let price_url = match (env::var("ORACLE_PRICE_URL").ok(), price_source) {
            (Some(raw), _) => raw,
            (None, PriceSourceKind::ApiNinjas) => defaults.price_url.clone(),
            (None, PriceSourceKind::BitPreco) => {
                return Err(AppError::Config(
                    "ORACLE_PRICE_URL is required for the bitpreco source".into(),
                ));
            }
        };
        let api_key = env::var("API_NINJA_KEY").ok().filter(|k| !k.is_empty());
        if price_source == PriceSourceKind::ApiNinjas && api_key.is_none() {
            return Err(AppError::Config(
                "API_NINJA_KEY environment variable is not set".into(),
            ));
        }
        let allowed_asset_ids = env::var("ORACLE_ALLOWED_ASSET_IDS")
            .map(|raw| parse_asset_list(&raw))
            .unwrap_or_else(|_| Ok(Vec::new()))?;

        let cfg = Self {
            price_source,
            price_url,
            api_key,
            ticker: env::var("ORACLE_TICKER").unwrap_or(defaults.ticker),
            decimal_display: env_or("ORACLE_DECIMAL_DISPLAY", defaults.decimal_display)?,
            max_asset_trade_amount: env_or(
                "ORACLE_MAX_ASSET_TRADE_AMOUNT",
                defaults.max_asset_trade_amount,
            )?,
            spread_bips: env_or("ORACLE_SPREAD_BIPS", defaults.spread_bips)?,
            allowed_asset_ids,
            refresh_interval: env_secs("ORACLE_REFRESH_SECS", defaults.refresh_interval)?,
            retry_interval: env_secs("ORACLE_RETRY_SECS", defaults.retry_interval)?,
            quote_expiry: env_secs("ORACLE_QUOTE_EXPIRY_SECS", defaults.quote_expiry)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parsed reference price endpoint.
    pub fn price_url(&self) -> Result<Url> {
        Ok(Url::parse(&self.price_url)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.price_url()?;
        if !self.spread_bips.is_finite() || self.spread_bips < 0.0 {
            return Err(AppError::Config(format!(
                "spread must be a non-negative number of bips, got {}",
                self.spread_bips
            )));
        }
        if self.refresh_interval.is_zero() || self.retry_interval.is_zero() {
            return Err(AppError::Config("feed intervals must be non-zero".into()));
        }
        if self.quote_expiry.is_zero() || self.quote_expiry > MAX_QUOTE_EXPIRY {
            return Err(AppError::Config(format!(
                "quote expiry must be between 1s and {}s, got {}s",
                MAX_QUOTE_EXPIRY.as_secs(),
                self.quote_expiry.as_secs()
            )));
        }
        Ok(())
    }
}

/// Swap orchestration settings. Defaults match what market makers expect today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapConfig {
    pub order_expiry: Duration,
    pub order_timeout: Duration,
    /// Extra sats added on top of amount + routing fee when sizing the quote budget.
    pub fee_buffer_sat: u64,
    /// Fee ceiling for the asset-leg payment.
    pub asset_fee_limit_sat: u64,
    /// Fee ceiling for the native-leg payment.
    pub native_fee_limit_msat: u64,
    pub native_max_parts: u32,
    pub native_timeout: Duration,
    pub invoice_expiry: Duration,
    pub invoice_poll_interval: Duration,
    /// Refuse concurrent attempts on the same channel pair.
    pub single_flight: bool,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            order_expiry: Duration::from_secs(30),
            order_timeout: Duration::from_secs(30),
            fee_buffer_sat: 0,
            asset_fee_limit_sat: 20_000,
            native_fee_limit_msat: 200_000,
            native_max_parts: 16,
            native_timeout: Duration::from_secs(60),
            invoice_expiry: Duration::from_secs(300),
            invoice_poll_interval: Duration::from_secs(5),
            single_flight: false,
        }
    }
}

impl SwapConfig {
    /// Load swap configuration from `SWAP_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            order_expiry: env_secs("SWAP_ORDER_EXPIRY_SECS", d.order_expiry)?,
            order_timeout: env_secs("SWAP_ORDER_TIMEOUT_SECS", d.order_timeout)?,
            fee_buffer_sat: env_or("SWAP_FEE_BUFFER_SAT", d.fee_buffer_sat)?,
            asset_fee_limit_sat: env_or("SWAP_ASSET_FEE_LIMIT_SAT", d.asset_fee_limit_sat)?,
            native_fee_limit_msat: env_or("SWAP_NATIVE_FEE_LIMIT_MSAT", d.native_fee_limit_msat)?,
            native_max_parts: env_or("SWAP_NATIVE_MAX_PARTS", d.native_max_parts)?,
            native_timeout: env_secs("SWAP_NATIVE_TIMEOUT_SECS", d.native_timeout)?,
            invoice_expiry: env_secs("SWAP_INVOICE_EXPIRY_SECS", d.invoice_expiry)?,
            invoice_poll_interval: env_secs("SWAP_INVOICE_POLL_SECS", d.invoice_poll_interval)?,
            single_flight: env_or("SWAP_SINGLE_FLIGHT", d.single_flight)?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key}: {e}"))),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    env_or(key, default.as_secs()).map(Duration::from_secs)
}

/// Comma-separated hex asset ids, lower-cased. Blank entries are skipped.
pub fn parse_asset_list(raw: &str) -> Result<Vec<String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let bytes = hex::decode(s)?;
            if bytes.len() != 32 {
                return Err(AppError::Config(format!("asset id {s} is not 32 bytes")));
            }
            Ok(s.to_ascii_lowercase())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_source_names() {
        assert_eq!(
            "api_ninjas".parse::<PriceSourceKind>().unwrap(),
            PriceSourceKind::ApiNinjas
        );
        assert_eq!(
            "BitPreco".parse::<PriceSourceKind>().unwrap(),
            PriceSourceKind::BitPreco
        );
        assert!("coingecko".parse::<PriceSourceKind>().is_err());
    }

    #[test]
    fn asset_list_parsing() {
        let id = "AB".repeat(32);
        let list = parse_asset_list(&format!(" {id}, ,")).unwrap();
        assert_eq!(list, vec!["ab".repeat(32)]);
        assert!(parse_asset_list("abcd").is_err());
        assert!(parse_asset_list("").unwrap().is_empty());
    }

    #[test]
    fn negative_spread_rejected() {
        let cfg = OracleConfig {
            spread_bips: -1.0,
            ..OracleConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(OracleConfig::default().validate().is_ok());

        let bad_url = OracleConfig {
            price_url: "not a url".into(),
            ..OracleConfig::default()
        };
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn quote_expiry_bounded() {
        let huge = OracleConfig {
            quote_expiry: Duration::from_secs(u64::MAX),
            ..OracleConfig::default()
        };
        assert!(matches!(huge.validate(), Err(AppError::Config(_))));

        let zero = OracleConfig {
            quote_expiry: Duration::ZERO,
            ..OracleConfig::default()
        };
        assert!(zero.validate().is_err());

        let day = OracleConfig {
            quote_expiry: MAX_QUOTE_EXPIRY,
            ..OracleConfig::default()
        };
        assert!(day.validate().is_ok());
    }

    #[test]
    fn swap_defaults() {
        let cfg = SwapConfig::default();
        assert_eq!(cfg.order_expiry, Duration::from_secs(30));
        assert_eq!(cfg.asset_fee_limit_sat, 20_000);
        assert_eq!(cfg.native_max_parts, 16);
        assert!(!cfg.single_flight);
    }
}
