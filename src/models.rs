//! Shared data structures used throughout the swap engine and the oracle.

use serde::Deserialize;

use crate::errors::{AppError, Result};

/// Hex id of the native unit as seen by the asset layer (32 zero bytes).
pub const BTC_ASSET_ID_HEX: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Which way value moves through the swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapDirection {
    /// Pay asset units over an asset channel, receive sats over a sats channel.
    AssetToSats,
    /// Pay sats over sats channels, receive asset units over an asset channel.
    SatsToAsset,
}

/// One swap invocation. `amount` is expressed in the units being received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub direction: SwapDirection,
    pub amount: u64,
    pub peer_pubkey: String,
    pub asset_id: String,
}

impl SwapRequest {
    pub fn asset_to_sats(asset_id: impl Into<String>, peer_pubkey: impl Into<String>, sats: u64) -> Self {
        Self {
            direction: SwapDirection::AssetToSats,
            amount: sats,
            peer_pubkey: peer_pubkey.into(),
            asset_id: asset_id.into(),
        }
    }

    pub fn sats_to_asset(
        asset_id: impl Into<String>,
        peer_pubkey: impl Into<String>,
        asset_units: u64,
    ) -> Self {
        Self {
            direction: SwapDirection::SatsToAsset,
            amount: asset_units,
            peer_pubkey: peer_pubkey.into(),
            asset_id: asset_id.into(),
        }
    }

    /// Checks amount and identifier encodings before any node call is made.
    pub fn validate(&self) -> Result<()> {
        if self.amount == 0 {
            return Err(AppError::InvalidRequest("swap amount must be non-zero".into()));
        }
        let asset = hex::decode(&self.asset_id)?;
        if asset.len() != 32 {
            return Err(AppError::InvalidRequest(format!(
                "asset id must be 32 bytes, got {}",
                asset.len()
            )));
        }
        let peer = hex::decode(&self.peer_pubkey)?;
        if peer.len() != 33 {
            return Err(AppError::InvalidRequest(format!(
                "peer pubkey must be 33 bytes, got {}",
                peer.len()
            )));
        }
        Ok(())
    }
}

/// Forwarding policy a node publishes for one direction of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingPolicy {
    pub time_lock_delta: u32,
    pub fee_base_msat: u32,
    /// Proportional fee in parts-per-million.
    pub fee_rate_ppm: u32,
}

/// Used when the counter-party has not published a policy (common on regtest/simnet).
pub const DEFAULT_ROUTING_POLICY: RoutingPolicy = RoutingPolicy {
    time_lock_delta: 80,
    fee_base_msat: 1_000,
    fee_rate_ppm: 1,
};

/// Routing fee budget for one payment amount under one policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingFeeEstimate {
    pub policy: RoutingPolicy,
    pub base_fee_sat: u64,
    pub proportional_fee_sat: u64,
    pub total_fee_sat: u64,
}

/// Custom channel data attached by the asset layer to asset-capable channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssetChannelData {
    #[serde(default)]
    pub funding_assets: Vec<FundingAsset>,
    #[serde(default)]
    pub local_assets: Vec<AssetBalance>,
    #[serde(default)]
    pub capacity: i64,
    #[serde(default)]
    pub group_key: String,
    #[serde(default)]
    pub local_balance: i64,
    #[serde(default)]
    pub remote_balance: i64,
    #[serde(default)]
    pub outgoing_htlc_balance: i64,
    #[serde(default)]
    pub incoming_htlc_balance: i64,
}

impl AssetChannelData {
    /// Whether the channel was funded with `asset_id` (first funding asset only).
    pub fn is_funded_with(&self, asset_id: &str) -> bool {
        self.funding_assets
            .first()
            .is_some_and(|a| a.asset_genesis.asset_id.eq_ignore_ascii_case(asset_id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct FundingAsset {
    #[serde(default)]
    pub version: i32,
    pub asset_genesis: AssetGenesis,
    #[serde(default)]
    pub amount: i64,
    #[serde(default)]
    pub script_key: String,
    #[serde(default)]
    pub decimal_display: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssetGenesis {
    #[serde(default)]
    pub genesis_point: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub meta_hash: String,
    pub asset_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AssetBalance {
    pub asset_id: String,
    pub amount: i64,
}

/// A channel either carries asset balance or it doesn't; never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelKind {
    SatsOnly,
    AssetCapable(AssetChannelData),
}

/// Read-only snapshot of one local channel, taken fresh for each swap attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCandidate {
    pub chan_id: u64,
    pub channel_point: String,
    pub remote_pubkey: String,
    pub active: bool,
    pub local_balance: i64,
    pub remote_balance: i64,
    pub peer_scid_alias: u64,
    pub kind: ChannelKind,
}

impl ChannelCandidate {
    pub fn is_asset_capable(&self) -> bool {
        matches!(self.kind, ChannelKind::AssetCapable(_))
    }

    pub fn asset_data(&self) -> Option<&AssetChannelData> {
        match &self.kind {
            ChannelKind::AssetCapable(data) => Some(data),
            ChannelKind::SatsOnly => None,
        }
    }
}

/// Accepted quote. Only ever built from an accepted order response in the current attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quote {
    pub id: Vec<u8>,
    /// Counter-asset amount implied by the quote.
    pub asset_amount: u64,
    /// Short channel id the counter-party bound the quote to (buy quotes), 0 if unset.
    pub scid: u64,
    /// Unix seconds.
    pub expiry: u64,
}

impl Quote {
    pub fn id_hex(&self) -> String {
        hex::encode(&self.id)
    }
}

/// Point-in-time reference prices, always written as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PriceSnapshot {
    pub index: f64,
    pub ask: f64,
    pub bid: f64,
}

impl PriceSnapshot {
    /// Derives ask/bid from `index` with a symmetric spread.
    /// 100 bips = 1%, 10_000 bips = 100%. Bid never goes below zero.
    pub fn from_index(index: f64, spread_bips: f64) -> Self {
        let spread = spread_bips / 10_000.0;
        Self {
            index,
            ask: index * (1.0 + spread),
            bid: (index * (1.0 - spread)).max(0.0),
        }
    }

    /// True until the first successful fetch.
    pub fn is_empty(&self) -> bool {
        self.index <= 0.0
    }
}

/// Terminal classification of one tracked payment.
#[derive(Debug)]
pub enum OutcomeStatus {
    Succeeded { amount_delivered: u64 },
    Failed { reason: String },
    Indeterminate { error: AppError },
}

#[derive(Debug)]
pub struct PaymentOutcome {
    pub status: OutcomeStatus,
    pub fee_sat: u64,
}

impl PaymentOutcome {
    pub fn succeeded(amount_delivered: u64, fee_sat: u64) -> Self {
        Self {
            status: OutcomeStatus::Succeeded { amount_delivered },
            fee_sat,
        }
    }

    pub fn failed(reason: impl Into<String>, fee_sat: u64) -> Self {
        Self {
            status: OutcomeStatus::Failed {
                reason: reason.into(),
            },
            fee_sat,
        }
    }

    pub fn indeterminate(error: AppError) -> Self {
        Self {
            status: OutcomeStatus::Indeterminate { error },
            fee_sat: 0,
        }
    }

    /// Collapses the outcome into the delivered amount or a typed error.
    pub fn into_result(self) -> Result<SettledPayment> {
        match self.status {
            OutcomeStatus::Succeeded { amount_delivered } => Ok(SettledPayment {
                amount_delivered,
                fee_sat: self.fee_sat,
            }),
            OutcomeStatus::Failed { reason } => Err(AppError::PaymentFailed(reason)),
            OutcomeStatus::Indeterminate { error } => Err(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettledPayment {
    pub amount_delivered: u64,
    pub fee_sat: u64,
}

/// Final result handed to the caller of a successful swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapReceipt {
    pub direction: SwapDirection,
    pub quote_id: Vec<u8>,
    /// Amount of the counter-asset the payment delivered.
    pub amount_delivered: u64,
    pub fee_sat: u64,
    pub sats_chan_id: u64,
    pub asset_chan_id: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASSET: &str = "a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";
    const PEER: &str = "02a1b2c3d4e5f60718293a4b5c6d7e8f90a1b2c3d4e5f60718293a4b5c6d7e8f90";

    #[test]
    fn snapshot_zero_spread_collapses_to_index() {
        let s = PriceSnapshot::from_index(100_000.0, 0.0);
        assert_eq!(s.ask, 100_000.0);
        assert_eq!(s.bid, 100_000.0);
        assert_eq!(s.index, 100_000.0);
    }

    #[test]
    fn snapshot_twenty_bips() {
        let s = PriceSnapshot::from_index(50_000.0, 20.0);
        assert!((s.ask - 50_100.0).abs() < 1e-6);
        assert!((s.bid - 49_900.0).abs() < 1e-6);
    }

    #[test]
    fn snapshot_bid_clamped_at_zero() {
        let s = PriceSnapshot::from_index(10.0, 20_000.0);
        assert_eq!(s.bid, 0.0);
        assert!(s.ask > s.index);
    }

    #[test]
    fn request_validation() {
        assert!(SwapRequest::asset_to_sats(ASSET, PEER, 5_000).validate().is_ok());
        assert!(SwapRequest::asset_to_sats(ASSET, PEER, 0).validate().is_err());
        assert!(SwapRequest::sats_to_asset("abcd", PEER, 1).validate().is_err());
        assert!(SwapRequest::sats_to_asset(ASSET, "zz", 1).validate().is_err());
    }

    #[test]
    fn outcome_into_result() {
        let ok = PaymentOutcome::succeeded(42, 1).into_result().expect("settled");
        assert_eq!(ok.amount_delivered, 42);
        let err = PaymentOutcome::failed("FAILURE_REASON_NO_ROUTE", 0)
            .into_result()
            .unwrap_err();
        assert_eq!(err.to_string(), "payment failed: FAILURE_REASON_NO_ROUTE");
    }

    #[test]
    fn custom_channel_data_parses_funding_asset() {
        let raw = format!(
            r#"{{"funding_assets":[{{"version":1,"asset_genesis":{{"genesis_point":"x:0","name":"USDT","meta_hash":"","asset_id":"{ASSET}"}},"amount":1000,"script_key":"","decimal_display":2}}],
            "local_assets":[{{"asset_id":"{ASSET}","amount":600}}],"remote_assets":[],"outgoing_htlcs":[],"incoming_htlcs":[],
            "capacity":1000,"group_key":"","local_balance":600,"remote_balance":400,"outgoing_htlc_balance":0,"incoming_htlc_balance":0}}"#
        );
        let data: AssetChannelData = serde_json::from_str(&raw).expect("parse");
        assert!(data.is_funded_with(ASSET));
        assert!(!data.is_funded_with(BTC_ASSET_ID_HEX));
        assert_eq!(data.local_balance, 600);
    }
}
