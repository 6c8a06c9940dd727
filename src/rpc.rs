//! Node daemon capabilities the swap engine consumes.
//!
//! Transport and credentials live behind these traits; the engine only sees
//! the request/response shapes below.

use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::errors::Result;
use crate::models::RoutingPolicy;

/// Raw channel listing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    pub chan_id: u64,
    pub channel_point: String,
    pub remote_pubkey: String,
    pub active: bool,
    pub local_balance: i64,
    pub remote_balance: i64,
    pub peer_scid_alias: u64,
    /// Opaque JSON document attached by the asset layer; empty for sats-only channels.
    pub custom_channel_data: Vec<u8>,
}

/// Graph edge for one channel with both directions' policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelEdge {
    pub node1_pub: String,
    pub node2_pub: String,
    pub node1_policy: Option<RoutingPolicy>,
    pub node2_policy: Option<RoutingPolicy>,
}

impl ChannelEdge {
    /// Policy published by `pubkey`'s side of the channel.
    pub fn policy_of(&self, pubkey: &str) -> Option<RoutingPolicy> {
        if self.node1_pub == pubkey {
            self.node1_policy
        } else {
            self.node2_policy
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    pub base_scid: u64,
    pub aliases: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Invoice {
    pub payment_request: String,
    pub r_hash: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceState {
    Open,
    Accepted,
    Settled,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvoiceStatus {
    pub state: InvoiceState,
    pub amt_paid_sat: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HopHint {
    pub node_id: String,
    pub chan_id: u64,
    pub cltv_expiry_delta: u32,
    pub fee_base_msat: u32,
    pub fee_proportional_millionths: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeLimit {
    Sat(u64),
    Msat(u64),
}

/// Outgoing lightning payment description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendPaymentRequest {
    pub payment_request: String,
    pub outgoing_chan_ids: Vec<u64>,
    pub allow_self_payment: bool,
    pub fee_limit: FeeLimit,
    pub route_hints: Vec<Vec<HopHint>>,
    pub max_parts: Option<u32>,
    pub timeout_seconds: Option<u32>,
}

/// Asset-denominated payment wrapping a lightning payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPaymentRequest {
    pub asset_id: Vec<u8>,
    pub peer_pubkey: Vec<u8>,
    pub payment: SendPaymentRequest,
    pub allow_overpay: bool,
    pub asset_amount: u64,
    pub rfq_id: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetInvoiceRequest {
    pub asset_id: Vec<u8>,
    pub asset_amount: u64,
    pub peer_pubkey: Vec<u8>,
    pub expiry_seconds: u64,
    pub rfq_id: Vec<u8>,
    /// Short channel id the payer should route the last hop through.
    pub hop_hint_scid: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Unknown,
    Initiated,
    InFlight,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    None,
    Timeout,
    NoRoute,
    Error,
    IncorrectPaymentDetails,
    InsufficientBalance,
    Canceled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureReason::None => "FAILURE_REASON_NONE",
            FailureReason::Timeout => "FAILURE_REASON_TIMEOUT",
            FailureReason::NoRoute => "FAILURE_REASON_NO_ROUTE",
            FailureReason::Error => "FAILURE_REASON_ERROR",
            FailureReason::IncorrectPaymentDetails => {
                "FAILURE_REASON_INCORRECT_PAYMENT_DETAILS"
            }
            FailureReason::InsufficientBalance => "FAILURE_REASON_INSUFFICIENT_BALANCE",
            FailureReason::Canceled => "FAILURE_REASON_CANCELED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hop {
    pub chan_id: u64,
    pub pub_key: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Route {
    pub hops: Vec<Hop>,
    /// JSON delivery record attached by the asset layer.
    pub custom_channel_data: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtlcAttempt {
    pub route: Option<Route>,
}

/// Status snapshot of one payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub payment_hash: String,
    pub status: PaymentStatus,
    pub value_sat: u64,
    pub fee_sat: u64,
    pub failure_reason: FailureReason,
    pub htlcs: Vec<HtlcAttempt>,
}

/// One event on a payment status stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentUpdate {
    /// Counter-party accepted the sell order backing an asset payment.
    AcceptedSellOrder { quote_id: Vec<u8> },
    PaymentResult(PaymentRecord),
    /// Anything the transport could not map onto the variants above.
    Unrecognized(String),
}

pub type PaymentStream = BoxStream<'static, Result<PaymentUpdate>>;

/// Order submitted to the counter-party's quote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    pub asset_id: String,
    pub amount: OrderAmount,
    pub expiry_seconds: u64,
    pub timeout_seconds: u32,
    pub peer_pubkey: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderAmount {
    /// Sell order: the most msat we are willing to be paid out.
    PaymentMaxMsat(u64),
    /// Buy order: the most asset units we want to receive.
    AssetMaxUnits(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedQuote {
    pub id: Vec<u8>,
    pub asset_amount: u64,
    pub scid: u64,
    pub expiry: u64,
}

/// Quote service reply to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderResponse {
    Accepted(AcceptedQuote),
    Invalid { status: String },
    Rejected { message: String },
    /// Response shape the transport could not classify.
    Unrecognized(String),
}

#[async_trait]
pub trait ChannelInventory: Send + Sync {
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>>;

    async fn channel_edge(&self, channel_point: &str) -> Result<ChannelEdge>;

    async fn list_aliases(&self) -> Result<Vec<AliasMap>>;
}

#[async_trait]
pub trait NativePayments: Send + Sync {
    async fn add_invoice(&self, value_sat: u64) -> Result<Invoice>;

    async fn lookup_invoice(&self, payment_hash: &str) -> Result<InvoiceStatus>;

    async fn send_payment(&self, request: SendPaymentRequest) -> Result<PaymentStream>;
}

#[async_trait]
pub trait AssetPayments: Send + Sync {
    async fn add_invoice(&self, request: AssetInvoiceRequest) -> Result<Invoice>;

    async fn send_payment(&self, request: AssetPaymentRequest) -> Result<PaymentStream>;
}

#[async_trait]
pub trait QuoteService: Send + Sync {
    async fn add_sell_order(&self, order: OrderRequest) -> Result<OrderResponse>;

    async fn add_buy_order(&self, order: OrderRequest) -> Result<OrderResponse>;
}
