//! In-memory node services for unit tests.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;

use crate::errors::{AppError, Result};
use crate::rpc::*;
use crate::swap::NodeClients;

pub fn stream_of(updates: Vec<PaymentUpdate>) -> PaymentStream {
    futures::stream::iter(updates.into_iter().map(Ok)).boxed()
}

pub fn record(status: PaymentStatus) -> PaymentRecord {
    PaymentRecord {
        payment_hash: "ee".repeat(32),
        status,
        value_sat: 0,
        fee_sat: 0,
        failure_reason: FailureReason::None,
        htlcs: Vec::new(),
    }
}

pub fn delivery_route(asset_id: &str, amount: i64) -> Route {
    Route {
        hops: vec![Hop {
            chan_id: 1,
            pub_key: "02aa".into(),
        }],
        custom_channel_data: format!(
            r#"{{"balances":[{{"asset_id":"{asset_id}","amount":{amount}}}],"rfq_id":"ab"}}"#
        )
        .into_bytes(),
    }
}

pub fn sats_channel(chan_id: u64, peer: &str) -> ChannelInfo {
    ChannelInfo {
        chan_id,
        channel_point: format!("{:064x}:0", chan_id),
        remote_pubkey: peer.to_string(),
        active: true,
        local_balance: 500_000,
        remote_balance: 500_000,
        peer_scid_alias: 16_000_000 + chan_id,
        custom_channel_data: Vec::new(),
    }
}

pub fn asset_channel(chan_id: u64, peer: &str, asset_id: &str) -> ChannelInfo {
    let custom = format!(
        r#"{{"funding_assets":[{{"version":1,"asset_genesis":{{"name":"USDT","asset_id":"{asset_id}"}},"amount":100000,"decimal_display":2}}],
        "local_assets":[{{"asset_id":"{asset_id}","amount":60000}}],"capacity":100000,"local_balance":60000,"remote_balance":40000}}"#
    );
    ChannelInfo {
        custom_channel_data: custom.into_bytes(),
        local_balance: 1_000,
        remote_balance: 1_000,
        ..sats_channel(chan_id, peer)
    }
}

/// Succeeded asset payment delivering `amount` units.
pub fn asset_success(asset_id: &str, amount: i64) -> PaymentUpdate {
    let mut r = record(PaymentStatus::Succeeded);
    r.htlcs = vec![HtlcAttempt {
        route: Some(delivery_route(asset_id, amount)),
    }];
    PaymentUpdate::PaymentResult(r)
}

pub struct FakeQuoteService {
    reply: OrderResponse,
    calls: AtomicUsize,
    orders: Mutex<Vec<OrderRequest>>,
}

impl FakeQuoteService {
    pub fn replying(reply: OrderResponse) -> Arc<Self> {
        Arc::new(Self {
            reply,
            calls: AtomicUsize::new(0),
            orders: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_order(&self) -> Option<OrderRequest> {
        self.orders.lock().last().cloned()
    }

    fn answer(&self, order: OrderRequest) -> Result<OrderResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.orders.lock().push(order);
        Ok(self.reply.clone())
    }
}

#[async_trait]
impl QuoteService for FakeQuoteService {
    async fn add_sell_order(&self, order: OrderRequest) -> Result<OrderResponse> {
        self.answer(order)
    }

    async fn add_buy_order(&self, order: OrderRequest) -> Result<OrderResponse> {
        self.answer(order)
    }
}

/// How a fake payment stream should behave.
#[derive(Clone)]
pub enum StreamScript {
    Updates(Vec<PaymentUpdate>),
    Hang,
}

impl StreamScript {
    fn into_stream(self) -> PaymentStream {
        match self {
            StreamScript::Updates(u) => stream_of(u),
            StreamScript::Hang => futures::stream::pending().boxed(),
        }
    }
}

/// Channel inventory plus both payment services of one node.
pub struct FakeNode {
    pub channels: Vec<ChannelInfo>,
    pub edge: Option<ChannelEdge>,
    pub aliases: Vec<AliasMap>,
    pub asset_stream: Mutex<Option<StreamScript>>,
    pub native_stream: Mutex<Option<StreamScript>>,
    pub invoice_states: Mutex<VecDeque<InvoiceState>>,
    pub asset_payments: Mutex<Vec<AssetPaymentRequest>>,
    pub native_payments: Mutex<Vec<SendPaymentRequest>>,
    pub asset_invoices: Mutex<Vec<AssetInvoiceRequest>>,
    pub native_invoices: Mutex<Vec<u64>>,
    pub lookups: AtomicUsize,
}

impl FakeNode {
    pub fn with_channels(channels: Vec<ChannelInfo>) -> Self {
        Self {
            channels,
            // an edge with no published policies
            edge: Some(ChannelEdge::default()),
            aliases: Vec::new(),
            asset_stream: Mutex::new(None),
            native_stream: Mutex::new(None),
            invoice_states: Mutex::new(VecDeque::new()),
            asset_payments: Mutex::new(Vec::new()),
            native_payments: Mutex::new(Vec::new()),
            asset_invoices: Mutex::new(Vec::new()),
            native_invoices: Mutex::new(Vec::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    fn take_stream(slot: &Mutex<Option<StreamScript>>) -> Result<PaymentStream> {
        slot.lock()
            .take()
            .map(StreamScript::into_stream)
            .ok_or_else(|| AppError::Rpc("no payment scripted".into()))
    }
}

#[async_trait]
impl ChannelInventory for FakeNode {
    async fn list_channels(&self) -> Result<Vec<ChannelInfo>> {
        Ok(self.channels.clone())
    }

    async fn channel_edge(&self, channel_point: &str) -> Result<ChannelEdge> {
        self.edge
            .clone()
            .ok_or_else(|| AppError::Rpc(format!("edge not found: {channel_point}")))
    }

    async fn list_aliases(&self) -> Result<Vec<AliasMap>> {
        Ok(self.aliases.clone())
    }
}

#[async_trait]
impl NativePayments for FakeNode {
    async fn add_invoice(&self, value_sat: u64) -> Result<Invoice> {
        self.native_invoices.lock().push(value_sat);
        Ok(Invoice {
            payment_request: format!("lnbcrt{value_sat}"),
            r_hash: vec![0xee; 32],
        })
    }

    async fn lookup_invoice(&self, _payment_hash: &str) -> Result<InvoiceStatus> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let state = self
            .invoice_states
            .lock()
            .pop_front()
            .unwrap_or(InvoiceState::Open);
        Ok(InvoiceStatus {
            state,
            amt_paid_sat: 0,
        })
    }

    async fn send_payment(&self, request: SendPaymentRequest) -> Result<PaymentStream> {
        self.native_payments.lock().push(request);
        Self::take_stream(&self.native_stream)
    }
}

#[async_trait]
impl AssetPayments for FakeNode {
    async fn add_invoice(&self, request: AssetInvoiceRequest) -> Result<Invoice> {
        let amount = request.asset_amount;
        self.asset_invoices.lock().push(request);
        Ok(Invoice {
            payment_request: format!("lnbcrt-asset{amount}"),
            r_hash: vec![0xee; 32],
        })
    }

    async fn send_payment(&self, request: AssetPaymentRequest) -> Result<PaymentStream> {
        self.asset_payments.lock().push(request);
        Self::take_stream(&self.asset_stream)
    }
}

pub fn clients(node: &Arc<FakeNode>, quotes: &Arc<FakeQuoteService>) -> NodeClients {
    NodeClients {
        channels: node.clone(),
        native: node.clone(),
        assets: node.clone(),
        quotes: quotes.clone(),
    }
}
