//! Request-for-quote round trip with the market maker.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::errors::{AppError, Result};
use crate::models::Quote;
use crate::rpc::{OrderAmount, OrderRequest, OrderResponse, QuoteService};

/// Submits sell/buy orders and turns the reply into a [`Quote`] or a typed error.
#[derive(Clone)]
pub struct QuoteNegotiator {
    service: Arc<dyn QuoteService>,
    expiry: Duration,
    timeout: Duration,
}

impl QuoteNegotiator {
    pub fn new(service: Arc<dyn QuoteService>, expiry: Duration, timeout: Duration) -> Self {
        Self {
            service,
            expiry,
            timeout,
        }
    }

    /// Offer to sell `asset_id` units for at most `payment_max_msat`.
    pub async fn sell(
        &self,
        asset_id: &str,
        payment_max_msat: u64,
        peer_pubkey: &[u8],
    ) -> Result<Quote> {
        let order = self.order(asset_id, OrderAmount::PaymentMaxMsat(payment_max_msat), peer_pubkey);
        info!(asset_id, payment_max_msat, "[RFQ] submitting sell order");
        let resp = self.service.add_sell_order(order).await?;
        classify(resp)
    }

    /// Ask to buy at most `asset_max_units` of `asset_id`.
    pub async fn buy(&self, asset_id: &str, asset_max_units: u64, peer_pubkey: &[u8]) -> Result<Quote> {
        let order = self.order(asset_id, OrderAmount::AssetMaxUnits(asset_max_units), peer_pubkey);
        info!(asset_id, asset_max_units, "[RFQ] submitting buy order");
        let resp = self.service.add_buy_order(order).await?;
        classify(resp)
    }

    fn order(&self, asset_id: &str, amount: OrderAmount, peer_pubkey: &[u8]) -> OrderRequest {
        OrderRequest {
            asset_id: asset_id.to_string(),
            amount,
            expiry_seconds: self.expiry.as_secs(),
            timeout_seconds: u32::try_from(self.timeout.as_secs()).unwrap_or(u32::MAX),
            peer_pubkey: peer_pubkey.to_vec(),
        }
    }
}

fn classify(resp: OrderResponse) -> Result<Quote> {
    match resp {
        OrderResponse::Accepted(q) => {
            let quote = Quote {
                id: q.id,
                asset_amount: q.asset_amount,
                scid: q.scid,
                expiry: q.expiry,
            };
            info!(
                quote_id = %quote.id_hex(),
                asset_amount = quote.asset_amount,
                scid = quote.scid,
                "[RFQ] quote accepted"
            );
            Ok(quote)
        }
        OrderResponse::Invalid { status } => {
            warn!(%status, "[RFQ] quote invalid");
            Err(AppError::QuoteInvalid(status))
        }
        OrderResponse::Rejected { message } => {
            warn!(%message, "[RFQ] quote rejected");
            Err(AppError::QuoteRejected(message))
        }
        OrderResponse::Unrecognized(shape) => Err(AppError::ProtocolViolation(format!(
            "unknown rfq response: {shape}"
        ))),
    }
}
