//! Swap orchestration across a sats channel and an asset channel with one peer.
//!
//! Each call to [`SwapOrchestrator::execute`] is one attempt: channels are
//! re-selected and the quote re-negotiated every time, and nothing is retried.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::channels::{ChannelSelection, resolve_alias_scid};
use crate::config::SwapConfig;
use crate::errors::{AppError, Result, SwapStage};
use crate::models::{SwapDirection, SwapReceipt, SwapRequest};
use crate::negotiator::QuoteNegotiator;
use crate::rates::{payment_budget_msat, routing_fee};
use crate::rpc::{
    AssetInvoiceRequest, AssetPaymentRequest, AssetPayments, ChannelInventory, FeeLimit, HopHint,
    InvoiceState, NativePayments, QuoteService, SendPaymentRequest,
};
use crate::tracker::PaymentTracker;
use crate::utils::CancelSignal;

/// Node services one orchestrator talks to.
#[derive(Clone)]
pub struct NodeClients {
    pub channels: Arc<dyn ChannelInventory>,
    pub native: Arc<dyn NativePayments>,
    pub assets: Arc<dyn AssetPayments>,
    pub quotes: Arc<dyn QuoteService>,
}

/// Registry of (sats channel, asset channel) pairs with an attempt in progress.
#[derive(Debug, Clone, Default)]
pub struct ChannelPairLocks {
    busy: Arc<Mutex<HashSet<(u64, u64)>>>,
}

impl ChannelPairLocks {
    pub fn try_acquire(&self, sats_chan_id: u64, asset_chan_id: u64) -> Result<ChannelPairGuard> {
        let pair = (sats_chan_id, asset_chan_id);
        if !self.busy.lock().insert(pair) {
            return Err(AppError::ChannelPairBusy {
                sats_chan_id,
                asset_chan_id,
            });
        }
        Ok(ChannelPairGuard {
            locks: self.clone(),
            pair,
        })
    }

    #[cfg(test)]
    pub(crate) fn is_busy(&self, sats_chan_id: u64, asset_chan_id: u64) -> bool {
        self.busy.lock().contains(&(sats_chan_id, asset_chan_id))
    }
}

/// Releases its pair on drop.
#[derive(Debug)]
pub struct ChannelPairGuard {
    locks: ChannelPairLocks,
    pair: (u64, u64),
}

impl Drop for ChannelPairGuard {
    fn drop(&mut self) {
        self.locks.busy.lock().remove(&self.pair);
    }
}

fn staged(stage: SwapStage) -> impl Fn(AppError) -> AppError {
    move |e| e.in_stage(stage)
}

pub struct SwapOrchestrator {
    clients: NodeClients,
    config: SwapConfig,
    negotiator: QuoteNegotiator,
    locks: Option<ChannelPairLocks>,
}

impl SwapOrchestrator {
    pub fn new(clients: NodeClients, config: SwapConfig) -> Self {
        let negotiator = QuoteNegotiator::new(
            clients.quotes.clone(),
            config.order_expiry,
            config.order_timeout,
        );
        let locks = config.single_flight.then(ChannelPairLocks::default);
        Self {
            clients,
            config,
            negotiator,
            locks,
        }
    }

    /// Share one single-flight registry between orchestrators.
    pub fn with_locks(mut self, locks: ChannelPairLocks) -> Self {
        self.locks = Some(locks);
        self
    }

    /// Run one swap attempt to its terminal outcome.
    pub async fn execute(&self, request: &SwapRequest, cancel: CancelSignal) -> Result<SwapReceipt> {
        request.validate()?;
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled("cancelled before start".into()));
        }
        info!(
            direction = ?request.direction,
            amount = request.amount,
            peer = %request.peer_pubkey,
            asset_id = %request.asset_id,
            "[SWAP] starting attempt"
        );
        let res = match request.direction {
            SwapDirection::AssetToSats => self.asset_to_sats(request, cancel).await,
            SwapDirection::SatsToAsset => self.sats_to_asset(request, cancel).await,
        };
        match &res {
            Ok(r) => info!(
                delivered = r.amount_delivered,
                fee_sat = r.fee_sat,
                quote_id = %hex::encode(&r.quote_id),
                "[SWAP] attempt succeeded"
            ),
            Err(e) => warn!(error = %e, kind = ?e.kind(), "[SWAP] attempt failed"),
        }
        res
    }

    fn claim(&self, sats_chan_id: u64, asset_chan_id: u64) -> Result<Option<ChannelPairGuard>> {
        self.locks
            .as_ref()
            .map(|l| l.try_acquire(sats_chan_id, asset_chan_id))
            .transpose()
    }

    /// Pay asset units out of the asset channel; receive sats over the sats channel.
    async fn asset_to_sats(&self, req: &SwapRequest, mut cancel: CancelSignal) -> Result<SwapReceipt> {
        let peer = hex::decode(&req.peer_pubkey)?;
        let asset_id = hex::decode(&req.asset_id)?;

        info!(stage = %SwapStage::SelectingChannels, "[SWAP] stage");
        let selection = ChannelSelection::fetch(
            self.clients.channels.as_ref(),
            &req.peer_pubkey,
            Some(&req.asset_id),
        )
        .await
        .map_err(staged(SwapStage::SelectingChannels))?;
        let sats_chan = selection
            .first_sats()
            .map_err(staged(SwapStage::SelectingChannels))?;
        let asset_chan = selection
            .first_asset()
            .map_err(staged(SwapStage::SelectingChannels))?;
        let _guard = self
            .claim(sats_chan.chan_id, asset_chan.chan_id)
            .map_err(staged(SwapStage::SelectingChannels))?;
        debug!(
            sats_chan = sats_chan.chan_id,
            asset_chan = asset_chan.chan_id,
            "[SWAP] channels chosen"
        );

        info!(stage = %SwapStage::EstimatingFees, "[SWAP] stage");
        let edge = self
            .clients
            .channels
            .channel_edge(&sats_chan.channel_point)
            .await
            .map_err(staged(SwapStage::EstimatingFees))?;
        // the peer's side of the sats channel forwards the last hop back to us
        let fee = routing_fee(req.amount, edge.policy_of(&sats_chan.remote_pubkey));
        let budget_msat = payment_budget_msat(req.amount, &fee, self.config.fee_buffer_sat);
        info!(
            base_fee_sat = fee.base_fee_sat,
            proportional_fee_sat = fee.proportional_fee_sat,
            budget_msat,
            "[SWAP] routing fee estimated"
        );

        info!(stage = %SwapStage::NegotiatingQuote, "[SWAP] stage");
        let quote = self
            .negotiator
            .sell(&req.asset_id, budget_msat, &peer)
            .await
            .map_err(staged(SwapStage::NegotiatingQuote))?;

        info!(stage = %SwapStage::BuildingPayment, "[SWAP] stage");
        let invoice = self
            .clients
            .native
            .add_invoice(req.amount)
            .await
            .map_err(staged(SwapStage::BuildingPayment))?;
        let hint = HopHint {
            node_id: asset_chan.remote_pubkey.clone(),
            chan_id: sats_chan.peer_scid_alias,
            cltv_expiry_delta: fee.policy.time_lock_delta,
            fee_base_msat: fee.policy.fee_base_msat,
            fee_proportional_millionths: fee.policy.fee_rate_ppm,
        };
        let payment = AssetPaymentRequest {
            asset_id,
            peer_pubkey: peer,
            payment: SendPaymentRequest {
                payment_request: invoice.payment_request,
                outgoing_chan_ids: vec![asset_chan.chan_id],
                allow_self_payment: true,
                fee_limit: FeeLimit::Sat(self.config.asset_fee_limit_sat),
                route_hints: vec![vec![hint]],
                max_parts: None,
                timeout_seconds: None,
            },
            allow_overpay: true,
            asset_amount: quote.asset_amount,
            rfq_id: quote.id.clone(),
        };
        let stream = self
            .clients
            .assets
            .send_payment(payment)
            .await
            .map_err(staged(SwapStage::BuildingPayment))?;

        info!(stage = %SwapStage::AwaitingPaymentOutcome, "[SWAP] stage");
        let settled = PaymentTracker::asset_delivery()
            .track(stream, &mut cancel)
            .await
            .into_result()
            .map_err(staged(SwapStage::AwaitingPaymentOutcome))?;

        Ok(SwapReceipt {
            direction: SwapDirection::AssetToSats,
            quote_id: quote.id,
            amount_delivered: settled.amount_delivered,
            fee_sat: settled.fee_sat,
            sats_chan_id: sats_chan.chan_id,
            asset_chan_id: asset_chan.chan_id,
        })
    }

    /// Pay sats out of the sats channels; receive asset units over the asset channel.
    async fn sats_to_asset(&self, req: &SwapRequest, mut cancel: CancelSignal) -> Result<SwapReceipt> {
        let peer = hex::decode(&req.peer_pubkey)?;
        let asset_id = hex::decode(&req.asset_id)?;

        info!(stage = %SwapStage::SelectingChannels, "[SWAP] stage");
        let selection = ChannelSelection::fetch(
            self.clients.channels.as_ref(),
            &req.peer_pubkey,
            Some(&req.asset_id),
        )
        .await
        .map_err(staged(SwapStage::SelectingChannels))?;
        let sats_chan = selection
            .first_sats()
            .map_err(staged(SwapStage::SelectingChannels))?;
        let asset_chan = selection
            .first_asset()
            .map_err(staged(SwapStage::SelectingChannels))?;
        let _guard = self
            .claim(sats_chan.chan_id, asset_chan.chan_id)
            .map_err(staged(SwapStage::SelectingChannels))?;
        let aliases = self
            .clients
            .channels
            .list_aliases()
            .await
            .map_err(staged(SwapStage::SelectingChannels))?;
        let alias = resolve_alias_scid(&aliases, asset_chan.chan_id);

        info!(stage = %SwapStage::NegotiatingQuote, "[SWAP] stage");
        let quote = self
            .negotiator
            .buy(&req.asset_id, req.amount, &peer)
            .await
            .map_err(staged(SwapStage::NegotiatingQuote))?;
        // a scid bound into the quote wins over the locally known alias
        let hop_hint_scid = match (quote.scid, alias) {
            (scid, _) if scid != 0 => scid,
            (_, Some(alias)) => alias,
            (_, None) => asset_chan.chan_id,
        };
        debug!(hop_hint_scid, ?alias, quote_scid = quote.scid, "[SWAP] asset hop scid");

        info!(stage = %SwapStage::BuildingPayment, "[SWAP] stage");
        let invoice = self
            .clients
            .assets
            .add_invoice(AssetInvoiceRequest {
                asset_id,
                asset_amount: req.amount,
                peer_pubkey: peer,
                expiry_seconds: self.config.invoice_expiry.as_secs(),
                rfq_id: quote.id.clone(),
                hop_hint_scid,
            })
            .await
            .map_err(staged(SwapStage::BuildingPayment))?;
        let payment = SendPaymentRequest {
            payment_request: invoice.payment_request,
            outgoing_chan_ids: selection.sats_chan_ids(),
            allow_self_payment: true,
            fee_limit: FeeLimit::Msat(self.config.native_fee_limit_msat),
            route_hints: Vec::new(),
            max_parts: Some(self.config.native_max_parts),
            timeout_seconds: Some(
                u32::try_from(self.config.native_timeout.as_secs()).unwrap_or(u32::MAX),
            ),
        };
        let stream = self
            .clients
            .native
            .send_payment(payment)
            .await
            .map_err(staged(SwapStage::BuildingPayment))?;

        info!(stage = %SwapStage::AwaitingPaymentOutcome, "[SWAP] stage");
        let settled = PaymentTracker::native_delivery()
            .track(stream, &mut cancel)
            .await
            .into_result()
            .map_err(staged(SwapStage::AwaitingPaymentOutcome))?;

        info!(stage = %SwapStage::AwaitingSettlement, "[SWAP] stage");
        let payment_hash = hex::encode(&invoice.r_hash);
        wait_for_settlement(
            self.clients.native.as_ref(),
            &payment_hash,
            self.config.invoice_poll_interval,
            &mut cancel,
        )
        .await
        .map_err(staged(SwapStage::AwaitingSettlement))?;

        Ok(SwapReceipt {
            direction: SwapDirection::SatsToAsset,
            quote_id: quote.id,
            amount_delivered: req.amount,
            fee_sat: settled.fee_sat,
            sats_chan_id: sats_chan.chan_id,
            asset_chan_id: asset_chan.chan_id,
        })
    }
}

/// Poll the invoice until it settles or is canceled.
async fn wait_for_settlement(
    native: &dyn NativePayments,
    payment_hash: &str,
    every: Duration,
    cancel: &mut CancelSignal,
) -> Result<()> {
    loop {
        let status = native.lookup_invoice(payment_hash).await?;
        match status.state {
            InvoiceState::Settled => {
                info!(payment_hash, "[SWAP] invoice settled");
                return Ok(());
            }
            InvoiceState::Canceled => {
                return Err(AppError::PaymentFailed("invoice was canceled".into()));
            }
            InvoiceState::Open | InvoiceState::Accepted => {
                debug!(state = ?status.state, "[SWAP] invoice not settled yet");
                tokio::select! {
                    biased;
                    reason = cancel.cancelled() => return Err(AppError::Cancelled(reason.to_string())),
                    _ = tokio::time::sleep(every) => {}
                }
            }
        }
    }
}
