//! Reduces a payment status stream to one [`PaymentOutcome`].

use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::errors::AppError;
use crate::models::{AssetBalance, PaymentOutcome};
use crate::rpc::{PaymentRecord, PaymentStatus, PaymentStream, PaymentUpdate};
use crate::utils::CancelSignal;

/// Delivery record the asset layer attaches to a settled route.
#[derive(Debug, Deserialize)]
struct RouteDelivery {
    #[serde(default)]
    balances: Vec<AssetBalance>,
    #[serde(default)]
    rfq_id: String,
}

/// What "amount delivered" means for the stream being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Accounting {
    /// Asset units, read from the first HTLC's route metadata.
    AssetUnits,
    /// Sats, read from the payment value.
    NativeSats,
}

enum Step {
    Continue,
    Done(PaymentOutcome),
}

#[derive(Debug, Clone, Copy)]
pub struct PaymentTracker {
    accounting: Accounting,
}

impl PaymentTracker {
    /// For asset-denominated payments.
    pub fn asset_delivery() -> Self {
        Self {
            accounting: Accounting::AssetUnits,
        }
    }

    /// For plain lightning payments.
    pub fn native_delivery() -> Self {
        Self {
            accounting: Accounting::NativeSats,
        }
    }

    /// Consume `stream` until a terminal status, stream end, or cancellation.
    ///
    /// A stream that ends without a terminal event counts as success with
    /// nothing delivered.
    pub async fn track(&self, mut stream: PaymentStream, cancel: &mut CancelSignal) -> PaymentOutcome {
        loop {
            let next = tokio::select! {
                biased;
                reason = cancel.cancelled() => {
                    warn!(reason, "[TRACK] stopped waiting for payment outcome");
                    return PaymentOutcome::indeterminate(AppError::Cancelled(reason.to_string()));
                }
                next = stream.next() => next,
            };
            match next {
                None => {
                    info!("[TRACK] stream closed without terminal status");
                    return PaymentOutcome::succeeded(0, 0);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "[TRACK] payment stream error");
                    return PaymentOutcome::indeterminate(e);
                }
                Some(Ok(update)) => {
                    if let Step::Done(outcome) = self.reduce(update) {
                        return outcome;
                    }
                }
            }
        }
    }

    fn reduce(&self, update: PaymentUpdate) -> Step {
        match update {
            PaymentUpdate::AcceptedSellOrder { quote_id } => {
                debug!(quote_id = %hex::encode(&quote_id), "[TRACK] sell order accepted");
                Step::Continue
            }
            PaymentUpdate::PaymentResult(payment) => self.on_payment(payment),
            PaymentUpdate::Unrecognized(shape) => Step::Done(PaymentOutcome::indeterminate(
                AppError::ProtocolViolation(format!("unknown payment response type: {shape}")),
            )),
        }
    }

    fn on_payment(&self, payment: PaymentRecord) -> Step {
        debug!(status = ?payment.status, hash = %payment.payment_hash, "[TRACK] payment update");
        match payment.status {
            PaymentStatus::InFlight | PaymentStatus::Initiated | PaymentStatus::Unknown => {
                Step::Continue
            }
            PaymentStatus::Failed => {
                warn!(
                    reason = %payment.failure_reason,
                    attempts = payment.htlcs.len(),
                    "[TRACK] payment failed"
                );
                Step::Done(PaymentOutcome::failed(
                    payment.failure_reason.to_string(),
                    payment.fee_sat,
                ))
            }
            PaymentStatus::Succeeded => {
                let outcome = match self.accounting {
                    Accounting::NativeSats => {
                        PaymentOutcome::succeeded(payment.value_sat, payment.fee_sat)
                    }
                    Accounting::AssetUnits => match delivered_asset_units(&payment) {
                        Ok(units) => PaymentOutcome::succeeded(units, payment.fee_sat),
                        Err(e) => PaymentOutcome::indeterminate(e),
                    },
                };
                info!(
                    fee_sat = payment.fee_sat,
                    value_sat = payment.value_sat,
                    "[TRACK] payment succeeded"
                );
                Step::Done(outcome)
            }
        }
    }
}

/// Asset units delivered according to the first HTLC attempt only.
fn delivered_asset_units(payment: &PaymentRecord) -> Result<u64, AppError> {
    let first = payment
        .htlcs
        .first()
        .ok_or_else(|| AppError::MalformedSuccess("no htlcs found for payment".into()))?;
    let route = first
        .route
        .as_ref()
        .ok_or_else(|| AppError::MalformedSuccess("no route found for payment".into()))?;
    if route.custom_channel_data.is_empty() {
        return Err(AppError::MalformedSuccess(
            "no custom data found in payment".into(),
        ));
    }
    let delivery: RouteDelivery = serde_json::from_slice(&route.custom_channel_data)
        .map_err(|e| AppError::MalformedSuccess(format!("unreadable route custom data: {e}")))?;
    if payment.htlcs.len() > 1 || delivery.balances.len() > 1 {
        warn!(
            htlcs = payment.htlcs.len(),
            balances = delivery.balances.len(),
            "[TRACK] multi-part settlement, counting the first entry only"
        );
    }
    let balance = delivery
        .balances
        .first()
        .ok_or_else(|| AppError::MalformedSuccess("no balances in route custom data".into()))?;
    debug!(asset_id = %balance.asset_id, rfq_id = %delivery.rfq_id, "[TRACK] delivery record");
    u64::try_from(balance.amount)
        .map_err(|_| AppError::MalformedSuccess(format!("negative delivered amount {}", balance.amount)))
}
