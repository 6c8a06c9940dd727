use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Orchestrator stage an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapStage {
    SelectingChannels,
    EstimatingFees,
    NegotiatingQuote,
    BuildingPayment,
    AwaitingPaymentOutcome,
    AwaitingSettlement,
}

impl fmt::Display for SwapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapStage::SelectingChannels => "selecting channels",
            SwapStage::EstimatingFees => "estimating routing fees",
            SwapStage::NegotiatingQuote => "negotiating quote",
            SwapStage::BuildingPayment => "building payment",
            SwapStage::AwaitingPaymentOutcome => "awaiting payment outcome",
            SwapStage::AwaitingSettlement => "awaiting invoice settlement",
        };
        f.write_str(s)
    }
}

/// Coarse classification used by callers to decide what to do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unreachable node or service, bad local setup.
    Connectivity,
    /// Malformed request or bad configuration value.
    Validation,
    /// Counter-party declined or could not parse the order.
    Negotiation,
    /// The swap ran but did not complete.
    Execution,
    /// Caller abort or deadline.
    Cancellation,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("Parse float error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("Parse int error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("price source error: {0}")]
    PriceSource(String),

    #[error("node rpc error: {0}")]
    Rpc(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed channel data for channel {chan_id}: {source}")]
    ChannelData {
        chan_id: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("no eligible channel: {0}")]
    NoEligibleChannel(String),

    #[error("channel pair busy: sats channel {sats_chan_id}, asset channel {asset_chan_id}")]
    ChannelPairBusy { sats_chan_id: u64, asset_chan_id: u64 },

    #[error("invalid quote: {0}")]
    QuoteInvalid(String),

    #[error("rejected quote: {0}")]
    QuoteRejected(String),

    #[error("malformed success: {0}")]
    MalformedSuccess(String),

    #[error("payment failed: {0}")]
    PaymentFailed(String),

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("{stage}: {source}")]
    Stage {
        stage: SwapStage,
        #[source]
        source: Box<AppError>,
    },
}

impl AppError {
    /// Wrap `self` with the orchestrator stage it surfaced in.
    pub fn in_stage(self, stage: SwapStage) -> Self {
        AppError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping stage wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Stage the error was raised in, if it was wrapped by the orchestrator.
    pub fn stage(&self) -> Option<SwapStage> {
        match self {
            AppError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Env(_)
            | AppError::Http(_)
            | AppError::PriceSource(_)
            | AppError::Rpc(_) => ErrorKind::Connectivity,
            AppError::Config(_)
            | AppError::ParseFloat(_)
            | AppError::ParseInt(_)
            | AppError::UrlParse(_)
            | AppError::SerdeJson(_)
            | AppError::Hex(_)
            | AppError::InvalidRequest(_) => ErrorKind::Validation,
            AppError::QuoteInvalid(_) | AppError::QuoteRejected(_) => ErrorKind::Negotiation,
            AppError::NoEligibleChannel(_)
            | AppError::ChannelData { .. }
            | AppError::ChannelPairBusy { .. }
            | AppError::MalformedSuccess(_)
            | AppError::PaymentFailed(_)
            | AppError::ProtocolViolation(_) => ErrorKind::Execution,
            AppError::Cancelled(_) => ErrorKind::Cancellation,
            AppError::Stage { source, .. } => source.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn stage_wrapper_keeps_reason_text() {
        let err = AppError::QuoteRejected("insufficient liquidity".into())
            .in_stage(SwapStage::NegotiatingQuote);
        let msg = err.to_string();
        assert_eq!(msg, "negotiating quote: rejected quote: insufficient liquidity");
        assert_eq!(err.stage(), Some(SwapStage::NegotiatingQuote));
        assert_eq!(err.kind(), ErrorKind::Negotiation);
        assert!(err.source().is_some());
    }

    #[test]
    fn root_skips_nested_stages() {
        let err = AppError::Cancelled("deadline".into())
            .in_stage(SwapStage::AwaitingPaymentOutcome)
            .in_stage(SwapStage::AwaitingSettlement);
        assert!(matches!(err.root(), AppError::Cancelled(_)));
        assert_eq!(err.kind(), ErrorKind::Cancellation);
    }

    #[test]
    fn execution_and_connectivity_are_distinct() {
        assert_eq!(
            AppError::NoEligibleChannel("x".into()).kind(),
            ErrorKind::Execution
        );
        assert_eq!(AppError::Rpc("down".into()).kind(), ErrorKind::Connectivity);
    }
}
