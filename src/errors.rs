use serde::Serialize;
use thiserror::Error;

use crate::models::{Direction, SourceId};

pub type Result<T> = std::result::Result<T, AppError>;

/// Process-level failures: anything that stops the engine from being wired up.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Parse float error: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),

    #[error("Parse int error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] ethers::signers::WalletError),

    #[error("Unit conversion error: {0}")]
    Units(#[from] ethers::utils::ConversionError),

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Other: {0}")]
    Other(String),
}

/// Failures contained within a single decision cycle.
///
/// None of these ever reach the process level: quote and estimation failures
/// disqualify the affected direction(s), a rejected submission ends the cycle.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CycleError {
    #[error("quote unavailable from {source_id}: {reason}")]
    QuoteUnavailable { source_id: SourceId, reason: String },

    #[error("invalid quote from {source_id}: {reason}")]
    InvalidQuote { source_id: SourceId, reason: String },

    #[error("cost estimation failed for {direction}: {reason}")]
    EstimationFailed { direction: Direction, reason: String },

    #[error("submission rejected for {direction}: {reason}")]
    SubmissionRejected { direction: Direction, reason: String },
}

impl CycleError {
    pub fn quote_unavailable(source_id: SourceId, reason: impl ToString) -> Self {
        Self::QuoteUnavailable {
            source_id,
            reason: reason.to_string(),
        }
    }

    pub fn invalid_quote(source_id: SourceId, reason: impl ToString) -> Self {
        Self::InvalidQuote {
            source_id,
            reason: reason.to_string(),
        }
    }

    pub fn estimation_failed(direction: Direction, reason: impl ToString) -> Self {
        Self::EstimationFailed {
            direction,
            reason: reason.to_string(),
        }
    }

    pub fn submission_rejected(direction: Direction, reason: impl ToString) -> Self {
        Self::SubmissionRejected {
            direction,
            reason: reason.to_string(),
        }
    }
}
