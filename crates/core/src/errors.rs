use thiserror::Error;

use crate::extract::SignalField;
use crate::report::CheckStatus;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("required signals missing from agent replies: {}", join_fields(.missing))]
    MissingSignals { missing: Vec<SignalField> },
    #[error("extracted amounts are too large to project: {0} overflowed")]
    Overflow(&'static str),
}

/// Why a single customer check did not produce a projection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CheckError {
    #[error("{query} query failed after {attempts} attempt(s): {message}")]
    Transport { query: String, attempts: u32, message: String },
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("customer check exceeded its {after_secs}s deadline")]
    TimedOut { after_secs: u64 },
    #[error("billing agent gave no answer to any query")]
    NoResponse,
    #[error("run cancelled before the customer check started")]
    Cancelled,
    #[error("customer check task aborted: {0}")]
    Aborted(String),
}

impl CheckError {
    pub fn status(&self) -> CheckStatus {
        match self {
            Self::Extraction(_) => CheckStatus::ParseError,
            Self::Transport { .. }
            | Self::NoResponse
            | Self::TimedOut { .. }
            | Self::Cancelled
            | Self::Aborted(_) => CheckStatus::Error,
        }
    }
}

fn join_fields(fields: &[SignalField]) -> String {
    fields.iter().map(|field| field.as_str()).collect::<Vec<_>>().join(", ")
}
