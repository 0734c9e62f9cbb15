use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::common::types::{City, DateRange, SourceId};
use crate::pipeline::state::PipelineState;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Illegal pipeline transition: {from} -> {to}")]
    IllegalTransition { from: PipelineState, to: PipelineState },

    #[error("Run store error: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failure of a source client. `Unavailable` is scoped to one chunk and is
/// recoverable as a gap; `Rejected` and `Cancelled` end the whole fetch.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceError {
    #[error("{source_id} unavailable for {city} {range} after {attempts} attempt(s): {reason}")]
    Unavailable {
        source_id: SourceId,
        city: City,
        range: DateRange,
        attempts: u32,
        reason: String,
    },

    #[error("{source_id} rejected the request: {reason}")]
    Rejected {
        source_id: SourceId,
        status: Option<u16>,
        reason: String,
    },

    #[error("{source_id} fetch cancelled")]
    Cancelled { source_id: SourceId },
}
