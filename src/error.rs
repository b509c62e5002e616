//! Error taxonomy for the analysis core.
//!
//! Collaborators (post source, LLM, sink) report `anyhow::Error`; the
//! orchestrator and matcher translate those into the variants below and then
//! degrade gracefully. Nothing here is meant to reach a caller of
//! `TrendAnalysisOrchestrator::run` except as a logged skip reason.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum TrendError {
    /// The post source returned nothing usable for this trend.
    #[error("no data available for trend '{trend}'")]
    DataUnavailable { trend: String },

    /// An LLM or provider response could not be parsed into the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A numeric guard fired (empty collection, zero span, zero max).
    #[error("computation guard: {0}")]
    ComputationGuard(&'static str),

    #[error("{operation} timed out after {timeout:?} for trend '{trend}'")]
    CollaboratorTimeout {
        operation: &'static str,
        trend: String,
        timeout: Duration,
    },

    #[error("collaborator error: {0}")]
    Collaborator(#[from] anyhow::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TrendError {
    /// Short machine-friendly label used for metrics and skip reports.
    pub fn kind(&self) -> &'static str {
        match self {
            TrendError::DataUnavailable { .. } => "data_unavailable",
            TrendError::MalformedResponse(_) => "malformed_response",
            TrendError::ComputationGuard(_) => "computation_guard",
            TrendError::CollaboratorTimeout { .. } => "timeout",
            TrendError::Collaborator(_) => "collaborator",
            TrendError::Config(_) => "config",
        }
    }
}

pub type TrendResult<T> = Result<T, TrendError>;
