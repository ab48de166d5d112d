//! Analyzer client error types.

use std::time::Duration;

use thiserror::Error;

pub type AnalyzerResult<T> = Result<T, AnalyzerError>;

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("Analysis request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analysis service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Analysis request failed: {0}")]
    Request(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AnalyzerError {
    pub fn request(msg: impl Into<String>) -> Self {
        Self::Request(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the call ran into its time budget.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AnalyzerError::Timeout(_))
    }
}
