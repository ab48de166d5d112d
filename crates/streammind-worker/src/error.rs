//! Worker error types.

use std::time::Duration;

use thiserror::Error;

use streammind_analyzer::AnalyzerError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Worker pool already started")]
    AlreadyStarted,

    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Analysis call timed out after {0:?}")]
    Timeout(Duration),

    #[error("Analysis call panicked: {0}")]
    Panicked(String),

    #[error("Analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
}

impl WorkerError {
    pub fn panicked(msg: impl Into<String>) -> Self {
        Self::Panicked(msg.into())
    }

    /// Short label used for metrics and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            WorkerError::AlreadyStarted | WorkerError::ShutDown => "pool",
            WorkerError::Timeout(_) => "timeout",
            WorkerError::Panicked(_) => "panic",
            WorkerError::Analyzer(AnalyzerError::Timeout(_)) => "timeout",
            WorkerError::Analyzer(_) => "analyzer",
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.reason() == "timeout"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_timeout_counts_as_timeout() {
        let err = WorkerError::from(AnalyzerError::Timeout(Duration::from_secs(1)));
        assert!(err.is_timeout());
        assert!(!WorkerError::panicked("boom").is_timeout());
        assert_eq!(WorkerError::panicked("boom").reason(), "panic");
    }
}
