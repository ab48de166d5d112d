//! Analyzer client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{AnalyzerError, AnalyzerResult};

/// Upper bound for one analysis call.
pub const DEFAULT_ANALYZE_TIMEOUT: Duration = Duration::from_secs(600);

/// Analyzer client configuration.
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Base URL of the analysis service
    pub base_url: Url,
    /// Per-request timeout
    pub timeout: Duration,
}

impl AnalyzerConfig {
    pub fn new(base_url: &str, timeout: Duration) -> AnalyzerResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AnalyzerError::config(format!("invalid analysis service URL '{}': {}", base_url, e)))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AnalyzerError::config(format!(
                "analysis service URL must be http(s), got '{}'",
                base_url.scheme()
            )));
        }
        Ok(Self { base_url, timeout })
    }

    /// Create config from environment variables.
    pub fn from_env() -> AnalyzerResult<Self> {
        let base_url = std::env::var("AI_SERVICE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());
        let timeout = std::env::var("ANALYZER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_ANALYZE_TIMEOUT);
        Self::new(&base_url, timeout)
    }

    /// Full URL of the analyze endpoint.
    pub fn analyze_url(&self) -> String {
        format!("{}/analyze-video", self.base_url.as_str().trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_url_handles_trailing_slash() {
        let a = AnalyzerConfig::new("http://ai:8000", DEFAULT_ANALYZE_TIMEOUT).unwrap();
        let b = AnalyzerConfig::new("http://ai:8000/", DEFAULT_ANALYZE_TIMEOUT).unwrap();
        assert_eq!(a.analyze_url(), "http://ai:8000/analyze-video");
        assert_eq!(b.analyze_url(), "http://ai:8000/analyze-video");
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(AnalyzerConfig::new("ftp://ai", DEFAULT_ANALYZE_TIMEOUT).is_err());
        assert!(AnalyzerConfig::new("not a url", DEFAULT_ANALYZE_TIMEOUT).is_err());
    }
}
