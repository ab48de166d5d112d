//! HTTP client for the `/analyze-video` endpoint.

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, info, warn};

use streammind_models::SessionId;

use crate::config::AnalyzerConfig;
use crate::error::{AnalyzerError, AnalyzerResult};

/// Something that can run the external analysis of a stored video segment.
///
/// Implementations return the raw response body; the tokens themselves
/// arrive later through ingestion.
#[async_trait]
pub trait VideoAnalyzer: Send + Sync {
    async fn analyze_video(&self, session_id: &SessionId, video_path: &str) -> AnalyzerResult<String>;
}

/// Analyze request payload.
#[derive(Debug, Serialize)]
struct AnalyzeVideoRequest<'a> {
    session_id: String,
    video_path: &'a str,
}

/// reqwest-based analysis service client.
#[derive(Debug, Clone)]
pub struct AnalyzerClient {
    client: Client,
    config: AnalyzerConfig,
}

impl AnalyzerClient {
    /// Create a new client.
    pub fn new(config: AnalyzerConfig) -> AnalyzerResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AnalyzerError::config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> AnalyzerResult<Self> {
        Self::new(AnalyzerConfig::from_env()?)
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}

#[async_trait]
impl VideoAnalyzer for AnalyzerClient {
    async fn analyze_video(&self, session_id: &SessionId, video_path: &str) -> AnalyzerResult<String> {
        let url = self.config.analyze_url();
        let body = AnalyzeVideoRequest {
            session_id: session_id.to_string(),
            video_path,
        };
        let started = Instant::now();

        debug!(session_id = %session_id, url = %url, "Calling analysis service");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        if !status.is_success() {
            warn!(
                session_id = %session_id,
                status = status.as_u16(),
                "Analysis service rejected request"
            );
            return Err(AnalyzerError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        info!(
            session_id = %session_id,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis service accepted video"
        );
        Ok(text)
    }
}

impl AnalyzerClient {
    fn map_transport_error(&self, e: reqwest::Error) -> AnalyzerError {
        if e.is_timeout() {
            AnalyzerError::Timeout(self.config.timeout)
        } else {
            AnalyzerError::request(e.to_string())
        }
    }
}
