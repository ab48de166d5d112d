//! Analysis job definitions.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::session::SessionId;

/// Unique identifier for a job, used for log correlation only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One uploaded video segment awaiting external analysis.
///
/// Created by the upload path, consumed exactly once by a worker and
/// discarded after dispatch whether the external call succeeded or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisJob {
    /// Job ID
    pub job_id: JobId,
    /// Session the video belongs to
    pub session_id: SessionId,
    /// Absolute path of the stored video segment
    pub video_path: String,
    /// When the job was enqueued
    pub created_at: DateTime<Utc>,
}

impl AnalysisJob {
    /// Create a new job for an absolute video path.
    pub fn new(session_id: SessionId, video_path: impl Into<String>) -> ModelResult<Self> {
        let video_path = video_path.into();
        if video_path.trim().is_empty() {
            return Err(ModelError::MissingField("video_path"));
        }
        if !Path::new(&video_path).is_absolute() {
            return Err(ModelError::invalid_video_path(format!(
                "'{}' is not an absolute path",
                video_path
            )));
        }

        Ok(Self {
            job_id: JobId::new(),
            session_id,
            video_path,
            created_at: Utc::now(),
        })
    }
}
