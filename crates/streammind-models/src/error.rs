//! Model validation errors.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid session ID '{0}': expected a UUID")]
    InvalidSessionId(String),

    #[error("Missing field: {0}")]
    MissingField(&'static str),

    #[error("Invalid video path: {0}")]
    InvalidVideoPath(String),
}

impl ModelError {
    pub fn invalid_session_id(raw: impl Into<String>) -> Self {
        Self::InvalidSessionId(raw.into())
    }

    pub fn invalid_video_path(msg: impl Into<String>) -> Self {
        Self::InvalidVideoPath(msg.into())
    }
}
