//! Session identifiers.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};

/// Identifier of a recording session owned by the session service.
///
/// Sessions are opaque to the pipeline; the only requirement is that the
/// identifier is a well-formed UUID. Parsing happens at the HTTP boundary so
/// malformed identifiers never reach the queue or the token store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a session ID from its textual form.
    pub fn parse(raw: &str) -> ModelResult<Self> {
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| ModelError::invalid_session_id(raw))
    }

    /// Get the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Uuid> for SessionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_session_id() {
        let id = SessionId::parse("6f1c2a4e-8d3b-4f5a-9c7e-1b2d3e4f5a6b").unwrap();
        assert_eq!(id.to_string(), "6f1c2a4e-8d3b-4f5a-9c7e-1b2d3e4f5a6b");
    }

    #[test]
    fn test_parse_trims_whitespace() {
        assert!(SessionId::parse(" 6f1c2a4e-8d3b-4f5a-9c7e-1b2d3e4f5a6b\n").is_ok());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = SessionId::parse("not-a-session").unwrap_err();
        assert_eq!(err, ModelError::InvalidSessionId("not-a-session".to_string()));
        assert!(SessionId::parse("").is_err());
    }

    #[test]
    fn test_serde_is_transparent() {
        let id = SessionId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
