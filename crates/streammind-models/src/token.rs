//! Analysis token models.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};
use crate::session::SessionId;

/// A token as produced by the analysis service, before the store assigns
/// its identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NewToken {
    pub session_id: SessionId,
    pub content: String,
    /// Producer-assigned sequence number, unique within a session by contract
    pub token_index: i32,
    /// Producer wall-clock time in milliseconds
    pub timestamp: i64,
}

impl NewToken {
    pub fn new(session_id: SessionId, content: impl Into<String>, token_index: i32, timestamp: i64) -> Self {
        Self {
            session_id,
            content: content.into(),
            token_index,
            timestamp,
        }
    }
}

/// A persisted analysis token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisToken {
    /// Store-assigned, monotonically increasing identifier
    pub id: i64,
    pub session_id: SessionId,
    pub content: String,
    pub token_index: i32,
    /// Producer wall-clock time in milliseconds
    pub timestamp: i64,
    /// When the store accepted the token
    pub created_at: DateTime<Utc>,
}

impl AnalysisToken {
    /// Build the stored form of a token.
    pub fn from_new(id: i64, token: NewToken, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            session_id: token.session_id,
            content: token.content,
            token_index: token.token_index,
            timestamp: token.timestamp,
            created_at,
        }
    }
}

/// Ingestion request body sent by the analysis service.
///
/// Fields are optional on the wire so that a missing field is reported as a
/// malformed request instead of a deserialization failure.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct SaveAnalysisRequest {
    pub session_id: Option<String>,
    pub content: Option<String>,
    pub token_index: Option<i32>,
    pub timestamp: Option<i64>,
}

impl SaveAnalysisRequest {
    /// Validate the request and convert it into a storable token.
    pub fn into_new_token(self) -> ModelResult<NewToken> {
        let raw_session = self.session_id.ok_or(ModelError::MissingField("session_id"))?;
        let session_id = SessionId::parse(&raw_session)?;
        let content = self.content.ok_or(ModelError::MissingField("content"))?;
        let token_index = self.token_index.ok_or(ModelError::MissingField("token_index"))?;
        let timestamp = self.timestamp.ok_or(ModelError::MissingField("timestamp"))?;

        Ok(NewToken {
            session_id,
            content,
            token_index,
            timestamp,
        })
    }
}

/// Ingestion acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SaveAnalysisResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved_id: Option<i64>,
}

impl SaveAnalysisResponse {
    pub fn saved(id: i64) -> Self {
        Self {
            success: true,
            message: "Saved".to_string(),
            saved_id: Some(id),
        }
    }

    pub fn failed(reason: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            message: format!("Error: {}", reason),
            saved_id: None,
        }
    }
}

/// One replayed token as written to the replay stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AnalysisChunk {
    pub id: i64,
    pub session_id: SessionId,
    pub content: String,
    pub token_index: i32,
    pub timestamp: i64,
}

impl From<&AnalysisToken> for AnalysisChunk {
    fn from(token: &AnalysisToken) -> Self {
        Self {
            id: token.id,
            session_id: token.session_id,
            content: token.content.clone(),
            token_index: token.token_index,
            timestamp: token.timestamp,
        }
    }
}

impl From<AnalysisToken> for AnalysisChunk {
    fn from(token: AnalysisToken) -> Self {
        Self {
            id: token.id,
            session_id: token.session_id,
            content: token.content,
            token_index: token.token_index,
            timestamp: token.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(session: &str) -> SaveAnalysisRequest {
        SaveAnalysisRequest {
            session_id: Some(session.to_string()),
            content: Some("tok0".to_string()),
            token_index: Some(0),
            timestamp: Some(1000),
        }
    }

    #[test]
    fn test_request_converts_to_new_token() {
        let session = SessionId::new();
        let token = request(&session.to_string()).into_new_token().unwrap();
        assert_eq!(token, NewToken::new(session, "tok0", 0, 1000));
    }

    #[test]
    fn test_request_rejects_malformed_session() {
        let err = request("abc").into_new_token().unwrap_err();
        assert!(matches!(err, ModelError::InvalidSessionId(_)));
    }

    #[test]
    fn test_request_reports_missing_fields() {
        let mut req = request(&SessionId::new().to_string());
        req.token_index = None;
        assert_eq!(req.into_new_token().unwrap_err(), ModelError::MissingField("token_index"));

        let req = SaveAnalysisRequest::default();
        assert_eq!(req.into_new_token().unwrap_err(), ModelError::MissingField("session_id"));
    }

    #[test]
    fn test_failed_response_has_no_id() {
        let resp = SaveAnalysisResponse::failed("connection refused");
        assert!(!resp.success);
        assert_eq!(resp.message, "Error: connection refused");
        let json = serde_json::to_value(&resp).unwrap();
        assert!(json.get("saved_id").is_none());
    }

    #[test]
    fn test_chunk_drops_created_at() {
        let token = AnalysisToken::from_new(7, NewToken::new(SessionId::new(), "x", 3, 42), Utc::now());
        let chunk = AnalysisChunk::from(&token);
        let json = serde_json::to_value(&chunk).unwrap();
        assert_eq!(json["id"], 7);
        assert_eq!(json["token_index"], 3);
        assert!(json.get("created_at").is_none());
    }
}
