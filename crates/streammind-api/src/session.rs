//! Session existence checks.
//!
//! Session bookkeeping lives in the signaling service; the API only asks
//! whether an id may receive uploads.

use std::collections::HashSet;

use async_trait::async_trait;

use streammind_models::SessionId;

#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn exists(&self, session_id: &SessionId) -> bool;
}

/// Accepts every well-formed session id.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSessionDirectory;

#[async_trait]
impl SessionDirectory for OpenSessionDirectory {
    async fn exists(&self, _session_id: &SessionId) -> bool {
        true
    }
}

/// Accepts a fixed set of sessions.
#[derive(Debug, Clone, Default)]
pub struct StaticSessionDirectory {
    sessions: HashSet<SessionId>,
}

impl StaticSessionDirectory {
    pub fn new(sessions: impl IntoIterator<Item = SessionId>) -> Self {
        Self {
            sessions: sessions.into_iter().collect(),
        }
    }
}

#[async_trait]
impl SessionDirectory for StaticSessionDirectory {
    async fn exists(&self, session_id: &SessionId) -> bool {
        self.sessions.contains(session_id)
    }
}
