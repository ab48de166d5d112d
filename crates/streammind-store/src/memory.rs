//! In-memory token store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use streammind_models::{AnalysisToken, NewToken, SessionId};

use crate::error::StoreResult;
use crate::metrics::record_operation;
use crate::store::TokenStore;

const BACKEND: &str = "memory";

/// Token store holding each session's log in a vector kept sorted by
/// `token_index`.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    sessions: RwLock<HashMap<SessionId, Vec<AnalysisToken>>>,
    last_id: AtomicI64,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions that currently hold tokens.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Index of the first token with `token_index >= min_index`.
fn lower_bound(log: &[AnalysisToken], min_index: i32) -> usize {
    log.partition_point(|t| t.token_index < min_index)
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn append(&self, token: NewToken) -> StoreResult<AnalysisToken> {
        let started = Instant::now();
        let mut sessions = self.sessions.write().await;

        // Assigned under the write lock so ids follow commit order.
        let id = self.last_id.fetch_add(1, Ordering::AcqRel) + 1;
        let stored = AnalysisToken::from_new(id, token, Utc::now());

        let log = sessions.entry(stored.session_id).or_default();
        let position = log.partition_point(|t| t.token_index <= stored.token_index);
        log.insert(position, stored.clone());
        drop(sessions);

        debug!(
            session_id = %stored.session_id,
            token_index = stored.token_index,
            id = stored.id,
            "Saved analysis token"
        );
        record_operation(BACKEND, "append", true, started);
        Ok(stored)
    }

    async fn list_page(
        &self,
        session_id: &SessionId,
        min_index: i32,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<AnalysisToken>> {
        let started = Instant::now();
        let sessions = self.sessions.read().await;
        let page = sessions
            .get(session_id)
            .map(|log| {
                log[lower_bound(log, min_index)..]
                    .iter()
                    .skip(skip)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        record_operation(BACKEND, "list_page", true, started);
        Ok(page)
    }

    async fn list_from(&self, session_id: &SessionId, min_index: i32) -> StoreResult<Vec<AnalysisToken>> {
        let started = Instant::now();
        let sessions = self.sessions.read().await;
        let tokens = sessions
            .get(session_id)
            .map(|log| log[lower_bound(log, min_index)..].to_vec())
            .unwrap_or_default();
        record_operation(BACKEND, "list", true, started);
        Ok(tokens)
    }

    async fn count(&self, session_id: &SessionId) -> StoreResult<u64> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).map(|log| log.len() as u64).unwrap_or(0))
    }

    async fn purge(&self, session_id: &SessionId) -> StoreResult<u64> {
        let started = Instant::now();
        let removed = self
            .sessions
            .write()
            .await
            .remove(session_id)
            .map(|log| log.len() as u64)
            .unwrap_or(0);
        info!(session_id = %session_id, removed, "Deleted all analysis records for session");
        record_operation(BACKEND, "purge", true, started);
        Ok(removed)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
