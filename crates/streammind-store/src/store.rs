//! The token store seam.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use streammind_models::{AnalysisToken, NewToken, SessionId};

use crate::config::{StoreBackend, StoreConfig};
use crate::error::StoreResult;
use crate::memory::MemoryTokenStore;
use crate::redis_store::RedisTokenStore;

/// Ordered, per-session append log of analysis tokens.
///
/// Listing order is `token_index` ascending; tokens sharing an index keep
/// the order in which they were appended. The store does not deduplicate
/// indexes, that is the producer's contract.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn backend(&self) -> &'static str;

    /// Persist a token, assigning its id and creation time. Either the whole
    /// record becomes visible to readers or nothing does.
    async fn append(&self, token: NewToken) -> StoreResult<AnalysisToken>;

    /// Tokens with `token_index >= min_index`, skipping the first `skip` of
    /// them and returning at most `limit`.
    async fn list_page(
        &self,
        session_id: &SessionId,
        min_index: i32,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<AnalysisToken>>;

    /// Tokens with `token_index >= min_index`.
    async fn list_from(&self, session_id: &SessionId, min_index: i32) -> StoreResult<Vec<AnalysisToken>>;

    /// Every token of a session.
    async fn list(&self, session_id: &SessionId) -> StoreResult<Vec<AnalysisToken>> {
        self.list_from(session_id, i32::MIN).await
    }

    async fn count(&self, session_id: &SessionId) -> StoreResult<u64>;

    /// Delete every token of a session, returning how many were removed.
    async fn purge(&self, session_id: &SessionId) -> StoreResult<u64>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> StoreResult<()>;
}

/// Build the configured store.
pub async fn connect(config: &StoreConfig) -> StoreResult<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryTokenStore::new()),
        StoreBackend::Redis => Arc::new(RedisTokenStore::connect(config).await?),
    };
    info!(backend = store.backend(), "Token store ready");
    Ok(store)
}
