//! Redis-backed token store.
//!
//! Layout:
//! - `{prefix}:token:seq` - global id counter (INCR)
//! - `{prefix}:tokens:{session_id}` - sorted set, score = `token_index`,
//!   member = `{id:020}|{token json}`
//!
//! The zero-padded id prefix makes members with equal scores sort in append
//! order, since Redis breaks score ties lexicographically.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use streammind_models::{AnalysisToken, NewToken, SessionId};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::metrics::record_operation;
use crate::store::TokenStore;

const BACKEND: &str = "redis";

/// Token store persisting each session as a Redis sorted set.
pub struct RedisTokenStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    key_prefix: String,
}

impl RedisTokenStore {
    /// Open the client and verify connectivity.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        let store = Self {
            client,
            conn: Mutex::new(None),
            key_prefix: config.key_prefix.clone(),
        };
        store.ping().await?;
        info!(prefix = %store.key_prefix, "Connected Redis token store");
        Ok(store)
    }

    fn seq_key(&self) -> String {
        format!("{}:token:seq", self.key_prefix)
    }

    fn session_key(&self, session_id: &SessionId) -> String {
        format!("{}:tokens:{}", self.key_prefix, session_id)
    }

    async fn connection(&self) -> StoreResult<MultiplexedConnection> {
        let mut cached = self.conn.lock().await;
        if let Some(conn) = cached.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self.client.get_multiplexed_async_connection().await?;
        *cached = Some(conn.clone());
        Ok(conn)
    }

    /// Drop the cached connection after transport failures so the next call
    /// reconnects.
    async fn observe<T>(&self, operation: &'static str, started: Instant, result: StoreResult<T>) -> StoreResult<T> {
        let lost = match &result {
            Err(StoreError::Redis(e)) if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() => {
                warn!(operation, error = %e, "Redis connection lost, resetting");
                true
            }
            _ => false,
        };
        if lost {
            *self.conn.lock().await = None;
        }
        record_operation(BACKEND, operation, result.is_ok(), started);
        result
    }

    async fn append_inner(&self, token: NewToken) -> StoreResult<AnalysisToken> {
        let mut conn = self.connection().await?;
        let id: i64 = conn.incr(self.seq_key(), 1).await?;
        let stored = AnalysisToken::from_new(id, token, Utc::now());
        let member = encode_member(&stored)?;

        let _: i64 = conn
            .zadd(self.session_key(&stored.session_id), member, stored.token_index)
            .await?;
        Ok(stored)
    }

    async fn range(
        &self,
        session_id: &SessionId,
        min_index: i32,
        window: Option<(usize, usize)>,
    ) -> StoreResult<Vec<AnalysisToken>> {
        let mut conn = self.connection().await?;
        let key = self.session_key(session_id);
        let members: Vec<String> = match window {
            Some((skip, limit)) => {
                conn.zrangebyscore_limit(key, min_index, "+inf", skip as isize, limit as isize)
                    .await?
            }
            None => conn.zrangebyscore(key, min_index, "+inf").await?,
        };
        members.iter().map(|m| decode_member(m)).collect()
    }

    async fn purge_inner(&self, session_id: &SessionId) -> StoreResult<u64> {
        let mut conn = self.connection().await?;
        let key = self.session_key(session_id);
        let (removed,): (u64,) = redis::pipe()
            .atomic()
            .zcard(&key)
            .del(&key)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(removed)
    }
}

fn encode_member(token: &AnalysisToken) -> StoreResult<String> {
    Ok(format!("{:020}|{}", token.id, serde_json::to_string(token)?))
}

fn decode_member(member: &str) -> StoreResult<AnalysisToken> {
    let (_, json) = member
        .split_once('|')
        .ok_or_else(|| StoreError::corrupt(format!("missing id prefix in '{}'", member)))?;
    Ok(serde_json::from_str(json)?)
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    async fn append(&self, token: NewToken) -> StoreResult<AnalysisToken> {
        let started = Instant::now();
        let result = self.append_inner(token).await;
        if let Ok(stored) = &result {
            debug!(
                session_id = %stored.session_id,
                token_index = stored.token_index,
                id = stored.id,
                "Saved analysis token"
            );
        }
        self.observe("append", started, result).await
    }

    async fn list_page(
        &self,
        session_id: &SessionId,
        min_index: i32,
        skip: usize,
        limit: usize,
    ) -> StoreResult<Vec<AnalysisToken>> {
        let started = Instant::now();
        let result = self.range(session_id, min_index, Some((skip, limit))).await;
        self.observe("list_page", started, result).await
    }

    async fn list_from(&self, session_id: &SessionId, min_index: i32) -> StoreResult<Vec<AnalysisToken>> {
        let started = Instant::now();
        let result = self.range(session_id, min_index, None).await;
        self.observe("list", started, result).await
    }

    async fn count(&self, session_id: &SessionId) -> StoreResult<u64> {
        let started = Instant::now();
        let result: StoreResult<u64> = async {
            let mut conn = self.connection().await?;
            let count: u64 = conn.zcard(self.session_key(session_id)).await?;
            Ok(count)
        }
        .await;
        self.observe("count", started, result).await
    }

    async fn purge(&self, session_id: &SessionId) -> StoreResult<u64> {
        let started = Instant::now();
        let result = self.purge_inner(session_id).await;
        if let Ok(removed) = &result {
            info!(session_id = %session_id, removed, "Deleted all analysis records for session");
        }
        self.observe("purge", started, result).await
    }

    async fn ping(&self) -> StoreResult<()> {
        let started = Instant::now();
        let result: StoreResult<()> = async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        }
        .await;
        self.observe("ping", started, result).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_encoding_sorts_by_id() {
        let session = SessionId::new();
        let a = AnalysisToken::from_new(9, NewToken::new(session, "a", 1, 0), Utc::now());
        let b = AnalysisToken::from_new(10, NewToken::new(session, "b", 1, 0), Utc::now());
        let ma = encode_member(&a).unwrap();
        let mb = encode_member(&b).unwrap();
        assert!(ma < mb);
        assert_eq!(decode_member(&mb).unwrap(), b);
    }

    #[test]
    fn test_decode_rejects_unprefixed_member() {
        let err = decode_member("{\"id\":1}").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_content_with_separator_survives() {
        let token = AnalysisToken::from_new(1, NewToken::new(SessionId::new(), "a|b|c", 0, 0), Utc::now());
        let decoded = decode_member(&encode_member(&token).unwrap()).unwrap();
        assert_eq!(decoded.content, "a|b|c");
    }
}
