//! Analysis token ingestion, replay and history handlers.

use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use streammind_models::{
    render_markdown_report, AnalysisChunk, AnalysisToken, SaveAnalysisRequest, SaveAnalysisResponse, SessionId,
};
use streammind_store::{replay_stream, StoreResult};

use crate::error::ApiResult;
use crate::ingest::ingest_token;
use crate::metrics;
use crate::state::AppState;

const NDJSON: &str = "application/x-ndjson";
const DEFAULT_PAGE_LIMIT: usize = 100;

/// Resolve an optional resume index. Absent or non-positive means the whole
/// log, including producers that count from negative indexes.
fn resume_index(from: Option<i32>) -> i32 {
    match from {
        Some(index) if index > 0 => index,
        _ => i32::MIN,
    }
}

/// `POST /internal/analysis` - called by the analysis service once per token.
pub async fn save_analysis(
    State(state): State<AppState>,
    payload: Result<Json<SaveAnalysisRequest>, JsonRejection>,
) -> (StatusCode, Json<SaveAnalysisResponse>) {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            metrics::record_ingest_failure("malformed");
            return (StatusCode::BAD_REQUEST, Json(SaveAnalysisResponse::failed(rejection.body_text())));
        }
    };

    let token = match request.into_new_token() {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "Rejected malformed analysis token");
            metrics::record_ingest_failure("malformed");
            return (StatusCode::BAD_REQUEST, Json(SaveAnalysisResponse::failed(e)));
        }
    };

    match ingest_token(state.store.as_ref(), &state.hub, token).await {
        Ok((stored, _)) => (StatusCode::OK, Json(SaveAnalysisResponse::saved(stored.id))),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, Json(SaveAnalysisResponse::failed(e))),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ReplayQuery {
    pub from: Option<i32>,
}

/// `GET /internal/analysis/:session_id/stream?from=N`
///
/// Streams stored tokens as NDJSON, one page of reads at a time. A read
/// failure aborts the response body; lines already sent stay valid.
pub async fn stream_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ReplayQuery>,
) -> ApiResult<Response> {
    let session_id = SessionId::parse(&session_id)?;
    let from = resume_index(query.from);
    metrics::record_replay_stream();
    info!(session_id = %session_id, from = query.from, "Replaying analysis tokens");

    let lines = replay_stream(state.store.clone(), session_id, from, state.config.replay_batch_size).map(
        move |item| -> StoreResult<Bytes> {
            let token = item.inspect_err(|e| {
                warn!(session_id = %session_id, error = %e, "Replay read failed, aborting stream");
            })?;
            let mut line = serde_json::to_vec(&AnalysisChunk::from(token))?;
            line.push(b'\n');
            Ok(Bytes::from(line))
        },
    );

    Ok(([(header::CONTENT_TYPE, NDJSON)], Body::from_stream(lines)).into_response())
}

#[derive(Debug, Deserialize, Validate)]
pub struct ListQuery {
    pub from: Option<i32>,
    #[serde(default)]
    pub offset: usize,
    #[validate(range(min = 1, max = 1000))]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AnalysisPage {
    pub session_id: SessionId,
    pub tokens: Vec<AnalysisToken>,
    pub total: u64,
}

/// `GET /api/sessions/:session_id/analysis`
pub async fn list_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<AnalysisPage>> {
    query.validate()?;
    let session_id = SessionId::parse(&session_id)?;
    let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT);

    let tokens = state
        .store
        .list_page(&session_id, resume_index(query.from), query.offset, limit)
        .await?;
    let total = state.store.count(&session_id).await?;

    Ok(Json(AnalysisPage {
        session_id,
        tokens,
        total,
    }))
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub session_id: SessionId,
    pub count: u64,
}

/// `GET /api/sessions/:session_id/analysis/count`
pub async fn count_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<CountResponse>> {
    let session_id = SessionId::parse(&session_id)?;
    let count = state.store.count(&session_id).await?;
    Ok(Json(CountResponse { session_id, count }))
}

/// `GET /api/sessions/:session_id/report` - Markdown rendering of the log.
pub async fn analysis_report(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Response> {
    let session_id = SessionId::parse(&session_id)?;
    let tokens = state.store.list(&session_id).await?;
    let report = render_markdown_report(&session_id, &tokens);
    Ok(([(header::CONTENT_TYPE, "text/markdown; charset=utf-8")], report).into_response())
}

#[derive(Debug, Serialize)]
pub struct PurgeResponse {
    pub session_id: SessionId,
    pub removed: u64,
}

/// `DELETE /api/sessions/:session_id/analysis`
pub async fn purge_analysis(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<PurgeResponse>> {
    let session_id = SessionId::parse(&session_id)?;
    let removed = state.store.purge(&session_id).await?;
    Ok(Json(PurgeResponse { session_id, removed }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resume_index() {
        assert_eq!(resume_index(None), i32::MIN);
        assert_eq!(resume_index(Some(0)), i32::MIN);
        assert_eq!(resume_index(Some(-3)), i32::MIN);
        assert_eq!(resume_index(Some(7)), 7);
    }

    #[test]
    fn test_list_query_limit_bounds() {
        let query = ListQuery {
            from: None,
            offset: 0,
            limit: Some(5000),
        };
        assert!(query.validate().is_err());

        let query = ListQuery {
            from: None,
            offset: 0,
            limit: Some(50),
        };
        assert!(query.validate().is_ok());
    }
}
