//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::handlers::{
    analysis_report, count_analysis, drain_queue, health, list_analysis, purge_analysis, queue_status, ready,
    save_analysis, session_connected, session_disconnected, stream_analysis, submit_job, upload_video,
};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit, redact_internal_errors, request_logging, security_headers, ClientRateLimit,
};
use crate::state::AppState;
use crate::ws::ws_analysis;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let video_routes = Router::new()
        .route("/videos/:session_id/upload", post(upload_video))
        .route("/videos/queue/status", get(queue_status));

    let session_routes = Router::new()
        .route("/sessions/:session_id/analysis", get(list_analysis).delete(purge_analysis))
        .route("/sessions/:session_id/analysis/count", get(count_analysis))
        .route("/sessions/:session_id/report", get(analysis_report));

    let client_limit = ClientRateLimit::new(state.config.rate_limit_rps, state.config.rate_limit_burst);

    let api_routes = Router::new()
        .merge(video_routes)
        .merge(session_routes)
        .layer(middleware::from_fn_with_state(client_limit.clone(), rate_limit));

    // Service-to-service routes: the analysis producer and signaling service.
    let internal_routes = Router::new()
        .route("/analysis", post(save_analysis))
        .route("/analysis/:session_id/stream", get(stream_analysis))
        .route("/jobs", post(submit_job))
        .route("/session/connected", post(session_connected))
        .route("/session/disconnected", post(session_disconnected))
        .route("/health", get(health));

    let admin_routes = Router::new().route("/admin/queue", delete(drain_queue));

    let ws_routes = Router::new()
        .route("/ws/analysis/:session_id", get(ws_analysis))
        .layer(middleware::from_fn_with_state(client_limit, rate_limit));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    let mut router = Router::new()
        .nest("/api", api_routes)
        .nest("/internal", internal_routes)
        .merge(admin_routes)
        .merge(ws_routes)
        .merge(health_routes)
        .merge(metrics_routes);

    if state.config.is_production() {
        router = router.layer(middleware::from_fn(redact_internal_errors));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_logging))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
