//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;
use uuid::Uuid;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "streammind_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "streammind_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "streammind_http_requests_in_flight";

    // WebSocket metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "streammind_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "streammind_ws_connections_active";
    pub const WS_MESSAGES_SENT: &str = "streammind_ws_messages_sent_total";
    pub const WS_MESSAGES_RECEIVED: &str = "streammind_ws_messages_received_total";

    // Ingestion and fan-out
    pub const TOKENS_INGESTED_TOTAL: &str = "streammind_tokens_ingested_total";
    pub const INGEST_FAILURES_TOTAL: &str = "streammind_ingest_failures_total";
    pub const FANOUT_DELIVERED_TOTAL: &str = "streammind_fanout_delivered_total";
    pub const FANOUT_EVICTED_TOTAL: &str = "streammind_fanout_evicted_total";
    pub const LIVE_SUBSCRIBERS: &str = "streammind_live_subscribers";
    pub const REPLAY_STREAMS_TOTAL: &str = "streammind_replay_streams_total";

    // Job submission metrics
    pub const JOBS_ENQUEUED_TOTAL: &str = "streammind_jobs_enqueued_total";
    pub const UPLOAD_BYTES_TOTAL: &str = "streammind_upload_bytes_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "streammind_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn record_ws_connection(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_CONNECTIONS_TOTAL, &labels).increment(1);
}

pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

pub fn record_ws_message_sent(endpoint: &str, message_type: &str) {
    let labels = [
        ("endpoint", endpoint.to_string()),
        ("type", message_type.to_string()),
    ];
    counter!(names::WS_MESSAGES_SENT, &labels).increment(1);
}

pub fn record_ws_message_received(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::WS_MESSAGES_RECEIVED, &labels).increment(1);
}

pub fn record_token_ingested() {
    counter!(names::TOKENS_INGESTED_TOTAL).increment(1);
}

pub fn record_ingest_failure(reason: &'static str) {
    counter!(names::INGEST_FAILURES_TOTAL, "reason" => reason).increment(1);
}

/// Record the outcome of one publish call.
pub fn record_fanout(delivered: usize, evicted: usize) {
    counter!(names::FANOUT_DELIVERED_TOTAL).increment(delivered as u64);
    if evicted > 0 {
        counter!(names::FANOUT_EVICTED_TOTAL).increment(evicted as u64);
    }
}

pub fn set_live_subscribers(count: usize) {
    gauge!(names::LIVE_SUBSCRIBERS).set(count as f64);
}

pub fn record_replay_stream() {
    counter!(names::REPLAY_STREAMS_TOTAL).increment(1);
}

/// Record job enqueued, labelled by the path that submitted it.
pub fn record_job_enqueued(source: &'static str) {
    counter!(names::JOBS_ENQUEUED_TOTAL, "source" => source).increment(1);
}

pub fn record_upload_bytes(bytes: u64) {
    counter!(names::UPLOAD_BYTES_TOTAL).increment(bytes);
}

pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", endpoint.to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Sanitize path for metrics labels: session ids and numeric ids become
/// placeholders so label cardinality stays bounded.
fn sanitize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if Uuid::parse_str(segment).is_ok() {
                ":id"
            } else if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ":n"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/sessions/550e8400-e29b-41d4-a716-446655440000/report"),
            "/api/sessions/:id/report"
        );
        assert_eq!(sanitize_path("/api/videos/queue/status"), "/api/videos/queue/status");
        assert_eq!(sanitize_path("/items/42"), "/items/:n");
    }
}
