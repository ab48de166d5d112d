//! API middleware.

use std::net::{IpAddr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderName, HeaderValue, Method, Request, Response};
use axum::middleware::Next;
use axum::response::IntoResponse;
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{debug, info, warn};

use crate::error::{redacted_response, ApiError, InternalErrorResponse};
use crate::metrics;

/// Tracked clients before idle entries are pruned.
const MAX_TRACKED_CLIENTS: usize = 10_000;

/// Per-client request budget for the consumer-facing routes.
#[derive(Clone)]
pub struct ClientRateLimit {
    limiter: Arc<DefaultKeyedRateLimiter<IpAddr>>,
}

impl ClientRateLimit {
    pub fn new(requests_per_second: u32, burst: u32) -> Self {
        let rate = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(burst).unwrap_or(rate);
        Self {
            limiter: Arc::new(RateLimiter::keyed(Quota::per_second(rate).allow_burst(burst))),
        }
    }

    /// Spend one request from the client's budget.
    pub fn check(&self, ip: IpAddr) -> bool {
        if self.limiter.len() > MAX_TRACKED_CLIENTS {
            self.limiter.retain_recent();
        }
        self.limiter.check_key(&ip).is_ok()
    }
}

/// Rate limit uploads, history reads and live subscriptions by client IP.
/// Requests whose origin cannot be determined pass through.
pub async fn rate_limit(
    State(limit): State<ClientRateLimit>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    if let Some(ip) = client_ip(&request) {
        if !limit.check(ip) {
            warn!(ip = %ip, path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limit_hit(request.uri().path());
            return ApiError::RateLimited.into_response();
        }
    }
    next.run(request).await
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket peer.
fn client_ip(request: &Request<Body>) -> Option<IpAddr> {
    header_str(request, "x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok())
        .or_else(|| header_str(request, "x-real-ip").and_then(|ip| ip.trim().parse().ok()))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
}

fn header_str<'a>(request: &'a Request<Body>, name: &str) -> Option<&'a str> {
    request.headers().get(name).and_then(|v| v.to_str().ok())
}

/// CORS for browser consumers of the history and live endpoints. No
/// credentials are involved, so a wildcard origin is allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(600));

    if origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

const SECURITY_HEADERS: [(&str, &str); 5] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("referrer-policy", "no-referrer"),
    ("cross-origin-resource-policy", "same-origin"),
    ("cache-control", "no-store"),
];

/// Security headers middleware. Token content is session data, so nothing is
/// cacheable.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response<Body> {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert(HeaderValue::from_static(value));
    }
    response
}

/// Replace the message of internal error responses with a generic one.
/// Installed only in production.
pub async fn redact_internal_errors(request: Request<Body>, next: Next) -> Response<Body> {
    let response = next.run(request).await;
    if response.extensions().get::<InternalErrorResponse>().is_some() {
        return redacted_response(response.status());
    }
    response
}

/// How loudly a request is logged on completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RouteClass {
    /// Health checks and scrapes: not logged.
    Monitoring,
    /// One call per analysis token: debug level.
    TokenIngest,
    Other,
}

impl RouteClass {
    fn of(method: &Method, path: &str) -> Self {
        match path {
            "/health" | "/healthz" | "/ready" | "/metrics" | "/internal/health" => RouteClass::Monitoring,
            "/internal/analysis" if method == Method::POST => RouteClass::TokenIngest,
            _ => RouteClass::Other,
        }
    }
}

/// Request logging middleware. Server errors are always logged at warn.
pub async fn request_logging(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let class = RouteClass::of(&method, uri.path());
    let request_id = header_str(&request, "x-request-id").unwrap_or("-").to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let duration_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        warn!(%method, %uri, %status, duration_ms, %request_id, "Request failed");
    } else {
        match class {
            RouteClass::Monitoring => {}
            RouteClass::TokenIngest => debug!(%status, duration_ms, %request_id, "Token ingest completed"),
            RouteClass::Other => info!(%method, %uri, %status, duration_ms, %request_id, "Request completed"),
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_blocks_after_burst() {
        let limit = ClientRateLimit::new(1, 2);
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        assert!(limit.check(ip));
        assert!(limit.check(ip));
        assert!(!limit.check(ip));

        // Other clients have their own budget.
        assert!(limit.check("10.0.0.2".parse().unwrap()));
    }

    #[test]
    fn test_client_ip_sources() {
        let request = Request::builder()
            .header("X-Forwarded-For", "203.0.113.7, 10.0.0.1")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some("203.0.113.7".parse().unwrap()));

        let request = Request::builder()
            .header("X-Real-IP", "198.51.100.4")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), Some("198.51.100.4".parse().unwrap()));

        let mut request = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&request), None);
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        assert_eq!(client_ip(&request), Some("127.0.0.1".parse().unwrap()));
    }

    #[test]
    fn test_route_classes() {
        assert_eq!(RouteClass::of(&Method::GET, "/ready"), RouteClass::Monitoring);
        assert_eq!(RouteClass::of(&Method::POST, "/internal/analysis"), RouteClass::TokenIngest);
        assert_eq!(
            RouteClass::of(&Method::GET, "/internal/analysis/abc/stream"),
            RouteClass::Other
        );
    }
}
