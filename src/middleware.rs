use crate::cache::TtlCache;
use crate::coalescer::RequestCoalescer;
use crate::config::Config;
use crate::error::{ResilienceError, Result};
use crate::policy::ResiliencePolicy;
use crate::rate_limiter::WindowRateLimiter;
use crate::response::BufferedResponse;
use crate::tracker::PercentileTracker;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderValue, Method};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use regex::Regex;
use std::net::SocketAddr;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Numeric or UUID-shaped path segments collapse to `:id` so per-entity
/// URLs share one endpoint key.
static IDENTIFIER_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12})$")
        .unwrap()
});

/// Shared instances of every resilience component, injected into the
/// middleware rather than living as module globals. Each map is owned
/// exclusively by its component; composition happens only here.
#[derive(Clone)]
pub struct ResilienceState {
    pub tracker: Arc<PercentileTracker>,
    pub cache: Arc<TtlCache<BufferedResponse>>,
    pub coalescer: Arc<RequestCoalescer<InnerOutcome>>,
    pub limiter: Arc<WindowRateLimiter>,
}

impl ResilienceState {
    pub fn new(config: &Config) -> Self {
        Self {
            tracker: Arc::new(PercentileTracker::new(config.tracker_capacity)),
            cache: Arc::new(TtlCache::new()),
            coalescer: Arc::new(RequestCoalescer::new()),
            limiter: Arc::new(WindowRateLimiter::new(
                config.rate_limit_max_requests,
                config.rate_limit_window(),
            )),
        }
    }
}

impl Default for ResilienceState {
    fn default() -> Self {
        Self {
            tracker: Arc::new(PercentileTracker::default()),
            cache: Arc::new(TtlCache::new()),
            coalescer: Arc::new(RequestCoalescer::new()),
            limiter: Arc::new(WindowRateLimiter::new(60, std::time::Duration::from_secs(60))),
        }
    }
}

/// How the cache participated in producing a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit { age_secs: u64 },
    Miss,
    /// Policy class is dynamic; the cache was not consulted.
    Bypass,
}

/// Result of one actual execution of the inner pipeline. Cloneable so
/// coalesced waiters all observe the same outcome, including the elapsed
/// time of the single shared execution.
#[derive(Debug, Clone)]
pub struct InnerOutcome {
    pub response: BufferedResponse,
    pub elapsed_ms: f64,
    pub cache: CacheStatus,
}

/// The resilience middleware: coalescing, caching, rate limiting and
/// latency tracking around the wrapped handler.
///
/// Wire per route with `axum::middleware::from_fn_with_state` and a
/// `(ResilienceState, ResiliencePolicy)` tuple.
pub async fn resilience_middleware(
    State((state, policy)): State<(ResilienceState, ResiliencePolicy)>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let endpoint = endpoint_key(method.as_str(), uri.path());
    let client_ip = client_ip(&request);

    let result = match &policy.deduplicate_key {
        Some(prefix) if method == Method::GET => {
            let flight_key = format!("{}:{}:{}", prefix, method, uri);
            let coalescer = Arc::clone(&state.coalescer);
            let state = state.clone();
            let policy = policy.clone();
            let endpoint = endpoint.clone();
            coalescer
                .coalesce(&flight_key, move || {
                    execute(state, policy, endpoint, client_ip, request, next)
                })
                .await
        }
        _ => {
            execute(
                state.clone(),
                policy.clone(),
                endpoint.clone(),
                client_ip,
                request,
                next,
            )
            .await
        }
    };

    match result {
        Ok(outcome) => {
            let mut response = outcome.response.clone().into_response();
            annotate_response(&mut response, &endpoint, &policy, &outcome);
            response
        }
        Err(err) => {
            if !matches!(err, ResilienceError::RateLimited { .. }) {
                warn!(
                    target: "resilience::middleware",
                    endpoint = %endpoint,
                    error = %err,
                    "resilience pipeline error"
                );
            }
            let mut response = err.into_response();
            set_header(&mut response, "X-Response-Endpoint", &endpoint);
            response
        }
    }
}

/// The inner pipeline: cache lookup, rate limit check, handler
/// invocation, response buffering, cache store. Runs exactly once per
/// coalesced group; elapsed time covers the whole pipeline and is
/// recorded into the tracker on every exit path, rejections and handler
/// failures included.
async fn execute(
    state: ResilienceState,
    policy: ResiliencePolicy,
    endpoint: String,
    client_ip: String,
    request: Request,
    next: Next,
) -> Result<InnerOutcome> {
    let started = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let cacheable = policy.cache.cacheable() && method == Method::GET;
    let cache_key = format!("{} {}", method, uri);

    if cacheable {
        if let Some(hit) = state.cache.get(&cache_key) {
            let elapsed_ms = elapsed_ms(started);
            track(&state, &endpoint, elapsed_ms);
            debug!(
                target: "resilience::cache",
                endpoint = %endpoint,
                age_secs = hit.age.as_secs(),
                "cache hit"
            );
            return Ok(InnerOutcome {
                response: hit.value,
                elapsed_ms,
                cache: CacheStatus::Hit {
                    age_secs: hit.age.as_secs(),
                },
            });
        }
    }

    if let Some((max_requests, window)) = policy.rate_limit() {
        let limit_key = format!("{}:{}", client_ip, endpoint);
        match state.limiter.check_with(&limit_key, max_requests, window) {
            Ok(decision) if !decision.allowed => {
                let elapsed_ms = elapsed_ms(started);
                track(&state, &endpoint, elapsed_ms);
                info!(
                    target: "resilience::rate_limit",
                    endpoint = %endpoint,
                    client_ip = %client_ip,
                    "request rejected by rate limit"
                );
                return Err(ResilienceError::RateLimited {
                    retry_after_secs: decision.retry_after_secs(),
                    reset_at_secs: decision.reset_at_secs(),
                });
            }
            Ok(_) => {}
            // Fail open: a broken limiter never blocks traffic.
            Err(err) => {
                warn!(
                    target: "resilience::rate_limit",
                    endpoint = %endpoint,
                    error = %err,
                    "rate limit check failed, allowing request"
                );
            }
        }
    }

    let response = next.run(request).await;
    let elapsed_ms = elapsed_ms(started);
    track(&state, &endpoint, elapsed_ms);

    let buffered = BufferedResponse::from_response(response).await?;

    if cacheable && buffered.is_success() {
        if let Some(ttl) = policy.effective_ttl() {
            state.cache.put(&cache_key, buffered.clone(), ttl);
        }
    }

    Ok(InnerOutcome {
        response: buffered,
        elapsed_ms,
        cache: if cacheable {
            CacheStatus::Miss
        } else {
            CacheStatus::Bypass
        },
    })
}

/// Recording failures must not fail the request.
fn track(state: &ResilienceState, endpoint: &str, elapsed_ms: f64) {
    if let Err(err) = state.tracker.track(endpoint, elapsed_ms) {
        warn!(
            target: "resilience::tracker",
            endpoint = %endpoint,
            error = %err,
            "failed to record timing sample"
        );
    }
}

fn annotate_response(
    response: &mut Response,
    endpoint: &str,
    policy: &ResiliencePolicy,
    outcome: &InnerOutcome,
) {
    set_header(response, "X-Response-Time", &format!("{:.2}", outcome.elapsed_ms));
    set_header(response, "X-Response-Endpoint", endpoint);

    match outcome.cache {
        CacheStatus::Hit { age_secs } => {
            set_header(response, "X-Cache", "HIT");
            set_header(response, "X-Cache-Age", &age_secs.to_string());
        }
        CacheStatus::Miss => set_header(response, "X-Cache", "MISS"),
        CacheStatus::Bypass => {}
    }

    set_header(response, "Cache-Control", policy.cache.cache_control());
    set_header(response, "CDN-Cache-Control", policy.cache.cdn_cache_control());
}

/// Header values here are always ASCII; a value that fails to parse is
/// dropped rather than failing the response.
fn set_header(response: &mut Response, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
}

/// `"METHOD /normalized/path"`, the key used for tracking and reporting.
pub fn endpoint_key(method: &str, path: &str) -> String {
    format!("{} {}", method, normalize_path(path))
}

/// Collapse identifier path segments so `/api/bookings/42` and
/// `/api/bookings/57` report as one endpoint.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if IDENTIFIER_SEGMENT.is_match(segment) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Client identity for rate limiting: proxy headers first, then the
/// connection address.
pub fn client_ip(request: &Request) -> String {
    let headers = request.headers();

    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|forwarded| forwarded.split(',').next())
        .map(|ip| ip.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(|ip| ip.to_string())
        })
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Request lifecycle logging with a per-request id.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = client_ip(&request);

    info!(
        target: "resilience::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "incoming request"
    );

    let started = Instant::now();
    let mut response = next.run(request).await;

    info!(
        target: "resilience::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status(),
        elapsed_ms = format!("{:.2}", elapsed_ms(started)),
        "request completed"
    );

    set_header(&mut response, "X-Request-Id", &request_id.to_string());
    response
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::HeaderValue;

    #[test]
    fn normalize_collapses_numeric_segments() {
        assert_eq!(normalize_path("/api/bookings/42"), "/api/bookings/:id");
        assert_eq!(
            normalize_path("/api/users/7/invoices/1234"),
            "/api/users/:id/invoices/:id"
        );
        assert_eq!(normalize_path("/api/bookings"), "/api/bookings");
    }

    #[test]
    fn normalize_collapses_uuid_segments() {
        assert_eq!(
            normalize_path("/api/invoices/7f9c24e5-2e13-4b41-9d5a-8f1f2c4c0a3b"),
            "/api/invoices/:id"
        );
    }

    #[test]
    fn normalize_keeps_named_segments() {
        assert_eq!(normalize_path("/api/v2/export"), "/api/v2/export");
        assert_eq!(normalize_path("/api/bookings/search"), "/api/bookings/search");
    }

    #[test]
    fn endpoint_key_includes_method() {
        assert_eq!(endpoint_key("GET", "/api/bookings/9"), "GET /api/bookings/:id");
    }

    #[test]
    fn client_ip_prefers_forwarded_header() {
        let mut request = Request::new(Body::empty());
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );

        assert_eq!(client_ip(&request), "192.168.1.1");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut request = Request::new(Body::empty());
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        assert_eq!(client_ip(&request), "203.0.113.1");
    }

    #[test]
    fn client_ip_unknown_without_sources() {
        let request = Request::new(Body::empty());
        assert_eq!(client_ip(&request), "unknown");
    }
}
