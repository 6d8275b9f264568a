//! API Middleware (Rate Limiting, Logging)

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::handlers::AppState;
use super::types::{ApiError, ApiResponse};

/// Rate limiter configuration
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests per window
    pub requests_per_window: u32,
    /// Window duration
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
        }
    }
}

/// Outcome of one rate-limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    /// Requests left in the current window after this one
    pub remaining: u32,
    /// Seconds until the window resets
    pub reset_secs: u64,
}

/// Fixed-window rate limiter keyed by API key or client address
pub struct RateLimiter {
    /// Client key -> (requests in window, window start)
    windows: DashMap<String, (u32, Instant)>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            config,
        }
    }

    /// Count one request against `key`'s window
    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let window = self.config.window_duration;
        let limit = self.config.requests_per_window;

        let mut slot = self.windows.entry(key.to_string()).or_insert((0, now));
        let (count, started) = slot.value_mut();
        if now.duration_since(*started) > window {
            *count = 0;
            *started = now;
        }
        let reset_secs = window.saturating_sub(now.duration_since(*started)).as_secs();

        if *count >= limit {
            return RateDecision {
                allowed: false,
                remaining: 0,
                reset_secs,
            };
        }
        *count += 1;
        RateDecision {
            allowed: true,
            remaining: limit - *count,
            reset_secs,
        }
    }

    /// Drop clients idle for two windows, returning how many were removed
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows
            .retain(|_, (_, started)| now.duration_since(*started) < self.config.window_duration * 2);
        before - self.windows.len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

/// Periodically prune the rate limiter
pub fn start_cleanup_task(limiter: Arc<RateLimiter>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let removed = limiter.cleanup();
            if removed > 0 {
                debug!("🧹 Rate limiter cleanup: {} idle clients removed", removed);
            }
        }
    });
}

fn is_health_path(path: &str) -> bool {
    path == "/health" || path == "/v1/health"
}

fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|s| format!("key:{}", s))
        .unwrap_or_else(|| {
            let ip = headers
                .get("x-forwarded-for")
                .or_else(|| headers.get("x-real-ip"))
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .unwrap_or("unknown")
                .trim();
            format!("ip:{}", ip)
        })
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if is_health_path(request.uri().path()) {
        return next.run(request).await;
    }

    let rate_key = client_key(&headers);
    let decision = state.rate_limiter.check(&rate_key);

    if !decision.allowed {
        warn!(key = %rate_key, reset_secs = decision.reset_secs, "🚦 Rate limit exceeded");
        let body = Json(ApiResponse::error(ApiError::rate_limited(decision.reset_secs), 0.0));
        let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
        response.headers_mut().insert("retry-after", decision.reset_secs.into());
        return response;
    }

    let mut response = next.run(request).await;
    let out = response.headers_mut();
    out.insert("x-ratelimit-remaining", decision.remaining.into());
    out.insert("x-ratelimit-reset", decision.reset_secs.into());
    response
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "Request completed"
    );

    response
}
