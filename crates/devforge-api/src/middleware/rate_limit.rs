//! Fixed-window rate limiting
//!
//! One counter per client address and request path, kept in the shared
//! key-value store so every server instance sees the same window.
//! The client address is the socket peer unless the router trusts a proxy
//! (see [`ClientInfo`]). When the store is unreachable requests are let through.
//!
//! Author: hephaex@gmail.com

use crate::audit::{security_log, ClientInfo, SecurityEvent};
use crate::error::AppError;
use crate::store::{KeyValueStore, StoreResult};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use devforge_core::RateLimitConfig;
use std::sync::Arc;

pub const HEADER_LIMIT: &str = "x-ratelimit-limit";
pub const HEADER_REMAINING: &str = "x-ratelimit-remaining";
pub const HEADER_RESET: &str = "x-ratelimit-reset";

/// Store key for one client on one path
pub fn rate_limit_key(client: &str, path: &str) -> String {
    format!("rate_limit:{client}:{path}")
}

/// Outcome of counting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limit: u64,
    /// Requests seen in the window, this one included
    pub count: u64,
    /// Unix seconds at which the window resets
    pub reset_at: u64,
}

impl RateLimitDecision {
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.count)
    }

    pub fn exceeded(&self) -> bool {
        self.count > self.limit
    }

    fn apply_headers(&self, headers: &mut HeaderMap) {
        let values = [
            (HEADER_LIMIT, self.limit),
            (HEADER_REMAINING, self.remaining()),
            (HEADER_RESET, self.reset_at),
        ];
        for (name, value) in values {
            headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
        }
    }
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    window_secs: u64,
    max_requests: u64,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, config: &RateLimitConfig) -> Self {
        Self::with_limits(store, config.window_secs(), config.max_requests)
    }

    pub fn with_limits(store: Arc<dyn KeyValueStore>, window_secs: u64, max_requests: u64) -> Self {
        Self {
            store,
            window_secs: window_secs.max(1),
            max_requests,
        }
    }

    pub fn window_secs(&self) -> u64 {
        self.window_secs
    }

    pub fn max_requests(&self) -> u64 {
        self.max_requests
    }

    /// Count a request from `client` on `path`
    ///
    /// Requests over the limit still increment the counter.
    pub async fn check(&self, client: &str, path: &str) -> StoreResult<RateLimitDecision> {
        let window = self
            .store
            .incr_window(&rate_limit_key(client, path), self.window_secs)
            .await?;

        Ok(RateLimitDecision {
            limit: self.max_requests,
            count: window.count,
            reset_at: unix_now_secs() + window.ttl_secs,
        })
    }
}

fn unix_now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

/// Rate limiting middleware
///
/// # Usage
///
/// ```ignore
/// Router::new()
///     .route("/login", post(login))
///     .route_layer(middleware::from_fn_with_state(limiter, rate_limit));
/// ```
pub async fn rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request,
    next: Next,
) -> Response {
    let client = ClientInfo::from_request(&request).client_key().to_string();
    let path = request.uri().path().to_string();

    let decision = match limiter.check(&client, &path).await {
        Ok(decision) => decision,
        Err(e) => {
            tracing::error!(client = %client, path = %path, error = %e, "Rate limiter unavailable, allowing request");
            return next.run(request).await;
        }
    };

    if decision.exceeded() {
        security_log(&SecurityEvent::RateLimitExceeded {
            client,
            path,
            count: decision.count,
            limit: decision.limit,
        });

        let mut response = AppError::rate_limited().into_response();
        decision.apply_headers(response.headers_mut());
        return response;
    }

    let mut response = next.run(request).await;
    decision.apply_headers(response.headers_mut());
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::audit::TrustedProxy;
    use axum::{
        body::Body,
        extract::ConnectInfo,
        http::{Request, StatusCode},
        middleware,
        routing::post,
        Extension, Router,
    };
    use std::net::{IpAddr, SocketAddr};
    use std::time::Duration;
    use tower::ServiceExt;

    fn limiter(store: Arc<MemoryStore>, max: u64) -> RateLimiter {
        RateLimiter::with_limits(store, 60, max)
    }

    fn app(limiter: RateLimiter) -> Router {
        Router::new()
            .route("/api/auth/login", post(|| async { "ok" }))
            .route("/api/auth/register", post(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(limiter, rate_limit))
    }

    fn post_from(path: &str, ip: &str) -> Request<Body> {
        let mut request = Request::builder()
            .method("POST")
            .uri(path)
            .body(Body::empty())
            .unwrap();
        let ip: IpAddr = ip.parse().unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::new(ip, 50000)));
        request
    }

    fn with_forwarded_for(mut request: Request<Body>, ip: &str) -> Request<Body> {
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_counts_and_resets() {
        let limiter = limiter(Arc::new(MemoryStore::new()), 2);

        let first = limiter.check("1.1.1.1", "/login").await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.remaining(), 1);
        assert!(!first.exceeded());

        limiter.check("1.1.1.1", "/login").await.unwrap();
        let third = limiter.check("1.1.1.1", "/login").await.unwrap();
        assert!(third.exceeded());
        assert_eq!(third.remaining(), 0);

        // Over-limit requests still consume capacity
        let fourth = limiter.check("1.1.1.1", "/login").await.unwrap();
        assert_eq!(fourth.count, 4);

        tokio::time::advance(Duration::from_secs(61)).await;
        let fresh = limiter.check("1.1.1.1", "/login").await.unwrap();
        assert_eq!(fresh.count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_header_tracks_window() {
        let limiter = limiter(Arc::new(MemoryStore::new()), 5);
        let before = unix_now_secs();
        let decision = limiter.check("c", "/p").await.unwrap();

        assert!(decision.reset_at >= before + 59);
        assert!(decision.reset_at <= unix_now_secs() + 60);
    }

    #[tokio::test]
    async fn test_counters_are_per_client_and_path() {
        let limiter = limiter(Arc::new(MemoryStore::new()), 1);

        assert!(!limiter.check("a", "/login").await.unwrap().exceeded());
        assert!(!limiter.check("b", "/login").await.unwrap().exceeded());
        assert!(!limiter.check("a", "/register").await.unwrap().exceeded());
        assert!(limiter.check("a", "/login").await.unwrap().exceeded());
    }

    #[tokio::test]
    async fn test_middleware_headers_and_429() {
        let app = app(limiter(Arc::new(MemoryStore::new()), 1));

        let ok = app
            .clone()
            .oneshot(post_from("/api/auth/login", "9.9.9.9"))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(ok.headers()[HEADER_LIMIT], "1");
        assert_eq!(ok.headers()[HEADER_REMAINING], "0");
        assert!(ok.headers().contains_key(HEADER_RESET));

        let limited = app
            .clone()
            .oneshot(post_from("/api/auth/login", "9.9.9.9"))
            .await
            .unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.headers()[HEADER_REMAINING], "0");

        let body = axum::body::to_bytes(limited.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "RATE_LIMIT_EXCEEDED");

        // A different client is unaffected
        let other = app
            .oneshot(post_from("/api/auth/login", "8.8.8.8"))
            .await
            .unwrap();
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_forwarded_header_cannot_reset_window() {
        let app = app(limiter(Arc::new(MemoryStore::new()), 2));

        let mut statuses = Vec::new();
        for i in 0..5 {
            let request = with_forwarded_for(
                post_from("/api/auth/login", "6.6.6.6"),
                &format!("10.0.0.{i}"),
            );
            statuses.push(app.clone().oneshot(request).await.unwrap().status());
        }

        assert_eq!(
            statuses,
            [
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::TOO_MANY_REQUESTS,
            ]
        );
    }

    #[tokio::test]
    async fn test_trusted_proxy_keys_on_forwarded_client() {
        let app = app(limiter(Arc::new(MemoryStore::new()), 1)).layer(Extension(TrustedProxy));

        // Same proxy peer, two different upstream clients
        for client in ["203.0.113.1", "203.0.113.2"] {
            let request = with_forwarded_for(post_from("/api/auth/login", "10.0.0.1"), client);
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }

        let request = with_forwarded_for(post_from("/api/auth/login", "10.0.0.1"), "203.0.113.1");
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_store_outage_fails_open() {
        let store = Arc::new(MemoryStore::new());
        store.set_unavailable(true);
        let app = app(limiter(store, 0));

        let response = app
            .oneshot(post_from("/api/auth/register", "7.7.7.7"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response.headers().contains_key(HEADER_LIMIT));
    }
}
