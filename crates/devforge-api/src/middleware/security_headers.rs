//! Security headers middleware
//!
//! Stamps every response, errors included, with a fixed set of hardening
//! headers. The content security policy admits same-origin resources, the
//! Google font hosts, inline styles, and `ws:`/`wss:` connections for the
//! realtime gateway.
//!
//! Author: hephaex@gmail.com

use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

pub const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
     style-src 'self' 'unsafe-inline' https://fonts.googleapis.com; \
     font-src 'self' https://fonts.gstatic.com; \
     script-src 'self'; \
     img-src 'self' data: https:; \
     connect-src 'self' ws: wss:; \
     object-src 'none'; \
     frame-ancestors 'self'; \
     base-uri 'self'; \
     form-action 'self'";

const SECURITY_HEADERS: &[(&str, &str)] = &[
    ("content-security-policy", CONTENT_SECURITY_POLICY),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-dns-prefetch-control", "off"),
    // The legacy XSS auditor is itself exploitable; switch it off
    ("x-xss-protection", "0"),
    ("strict-transport-security", "max-age=15552000; includeSubDomains"),
    ("referrer-policy", "no-referrer"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
    ("origin-agent-cluster", "?1"),
    ("x-permitted-cross-domain-policies", "none"),
];

/// Add the hardening headers to the response
///
/// Headers a handler already set are left alone.
pub async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    for &(name, value) in SECURITY_HEADERS {
        if !headers.contains_key(name) {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
        middleware,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/ok", get(|| async { "ok" }))
            .route(
                "/fail",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "error") }),
            )
            .route(
                "/framed",
                get(|| async { ([(header::X_FRAME_OPTIONS, "DENY")], "framed").into_response() }),
            )
            .layer(middleware::from_fn(security_headers))
    }

    async fn get_headers(path: &str) -> (StatusCode, axum::http::HeaderMap) {
        let response = app()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        (response.status(), response.headers().clone())
    }

    #[tokio::test]
    async fn test_headers_present() {
        let (status, headers) = get_headers("/ok").await;
        assert_eq!(status, StatusCode::OK);

        for &(name, value) in SECURITY_HEADERS {
            assert_eq!(headers.get(name).unwrap(), value, "header {name}");
        }
        let csp = headers
            .get(header::CONTENT_SECURITY_POLICY)
            .unwrap()
            .to_str()
            .unwrap();
        assert!(csp.contains("connect-src 'self' ws: wss:"));
    }

    #[tokio::test]
    async fn test_headers_on_error_response() {
        let (status, headers) = get_headers("/fail").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(headers.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
    }

    #[tokio::test]
    async fn test_handler_header_wins() {
        let (_, headers) = get_headers("/framed").await;
        assert_eq!(headers.get(header::X_FRAME_OPTIONS).unwrap(), "DENY");
    }
}
