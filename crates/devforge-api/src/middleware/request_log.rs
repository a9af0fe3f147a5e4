//! Access log middleware
//!
//! One line per request on the `api` target, plus the request counters
//! served by `/metrics`.
//!
//! Author: hephaex@gmail.com

use crate::audit::ClientInfo;
use crate::auth::AuthenticatedUserId;
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use std::time::Instant;

/// Access log middleware
///
/// Logs method, path, normalized endpoint, status, duration, client address
/// and the authenticated user. Responses with status 400 and above are
/// logged at warn.
pub async fn request_log(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let endpoint = normalize_endpoint(&path);
    let client = ClientInfo::from_request(&request);

    state.increment_requests();
    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;
    let user_id = response
        .extensions()
        .get::<AuthenticatedUserId>()
        .map(|id| id.0.to_string())
        .unwrap_or_else(|| "-".to_string());

    if status >= 400 {
        state.increment_errors();
        tracing::warn!(
            target: "api",
            method = %method,
            path = %path,
            endpoint = %endpoint,
            status,
            duration_ms,
            client = client.client_key(),
            user_id = %user_id,
            "request failed"
        );
    } else {
        tracing::info!(
            target: "api",
            method = %method,
            path = %path,
            endpoint = %endpoint,
            status,
            duration_ms,
            client = client.client_key(),
            user_id = %user_id,
            "request completed"
        );
    }

    response
}

/// Normalize endpoint paths for the access log
///
/// Replaces UUID/ID segments with placeholders to group similar endpoints
pub fn normalize_endpoint(path: &str) -> String {
    path.split('/')
        .map(|seg| if is_uuid(seg) || is_numeric(seg) { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}

/// Check if a string looks like a UUID
fn is_uuid(s: &str) -> bool {
    s.len() == 36
        && s.chars().enumerate().all(|(i, c)| match i {
            8 | 13 | 18 | 23 => c == '-',
            _ => c.is_ascii_hexdigit(),
        })
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}
