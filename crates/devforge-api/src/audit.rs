//! Security and audit logging
//!
//! Two event families, each routed to its own tracing target so they can be
//! filtered and shipped separately from application logs:
//!
//! - [`SecurityEvent`] on target `security`: authentication and authorization
//!   decisions. Failures log at WARN, successes at INFO.
//! - [`AuditEvent`] on target `audit`: account lifecycle events, all at INFO.
//!
//! Every line carries the event serialized as JSON in the `event` field.
//!
//! # Example
//!
//! ```ignore
//! use devforge_api::audit::{security_log, SecurityEvent};
//!
//! security_log(&SecurityEvent::AuthenticationFailed {
//!     reason: "Access token required".to_string(),
//!     path: "/api/auth/me".to_string(),
//!     ip_address: Some("192.168.1.1".to_string()),
//!     user_agent: None,
//! });
//! ```
//!
//! Author: hephaex@gmail.com

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, Extensions, HeaderMap, Request},
};
use devforge_core::Role;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::{info, warn};
use uuid::Uuid;

/// Authentication and authorization decisions
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SecurityEvent {
    AuthenticationFailed {
        reason: String,
        path: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    AuthenticationSuccess {
        user_id: Uuid,
        email: String,
        ip_address: Option<String>,
    },

    AuthorizationFailed {
        user_id: Uuid,
        user_role: Role,
        required_roles: Vec<Role>,
        resource: String,
        ip_address: Option<String>,
    },

    ProjectAccessDenied {
        user_id: Uuid,
        project_id: Uuid,
        ip_address: Option<String>,
    },

    /// Access token blacklisted by the logout companion
    UserLogout {
        user_id: Uuid,
        email: String,
        revoked_for_secs: u64,
        ip_address: Option<String>,
    },

    RateLimitExceeded {
        client: String,
        path: String,
        count: u64,
        limit: u64,
    },

    /// Token rejected at the realtime handshake
    SocketAuthenticationFailed {
        reason: String,
        ip_address: Option<String>,
    },
}

impl SecurityEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SecurityEvent::AuthenticationFailed { .. } => "authentication_failed",
            SecurityEvent::AuthenticationSuccess { .. } => "authentication_success",
            SecurityEvent::AuthorizationFailed { .. } => "authorization_failed",
            SecurityEvent::ProjectAccessDenied { .. } => "project_access_denied",
            SecurityEvent::UserLogout { .. } => "user_logout",
            SecurityEvent::RateLimitExceeded { .. } => "rate_limit_exceeded",
            SecurityEvent::SocketAuthenticationFailed { .. } => "socket_authentication_failed",
        }
    }

    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            SecurityEvent::AuthenticationSuccess { .. } | SecurityEvent::UserLogout { .. }
        )
    }
}

/// Account lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    UserRegistered {
        user_id: Uuid,
        email: String,
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    UserLogin {
        user_id: Uuid,
        email: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    /// `reason` is internal only; clients always see the same message
    LoginFailed {
        email: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    TokenRefreshed {
        user_id: Uuid,
        ip_address: Option<String>,
    },

    UserLoggedOut {
        user_id: Uuid,
        ip_address: Option<String>,
    },

    PasswordResetRequested {
        user_id: Uuid,
        email: String,
        /// One-time token; logged in place of sending an email
        reset_token: String,
        ip_address: Option<String>,
    },

    PasswordResetCompleted {
        user_id: Uuid,
        ip_address: Option<String>,
    },

    PasswordChanged {
        user_id: Uuid,
        ip_address: Option<String>,
    },

    VerificationTokenIssued {
        user_id: Uuid,
        email: String,
        verification_token: String,
    },

    EmailVerified {
        user_id: Uuid,
        email: String,
        ip_address: Option<String>,
    },

    VerificationEmailResent {
        user_id: Uuid,
        email: String,
        ip_address: Option<String>,
    },
}

impl AuditEvent {
    pub fn name(&self) -> &'static str {
        match self {
            AuditEvent::UserRegistered { .. } => "user_registered",
            AuditEvent::UserLogin { .. } => "user_login",
            AuditEvent::LoginFailed { .. } => "login_failed",
            AuditEvent::TokenRefreshed { .. } => "token_refreshed",
            AuditEvent::UserLoggedOut { .. } => "user_logged_out",
            AuditEvent::PasswordResetRequested { .. } => "password_reset_requested",
            AuditEvent::PasswordResetCompleted { .. } => "password_reset_completed",
            AuditEvent::PasswordChanged { .. } => "password_changed",
            AuditEvent::VerificationTokenIssued { .. } => "verification_token_issued",
            AuditEvent::EmailVerified { .. } => "email_verified",
            AuditEvent::VerificationEmailResent { .. } => "verification_email_resent",
        }
    }

    fn user_id(&self) -> Option<Uuid> {
        match self {
            AuditEvent::LoginFailed { .. } => None,
            AuditEvent::UserRegistered { user_id, .. }
            | AuditEvent::UserLogin { user_id, .. }
            | AuditEvent::TokenRefreshed { user_id, .. }
            | AuditEvent::UserLoggedOut { user_id, .. }
            | AuditEvent::PasswordResetRequested { user_id, .. }
            | AuditEvent::PasswordResetCompleted { user_id, .. }
            | AuditEvent::PasswordChanged { user_id, .. }
            | AuditEvent::VerificationTokenIssued { user_id, .. }
            | AuditEvent::EmailVerified { user_id, .. }
            | AuditEvent::VerificationEmailResent { user_id, .. } => Some(*user_id),
        }
    }
}

fn to_json<T: Serialize>(event: &T) -> String {
    serde_json::to_string(event)
        .unwrap_or_else(|e| format!("{{\"error\":\"Failed to serialize event: {e}\"}}"))
}

/// Log a security event on the `security` target
pub fn security_log(event: &SecurityEvent) {
    let event_json = to_json(event);
    let name = event.name();

    if event.is_failure() {
        warn!(target: "security", event_type = name, event = %event_json, "Security event");
    } else {
        info!(target: "security", event_type = name, event = %event_json, "Security event");
    }
}

/// Log an account lifecycle event on the `audit` target
pub fn audit_log(event: &AuditEvent) {
    let event_json = to_json(event);

    info!(
        target: "audit",
        event_type = event.name(),
        user_id = ?event.user_id(),
        event = %event_json,
        "Audit event"
    );
}

/// Extract IP address from request headers
///
/// Checks X-Forwarded-For (first hop) then X-Real-IP.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    if let Some(xff) = headers.get("x-forwarded-for") {
        if let Ok(xff_str) = xff.to_str() {
            if let Some(first_ip) = xff_str.split(',').next() {
                let first_ip = first_ip.trim();
                if !first_ip.is_empty() {
                    return Some(first_ip.to_string());
                }
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip") {
        if let Ok(ip_str) = real_ip.to_str() {
            return Some(ip_str.trim().to_string());
        }
    }

    None
}

/// Extract user agent from request headers
pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|ua| ua.to_str().ok())
        .map(|s| s.to_string())
}

/// Request extension marking forwarded headers as set by a trusted proxy
///
/// Inserted by the router only when `server.trust_proxy` is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustedProxy;

/// Client address and user agent of the current request
///
/// The address is the socket peer. `X-Forwarded-For` / `X-Real-IP` are
/// client-controlled, so they are read only when [`TrustedProxy`] is present.
/// The peer is only known when the server was started with connect info.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ClientInfo {
    pub fn new(headers: &HeaderMap, extensions: &Extensions) -> Self {
        let forwarded = extensions
            .get::<TrustedProxy>()
            .and_then(|_| extract_ip_address(headers));

        let ip_address = forwarded.or_else(|| {
            extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip().to_string())
        });

        Self {
            ip_address,
            user_agent: extract_user_agent(headers),
        }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::new(&parts.headers, &parts.extensions)
    }

    pub fn from_request<B>(request: &Request<B>) -> Self {
        Self::new(request.headers(), request.extensions())
    }

    /// Key used to bucket requests per client
    pub fn client_key(&self) -> &str {
        self.ip_address.as_deref().unwrap_or("unknown")
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientInfo
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
