//! API error handling
//!
//! Every failure leaving the server is rendered by [`AppError`] into
//! `{success: false, error: {code, message, details?}, timestamp}`.
//!
//! Author: hephaex@gmail.com

use crate::auth::jwt::JwtError;
use crate::auth::password::PasswordError;
use crate::store::StoreError;
use axum::{
    extract::rejection::JsonRejection,
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use devforge_core::DevforgeError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error categories with a fixed status and wire code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    BadRequest,
    Authentication,
    Authorization,
    NotFound,
    Conflict,
    RateLimitExceeded,
    Database,
    Internal,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::Validation | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            ErrorKind::Authorization => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Database | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::BadRequest => "BAD_REQUEST",
            ErrorKind::Authentication => "UNAUTHORIZED",
            ErrorKind::Authorization => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorKind::Database => "DATABASE_ERROR",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// API error body
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// Error response envelope
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorEnvelope {
    /// Always false
    pub success: bool,
    pub error: ApiError,
    pub timestamp: DateTime<Utc>,
}

/// Application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authorization, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn rate_limited() -> Self {
        Self::new(ErrorKind::RateLimitExceeded, "Too many requests")
    }

    /// Internal failure; the raw cause only reaches clients in debug builds
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        Self::opaque(ErrorKind::Internal, "Internal server error", cause)
    }

    pub fn database(cause: impl std::fmt::Display) -> Self {
        Self::opaque(ErrorKind::Database, "Database operation failed", cause)
    }

    fn opaque(kind: ErrorKind, message: &str, cause: impl std::fmt::Display) -> Self {
        let cause = cause.to_string();
        tracing::error!(code = kind.code(), cause = %cause, "{message}");

        let error = Self::new(kind, message);
        if cfg!(debug_assertions) {
            error.with_details(serde_json::Value::String(cause))
        } else {
            error
        }
    }

    pub fn status(&self) -> StatusCode {
        self.kind.status()
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            success: false,
            error: ApiError {
                code: self.kind.code().to_string(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
            timestamp: Utc::now(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_client_error() {
            tracing::warn!(code = self.kind.code(), message = %self.message, "Request rejected");
        }

        (status, Json(self.to_envelope())).into_response()
    }
}

impl From<DevforgeError> for AppError {
    fn from(err: DevforgeError) -> Self {
        match err {
            DevforgeError::NotFound(msg) => AppError::not_found(msg),
            DevforgeError::ValidationError(msg) => AppError::validation(msg),
            DevforgeError::Conflict(msg) => AppError::conflict(msg),
            DevforgeError::AccessDenied { reason } => AppError::forbidden(reason),
            DevforgeError::DatabaseError(msg) => AppError::database(msg),
            DevforgeError::StoreError(msg) => AppError::internal(format!("Store error: {msg}")),
            DevforgeError::ConfigError(msg) => {
                AppError::internal(format!("Configuration error: {msg}"))
            }
            DevforgeError::Other(err) => AppError::internal(err),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        AppError::internal(err)
    }
}

impl From<JwtError> for AppError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::EncodingError(_)
            | JwtError::SystemTimeError(_)
            | JwtError::ExpiryOverflow(_) => AppError::internal(err),
            _ => AppError::unauthorized("Invalid or expired token"),
        }
    }
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        AppError::internal(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::bad_request(rejection.body_text())
    }
}

/// Fallback for unmatched routes
pub async fn not_found(method: Method, uri: Uri) -> AppError {
    AppError::not_found(format!("Route {} {} not found", method, uri.path()))
}
