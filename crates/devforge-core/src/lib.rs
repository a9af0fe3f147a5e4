//! DevForge Core - Domain models, errors, and configuration
//!
//! This crate defines the shared abstractions used by the DevForge API server:
//! - Common error types and relational error translation
//! - User, project, and membership models
//! - Configuration management
//!
//! Author: hephaex@gmail.com

pub mod config;
pub mod models;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, Environment, LoggingConfig,
    RateLimitConfig, RedisConfig, ServerConfig,
};
pub use models::{NewUser, Project, ProjectMember, Role, User, UserPublic};

use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for DevForge operations
#[derive(Error, Debug)]
pub enum DevforgeError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, DevforgeError>;

/// Postgres SQLSTATE codes translated to domain errors
pub mod sqlstate {
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const NOT_NULL_VIOLATION: &str = "23502";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const UNDEFINED_TABLE: &str = "42P01";
    pub const UNDEFINED_COLUMN: &str = "42703";
}

impl DevforgeError {
    /// Map a Postgres SQLSTATE code to the closest domain error
    pub fn from_sqlstate(code: Option<&str>, raw: impl Into<String>) -> Self {
        match code {
            Some(sqlstate::UNIQUE_VIOLATION) => Self::Conflict("Resource already exists".into()),
            Some(sqlstate::FOREIGN_KEY_VIOLATION) => {
                Self::ValidationError("Referenced resource does not exist".into())
            }
            Some(sqlstate::NOT_NULL_VIOLATION) => {
                Self::ValidationError("Required field is missing".into())
            }
            Some(sqlstate::CHECK_VIOLATION) => {
                Self::ValidationError("Field value violates constraint".into())
            }
            Some(sqlstate::UNDEFINED_TABLE) => Self::NotFound("Database table not found".into()),
            Some(sqlstate::UNDEFINED_COLUMN) => {
                Self::ValidationError("Database column not found".into())
            }
            _ => Self::DatabaseError(raw.into()),
        }
    }
}

impl From<sqlx::Error> for DevforgeError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("Resource not found".into()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code();
                Self::from_sqlstate(code.as_deref(), db_err.message())
            }
            _ => Self::DatabaseError(err.to_string()),
        }
    }
}
