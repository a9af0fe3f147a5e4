//! Health check handlers
//!
//! Author: hephaex@gmail.com

use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use utoipa::ToSchema;

/// Basic health response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    /// Seconds since start
    pub uptime: u64,
    pub environment: String,
    pub version: String,
}

/// Liveness of each backing service
#[derive(Debug, Serialize, ToSchema)]
pub struct DependencyChecks {
    pub database: bool,
    pub redis: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetailedHealthResponse {
    pub status: String,
    pub checks: DependencyChecks,
    pub timestamp: DateTime<Utc>,
    pub uptime: u64,
    pub environment: String,
    pub version: String,
    pub response_time: String,
}

/// Single dependency probe
#[derive(Debug, Serialize, ToSchema)]
pub struct DependencyHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Readiness response
#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<DependencyChecks>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LivenessResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Request counters
#[derive(Debug, Serialize, ToSchema)]
pub struct MetricsResponse {
    pub uptime_secs: u64,
    pub requests_total: u64,
    pub errors_total: u64,
    pub realtime_connections: usize,
}

fn health_label(healthy: bool) -> String {
    if healthy { "healthy" } else { "unhealthy" }.to_string()
}

fn status_for(healthy: bool) -> StatusCode {
    if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn dependency_checks(state: &AppState) -> DependencyChecks {
    let (database, redis) = tokio::join!(state.check_database(), state.check_redis());
    DependencyChecks {
        database: database.is_ok(),
        redis: redis.is_ok(),
    }
}

/// Basic health check
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        uptime: state.uptime_secs(),
        environment: state.config.environment.as_str().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Health check including database and Redis
#[utoipa::path(
    get,
    path = "/health/detailed",
    tag = "health",
    responses(
        (status = 200, description = "All dependencies healthy", body = DetailedHealthResponse),
        (status = 503, description = "A dependency is down", body = DetailedHealthResponse)
    )
)]
pub async fn detailed_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let started = Instant::now();
    let checks = dependency_checks(&state).await;
    let healthy = checks.database && checks.redis;

    let body = DetailedHealthResponse {
        status: health_label(healthy),
        checks,
        timestamp: Utc::now(),
        uptime: state.uptime_secs(),
        environment: state.config.environment.as_str().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        response_time: format!("{}ms", started.elapsed().as_millis()),
    };

    (status_for(healthy), Json(body))
}

fn dependency_response(result: Result<(), String>, name: &str) -> (StatusCode, Json<DependencyHealth>) {
    if let Err(e) = &result {
        tracing::error!(dependency = name, error = %e, "Health check failed");
    }
    let healthy = result.is_ok();
    (
        status_for(healthy),
        Json(DependencyHealth {
            status: health_label(healthy),
            error: result.err(),
            timestamp: Utc::now(),
        }),
    )
}

/// Database health check
#[utoipa::path(
    get,
    path = "/health/database",
    tag = "health",
    responses(
        (status = 200, description = "Database reachable", body = DependencyHealth),
        (status = 503, description = "Database unreachable", body = DependencyHealth)
    )
)]
pub async fn database_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    dependency_response(state.check_database().await, "database")
}

/// Redis health check
#[utoipa::path(
    get,
    path = "/health/redis",
    tag = "health",
    responses(
        (status = 200, description = "Redis reachable", body = DependencyHealth),
        (status = 503, description = "Redis unreachable", body = DependencyHealth)
    )
)]
pub async fn redis_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    dependency_response(state.check_redis().await, "redis")
}

/// Readiness probe
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Ready to serve", body = ReadinessResponse),
        (status = 503, description = "Not ready", body = ReadinessResponse)
    )
)]
pub async fn readiness_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let checks = dependency_checks(&state).await;
    let ready = state.is_ready() && checks.database && checks.redis;

    if ready {
        (
            StatusCode::OK,
            Json(ReadinessResponse {
                status: "ready".to_string(),
                checks: None,
                timestamp: Utc::now(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                status: "not ready".to_string(),
                checks: Some(checks),
                timestamp: Utc::now(),
            }),
        )
    }
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Process is alive", body = LivenessResponse)
    )
)]
pub async fn liveness_check() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
        timestamp: Utc::now(),
    })
}

/// Request counters
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Process counters", body = MetricsResponse)
    )
)]
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    Json(MetricsResponse {
        uptime_secs: state.uptime_secs(),
        requests_total: state.get_request_count(),
        errors_total: state.get_error_count(),
        // The hub itself holds no receiver, so this is the socket count
        realtime_connections: state.realtime.connection_count(),
    })
}
