//! API route definitions
//!
//! Layers added later with `route_layer` run first, so each group lists its
//! guards innermost to outermost.
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    authenticate, logout, require_admin, require_project_access, require_user_or_admin,
};
use crate::handlers::{auth, health, projects};
use crate::middleware::rate_limit;
use crate::realtime::ws_handler;
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Routes mounted under `/api`
pub fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    let limiter = state.rate_limiter.clone();

    // Public routes, rate limited
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register_handler))
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/refresh", post(auth::refresh_handler))
        .route("/auth/forgot-password", post(auth::forgot_password_handler))
        .route("/auth/reset-password", post(auth::reset_password_handler))
        .route("/auth/verify-email", post(auth::verify_email_handler))
        .route_layer(middleware::from_fn_with_state(limiter.clone(), rate_limit));

    // Authenticated, then rate limited
    let limited_protected_routes = Router::new()
        .route("/auth/change-password", post(auth::change_password_handler))
        .route(
            "/auth/resend-verification",
            post(auth::resend_verification_handler),
        )
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    // Authenticated
    let protected_routes = Router::new()
        .route(
            "/auth/logout",
            post(auth::logout_handler)
                .route_layer(middleware::from_fn_with_state(state.clone(), logout)),
        )
        .route("/auth/me", get(auth::me_handler))
        .route(
            "/projects/:projectId",
            get(projects::get_project)
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    require_project_access,
                ))
                .route_layer(middleware::from_fn(require_user_or_admin())),
        )
        .route(
            "/admin/ping",
            get(projects::admin_ping).route_layer(middleware::from_fn(require_admin())),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .merge(public_routes)
        .merge(limited_protected_routes)
        .merge(protected_routes)
}

/// Health and process probes
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::detailed_health))
        .route("/health/database", get(health::database_health))
        .route("/health/redis", get(health::redis_health))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(health::metrics_handler))
}

/// Realtime gateway
pub fn realtime_routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}
