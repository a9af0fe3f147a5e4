//! DevForge API - authentication, session security and realtime gateway
//!
//! REST endpoints under `/api`, health probes under `/health`, and a
//! WebSocket gateway at `/ws`. PostgreSQL holds accounts and projects;
//! Redis holds the token blacklist, refresh-token registry and rate-limit
//! counters.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod realtime;
pub mod routes;
pub mod state;
pub mod store;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Extension, Router,
};
use devforge_core::ServerConfig;
use state::AppState;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[cfg(any(test, feature = "test-utils"))]
pub use testing::{create_router_for_testing, TestContext};

/// OpenAPI document
#[derive(OpenApi)]
#[openapi(
    info(
        title = "DevForge API",
        description = "Authentication and session security for the DevForge development environment"
    ),
    paths(
        handlers::api_index,
        handlers::auth::register_handler,
        handlers::auth::login_handler,
        handlers::auth::refresh_handler,
        handlers::auth::logout_handler,
        handlers::auth::me_handler,
        handlers::auth::forgot_password_handler,
        handlers::auth::reset_password_handler,
        handlers::auth::change_password_handler,
        handlers::auth::verify_email_handler,
        handlers::auth::resend_verification_handler,
        handlers::projects::get_project,
        handlers::projects::admin_ping,
        handlers::health::health_check,
        handlers::health::detailed_health,
        handlers::health::database_health,
        handlers::health::redis_health,
        handlers::health::readiness_check,
        handlers::health::liveness_check,
        handlers::health::metrics_handler,
    ),
    components(schemas(
        auth::models::RegisterRequest,
        auth::models::LoginRequest,
        auth::models::RefreshRequest,
        auth::models::ForgotPasswordRequest,
        auth::models::ResetPasswordRequest,
        auth::models::ChangePasswordRequest,
        auth::models::VerifyEmailRequest,
        auth::models::AuthPayload,
        auth::models::AuthResponse,
        auth::models::UserPayload,
        auth::models::UserResponse,
        auth::models::MessageResponse,
        auth::models::FieldError,
        devforge_core::UserPublic,
        devforge_core::Role,
        devforge_core::Project,
        devforge_core::ProjectMember,
        error::ApiError,
        error::ErrorEnvelope,
        handlers::ApiIndex,
        handlers::EndpointIndex,
        handlers::projects::ProjectAccessData,
        handlers::projects::ProjectResponse,
        handlers::projects::AdminPingResponse,
        handlers::health::HealthResponse,
        handlers::health::DependencyChecks,
        handlers::health::DetailedHealthResponse,
        handlers::health::DependencyHealth,
        handlers::health::ReadinessResponse,
        handlers::health::LivenessResponse,
        handlers::health::MetricsResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Registration, login, tokens and passwords"),
        (name = "projects", description = "Project access"),
        (name = "admin", description = "Admin-only endpoints"),
        (name = "health", description = "Health and readiness probes"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// CORS policy for the configured origins, with credentials
pub fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin.trim()) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
}

/// Build the complete application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let router = Router::new()
        .route(
            "/api",
            get(handlers::api_index).route_layer(axum::middleware::from_fn_with_state(
                state.clone(),
                auth::optional_auth,
            )),
        )
        .nest("/api", routes::api_routes(&state))
        .merge(routes::health_routes())
        .merge(routes::realtime_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback(error::not_found)
        .layer(DefaultBodyLimit::max(state.config.server.max_body_size))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::request_log,
        ))
        .layer(axum::middleware::from_fn(middleware::security_headers))
        .layer(cors_layer(&state.config.server))
        .layer(TraceLayer::new_for_http());

    // Outermost, so the access log and the rate limiter both see it
    let router = if state.config.server.trust_proxy {
        router.layer(Extension(audit::TrustedProxy))
    } else {
        router
    };

    router.with_state(state)
}

/// In-memory wiring for tests
#[cfg(any(test, feature = "test-utils"))]
pub mod testing {
    use super::*;
    use crate::auth::{JwtConfig, MemoryAuthRepository, PasswordConfig};
    use crate::store::MemoryStore;
    use devforge_core::{AppConfig, Environment, RateLimitConfig};

    pub const TEST_JWT_SECRET: &str = "test-secret-key-for-integration-tests";

    /// Test configuration: test environment and a generous rate limit
    pub fn test_config() -> AppConfig {
        AppConfig {
            environment: Environment::Test,
            rate_limit: RateLimitConfig {
                window_ms: 60_000,
                max_requests: 1_000,
            },
            ..AppConfig::default()
        }
    }

    /// Argon2 parameters cheap enough for tests
    pub fn fast_password_config() -> PasswordConfig {
        PasswordConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    pub fn test_jwt_config() -> JwtConfig {
        JwtConfig {
            secret: TEST_JWT_SECRET.to_string(),
            ..JwtConfig::default()
        }
    }

    /// Router plus handles on its in-memory backends
    pub struct TestContext {
        pub state: Arc<AppState>,
        pub repo: Arc<MemoryAuthRepository>,
        pub store: Arc<MemoryStore>,
    }

    impl Default for TestContext {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TestContext {
        pub fn new() -> Self {
            Self::with_config(test_config())
        }

        pub fn with_config(config: AppConfig) -> Self {
            let repo = Arc::new(MemoryAuthRepository::new());
            let store = Arc::new(MemoryStore::new());
            let state = Arc::new(AppState::with_services(
                config,
                repo.clone(),
                store.clone(),
                test_jwt_config(),
                fast_password_config(),
            ));
            Self { state, repo, store }
        }

        pub fn router(&self) -> Router {
            create_router(self.state.clone())
        }
    }

    /// Router over fresh in-memory backends
    pub fn create_router_for_testing() -> Router {
        TestContext::new().router()
    }
}
