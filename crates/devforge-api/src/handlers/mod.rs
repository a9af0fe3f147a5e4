//! HTTP request handlers
//!
//! Author: hephaex@gmail.com

pub mod auth;
pub mod health;
pub mod projects;

use crate::auth::AuthContext;
use axum::Json;
use devforge_core::UserPublic;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct EndpointIndex {
    pub auth: String,
    pub projects: String,
    pub health: String,
    pub realtime: String,
    pub docs: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiIndex {
    pub name: String,
    pub version: String,
    pub description: String,
    pub endpoints: EndpointIndex,
    /// Present when the request carried a valid access token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewer: Option<UserPublic>,
}

/// API index
#[utoipa::path(
    get,
    path = "/api",
    tag = "health",
    responses(
        (status = 200, description = "Service name and entry points", body = ApiIndex)
    ),
    security((), ("bearer_auth" = []))
)]
pub async fn api_index(auth: Option<AuthContext>) -> Json<ApiIndex> {
    Json(ApiIndex {
        name: "DevForge API".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "Self-hosted development environment API".to_string(),
        endpoints: EndpointIndex {
            auth: "/api/auth".to_string(),
            projects: "/api/projects".to_string(),
            health: "/health".to_string(),
            realtime: "/ws".to_string(),
            docs: "/swagger-ui".to_string(),
        },
        viewer: auth.map(|a| a.user.to_public()),
    })
}
