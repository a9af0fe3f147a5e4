//! Project and admin handlers
//!
//! Author: hephaex@gmail.com

use crate::auth::{AuthContext, ProjectAccess};
use axum::Json;
use chrono::{DateTime, Utc};
use devforge_core::{Project, ProjectMember};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Project as seen by the caller
#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectAccessData {
    pub project: Project,
    /// `admin`, `owner` or `member`
    pub access: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub membership: Option<ProjectMember>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectResponse {
    pub success: bool,
    pub data: ProjectAccessData,
}

/// Get a project the caller may access
#[utoipa::path(
    get,
    path = "/api/projects/{projectId}",
    tag = "projects",
    params(
        ("projectId" = Uuid, Path, description = "Project ID")
    ),
    responses(
        (status = 200, description = "Project with the caller's access relation", body = ProjectResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
        (status = 403, description = "Access denied to project", body = crate::error::ErrorEnvelope),
        (status = 404, description = "Project not found", body = crate::error::ErrorEnvelope),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(access: ProjectAccess) -> Json<ProjectResponse> {
    let membership = access.relation.membership().cloned();
    Json(ProjectResponse {
        success: true,
        data: ProjectAccessData {
            access: access.relation.as_str().to_string(),
            membership,
            project: access.project,
        },
    })
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminPingResponse {
    pub success: bool,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

/// Admin-only liveness check
#[utoipa::path(
    get,
    path = "/api/admin/ping",
    tag = "admin",
    responses(
        (status = 200, description = "Caller is an admin", body = AdminPingResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
        (status = 403, description = "Insufficient permissions", body = crate::error::ErrorEnvelope),
    ),
    security(("bearer_auth" = []))
)]
pub async fn admin_ping(auth: AuthContext) -> Json<AdminPingResponse> {
    Json(AdminPingResponse {
        success: true,
        user_id: auth.user.id,
        timestamp: Utc::now(),
    })
}
