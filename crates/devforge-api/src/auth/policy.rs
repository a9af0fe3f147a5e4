//! Authorization policy
//!
//! - Role guards: [`require_role`] with the [`require_admin`] and
//!   [`require_user_or_admin`] instances
//! - Project guard: [`require_project_access`], resolving the caller's
//!   relation to the project in fixed precedence admin > owner > member
//!
//! Both run after `authenticate` and read its [`AuthContext`].
//!
//! Author: hephaex@gmail.com

use super::middleware::{AuthContext, MSG_AUTH_REQUIRED};
use super::repository::AuthRepository;
use crate::audit::{security_log, ClientInfo, SecurityEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Path, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use devforge_core::{Project, ProjectMember, Role, User};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

pub const MSG_INSUFFICIENT_PERMISSIONS: &str = "Insufficient permissions";
pub const MSG_PROJECT_ID_REQUIRED: &str = "Project ID required";
pub const MSG_PROJECT_NOT_FOUND: &str = "Project not found";
pub const MSG_PROJECT_ACCESS_DENIED: &str = "Access denied to project";

/// Path parameter carrying the project id
pub const PROJECT_ID_PARAM: &str = "projectId";

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const USER_OR_ADMIN: &[Role] = &[Role::User, Role::Admin];

/// Type alias for role middleware future
type RoleMiddlewareFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Response> + Send>>;

/// Middleware factory for role-based access control
///
/// # Example
///
/// ```ignore
/// let app = Router::new()
///     .route("/admin", get(admin_handler))
///     .route_layer(middleware::from_fn(require_role(&[Role::Admin])))
///     .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));
/// ```
pub fn require_role(
    allowed: &'static [Role],
) -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    move |request: Request<Body>, next: Next| {
        Box::pin(async move {
            match check_role(&request, allowed) {
                Ok(()) => next.run(request).await,
                Err(e) => e.into_response(),
            }
        })
    }
}

pub fn require_admin() -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    require_role(ADMIN_ONLY)
}

pub fn require_user_or_admin() -> impl Fn(Request<Body>, Next) -> RoleMiddlewareFuture + Clone {
    require_role(USER_OR_ADMIN)
}

fn check_role(request: &Request<Body>, allowed: &[Role]) -> Result<(), AppError> {
    let auth = request
        .extensions()
        .get::<AuthContext>()
        .ok_or_else(|| AppError::unauthorized(MSG_AUTH_REQUIRED))?;

    if allowed.contains(&auth.user.role) {
        return Ok(());
    }

    security_log(&SecurityEvent::AuthorizationFailed {
        user_id: auth.user.id,
        user_role: auth.user.role,
        required_roles: allowed.to_vec(),
        resource: request.uri().path().to_string(),
        ip_address: ClientInfo::from_request(request).ip_address,
    });

    Err(AppError::forbidden(MSG_INSUFFICIENT_PERMISSIONS))
}

/// How the caller is entitled to a project
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRelation {
    Admin,
    Owner,
    Member(ProjectMember),
}

impl AccessRelation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessRelation::Admin => "admin",
            AccessRelation::Owner => "owner",
            AccessRelation::Member(_) => "member",
        }
    }

    pub fn membership(&self) -> Option<&ProjectMember> {
        match self {
            AccessRelation::Member(member) => Some(member),
            _ => None,
        }
    }
}

/// Resolve the first matching relation, or `None` when access is denied
pub async fn resolve_access(
    repo: &dyn AuthRepository,
    user: &User,
    project: &Project,
) -> Result<Option<AccessRelation>, AppError> {
    if user.is_admin() {
        return Ok(Some(AccessRelation::Admin));
    }
    if project.owner_id == user.id {
        return Ok(Some(AccessRelation::Owner));
    }

    Ok(repo
        .find_project_member(project.id, user.id)
        .await?
        .map(AccessRelation::Member))
}

/// Project and relation attached by [`require_project_access`]
#[derive(Debug, Clone)]
pub struct ProjectAccess {
    pub project: Project,
    pub relation: AccessRelation,
}

#[async_trait]
impl<S> FromRequestParts<S> for ProjectAccess
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ProjectAccess>()
            .cloned()
            .ok_or_else(|| AppError::forbidden(MSG_PROJECT_ACCESS_DENIED))
    }
}

/// Project access middleware
///
/// Reads `:projectId` from the matched route, so it must be mounted with
/// `route_layer`. Order of checks:
/// 1. missing parameter: 400
/// 2. unknown project: 404, before any role logic
/// 3. admin, owner, member, first match wins
/// 4. otherwise 403
pub async fn require_project_access(
    State(state): State<Arc<AppState>>,
    params: Option<Path<HashMap<String, String>>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| AppError::unauthorized(MSG_AUTH_REQUIRED))?;

    let raw_id = params
        .and_then(|Path(mut p)| p.remove(PROJECT_ID_PARAM))
        .filter(|id| !id.is_empty())
        .ok_or_else(|| AppError::bad_request(MSG_PROJECT_ID_REQUIRED))?;

    // An id that is not a UUID cannot name a project
    let project_id =
        Uuid::parse_str(&raw_id).map_err(|_| AppError::not_found(MSG_PROJECT_NOT_FOUND))?;

    let project = state
        .repo
        .find_project(project_id)
        .await?
        .ok_or_else(|| AppError::not_found(MSG_PROJECT_NOT_FOUND))?;

    let Some(relation) = resolve_access(state.repo.as_ref(), &auth.user, &project).await? else {
        security_log(&SecurityEvent::ProjectAccessDenied {
            user_id: auth.user.id,
            project_id,
            ip_address: ClientInfo::from_request(&request).ip_address,
        });
        return Err(AppError::forbidden(MSG_PROJECT_ACCESS_DENIED));
    };

    request
        .extensions_mut()
        .insert(ProjectAccess { project, relation });

    Ok(next.run(request).await)
}
