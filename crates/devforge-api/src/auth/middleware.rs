/// Authentication middleware for protecting routes
///
/// Extracts and validates bearer tokens from the Authorization header.
/// On success, adds an [`AuthContext`] to request extensions.
use super::jwt::{decode_unverified, unix_now};
use super::service::MSG_INVALID_TOKEN;
use crate::audit::{security_log, ClientInfo, SecurityEvent};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use devforge_core::User;
use std::sync::Arc;
use uuid::Uuid;

pub const MSG_TOKEN_REQUIRED: &str = "Access token required";
pub const MSG_AUTH_REQUIRED: &str = "Authentication required";

/// Identity attached by [`authenticate`]
///
/// Extract it in handlers directly; a missing context is a 401.
///
/// ```ignore
/// async fn me(auth: AuthContext) -> Json<UserResponse> {
///     Json(UserResponse::new(auth.user.to_public()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Full user row, loaded fresh for this request
    pub user: User,
    /// Raw bearer token the request presented
    pub token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::unauthorized(MSG_AUTH_REQUIRED))
    }
}

/// User id stamped on responses of authenticated requests, read by the access log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthenticatedUserId(pub Uuid);

/// Bearer token from the Authorization header, if well formed
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware that requires a valid access token
///
/// This middleware:
/// 1. Extracts the Bearer token
/// 2. Verifies signature, expiry, and the blacklist
/// 3. Loads the user and requires it to be active
/// 4. Adds [`AuthContext`] to request extensions
///
/// # Usage
///
/// ```ignore
/// let app = Router::new()
///     .route("/protected", get(protected_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));
/// ```
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let client = ClientInfo::from_request(&request);
    let path = request.uri().path().to_string();

    let reject = |message: &str| {
        security_log(&SecurityEvent::AuthenticationFailed {
            reason: message.to_string(),
            path: path.clone(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });
        AppError::unauthorized(message)
    };

    let Some(token) = bearer_token(request.headers()).map(str::to_string) else {
        return Err(reject(MSG_TOKEN_REQUIRED));
    };

    let user = match state.auth.resolve_access_token(&token).await {
        Ok(user) => user,
        Err(e) if e.status().is_client_error() => return Err(reject(&e.message)),
        Err(e) => return Err(e),
    };

    security_log(&SecurityEvent::AuthenticationSuccess {
        user_id: user.id,
        email: user.email.clone(),
        ip_address: client.ip_address.clone(),
    });

    let user_id = user.id;
    request.extensions_mut().insert(AuthContext { user, token });

    let mut response = next.run(request).await;
    response
        .extensions_mut()
        .insert(AuthenticatedUserId(user_id));
    Ok(response)
}

/// Optional authentication middleware
///
/// Runs the same checks as [`authenticate`] but never rejects. Handlers
/// take `Option<AuthContext>` to see whether an identity was attached.
pub async fn optional_auth(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let mut user_id = None;

    if let Some(token) = bearer_token(request.headers()).map(str::to_string) {
        if let Ok(user) = state.auth.resolve_access_token(&token).await {
            user_id = Some(user.id);
            request.extensions_mut().insert(AuthContext { user, token });
        }
    }

    let mut response = next.run(request).await;
    if let Some(id) = user_id {
        response.extensions_mut().insert(AuthenticatedUserId(id));
    }
    response
}

/// Logout companion
///
/// Must run after [`authenticate`]. Blacklists the presented access token for
/// exactly its remaining lifetime, then always continues to the handler even
/// if the blacklist write fails.
pub async fn logout(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let auth = request.extensions().get::<AuthContext>().cloned();

    if let Some(auth) = auth {
        let client = ClientInfo::from_request(&request);

        match revoke_remaining(&state, &auth.token).await {
            Ok(revoked_for_secs) => security_log(&SecurityEvent::UserLogout {
                user_id: auth.user.id,
                email: auth.user.email.clone(),
                revoked_for_secs,
                ip_address: client.ip_address,
            }),
            Err(e) => {
                tracing::error!(user_id = %auth.user.id, error = %e, "Failed to blacklist token on logout");
            }
        }
    }

    next.run(request).await
}

/// Blacklist `token` until its own expiry; returns the TTL used (0 when already expired)
async fn revoke_remaining(state: &AppState, token: &str) -> Result<u64, AppError> {
    let claims = decode_unverified(token).map_err(|_| AppError::unauthorized(MSG_INVALID_TOKEN))?;
    let remaining = claims.remaining_secs(unix_now()?);

    if remaining > 0 {
        state.tokens.revocation().blacklist(token, remaining).await?;
    }

    Ok(remaining)
}
