//! Authentication handlers
//!
//! Author: hephaex@gmail.com

use crate::audit::ClientInfo;
use crate::auth::models::{
    AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, MessageResponse,
    RefreshRequest, RegisterRequest, ResetPasswordRequest, UserResponse, VerifyEmailRequest,
};
use crate::auth::service::MSG_LOGGED_OUT;
use crate::auth::AuthContext;
use crate::error::AppError;
use crate::state::AppState;
use axum::{extract::rejection::JsonRejection, extract::State, http::StatusCode, Json};
use std::sync::Arc;

type JsonBody<T> = Result<Json<T>, JsonRejection>;

/// Register a new user
#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered successfully", body = AuthResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorEnvelope),
        (status = 409, description = "Email or username already taken", body = crate::error::ErrorEnvelope),
        (status = 429, description = "Too many requests", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    payload: JsonBody<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    let Json(request) = payload?;
    let session = state.auth.register(request, &client).await?;
    Ok((StatusCode::CREATED, Json(AuthResponse::new(session))))
}

/// Login with email and password
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Invalid credentials or deactivated account", body = crate::error::ErrorEnvelope),
        (status = 429, description = "Too many requests", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    payload: JsonBody<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(request) = payload?;
    let session = state.auth.login(request, &client).await?;
    Ok(Json(AuthResponse::new(session)))
}

/// Exchange a refresh token for a new token pair
///
/// A missing or unreadable body counts as a missing refresh token.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = AuthResponse),
        (status = 400, description = "Refresh token is required", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Invalid refresh token", body = crate::error::ErrorEnvelope),
        (status = 429, description = "Too many requests", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    payload: JsonBody<RefreshRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let session = state.auth.refresh(request, &client).await?;
    Ok(Json(AuthResponse::new(session)))
}

/// Logout
///
/// The presented access token is blacklisted by the logout middleware
/// before this handler runs; here the refresh token is dropped.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    tag = "auth",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    client: ClientInfo,
) -> Json<MessageResponse> {
    state.auth.logout(&auth.user, &client).await;
    Json(MessageResponse::new(MSG_LOGGED_OUT))
}

/// Current user
#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
    ),
    security(("bearer_auth" = []))
)]
pub async fn me_handler(auth: AuthContext) -> Json<UserResponse> {
    Json(UserResponse::new(auth.user.to_public()))
}

/// Request a password reset
///
/// The response is the same whether or not the account exists.
#[utoipa::path(
    post,
    path = "/api/auth/forgot-password",
    tag = "auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset requested", body = MessageResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorEnvelope),
        (status = 429, description = "Too many requests", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    payload: JsonBody<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    let message = state.auth.forgot_password(request, &client).await?;
    Ok(Json(MessageResponse::new(message)))
}

/// Set a new password with a reset token
#[utoipa::path(
    post,
    path = "/api/auth/reset-password",
    tag = "auth",
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Validation failed", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Invalid or expired reset token", body = crate::error::ErrorEnvelope),
        (status = 429, description = "Too many requests", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    payload: JsonBody<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    let message = state.auth.reset_password(request, &client).await?;
    Ok(Json(MessageResponse::new(message)))
}

/// Change password for the current user
#[utoipa::path(
    post,
    path = "/api/auth/change-password",
    tag = "auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Validation failed or wrong current password", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
        (status = 429, description = "Too many requests", body = crate::error::ErrorEnvelope),
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    client: ClientInfo,
    payload: JsonBody<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    let message = state.auth.change_password(&auth.user, request, &client).await?;
    Ok(Json(MessageResponse::new(message)))
}

/// Verify an email address
#[utoipa::path(
    post,
    path = "/api/auth/verify-email",
    tag = "auth",
    request_body = VerifyEmailRequest,
    responses(
        (status = 200, description = "Email verified", body = MessageResponse),
        (status = 400, description = "Invalid verification token", body = crate::error::ErrorEnvelope),
        (status = 429, description = "Too many requests", body = crate::error::ErrorEnvelope),
    )
)]
pub async fn verify_email_handler(
    State(state): State<Arc<AppState>>,
    client: ClientInfo,
    payload: JsonBody<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let Json(request) = payload?;
    let message = state.auth.verify_email(request, &client).await?;
    Ok(Json(MessageResponse::new(message)))
}

/// Issue a fresh verification token for the current user
#[utoipa::path(
    post,
    path = "/api/auth/resend-verification",
    tag = "auth",
    responses(
        (status = 200, description = "Verification email sent", body = MessageResponse),
        (status = 400, description = "Email is already verified", body = crate::error::ErrorEnvelope),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorEnvelope),
        (status = 429, description = "Too many requests", body = crate::error::ErrorEnvelope),
    ),
    security(("bearer_auth" = []))
)]
pub async fn resend_verification_handler(
    State(state): State<Arc<AppState>>,
    auth: AuthContext,
    client: ClientInfo,
) -> Result<Json<MessageResponse>, AppError> {
    let message = state.auth.resend_verification(&auth.user, &client).await?;
    Ok(Json(MessageResponse::new(message)))
}
