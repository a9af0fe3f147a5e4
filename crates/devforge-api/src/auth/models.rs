//! Request and response bodies for the auth endpoints
//!
//! Wire names are camelCase. Every request field defaults when absent, so a
//! missing field surfaces as a validation error with field details instead of
//! a body-parsing failure.

use super::password::validate_password_strength;
use crate::error::AppError;
use devforge_core::UserPublic;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

pub const USERNAME_MIN_LENGTH: usize = 3;
pub const USERNAME_MAX_LENGTH: usize = 30;
pub const NAME_MAX_LENGTH: usize = 50;

const PASSWORD_POLICY_MESSAGE: &str = "Password must be at least 8 characters and contain uppercase, lowercase, number, and special character";
const NEW_PASSWORD_POLICY_MESSAGE: &str = "New password must be at least 8 characters and contain uppercase, lowercase, number, and special character";

/// One failed field in a validation error's `details`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Request bodies that normalize and validate themselves before use
pub trait ValidatedRequest: Sized {
    /// Trim and canonicalize inputs
    fn normalize(self) -> Self {
        self
    }

    /// Collect every failed rule; empty means valid
    fn field_errors(&self) -> Vec<FieldError>;

    /// Normalize then validate, failing with 400 `VALIDATION_ERROR`
    fn validated(self) -> Result<Self, AppError> {
        let request = self.normalize();
        let errors = request.field_errors();
        if errors.is_empty() {
            return Ok(request);
        }

        let details = serde_json::to_value(&errors).map_err(AppError::internal)?;
        Err(AppError::validation("Validation failed").with_details(details))
    }
}

/// Flatten derive-based validation results, ordered by field name
fn derive_errors<T: Validate>(request: &T) -> Vec<FieldError> {
    let Err(errors) = request.validate() else {
        return Vec::new();
    };

    let mut fields: Vec<FieldError> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let field = field.to_string();
            errs.iter().map(move |e| FieldError {
                field: field.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    fields.sort_by(|a, b| a.field.cmp(&b.field));
    fields
}

pub fn is_valid_username(username: &str) -> bool {
    let len = username.chars().count();
    (USERNAME_MIN_LENGTH..=USERNAME_MAX_LENGTH).contains(&len)
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_valid_name(name: &str) -> bool {
    let len = name.chars().count();
    (1..=NAME_MAX_LENGTH).contains(&len)
}

fn normalize_email(email: String) -> String {
    email.trim().to_lowercase()
}

/// User registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterRequest {
    #[validate(email(message = "Valid email is required"))]
    pub email: String,
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
}

impl ValidatedRequest for RegisterRequest {
    fn normalize(self) -> Self {
        Self {
            email: normalize_email(self.email),
            username: self.username.trim().to_string(),
            password: self.password,
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
        }
    }

    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = derive_errors(self);

        if !is_valid_username(&self.username) {
            errors.push(FieldError::new(
                "username",
                "Username must be 3-30 characters and contain only letters, numbers, underscores, and hyphens",
            ));
        }
        if validate_password_strength(&self.password).is_err() {
            errors.push(FieldError::new("password", PASSWORD_POLICY_MESSAGE));
        }
        if !is_valid_name(&self.first_name) {
            errors.push(FieldError::new(
                "firstName",
                "First name is required and must be less than 50 characters",
            ));
        }
        if !is_valid_name(&self.last_name) {
            errors.push(FieldError::new(
                "lastName",
                "Last name is required and must be less than 50 characters",
            ));
        }

        errors
    }
}

/// User login request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct LoginRequest {
    #[validate(email(message = "Valid email is required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

impl ValidatedRequest for LoginRequest {
    fn normalize(self) -> Self {
        Self {
            email: normalize_email(self.email),
            password: self.password,
        }
    }

    fn field_errors(&self) -> Vec<FieldError> {
        derive_errors(self)
    }
}

/// Token refresh request
///
/// Not a [`ValidatedRequest`]: a missing token has its own message.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

/// Password reset request
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Valid email is required"))]
    pub email: String,
}

impl ValidatedRequest for ForgotPasswordRequest {
    fn normalize(self) -> Self {
        Self {
            email: normalize_email(self.email),
        }
    }

    fn field_errors(&self) -> Vec<FieldError> {
        derive_errors(self)
    }
}

/// Complete a password reset with the emailed token
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ResetPasswordRequest {
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,
    pub new_password: String,
}

impl ValidatedRequest for ResetPasswordRequest {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = derive_errors(self);
        if validate_password_strength(&self.new_password).is_err() {
            errors.push(FieldError::new("newPassword", NEW_PASSWORD_POLICY_MESSAGE));
        }
        errors
    }
}

/// Change the password of the signed-in user
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ValidatedRequest for ChangePasswordRequest {
    fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        if self.current_password.is_empty() {
            errors.push(FieldError::new(
                "currentPassword",
                "Current password is required",
            ));
        }
        if validate_password_strength(&self.new_password).is_err() {
            errors.push(FieldError::new("newPassword", NEW_PASSWORD_POLICY_MESSAGE));
        }
        errors
    }
}

/// Confirm an email address
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct VerifyEmailRequest {
    #[validate(length(min = 1, message = "Verification token is required"))]
    pub token: String,
}

impl ValidatedRequest for VerifyEmailRequest {
    fn normalize(self) -> Self {
        Self {
            token: self.token.trim().to_string(),
        }
    }

    fn field_errors(&self) -> Vec<FieldError> {
        derive_errors(self)
    }
}

/// Issued credentials together with the account they belong to
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: UserPublic,
    /// Access token
    pub token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

/// `{success, data: {user, token, refreshToken, expiresIn}}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub data: AuthPayload,
}

impl AuthResponse {
    pub fn new(data: AuthPayload) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPayload {
    pub user: UserPublic,
}

/// `{success, data: {user}}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub success: bool,
    pub data: UserPayload,
}

impl UserResponse {
    pub fn new(user: UserPublic) -> Self {
        Self {
            success: true,
            data: UserPayload { user },
        }
    }
}

/// `{success, message}`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}
