//! Authentication service layer
//!
//! Business logic behind the auth endpoints: registration, login, token
//! rotation, logout, password reset and change, and email verification.
//! Handlers stay thin and only translate HTTP into these calls.

use super::jwt::{TokenKind, TokenService};
use super::models::{
    AuthPayload, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest,
    RegisterRequest, ResetPasswordRequest, ValidatedRequest, VerifyEmailRequest,
};
use super::password::CredentialStore;
use super::repository::AuthRepository;
use crate::audit::{audit_log, AuditEvent, ClientInfo};
use crate::error::AppError;
use base64::Engine;
use chrono::{Duration, Utc};
use devforge_core::{NewUser, User};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

pub const MSG_EMAIL_TAKEN: &str = "User with this email already exists";
pub const MSG_USERNAME_TAKEN: &str = "Username already taken";
pub const MSG_INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const MSG_ACCOUNT_DEACTIVATED: &str = "Account is deactivated";
pub const MSG_REFRESH_REQUIRED: &str = "Refresh token is required";
pub const MSG_INVALID_REFRESH: &str = "Invalid refresh token";
pub const MSG_INVALID_TOKEN: &str = "Invalid or expired token";
pub const MSG_USER_INACTIVE: &str = "User not found or inactive";
pub const MSG_RESET_SENT: &str =
    "If an account with that email exists, a password reset link has been sent";
pub const MSG_INVALID_RESET: &str = "Invalid or expired reset token";
pub const MSG_PASSWORD_RESET: &str = "Password reset successfully";
pub const MSG_WRONG_CURRENT_PASSWORD: &str = "Current password is incorrect";
pub const MSG_PASSWORD_CHANGED: &str = "Password changed successfully";
pub const MSG_INVALID_VERIFICATION: &str = "Invalid verification token";
pub const MSG_EMAIL_VERIFIED: &str = "Email verified successfully";
pub const MSG_ALREADY_VERIFIED: &str = "Email is already verified";
pub const MSG_VERIFICATION_SENT: &str = "Verification email sent";
pub const MSG_LOGGED_OUT: &str = "Logged out successfully";

/// Reset links stay valid for one hour
const RESET_TOKEN_TTL_MINS: i64 = 60;

/// Random bytes behind reset and verification tokens
const ONE_TIME_TOKEN_BYTES: usize = 32;

/// 32 random bytes, URL-safe base64 without padding
pub fn generate_one_time_token() -> String {
    let mut bytes = [0u8; ONE_TIME_TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// SHA-256 of a one-time token, hex encoded; only this digest is stored
pub fn hash_one_time_token(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    repo: Arc<dyn AuthRepository>,
    tokens: TokenService,
    credentials: CredentialStore,
}

impl AuthService {
    pub fn new(
        repo: Arc<dyn AuthRepository>,
        tokens: TokenService,
        credentials: CredentialStore,
    ) -> Self {
        Self {
            repo,
            tokens,
            credentials,
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Resolve a bearer token to an active user
    ///
    /// # Returns
    ///
    /// * `Ok(User)` - Token verified, not revoked, user exists and is active
    /// * `Err(AppError)` - 401 "Invalid or expired token" or "User not found or inactive"
    pub async fn resolve_access_token(&self, token: &str) -> Result<User, AppError> {
        let claims = self.tokens.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            AppError::unauthorized(MSG_INVALID_TOKEN)
        })?;
        let user_id = claims
            .user_id()
            .map_err(|_| AppError::unauthorized(MSG_INVALID_TOKEN))?;

        match self.repo.find_user_by_id(user_id).await? {
            Some(user) if user.is_active => Ok(user),
            _ => Err(AppError::unauthorized(MSG_USER_INACTIVE)),
        }
    }

    /// Issue both tokens for `user` and make the refresh token the live one
    async fn start_session(&self, user: &User) -> Result<AuthPayload, AppError> {
        let pair = self.tokens.issue_pair(user)?;
        let config = self.tokens.config();

        self.tokens
            .revocation()
            .set_refresh_token(user.id, &pair.refresh_token, config.refresh_ttl_secs)
            .await?;

        Ok(AuthPayload {
            user: user.to_public(),
            token: pair.access_token,
            refresh_token: pair.refresh_token,
            expires_in: config.access_ttl_secs,
        })
    }

    /// Register a new user
    ///
    /// # Returns
    ///
    /// * `Ok(AuthPayload)` - Created user with a fresh session
    /// * `Err(AppError)` - Validation failure or duplicate email/username
    pub async fn register(
        &self,
        request: RegisterRequest,
        client: &ClientInfo,
    ) -> Result<AuthPayload, AppError> {
        let request = request.validated()?;

        if self.repo.find_user_by_email(&request.email).await?.is_some() {
            return Err(AppError::conflict(MSG_EMAIL_TAKEN));
        }
        if self
            .repo
            .find_user_by_username(&request.username)
            .await?
            .is_some()
        {
            return Err(AppError::conflict(MSG_USERNAME_TAKEN));
        }

        let password_hash = self.credentials.hash(&request.password).await?;
        let verification_token = generate_one_time_token();

        // A concurrent registration that slipped past the checks above fails
        // here on the unique index and maps to 409
        let user = self
            .repo
            .create_user(NewUser {
                email: request.email,
                username: request.username,
                password_hash,
                first_name: request.first_name,
                last_name: request.last_name,
                verification_token: Some(verification_token.clone()),
            })
            .await?;

        let payload = self.start_session(&user).await?;

        audit_log(&AuditEvent::UserRegistered {
            user_id: user.id,
            email: user.email.clone(),
            username: user.username.clone(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });
        audit_log(&AuditEvent::VerificationTokenIssued {
            user_id: user.id,
            email: user.email.clone(),
            verification_token,
        });

        Ok(payload)
    }

    /// Login with email and password
    ///
    /// Unknown email and wrong password produce the same response.
    pub async fn login(
        &self,
        request: LoginRequest,
        client: &ClientInfo,
    ) -> Result<AuthPayload, AppError> {
        let request = request.validated()?;

        let login_failed = |reason: &str| {
            audit_log(&AuditEvent::LoginFailed {
                email: request.email.clone(),
                reason: reason.to_string(),
                ip_address: client.ip_address.clone(),
                user_agent: client.user_agent.clone(),
            });
        };

        let Some(user) = self.repo.find_user_by_email(&request.email).await? else {
            login_failed("User not found");
            return Err(AppError::unauthorized(MSG_INVALID_CREDENTIALS));
        };

        if !user.is_active {
            login_failed("Account inactive");
            return Err(AppError::unauthorized(MSG_ACCOUNT_DEACTIVATED));
        }

        if !self
            .credentials
            .verify(&request.password, &user.password_hash)
            .await?
        {
            login_failed("Invalid password");
            return Err(AppError::unauthorized(MSG_INVALID_CREDENTIALS));
        }

        let payload = self.start_session(&user).await?;
        self.repo.record_login(user.id).await?;

        audit_log(&AuditEvent::UserLogin {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: client.ip_address.clone(),
            user_agent: client.user_agent.clone(),
        });

        Ok(payload)
    }

    /// Rotate a refresh token
    ///
    /// The presented token must verify as a refresh token and equal the one
    /// currently registered for its user. Every failure is the same 401.
    pub async fn refresh(
        &self,
        request: RefreshRequest,
        client: &ClientInfo,
    ) -> Result<AuthPayload, AppError> {
        let token = request
            .refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| AppError::validation(MSG_REFRESH_REQUIRED))?;

        let invalid = || AppError::unauthorized(MSG_INVALID_REFRESH);

        let claims = self
            .tokens
            .verify_signature(&token, TokenKind::Refresh)
            .map_err(|e| {
                tracing::debug!(error = %e, "Refresh token rejected");
                invalid()
            })?;
        let user_id = claims.user_id().map_err(|_| invalid())?;

        let stored = self
            .tokens
            .revocation()
            .get_refresh_token(user_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Refresh registry lookup failed");
                invalid()
            })?;
        if stored.as_deref() != Some(token.as_str()) {
            return Err(invalid());
        }

        let user = match self.repo.find_user_by_id(user_id).await? {
            Some(user) if user.is_active => user,
            _ => return Err(invalid()),
        };

        let payload = self.start_session(&user).await?;

        audit_log(&AuditEvent::TokenRefreshed {
            user_id: user.id,
            ip_address: client.ip_address.clone(),
        });

        Ok(payload)
    }

    /// Drop the user's refresh token
    ///
    /// The access token itself is blacklisted by the logout middleware.
    /// A store failure here is logged and the logout still succeeds.
    pub async fn logout(&self, user: &User, client: &ClientInfo) {
        if let Err(e) = self.tokens.revocation().clear_refresh_token(user.id).await {
            tracing::error!(user_id = %user.id, error = %e, "Failed to clear refresh token");
        }

        audit_log(&AuditEvent::UserLoggedOut {
            user_id: user.id,
            ip_address: client.ip_address.clone(),
        });
    }

    /// Start a password reset
    ///
    /// The outcome is the same whether or not the account exists.
    pub async fn forgot_password(
        &self,
        request: ForgotPasswordRequest,
        client: &ClientInfo,
    ) -> Result<&'static str, AppError> {
        let request = request.validated()?;

        if let Some(user) = self.repo.find_user_by_email(&request.email).await? {
            let reset_token = generate_one_time_token();
            let expires_at = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINS);

            self.repo
                .set_reset_token(user.id, &hash_one_time_token(&reset_token), expires_at)
                .await?;

            audit_log(&AuditEvent::PasswordResetRequested {
                user_id: user.id,
                email: user.email.clone(),
                reset_token,
                ip_address: client.ip_address.clone(),
            });
        }

        Ok(MSG_RESET_SENT)
    }

    /// Complete a password reset
    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
        client: &ClientInfo,
    ) -> Result<&'static str, AppError> {
        let request = request.validated()?;

        let user = self
            .repo
            .find_user_by_reset_token_hash(&hash_one_time_token(&request.token), Utc::now())
            .await?
            .ok_or_else(|| AppError::unauthorized(MSG_INVALID_RESET))?;

        let password_hash = self.credentials.hash(&request.new_password).await?;
        self.repo.update_password(user.id, &password_hash).await?;
        self.tokens
            .revocation()
            .clear_refresh_token(user.id)
            .await?;

        audit_log(&AuditEvent::PasswordResetCompleted {
            user_id: user.id,
            ip_address: client.ip_address.clone(),
        });

        Ok(MSG_PASSWORD_RESET)
    }

    /// Change the password of an authenticated user
    pub async fn change_password(
        &self,
        user: &User,
        request: ChangePasswordRequest,
        client: &ClientInfo,
    ) -> Result<&'static str, AppError> {
        let request = request.validated()?;

        if !self
            .credentials
            .verify(&request.current_password, &user.password_hash)
            .await?
        {
            return Err(AppError::unauthorized(MSG_WRONG_CURRENT_PASSWORD));
        }

        let password_hash = self.credentials.hash(&request.new_password).await?;
        self.repo.update_password(user.id, &password_hash).await?;
        self.tokens
            .revocation()
            .clear_refresh_token(user.id)
            .await?;

        audit_log(&AuditEvent::PasswordChanged {
            user_id: user.id,
            ip_address: client.ip_address.clone(),
        });

        Ok(MSG_PASSWORD_CHANGED)
    }

    /// Confirm an email address with its verification token
    pub async fn verify_email(
        &self,
        request: VerifyEmailRequest,
        client: &ClientInfo,
    ) -> Result<&'static str, AppError> {
        let request = request.validated()?;

        let user = self
            .repo
            .find_unverified_user_by_verification_token(&request.token)
            .await?
            .ok_or_else(|| AppError::unauthorized(MSG_INVALID_VERIFICATION))?;

        self.repo.mark_verified(user.id).await?;

        audit_log(&AuditEvent::EmailVerified {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: client.ip_address.clone(),
        });

        Ok(MSG_EMAIL_VERIFIED)
    }

    /// Issue a new verification token for an unverified user
    pub async fn resend_verification(
        &self,
        user: &User,
        client: &ClientInfo,
    ) -> Result<&'static str, AppError> {
        if user.is_verified {
            return Err(AppError::validation(MSG_ALREADY_VERIFIED));
        }

        let verification_token = generate_one_time_token();
        self.repo
            .set_verification_token(user.id, &verification_token)
            .await?;

        audit_log(&AuditEvent::VerificationTokenIssued {
            user_id: user.id,
            email: user.email.clone(),
            verification_token,
        });
        audit_log(&AuditEvent::VerificationEmailResent {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: client.ip_address.clone(),
        });

        Ok(MSG_VERIFICATION_SENT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtConfig;
    use crate::auth::password::PasswordConfig;
    use crate::auth::repository::MemoryAuthRepository;
    use crate::auth::revocation::RevocationStore;
    use crate::error::ErrorKind;
    use crate::store::MemoryStore;

    struct Fixture {
        service: AuthService,
        repo: Arc<MemoryAuthRepository>,
        store: Arc<MemoryStore>,
        client: ClientInfo,
    }

    fn fixture() -> Fixture {
        let repo = Arc::new(MemoryAuthRepository::new());
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenService::new(JwtConfig::default(), RevocationStore::new(store.clone()));
        let credentials = CredentialStore::new(PasswordConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        });

        Fixture {
            service: AuthService::new(repo.clone(), tokens, credentials),
            repo,
            store,
            client: ClientInfo::default(),
        }
    }

    fn register_request(email: &str, username: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            username: username.to_string(),
            password: "Abcdef1!".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
        }
    }

    fn login_request(email: &str, password: &str) -> LoginRequest {
        LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        }
    }

    #[test]
    fn test_one_time_tokens() {
        let a = generate_one_time_token();
        let b = generate_one_time_token();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(!a.contains('='));

        let digest = hash_one_time_token("abc");
        assert_eq!(
            digest,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_register_creates_session() {
        let f = fixture();
        let payload = f
            .service
            .register(register_request("A@Example.com", "alice"), &f.client)
            .await
            .unwrap();

        assert_eq!(payload.user.email, "a@example.com");
        assert_eq!(payload.expires_in, 7 * 24 * 60 * 60);
        assert!(!payload.user.is_verified);

        let stored = f
            .service
            .tokens()
            .revocation()
            .get_refresh_token(payload.user.id)
            .await
            .unwrap();
        assert_eq!(stored, Some(payload.refresh_token.clone()));

        let row = f.repo.user_by_email("a@example.com").await.unwrap();
        assert!(row.verification_token.is_some());
        assert!(row.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_conflicts() {
        let f = fixture();
        f.service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        let err = f
            .service
            .register(register_request("a@example.com", "bob"), &f.client)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Conflict);
        assert_eq!(err.message, MSG_EMAIL_TAKEN);

        let err = f
            .service
            .register(register_request("b@example.com", "alice"), &f.client)
            .await
            .unwrap_err();
        assert_eq!(err.message, MSG_USERNAME_TAKEN);
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let f = fixture();
        f.service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        let unknown = f
            .service
            .login(login_request("nobody@example.com", "Abcdef1!"), &f.client)
            .await
            .unwrap_err();
        let wrong = f
            .service
            .login(login_request("a@example.com", "Wrong123!"), &f.client)
            .await
            .unwrap_err();

        assert_eq!(unknown.kind, ErrorKind::Authentication);
        assert_eq!(unknown.message, wrong.message);
        assert_eq!(unknown.message, MSG_INVALID_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_login_rejects_inactive_account() {
        let f = fixture();
        let payload = f
            .service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();
        f.repo.set_active(payload.user.id, false).await;

        let err = f
            .service
            .login(login_request("a@example.com", "Abcdef1!"), &f.client)
            .await
            .unwrap_err();
        assert_eq!(err.message, MSG_ACCOUNT_DEACTIVATED);
    }

    #[tokio::test]
    async fn test_login_records_last_login() {
        let f = fixture();
        f.service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        f.service
            .login(login_request("a@example.com", "Abcdef1!"), &f.client)
            .await
            .unwrap();

        let row = f.repo.user_by_email("a@example.com").await.unwrap();
        assert!(row.last_login_at.is_some());
    }

    #[tokio::test]
    async fn test_refresh_rotation_invalidates_previous_token() {
        let f = fixture();
        let first = f
            .service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        let second = f
            .service
            .refresh(
                RefreshRequest {
                    refresh_token: Some(first.refresh_token.clone()),
                },
                &f.client,
            )
            .await
            .unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let replay = f
            .service
            .refresh(
                RefreshRequest {
                    refresh_token: Some(first.refresh_token),
                },
                &f.client,
            )
            .await
            .unwrap_err();
        assert_eq!(replay.message, MSG_INVALID_REFRESH);
    }

    #[tokio::test]
    async fn test_refresh_input_errors() {
        let f = fixture();

        let missing = f
            .service
            .refresh(RefreshRequest::default(), &f.client)
            .await
            .unwrap_err();
        assert_eq!(missing.kind, ErrorKind::Validation);
        assert_eq!(missing.message, MSG_REFRESH_REQUIRED);

        let payload = f
            .service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        // An access token is not a refresh token
        let wrong_kind = f
            .service
            .refresh(
                RefreshRequest {
                    refresh_token: Some(payload.token),
                },
                &f.client,
            )
            .await
            .unwrap_err();
        assert_eq!(wrong_kind.kind, ErrorKind::Authentication);
        assert_eq!(wrong_kind.message, MSG_INVALID_REFRESH);
    }

    #[tokio::test]
    async fn test_refresh_fails_closed_when_registry_unavailable() {
        let f = fixture();
        let payload = f
            .service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        f.store.set_unavailable(true);
        let err = f
            .service
            .refresh(
                RefreshRequest {
                    refresh_token: Some(payload.refresh_token),
                },
                &f.client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.message, MSG_INVALID_REFRESH);
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let f = fixture();
        let payload = f
            .service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        // Unknown email gets the same answer
        let message = f
            .service
            .forgot_password(
                ForgotPasswordRequest {
                    email: "nobody@example.com".to_string(),
                },
                &f.client,
            )
            .await
            .unwrap();
        assert_eq!(message, MSG_RESET_SENT);

        // Plant a known token the way forgot_password does
        let token = generate_one_time_token();
        f.repo
            .set_reset_token(
                payload.user.id,
                &hash_one_time_token(&token),
                Utc::now() + Duration::hours(1),
            )
            .await
            .unwrap();

        let bad = f
            .service
            .reset_password(
                ResetPasswordRequest {
                    token: "wrong".to_string(),
                    new_password: "Newpass1!".to_string(),
                },
                &f.client,
            )
            .await
            .unwrap_err();
        assert_eq!(bad.message, MSG_INVALID_RESET);

        let ok = f
            .service
            .reset_password(
                ResetPasswordRequest {
                    token: token.clone(),
                    new_password: "Newpass1!".to_string(),
                },
                &f.client,
            )
            .await
            .unwrap();
        assert_eq!(ok, MSG_PASSWORD_RESET);

        // Token is single use and the session registry is cleared
        assert!(f
            .service
            .reset_password(
                ResetPasswordRequest {
                    token,
                    new_password: "Another1!".to_string(),
                },
                &f.client,
            )
            .await
            .is_err());
        assert_eq!(
            f.service
                .tokens()
                .revocation()
                .get_refresh_token(payload.user.id)
                .await
                .unwrap(),
            None
        );

        f.service
            .login(login_request("a@example.com", "Newpass1!"), &f.client)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_expired_reset_token_rejected() {
        let f = fixture();
        let payload = f
            .service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        let token = generate_one_time_token();
        f.repo
            .set_reset_token(
                payload.user.id,
                &hash_one_time_token(&token),
                Utc::now() - Duration::minutes(1),
            )
            .await
            .unwrap();

        let err = f
            .service
            .reset_password(
                ResetPasswordRequest {
                    token,
                    new_password: "Newpass1!".to_string(),
                },
                &f.client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 401);
        assert_eq!(err.message, MSG_INVALID_RESET);

        // The old password still works
        f.service
            .login(login_request("a@example.com", "Abcdef1!"), &f.client)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_forgot_password_stores_only_the_digest() {
        let f = fixture();
        f.service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        f.service
            .forgot_password(
                ForgotPasswordRequest {
                    email: "a@example.com".to_string(),
                },
                &f.client,
            )
            .await
            .unwrap();

        let row = f.repo.user_by_email("a@example.com").await.unwrap();
        let stored = row.reset_token_hash.unwrap();
        assert_eq!(stored.len(), 64);
        assert!(row.reset_token_expires_at.unwrap() > Utc::now());
    }

    #[tokio::test]
    async fn test_change_password() {
        let f = fixture();
        f.service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();
        let user = f.repo.user_by_email("a@example.com").await.unwrap();

        let err = f
            .service
            .change_password(
                &user,
                ChangePasswordRequest {
                    current_password: "Wrong123!".to_string(),
                    new_password: "Newpass1!".to_string(),
                },
                &f.client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.message, MSG_WRONG_CURRENT_PASSWORD);

        f.service
            .change_password(
                &user,
                ChangePasswordRequest {
                    current_password: "Abcdef1!".to_string(),
                    new_password: "Newpass1!".to_string(),
                },
                &f.client,
            )
            .await
            .unwrap();

        assert_eq!(
            f.service
                .tokens()
                .revocation()
                .get_refresh_token(user.id)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_email_verification() {
        let f = fixture();
        f.service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();
        let user = f.repo.user_by_email("a@example.com").await.unwrap();
        let token = user.verification_token.clone().unwrap();

        let err = f
            .service
            .verify_email(
                VerifyEmailRequest {
                    token: "nope".to_string(),
                },
                &f.client,
            )
            .await
            .unwrap_err();
        assert_eq!(err.message, MSG_INVALID_VERIFICATION);

        f.service
            .verify_email(VerifyEmailRequest { token }, &f.client)
            .await
            .unwrap();

        let verified = f.repo.user_by_email("a@example.com").await.unwrap();
        assert!(verified.is_verified);

        let err = f
            .service
            .resend_verification(&verified, &f.client)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert_eq!(err.message, MSG_ALREADY_VERIFIED);
    }

    #[tokio::test]
    async fn test_resend_verification_rotates_token() {
        let f = fixture();
        f.service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();
        let user = f.repo.user_by_email("a@example.com").await.unwrap();
        let old = user.verification_token.clone();

        let message = f
            .service
            .resend_verification(&user, &f.client)
            .await
            .unwrap();
        assert_eq!(message, MSG_VERIFICATION_SENT);

        let row = f.repo.user_by_email("a@example.com").await.unwrap();
        assert!(row.verification_token.is_some());
        assert_ne!(row.verification_token, old);
    }

    #[tokio::test]
    async fn test_resolve_access_token() {
        let f = fixture();
        let payload = f
            .service
            .register(register_request("a@example.com", "alice"), &f.client)
            .await
            .unwrap();

        let user = f.service.resolve_access_token(&payload.token).await.unwrap();
        assert_eq!(user.id, payload.user.id);

        let err = f
            .service
            .resolve_access_token("garbage")
            .await
            .unwrap_err();
        assert_eq!(err.message, MSG_INVALID_TOKEN);

        f.repo.set_active(payload.user.id, false).await;
        let err = f
            .service
            .resolve_access_token(&payload.token)
            .await
            .unwrap_err();
        assert_eq!(err.message, MSG_USER_INACTIVE);
    }
}
