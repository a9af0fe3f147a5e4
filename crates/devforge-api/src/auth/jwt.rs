//! JWT token generation and validation
//!
//! Implements JWT-based authentication with HMAC-SHA256 signing.
//! Access and refresh tokens share the signing secret and claim shape; the
//! `typ` claim keeps one from being accepted where the other is expected.
//!
//! Token lifecycle: issued -> valid -> (expired | revoked). Expiry is checked
//! locally from the signed claims, revocation against the blacklist.

use super::revocation::RevocationStore;
use devforge_core::{AuthConfig, ConfigError, Role, User};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

/// Which of the two token kinds a JWT is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// JWT Claims structure containing user information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Token issuer
    pub iss: String,
    /// Subject - user ID
    pub sub: String,
    /// JWT ID - makes every issued token unique
    pub jti: String,
    /// Issued at timestamp (Unix epoch)
    pub iat: u64,
    /// Expiration timestamp (Unix epoch)
    pub exp: u64,
    /// User's email address
    pub email: String,
    /// User's role
    pub role: Role,
    /// Access or refresh
    pub typ: TokenKind,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|_| JwtError::InvalidToken)
    }

    /// Seconds left before expiry, zero once expired
    pub fn remaining_secs(&self, now: u64) -> u64 {
        self.exp.saturating_sub(now)
    }
}

/// JWT token generation and validation errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Failed to encode JWT: {0}")]
    EncodingError(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid token format")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Unexpected token type")]
    WrongTokenType,

    #[error("Token has been revoked")]
    Revoked,

    #[error("System time error: {0}")]
    SystemTimeError(#[from] std::time::SystemTimeError),

    #[error("Token lifetime of {0}s overflows the expiry timestamp")]
    ExpiryOverflow(u64),
}

/// JWT Configuration
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Secret key for HMAC signing
    pub secret: String,
    /// Access token lifetime in seconds (default: 7 days)
    pub access_ttl_secs: u64,
    /// Refresh token lifetime in seconds (default: 30 days)
    pub refresh_ttl_secs: u64,
    /// Token issuer identifier
    pub issuer: String,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "development-secret-key-change-this-in-production".to_string(),
            access_ttl_secs: 7 * 24 * 60 * 60,
            refresh_ttl_secs: 30 * 24 * 60 * 60,
            issuer: "devforge-api".to_string(),
        }
    }
}

impl JwtConfig {
    pub fn from_auth_config(auth: &AuthConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            secret: auth.jwt_secret.clone(),
            access_ttl_secs: auth.access_ttl_secs()?,
            refresh_ttl_secs: auth.refresh_ttl_secs()?,
            issuer: auth.jwt_issuer.clone(),
        })
    }

    pub fn ttl_secs(&self, kind: TokenKind) -> u64 {
        match kind {
            TokenKind::Access => self.access_ttl_secs,
            TokenKind::Refresh => self.refresh_ttl_secs,
        }
    }
}

/// Access and refresh token issued together
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

pub(crate) fn unix_now() -> Result<u64, JwtError> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

/// Issues and verifies signed tokens
#[derive(Clone)]
pub struct TokenService {
    config: Arc<JwtConfig>,
    revocation: RevocationStore,
}

impl TokenService {
    pub fn new(config: JwtConfig, revocation: RevocationStore) -> Self {
        Self {
            config: Arc::new(config),
            revocation,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn revocation(&self) -> &RevocationStore {
        &self.revocation
    }

    /// Issue an access token expiring after the configured access TTL
    pub fn issue_access(&self, user_id: Uuid, email: &str, role: Role) -> Result<String, JwtError> {
        self.issue(TokenKind::Access, user_id, email, role)
    }

    /// Issue a refresh token expiring after the configured refresh TTL
    pub fn issue_refresh(
        &self,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, JwtError> {
        self.issue(TokenKind::Refresh, user_id, email, role)
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, JwtError> {
        Ok(TokenPair {
            access_token: self.issue_access(user.id, &user.email, user.role)?,
            refresh_token: self.issue_refresh(user.id, &user.email, user.role)?,
        })
    }

    fn issue(
        &self,
        kind: TokenKind,
        user_id: Uuid,
        email: &str,
        role: Role,
    ) -> Result<String, JwtError> {
        let now = unix_now()?;
        let ttl = self.config.ttl_secs(kind);
        let exp = now.checked_add(ttl).ok_or(JwtError::ExpiryOverflow(ttl))?;

        let claims = Claims {
            iss: self.config.issuer.clone(),
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp,
            email: email.to_string(),
            role,
            typ: kind,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// Check signature, expiry, issuer, and token kind; no store access
    pub fn verify_signature(&self, token: &str, kind: TokenKind) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.leeway = 0;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::ExpiredToken,
            jsonwebtoken::errors::ErrorKind::InvalidSignature => JwtError::InvalidSignature,
            _ => JwtError::InvalidToken,
        })?;

        if token_data.claims.typ != kind {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Fully verify an access token
    ///
    /// Signature and expiry are checked first so garbage tokens never cost a
    /// store round trip. A failing blacklist lookup is logged and the token is
    /// treated as not revoked.
    pub async fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.verify_signature(token, TokenKind::Access)?;

        match self.revocation.is_blacklisted(token).await {
            Ok(true) => Err(JwtError::Revoked),
            Ok(false) => Ok(claims),
            Err(e) => {
                tracing::error!(error = %e, "Blacklist lookup failed, accepting token");
                Ok(claims)
            }
        }
    }
}

/// Read claims without checking signature or expiry
///
/// Only for computing the remaining lifetime of a token that was already
/// verified earlier in the request; never use it to authorize anything.
pub fn decode_unverified(token: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|_| JwtError::InvalidToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service_with(config: JwtConfig) -> TokenService {
        TokenService::new(config, RevocationStore::new(Arc::new(MemoryStore::new())))
    }

    fn service() -> TokenService {
        service_with(JwtConfig::default())
    }

    fn encode_claims(config: &JwtConfig, claims: &Claims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(config.secret.as_bytes()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_issue_and_verify_access_token() {
        let tokens = service();
        let user_id = Uuid::new_v4();

        let token = tokens
            .issue_access(user_id, "test@example.com", Role::User)
            .unwrap();
        let claims = tokens.verify(&token).await.unwrap();

        assert_eq!(claims.user_id().unwrap(), user_id);
        assert_eq!(claims.email, "test@example.com");
        assert_eq!(claims.role, Role::User);
        assert_eq!(claims.typ, TokenKind::Access);
        assert_eq!(claims.iss, "devforge-api");
        assert_eq!(claims.exp - claims.iat, 7 * 24 * 60 * 60);
    }

    #[test]
    fn test_refresh_token_lifetime() {
        let tokens = service();
        let token = tokens
            .issue_refresh(Uuid::new_v4(), "test@example.com", Role::Admin)
            .unwrap();
        let claims = tokens.verify_signature(&token, TokenKind::Refresh).unwrap();

        assert_eq!(claims.exp - claims.iat, 30 * 24 * 60 * 60);
        assert_eq!(claims.role, Role::Admin);
    }

    #[test]
    fn test_tokens_are_unique() {
        let tokens = service();
        let id = Uuid::new_v4();
        let a = tokens.issue_refresh(id, "x@y.com", Role::User).unwrap();
        let b = tokens.issue_refresh(id, "x@y.com", Role::User).unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_access_token() {
        let tokens = service();
        let refresh = tokens
            .issue_refresh(Uuid::new_v4(), "test@example.com", Role::User)
            .unwrap();

        assert!(matches!(
            tokens.verify(&refresh).await,
            Err(JwtError::WrongTokenType)
        ));

        let access = tokens
            .issue_access(Uuid::new_v4(), "test@example.com", Role::User)
            .unwrap();
        assert!(matches!(
            tokens.verify_signature(&access, TokenKind::Refresh),
            Err(JwtError::WrongTokenType)
        ));
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let tokens = service();
        assert!(matches!(
            tokens.verify("invalid.token.here").await,
            Err(JwtError::InvalidToken)
        ));
    }

    #[tokio::test]
    async fn test_wrong_secret() {
        let issuer = service_with(JwtConfig {
            secret: "secret1".to_string(),
            ..Default::default()
        });
        let verifier = service_with(JwtConfig {
            secret: "secret2".to_string(),
            ..Default::default()
        });

        let token = issuer
            .issue_access(Uuid::new_v4(), "test@example.com", Role::User)
            .unwrap();

        assert!(matches!(
            verifier.verify(&token).await,
            Err(JwtError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn test_expired_token() {
        let config = JwtConfig::default();
        let tokens = service_with(config.clone());
        let now = unix_now().unwrap();

        // Create a token that expired 1 hour ago
        let claims = Claims {
            iss: config.issuer.clone(),
            sub: Uuid::new_v4().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now - 7200,
            exp: now - 3600,
            email: "test@example.com".to_string(),
            role: Role::User,
            typ: TokenKind::Access,
        };

        let token = encode_claims(&config, &claims);
        assert!(matches!(
            tokens.verify(&token).await,
            Err(JwtError::ExpiredToken)
        ));
    }

    #[tokio::test]
    async fn test_token_expires_after_ttl_elapses() {
        let tokens = service_with(JwtConfig {
            access_ttl_secs: 1,
            ..Default::default()
        });
        let token = tokens
            .issue_access(Uuid::new_v4(), "test@example.com", Role::User)
            .unwrap();

        assert!(tokens.verify(&token).await.is_ok());

        std::thread::sleep(std::time::Duration::from_millis(2100));

        assert!(matches!(
            tokens.verify(&token).await,
            Err(JwtError::ExpiredToken)
        ));
    }

    #[test]
    fn test_expiry_overflow_is_an_error() {
        let tokens = service_with(JwtConfig {
            refresh_ttl_secs: u64::MAX - 1,
            ..Default::default()
        });

        assert!(matches!(
            tokens.issue_refresh(Uuid::new_v4(), "test@example.com", Role::User),
            Err(JwtError::ExpiryOverflow(ttl)) if ttl == u64::MAX - 1
        ));
        assert!(tokens
            .issue_access(Uuid::new_v4(), "test@example.com", Role::User)
            .is_ok());
    }

    #[tokio::test]
    async fn test_blacklisted_token_is_revoked() {
        let tokens = service();
        let token = tokens
            .issue_access(Uuid::new_v4(), "test@example.com", Role::User)
            .unwrap();

        tokens.revocation().blacklist(&token, 60).await.unwrap();

        assert!(matches!(tokens.verify(&token).await, Err(JwtError::Revoked)));
        // Signature-only check does not consult the blacklist
        assert!(tokens.verify_signature(&token, TokenKind::Access).is_ok());
    }

    #[tokio::test]
    async fn test_blacklist_outage_fails_open() {
        let store = Arc::new(MemoryStore::new());
        let tokens = TokenService::new(JwtConfig::default(), RevocationStore::new(store.clone()));
        let token = tokens
            .issue_access(Uuid::new_v4(), "test@example.com", Role::User)
            .unwrap();

        store.set_unavailable(true);
        assert!(tokens.verify(&token).await.is_ok());
    }

    #[test]
    fn test_decode_unverified_reads_expired_and_foreign_tokens() {
        let config = JwtConfig {
            secret: "someone-else".to_string(),
            ..Default::default()
        };
        let now = unix_now().unwrap();
        let claims = Claims {
            iss: "other".to_string(),
            sub: Uuid::new_v4().to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now - 100,
            exp: now - 50,
            email: "test@example.com".to_string(),
            role: Role::User,
            typ: TokenKind::Access,
        };
        let token = encode_claims(&config, &claims);

        let decoded = decode_unverified(&token).unwrap();
        assert_eq!(decoded, claims);
        assert_eq!(decoded.remaining_secs(now), 0);

        assert!(decode_unverified("not-a-jwt").is_err());
    }
}
