//! Authentication and authorization
//!
//! Provides:
//! - Password hashing with Argon2
//! - JWT access and refresh tokens with revocation
//! - Account flows (register, login, refresh, password reset, email verification)
//! - Authentication middleware and role/project policy guards
//!
//! Author: hephaex@gmail.com

pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod policy;
pub mod repository;
pub mod revocation;
pub mod service;

pub use jwt::{decode_unverified, Claims, JwtConfig, JwtError, TokenKind, TokenPair, TokenService};
pub use middleware::{authenticate, logout, optional_auth, AuthContext, AuthenticatedUserId};
pub use password::{CredentialStore, PasswordConfig, PasswordError};
pub use policy::{
    require_admin, require_project_access, require_role, require_user_or_admin, AccessRelation,
    ProjectAccess,
};
pub use repository::{AuthRepository, PgAuthRepository};
pub use revocation::RevocationStore;
pub use service::AuthService;

#[cfg(any(test, feature = "test-utils"))]
pub use repository::MemoryAuthRepository;
