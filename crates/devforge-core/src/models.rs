//! Domain models for accounts and projects
//!
//! - `User`: account row including credentials (never serialized)
//! - `UserPublic`: the client-facing view of a user
//! - `Project` / `ProjectMember`: rows consulted by project access checks
//!
//! Author: hephaex@gmail.com

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Account role
///
/// Closed set of roles a user can hold:
/// - User: regular account (default at registration)
/// - Admin: full access, including every project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = crate::DevforgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(crate::DevforgeError::ValidationError(format!(
                "Unknown role: {other}"
            ))),
        }
    }
}

/// User account
///
/// Holds the password hash and one-time tokens, so it deliberately does not
/// implement `Serialize`. Convert with [`User::to_public`] before responding.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub verification_token: Option<String>,
    pub reset_token_hash: Option<String>,
    pub reset_token_expires_at: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }

    pub fn to_public(&self) -> UserPublic {
        UserPublic {
            id: self.id,
            email: self.email.clone(),
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            role: self.role,
            is_active: self.is_active,
            is_verified: self.is_verified,
            last_login_at: self.last_login_at,
            email_verified_at: self.email_verified_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Client-facing user representation without any secret material
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_verified: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert payload for a freshly registered account
///
/// Role is always `user`, the account starts active and unverified.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub verification_token: Option<String>,
}

/// Project row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Project {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
}

/// Project membership row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProjectMember {
    pub id: Uuid,
    pub project_id: Uuid,
    pub user_id: Uuid,
    pub role: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            username: "abuser".to_string(),
            password_hash: "$argon2id$v=19$secret".to_string(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            role: Role::User,
            is_active: true,
            is_verified: false,
            verification_token: Some("verify-me".to_string()),
            reset_token_hash: Some("reset-hash".to_string()),
            reset_token_expires_at: Some(now),
            last_login_at: None,
            email_verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_parse_and_display() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("USER".parse::<Role>().unwrap(), Role::User);
        assert!("editor".parse::<Role>().is_err());
        assert_eq!(Role::Admin.to_string(), "admin");
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        let role: Role = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_public_user_has_no_secrets() {
        let user = sample_user();
        let json = serde_json::to_string(&user.to_public()).unwrap();

        assert!(json.contains("a@b.com"));
        assert!(!json.contains("password"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("reset"));
        assert!(!json.contains("verify-me"));
    }

    #[test]
    fn test_is_admin() {
        let mut user = sample_user();
        assert!(!user.is_admin());
        user.role = Role::Admin;
        assert!(user.is_admin());
    }
}
