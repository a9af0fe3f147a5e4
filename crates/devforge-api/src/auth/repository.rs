//! Authentication repository
//!
//! Row-oriented data access for accounts and the project rows consulted by
//! access checks:
//! - [`PgAuthRepository`]: PostgreSQL via sqlx
//! - [`MemoryAuthRepository`]: in-process maps for tests (`test-utils`)
//!
//! Both enforce unique email and username; a violation surfaces as
//! `DevforgeError::Conflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use devforge_core::{DevforgeError, NewUser, Project, ProjectMember, Result, Role, User};
use sqlx::PgPool;
use uuid::Uuid;

/// Data access for the session-security layer
#[async_trait]
pub trait AuthRepository: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>>;

    /// Exact match; callers lowercase the address first
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;

    /// Insert an active, unverified `user`-role account
    async fn create_user(&self, user: NewUser) -> Result<User>;

    async fn record_login(&self, id: Uuid) -> Result<()>;

    /// Replace the password hash and clear any pending reset token
    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()>;

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;

    /// User holding `token_hash` whose reset window is still open at `now`
    async fn find_user_by_reset_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>>;

    async fn set_verification_token(&self, id: Uuid, token: &str) -> Result<()>;

    async fn find_unverified_user_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>>;

    /// Set `is_verified`, stamp `email_verified_at`, drop the token
    async fn mark_verified(&self, id: Uuid) -> Result<()>;

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>>;

    async fn find_project_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectMember>>;

    /// Round-trip check used by health probes
    async fn ping(&self) -> Result<()>;
}

const USER_COLUMNS: &str = "id, email, username, password_hash, first_name, last_name, role, \
     is_active, is_verified, verification_token, reset_token_hash, reset_token_expires_at, \
     last_login_at, email_verified_at, created_at, updated_at";

/// Internal user record from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    username: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    role: String,
    is_active: bool,
    is_verified: bool,
    verification_token: Option<String>,
    reset_token_hash: Option<String>,
    reset_token_expires_at: Option<DateTime<Utc>>,
    last_login_at: Option<DateTime<Utc>>,
    email_verified_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRecord> for User {
    type Error = DevforgeError;

    fn try_from(record: UserRecord) -> Result<Self> {
        Ok(User {
            id: record.id,
            email: record.email,
            username: record.username,
            password_hash: record.password_hash,
            first_name: record.first_name,
            last_name: record.last_name,
            role: record.role.parse::<Role>()?,
            is_active: record.is_active,
            is_verified: record.is_verified,
            verification_token: record.verification_token,
            reset_token_hash: record.reset_token_hash,
            reset_token_expires_at: record.reset_token_expires_at,
            last_login_at: record.last_login_at,
            email_verified_at: record.email_verified_at,
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProjectRecord {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    description: Option<String>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProjectMemberRecord {
    id: Uuid,
    project_id: Uuid,
    user_id: Uuid,
    role: String,
}

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgAuthRepository {
    pool: PgPool,
}

impl PgAuthRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply embedded migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DevforgeError::DatabaseError(format!("Migration failed: {e}")))
    }

    async fn fetch_user(&self, filter: &str, value: &str) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {filter}");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;

        record.map(User::try_from).transpose()
    }
}

#[async_trait]
impl AuthRepository for PgAuthRepository {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        record.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_user("email = $1", email).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.fetch_user("username = $1", username).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (id, email, username, password_hash, first_name, last_name, role,
                               is_active, is_verified, verification_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'user', true, false, $7, NOW(), NOW())
            RETURNING {USER_COLUMNS}
            "#
        );

        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.username)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.verification_token)
            .fetch_one(&self.pool)
            .await?;

        User::try_from(record)
    }

    async fn record_login(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE users SET last_login_at = NOW(), updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = $1, reset_token_hash = NULL, reset_token_expires_at = NULL,
                updated_at = NOW()
            WHERE id = $2
            "#,
        )
        .bind(password_hash)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET reset_token_hash = $1, reset_token_expires_at = $2, updated_at = NOW() WHERE id = $3",
        )
        .bind(token_hash)
        .bind(expires_at)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_reset_token_hash(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE reset_token_hash = $1 AND reset_token_expires_at > $2"
        );
        let record = sqlx::query_as::<_, UserRecord>(&sql)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        record.map(User::try_from).transpose()
    }

    async fn set_verification_token(&self, id: Uuid, token: &str) -> Result<()> {
        sqlx::query(
            "UPDATE users SET verification_token = $1, updated_at = NOW() WHERE id = $2",
        )
        .bind(token)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_unverified_user_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>> {
        self.fetch_user("verification_token = $1 AND is_verified = false", token)
            .await
    }

    async fn mark_verified(&self, id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET is_verified = true, verification_token = NULL, email_verified_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_project(&self, id: Uuid) -> Result<Option<Project>> {
        let record = sqlx::query_as::<_, ProjectRecord>(
            "SELECT id, owner_id, name, description FROM projects WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(|r| Project {
            id: r.id,
            owner_id: r.owner_id,
            name: r.name,
            description: r.description,
        }))
    }

    async fn find_project_member(
        &self,
        project_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ProjectMember>> {
        let record = sqlx::query_as::<_, ProjectMemberRecord>(
            "SELECT id, project_id, user_id, role FROM project_members WHERE project_id = $1 AND user_id = $2",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(|r| ProjectMember {
            id: r.id,
            project_id: r.project_id,
            user_id: r.user_id,
            role: r.role,
        }))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryAuthRepository;

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    #[derive(Default)]
    struct Tables {
        users: HashMap<Uuid, User>,
        projects: HashMap<Uuid, Project>,
        members: Vec<ProjectMember>,
    }

    /// In-process repository with the same uniqueness rules as the schema
    #[derive(Default)]
    pub struct MemoryAuthRepository {
        tables: RwLock<Tables>,
        unavailable: AtomicBool,
    }

    impl MemoryAuthRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Simulate a database outage
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }

        fn check_available(&self) -> Result<()> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(DevforgeError::DatabaseError(
                    "connection refused".to_string(),
                ));
            }
            Ok(())
        }

        pub async fn insert_project(
            &self,
            owner_id: Uuid,
            name: &str,
            description: Option<&str>,
        ) -> Project {
            let project = Project {
                id: Uuid::new_v4(),
                owner_id,
                name: name.to_string(),
                description: description.map(str::to_string),
            };
            self.tables
                .write()
                .await
                .projects
                .insert(project.id, project.clone());
            project
        }

        pub async fn add_member(&self, project_id: Uuid, user_id: Uuid, role: &str) -> ProjectMember {
            let member = ProjectMember {
                id: Uuid::new_v4(),
                project_id,
                user_id,
                role: role.to_string(),
            };
            self.tables.write().await.members.push(member.clone());
            member
        }

        pub async fn set_active(&self, id: Uuid, active: bool) {
            if let Some(user) = self.tables.write().await.users.get_mut(&id) {
                user.is_active = active;
            }
        }

        pub async fn set_role(&self, id: Uuid, role: Role) {
            if let Some(user) = self.tables.write().await.users.get_mut(&id) {
                user.role = role;
            }
        }

        /// Direct row access for assertions
        pub async fn user_by_email(&self, email: &str) -> Option<User> {
            self.tables
                .read()
                .await
                .users
                .values()
                .find(|u| u.email == email)
                .cloned()
        }

        async fn update_user(&self, id: Uuid, f: impl FnOnce(&mut User)) -> Result<()> {
            self.check_available()?;
            if let Some(user) = self.tables.write().await.users.get_mut(&id) {
                f(user);
                user.updated_at = Utc::now();
            }
            Ok(())
        }

        async fn find_user(&self, pred: impl Fn(&User) -> bool) -> Result<Option<User>> {
            self.check_available()?;
            Ok(self
                .tables
                .read()
                .await
                .users
                .values()
                .find(|u| pred(u))
                .cloned())
        }
    }

    #[async_trait]
    impl AuthRepository for MemoryAuthRepository {
        async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
            self.check_available()?;
            Ok(self.tables.read().await.users.get(&id).cloned())
        }

        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
            self.find_user(|u| u.email == email).await
        }

        async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
            self.find_user(|u| u.username == username).await
        }

        async fn create_user(&self, user: NewUser) -> Result<User> {
            self.check_available()?;
            let mut tables = self.tables.write().await;

            if tables
                .users
                .values()
                .any(|u| u.email == user.email || u.username == user.username)
            {
                return Err(DevforgeError::from_sqlstate(
                    Some(devforge_core::sqlstate::UNIQUE_VIOLATION),
                    "duplicate key value violates unique constraint",
                ));
            }

            let now = Utc::now();
            let created = User {
                id: Uuid::new_v4(),
                email: user.email,
                username: user.username,
                password_hash: user.password_hash,
                first_name: user.first_name,
                last_name: user.last_name,
                role: Role::User,
                is_active: true,
                is_verified: false,
                verification_token: user.verification_token,
                reset_token_hash: None,
                reset_token_expires_at: None,
                last_login_at: None,
                email_verified_at: None,
                created_at: now,
                updated_at: now,
            };
            tables.users.insert(created.id, created.clone());
            Ok(created)
        }

        async fn record_login(&self, id: Uuid) -> Result<()> {
            self.update_user(id, |u| u.last_login_at = Some(Utc::now()))
                .await
        }

        async fn update_password(&self, id: Uuid, password_hash: &str) -> Result<()> {
            self.update_user(id, |u| {
                u.password_hash = password_hash.to_string();
                u.reset_token_hash = None;
                u.reset_token_expires_at = None;
            })
            .await
        }

        async fn set_reset_token(
            &self,
            id: Uuid,
            token_hash: &str,
            expires_at: DateTime<Utc>,
        ) -> Result<()> {
            self.update_user(id, |u| {
                u.reset_token_hash = Some(token_hash.to_string());
                u.reset_token_expires_at = Some(expires_at);
            })
            .await
        }

        async fn find_user_by_reset_token_hash(
            &self,
            token_hash: &str,
            now: DateTime<Utc>,
        ) -> Result<Option<User>> {
            self.find_user(|u| {
                u.reset_token_hash.as_deref() == Some(token_hash)
                    && u.reset_token_expires_at.is_some_and(|at| at > now)
            })
            .await
        }

        async fn set_verification_token(&self, id: Uuid, token: &str) -> Result<()> {
            self.update_user(id, |u| u.verification_token = Some(token.to_string()))
                .await
        }

        async fn find_unverified_user_by_verification_token(
            &self,
            token: &str,
        ) -> Result<Option<User>> {
            self.find_user(|u| !u.is_verified && u.verification_token.as_deref() == Some(token))
                .await
        }

        async fn mark_verified(&self, id: Uuid) -> Result<()> {
            self.update_user(id, |u| {
                u.is_verified = true;
                u.verification_token = None;
                u.email_verified_at = Some(Utc::now());
            })
            .await
        }

        async fn find_project(&self, id: Uuid) -> Result<Option<Project>> {
            self.check_available()?;
            Ok(self.tables.read().await.projects.get(&id).cloned())
        }

        async fn find_project_member(
            &self,
            project_id: Uuid,
            user_id: Uuid,
        ) -> Result<Option<ProjectMember>> {
            self.check_available()?;
            Ok(self
                .tables
                .read()
                .await
                .members
                .iter()
                .find(|m| m.project_id == project_id && m.user_id == user_id)
                .cloned())
        }

        async fn ping(&self) -> Result<()> {
            self.check_available()
        }
    }
}
