//! Application state management
//!
//! Every service is built once here and shared through `Arc<AppState>`;
//! nothing is process-global.
//!
//! Author: hephaex@gmail.com

use crate::auth::{
    AuthRepository, AuthService, CredentialStore, JwtConfig, PasswordConfig, PgAuthRepository,
    RevocationStore, TokenService,
};
use crate::middleware::RateLimiter;
use crate::realtime::RealtimeHub;
use crate::store::{KeyValueStore, RedisStore};
use anyhow::Context;
use devforge_core::config::{AppConfig, ConfigError};
use sqlx::postgres::PgPoolOptions;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Account and project rows
    pub repo: Arc<dyn AuthRepository>,
    /// Shared key-value store (blacklist, refresh registry, rate limits)
    pub store: Arc<dyn KeyValueStore>,
    pub tokens: TokenService,
    pub auth: AuthService,
    pub rate_limiter: RateLimiter,
    pub realtime: RealtimeHub,
    /// Server start time
    pub start_time: Instant,
    /// Request counter
    pub request_count: AtomicU64,
    /// Responses with status 400 and above
    pub error_count: AtomicU64,
    /// Ready status
    pub is_ready: AtomicBool,
}

impl AppState {
    /// Wire the services over an existing repository and store
    pub fn new(
        config: AppConfig,
        repo: Arc<dyn AuthRepository>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, ConfigError> {
        let jwt = JwtConfig::from_auth_config(&config.auth)?;
        let passwords = PasswordConfig::from_auth_config(&config.auth);
        Ok(Self::with_services(config, repo, store, jwt, passwords))
    }

    /// Same as [`AppState::new`] with explicit token and hashing settings
    pub fn with_services(
        config: AppConfig,
        repo: Arc<dyn AuthRepository>,
        store: Arc<dyn KeyValueStore>,
        jwt: JwtConfig,
        passwords: PasswordConfig,
    ) -> Self {
        let tokens = TokenService::new(jwt, RevocationStore::new(store.clone()));
        let auth = AuthService::new(repo.clone(), tokens.clone(), CredentialStore::new(passwords));
        let rate_limiter = RateLimiter::new(store.clone(), &config.rate_limit);

        Self {
            config,
            repo,
            store,
            tokens,
            auth,
            rate_limiter,
            realtime: RealtimeHub::new(),
            start_time: Instant::now(),
            request_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            is_ready: AtomicBool::new(true),
        }
    }

    /// Connect to PostgreSQL and Redis, run migrations, and build the state
    pub async fn connect(config: AppConfig) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.database.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(&config.database.postgres_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        tracing::info!("Database connection established");

        let repo = PgAuthRepository::new(pool);
        if config.database.run_migrations {
            repo.migrate().await.context("Failed to run migrations")?;
            tracing::info!("Database migrations applied");
        }

        let store = RedisStore::connect(&config.redis.url)
            .await
            .context("Failed to connect to Redis")?;
        tracing::info!("Redis connection established");

        Ok(Self::new(config, Arc::new(repo), Arc::new(store))?)
    }

    /// Increment request counter
    pub fn increment_requests(&self) -> u64 {
        self.request_count.fetch_add(1, Ordering::SeqCst)
    }

    /// Get total request count
    pub fn get_request_count(&self) -> u64 {
        self.request_count.load(Ordering::SeqCst)
    }

    pub fn increment_errors(&self) -> u64 {
        self.error_count.fetch_add(1, Ordering::SeqCst)
    }

    pub fn get_error_count(&self) -> u64 {
        self.error_count.load(Ordering::SeqCst)
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if service is ready
    pub fn is_ready(&self) -> bool {
        self.is_ready.load(Ordering::SeqCst)
    }

    /// Set ready status
    pub fn set_ready(&self, ready: bool) {
        self.is_ready.store(ready, Ordering::SeqCst);
    }

    /// Probe the database; `Err` carries the failure for health output
    pub async fn check_database(&self) -> Result<(), String> {
        self.repo.ping().await.map_err(|e| e.to_string())
    }

    pub async fn check_redis(&self) -> Result<(), String> {
        self.store.ping().await.map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::MemoryAuthRepository;
    use crate::store::MemoryStore;

    fn state() -> AppState {
        AppState::new(
            AppConfig::default(),
            Arc::new(MemoryAuthRepository::new()),
            Arc::new(MemoryStore::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_counters() {
        let state = state();
        assert_eq!(state.get_request_count(), 0);
        state.increment_requests();
        state.increment_requests();
        state.increment_errors();
        assert_eq!(state.get_request_count(), 2);
        assert_eq!(state.get_error_count(), 1);
    }

    #[test]
    fn test_ready_flag() {
        let state = state();
        assert!(state.is_ready());
        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn test_rate_limiter_follows_config() {
        let state = state();
        assert_eq!(state.rate_limiter.window_secs(), 900);
        assert_eq!(state.rate_limiter.max_requests(), 100);
    }

    #[tokio::test]
    async fn test_dependency_checks() {
        let repo = Arc::new(MemoryAuthRepository::new());
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(AppConfig::default(), repo.clone(), store.clone()).unwrap();

        assert!(state.check_database().await.is_ok());
        assert!(state.check_redis().await.is_ok());

        repo.set_unavailable(true);
        store.set_unavailable(true);
        assert!(state.check_database().await.is_err());
        assert!(state.check_redis().await.is_err());
    }
}
