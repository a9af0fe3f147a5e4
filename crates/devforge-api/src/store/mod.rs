//! Key-value store with per-key expiry
//!
//! Backs the token blacklist, the refresh-token registry, and the rate limiter.
//! Production uses Redis; tests use an in-process map with the same semantics.
//!
//! Author: hephaex@gmail.com

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;
pub mod redis;

#[cfg(any(test, feature = "test-utils"))]
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use thiserror::Error;

/// Key-value store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Snapshot of a fixed-window counter after an increment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCount {
    /// Requests counted in the current window, including this one
    pub count: u64,
    /// Seconds until the window resets
    pub ttl_secs: u64,
}

/// Key-value operations needed by the session-security layer
///
/// Every operation is a single-key command, so cross-request coordination
/// relies entirely on the store's own atomicity.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Set a value that expires after `ttl_secs`, overwriting any previous value
    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Atomically increment a window counter
    ///
    /// The first increment in a window sets the expiry to `window_secs`.
    async fn incr_window(&self, key: &str, window_secs: u64) -> StoreResult<WindowCount>;

    /// Round-trip check used by health probes
    async fn ping(&self) -> StoreResult<()>;
}
