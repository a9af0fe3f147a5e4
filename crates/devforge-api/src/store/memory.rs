//! In-memory key-value store for tests
//!
//! Expiry uses `tokio::time::Instant`, so tests running with a paused clock
//! can drive TTLs with `tokio::time::advance`.
//!
//! Author: hephaex@gmail.com

use super::{KeyValueStore, StoreError, StoreResult, WindowCount};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Process-local store with Redis-like TTL semantics
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every operation fails until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Remaining TTL of a live key, in whole seconds
    pub async fn ttl(&self, key: &str) -> Option<u64> {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now).as_secs())
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store switched off".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.check_available()?;
        let now = Instant::now();
        let entries = self.entries.lock().await;
        Ok(entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + Duration::from_secs(ttl_secs)),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.check_available()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn incr_window(&self, key: &str, window_secs: u64) -> StoreResult<WindowCount> {
        self.check_available()?;
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let live = entries.get(key).filter(|e| e.is_live(now)).cloned();
        let (count, expires_at) = match live {
            Some(entry) => {
                let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
                (count, entry.expires_at)
            }
            None => (1, Some(now + Duration::from_secs(window_secs))),
        };

        entries.insert(
            key.to_string(),
            Entry {
                value: count.to_string(),
                expires_at,
            },
        );

        let ttl_secs = expires_at
            .map(|at| at.saturating_duration_since(now).as_secs())
            .unwrap_or(window_secs);

        Ok(WindowCount { count, ttl_secs })
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }
}
