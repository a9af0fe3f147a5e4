//! Redis-backed key-value store
//!
//! Author: hephaex@gmail.com

use super::{KeyValueStore, StoreResult, WindowCount};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

/// INCR plus first-hit EXPIRE, executed atomically server side
const INCR_WINDOW_SCRIPT: &str = r#"
local current = redis.call('INCR', KEYS[1])
if current == 1 then
    redis.call('EXPIRE', KEYS[1], ARGV[1])
end
local ttl = redis.call('TTL', KEYS[1])
return {current, ttl}
"#;

/// Redis store over an auto-reconnecting connection manager
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    incr_window: Script,
}

impl RedisStore {
    /// Connect to Redis at `url`
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr_window: Script::new(INCR_WINDOW_SCRIPT),
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn incr_window(&self, key: &str, window_secs: u64) -> StoreResult<WindowCount> {
        let mut conn = self.conn.clone();
        let (count, ttl): (i64, i64) = self
            .incr_window
            .key(key)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await?;

        // TTL is -1 when the key somehow lost its expiry; report a full window
        let ttl_secs = if ttl < 0 { window_secs } else { ttl as u64 };

        Ok(WindowCount {
            count: count.max(0) as u64,
            ttl_secs,
        })
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}
