//! Token revocation store
//!
//! Two keyspaces on the shared key-value store:
//! - `blacklist:<token>`: logged-out access tokens, kept for their remaining lifetime
//! - `refresh_token:<user id>`: the single live refresh token of each user
//!
//! Author: hephaex@gmail.com

use crate::store::{KeyValueStore, StoreResult};
use std::sync::Arc;
use uuid::Uuid;

const BLACKLIST_PREFIX: &str = "blacklist:";
const REFRESH_TOKEN_PREFIX: &str = "refresh_token:";

pub fn blacklist_key(token: &str) -> String {
    format!("{BLACKLIST_PREFIX}{token}")
}

pub fn refresh_token_key(user_id: Uuid) -> String {
    format!("{REFRESH_TOKEN_PREFIX}{user_id}")
}

/// Blacklist and refresh-token registry over a [`KeyValueStore`]
#[derive(Clone)]
pub struct RevocationStore {
    store: Arc<dyn KeyValueStore>,
}

impl RevocationStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Blacklist an access token for `ttl_secs`; repeating the call is harmless
    pub async fn blacklist(&self, token: &str, ttl_secs: u64) -> StoreResult<()> {
        self.store.set_ex(&blacklist_key(token), "true", ttl_secs).await
    }

    pub async fn is_blacklisted(&self, token: &str) -> StoreResult<bool> {
        self.store.exists(&blacklist_key(token)).await
    }

    /// Replace the user's refresh token unconditionally
    pub async fn set_refresh_token(
        &self,
        user_id: Uuid,
        token: &str,
        ttl_secs: u64,
    ) -> StoreResult<()> {
        self.store
            .set_ex(&refresh_token_key(user_id), token, ttl_secs)
            .await
    }

    pub async fn get_refresh_token(&self, user_id: Uuid) -> StoreResult<Option<String>> {
        self.store.get(&refresh_token_key(user_id)).await
    }

    pub async fn clear_refresh_token(&self, user_id: Uuid) -> StoreResult<()> {
        self.store.delete(&refresh_token_key(user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn revocation() -> (RevocationStore, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (RevocationStore::new(store.clone()), store)
    }

    #[test]
    fn test_key_layout() {
        let id = Uuid::nil();
        assert_eq!(blacklist_key("abc"), "blacklist:abc");
        assert_eq!(
            refresh_token_key(id),
            "refresh_token:00000000-0000-0000-0000-000000000000"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_blacklist_never_outlives_ttl() {
        let (revocation, store) = revocation();

        revocation.blacklist("tok", 30).await.unwrap();
        revocation.blacklist("tok", 30).await.unwrap();
        assert!(revocation.is_blacklisted("tok").await.unwrap());
        assert_eq!(store.ttl("blacklist:tok").await, Some(30));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(!revocation.is_blacklisted("tok").await.unwrap());
    }

    #[tokio::test]
    async fn test_refresh_registry_holds_one_token_per_user() {
        let (revocation, _) = revocation();
        let user = Uuid::new_v4();

        assert_eq!(revocation.get_refresh_token(user).await.unwrap(), None);

        revocation.set_refresh_token(user, "first", 60).await.unwrap();
        revocation.set_refresh_token(user, "second", 60).await.unwrap();
        assert_eq!(
            revocation.get_refresh_token(user).await.unwrap(),
            Some("second".to_string())
        );

        revocation.clear_refresh_token(user).await.unwrap();
        assert_eq!(revocation.get_refresh_token(user).await.unwrap(), None);
    }
}
