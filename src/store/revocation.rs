//! Blocklist of token ids considered invalid before their natural expiry.

use std::collections::HashMap;
use tokio::sync::Mutex;

/// Entries expire at the revoked token's own expiry, so a revocation never
/// outlives the token it blocks.
#[derive(Debug, Default)]
pub struct RevocationStore {
    entries: Mutex<HashMap<String, i64>>,
}

impl RevocationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent insert. A token already past its expiry gets a zero TTL and
    /// is immediately reported as not revoked.
    pub async fn revoke(&self, token_id: &str, expires_at: i64, now: i64) {
        let revoked_until = expires_at.max(now);
        let mut entries = self.entries.lock().await;
        entries.insert(token_id.to_string(), revoked_until);
    }

    pub async fn is_revoked(&self, token_id: &str, now: i64) -> bool {
        let entries = self.entries.lock().await;
        entries.get(token_id).is_some_and(|until| now < *until)
    }

    /// Best-effort purge of entries whose window already closed. Safe to call
    /// on a schedule or on demand; a no-op when there is nothing to clean.
    pub async fn cleanup_expired(&self, now: i64) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, until| now < *until);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::RevocationStore;

    const NOW: i64 = 1_700_000_000;

    #[tokio::test]
    async fn revoked_until_original_expiry_and_not_after() {
        let store = RevocationStore::new();
        store.revoke("jti-1", NOW + 60, NOW).await;

        assert!(store.is_revoked("jti-1", NOW).await);
        assert!(store.is_revoked("jti-1", NOW + 59).await);
        assert!(!store.is_revoked("jti-1", NOW + 60).await);
        assert!(!store.is_revoked("jti-1", NOW + 61).await);
    }

    #[tokio::test]
    async fn unknown_token_is_not_revoked() {
        let store = RevocationStore::new();
        assert!(!store.is_revoked("jti-unknown", NOW).await);
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let store = RevocationStore::new();
        store.revoke("jti-1", NOW + 60, NOW).await;
        store.revoke("jti-1", NOW + 60, NOW).await;
        assert_eq!(store.len().await, 1);
        assert!(store.is_revoked("jti-1", NOW).await);
    }

    #[tokio::test]
    async fn expiry_in_the_past_clamps_to_zero_ttl() {
        let store = RevocationStore::new();
        store.revoke("jti-stale", NOW - 10, NOW).await;
        assert!(!store.is_revoked("jti-stale", NOW).await);
    }

    #[tokio::test]
    async fn cleanup_drops_only_expired_entries() {
        let store = RevocationStore::new();
        store.revoke("jti-live", NOW + 600, NOW).await;
        store.revoke("jti-dead", NOW + 5, NOW).await;

        store.cleanup_expired(NOW + 10).await;

        assert_eq!(store.len().await, 1);
        assert!(store.is_revoked("jti-live", NOW + 10).await);
    }

    #[tokio::test]
    async fn cleanup_on_empty_store_is_a_noop() {
        let store = RevocationStore::new();
        store.cleanup_expired(NOW).await;
        assert_eq!(store.len().await, 0);
    }
}
