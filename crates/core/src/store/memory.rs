//! In-memory TTL store.

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{TtlStore, is_expired_on_arrival};
use crate::Error;
use crate::clock::{Clock, SystemClock};

/// Stored value with its expiry instant.
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// Process-local TTL store.
///
/// Expired entries are invisible to `get` immediately and are dropped from
/// the map on the next write or on [`MemoryStore::purge_expired`].
#[derive(Debug, Clone)]
pub struct MemoryStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store whose expiry decisions use the given clock.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: Arc::new(RwLock::new(HashMap::new())), clock }
    }

    /// Drop expired entries, returning how many were removed.
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of entries held, including expired ones not yet purged.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtlStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        Ok(entries.get(key).filter(|entry| !entry.is_expired(now)).map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<TimeDelta>) -> Result<(), Error> {
        let mut entries = self.entries.write().await;
        if is_expired_on_arrival(ttl) {
            entries.remove(key);
            return Ok(());
        }

        // past chrono's last representable instant the key never expires
        let expires_at = ttl.and_then(|ttl| self.clock.now().checked_add_signed(ttl));
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.entries.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (MemoryStore, ManualClock) {
        let clock = ManualClock::default();
        (MemoryStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _) = store_with_clock();
        store.set("a", b"1".to_vec(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.get("b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires_at_ttl() {
        let (store, clock) = store_with_clock();
        store.set("a", b"1".to_vec(), Some(TimeDelta::seconds(3))).await.unwrap();

        clock.advance(TimeDelta::milliseconds(2999));
        assert!(store.get("a").await.unwrap().is_some());

        clock.advance(TimeDelta::milliseconds(1));
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_positive_ttl_deletes() {
        let (store, _) = store_with_clock();
        store.set("a", b"1".to_vec(), None).await.unwrap();
        store.set("a", b"2".to_vec(), Some(TimeDelta::seconds(-1))).await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ttl_beyond_calendar_never_expires() {
        let (store, clock) = store_with_clock();
        store.set("a", b"1".to_vec(), Some(TimeDelta::MAX)).await.unwrap();
        clock.advance(TimeDelta::days(365 * 1000));
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_overwrite_resets_expiry() {
        let (store, clock) = store_with_clock();
        store.set("a", b"1".to_vec(), Some(TimeDelta::seconds(1))).await.unwrap();
        store.set("a", b"2".to_vec(), None).await.unwrap();
        clock.advance(TimeDelta::seconds(10));
        assert_eq!(store.get("a").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_purge_and_clear() {
        let (store, clock) = store_with_clock();
        store.set("short", b"1".to_vec(), Some(TimeDelta::seconds(1))).await.unwrap();
        store.set("long", b"2".to_vec(), None).await.unwrap();

        clock.advance(TimeDelta::seconds(2));
        assert_eq!(store.purge_expired().await, 1);
        assert_eq!(store.len().await, 1);

        store.clear().await.unwrap();
        assert!(store.is_empty().await);
    }
}
