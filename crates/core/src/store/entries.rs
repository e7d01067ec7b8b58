//! Entry reads and writes for the SQLite store.

use async_trait::async_trait;
use chrono::TimeDelta;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::connection::SqliteStore;
use super::{TtlStore, is_expired_on_arrival};
use crate::Error;

impl SqliteStore {
    fn now_millis(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    /// Delete expired entries.
    ///
    /// Returns the number of deleted entries.
    pub async fn purge_expired(&self) -> Result<u64, Error> {
        let now = self.now_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count = conn.execute(
                    "DELETE FROM entries WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }

    /// Count live entries.
    pub async fn live_count(&self) -> Result<u64, Error> {
        let now = self.now_millis();
        self.conn
            .call(move |conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE expires_at IS NULL OR expires_at > ?1",
                    params![now],
                    |row| row.get(0),
                )?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}

#[async_trait]
impl TtlStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let key = key.to_string();
        let now = self.now_millis();
        self.conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                let result = conn.query_row(
                    "SELECT value FROM entries
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now],
                    |row| row.get::<_, Vec<u8>>(0),
                );

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<TimeDelta>) -> Result<(), Error> {
        let key = key.to_string();
        let now = self.now_millis();

        if is_expired_on_arrival(ttl) {
            return self
                .conn
                .call(move |conn| -> Result<(), Error> {
                    conn.execute("DELETE FROM entries WHERE key = ?1", params![key])?;
                    Ok(())
                })
                .await
                .map_err(Error::from);
        }

        let expires_at = ttl.map(|ttl| now.saturating_add(ttl.num_milliseconds()));
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO entries (key, value, expires_at, updated_at) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        expires_at = excluded.expires_at,
                        updated_at = excluded.updated_at",
                    params![key, value, expires_at, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn clear(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                conn.execute("DELETE FROM entries", [])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    async fn store_with_clock() -> (SqliteStore, ManualClock) {
        let clock = ManualClock::default();
        let store = SqliteStore::open_in_memory_with_clock(Arc::new(clock.clone()))
            .await
            .unwrap();
        (store, clock)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _) = store_with_clock().await;
        store.set("a", b"hello".to_vec(), None).await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(store.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_upsert_replaces_value_and_expiry() {
        let (store, clock) = store_with_clock().await;
        store.set("a", b"1".to_vec(), Some(TimeDelta::seconds(1))).await.unwrap();
        store.set("a", b"2".to_vec(), Some(TimeDelta::seconds(10))).await.unwrap();

        clock.advance(TimeDelta::seconds(5));
        assert_eq!(store.get("a").await.unwrap(), Some(b"2".to_vec()));
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (store, clock) = store_with_clock().await;
        store.set("a", b"1".to_vec(), Some(TimeDelta::seconds(2))).await.unwrap();

        clock.advance(TimeDelta::milliseconds(1999));
        assert!(store.get("a").await.unwrap().is_some());

        clock.advance(TimeDelta::milliseconds(1));
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_negative_ttl_deletes() {
        let (store, _) = store_with_clock().await;
        store.set("a", b"1".to_vec(), None).await.unwrap();
        store.set("a", b"1".to_vec(), Some(TimeDelta::seconds(-30))).await.unwrap();
        assert!(store.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_purge_expired_and_clear() {
        let (store, clock) = store_with_clock().await;
        store.set("short", b"1".to_vec(), Some(TimeDelta::seconds(1))).await.unwrap();
        store.set("session", b"2".to_vec(), None).await.unwrap();

        clock.advance(TimeDelta::seconds(1));
        assert_eq!(store.live_count().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 1);

        store.clear().await.unwrap();
        assert_eq!(store.live_count().await.unwrap(), 0);
    }
}
