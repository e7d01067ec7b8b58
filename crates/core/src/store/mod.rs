//! Key/value stores with per-key expiry.
//!
//! Every engine in the client crate persists its records through a
//! [`TtlStore`]. Two implementations ship here:
//!
//! - [`MemoryStore`]: process-local map guarded by a tokio `RwLock`
//! - [`SqliteStore`]: SQLite file (or in-memory database) via tokio-rusqlite,
//!   with WAL mode and a versioned schema
//!
//! Values are opaque bytes. Records are encoded as JSON by [`read_json`] and
//! [`write_json`].

pub mod connection;
pub mod entries;
pub mod memory;

use async_trait::async_trait;
use chrono::TimeDelta;
use serde::{Serialize, de::DeserializeOwned};

use crate::Error;

pub use connection::SqliteStore;
pub use memory::MemoryStore;

/// Longest lifetime a key can be given: 2^31 seconds, about 68 years.
pub const MAX_TTL_SECS: i64 = 1 << 31;

/// Key/value store with optional per-key time-to-live.
///
/// A `None` TTL keeps the key until the store is cleared. A TTL of zero or
/// less removes the key, which is how cookies with a past expiry get deleted.
/// Single-key `get`/`set` must be atomic; nothing here spans multiple keys.
#[async_trait]
pub trait TtlStore: Send + Sync + std::fmt::Debug {
    /// Read a live value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Write a value, replacing any previous one and its expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<TimeDelta>) -> Result<(), Error>;

    /// Remove every key.
    async fn clear(&self) -> Result<(), Error>;
}

/// Read and decode a JSON record.
pub async fn read_json<T: DeserializeOwned>(store: &dyn TtlStore, key: &str) -> Result<Option<T>, Error> {
    match store.get(key).await? {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON record.
pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn TtlStore, key: &str, value: &T, ttl: Option<TimeDelta>,
) -> Result<(), Error> {
    let bytes = serde_json::to_vec(value)?;
    store.set(key, bytes, ttl).await
}

/// Bound a TTL to ±[`MAX_TTL_SECS`].
pub fn clamp_ttl(ttl: TimeDelta) -> TimeDelta {
    let bound = TimeDelta::seconds(MAX_TTL_SECS);
    ttl.clamp(-bound, bound)
}

/// A TTL of `secs` seconds, bounded like [`clamp_ttl`].
pub fn ttl_from_secs(secs: i64) -> TimeDelta {
    TimeDelta::seconds(secs.clamp(-MAX_TTL_SECS, MAX_TTL_SECS))
}

/// Whether a TTL means "delete now".
pub(crate) fn is_expired_on_arrival(ttl: Option<TimeDelta>) -> bool {
    matches!(ttl, Some(ttl) if ttl <= TimeDelta::zero())
}
