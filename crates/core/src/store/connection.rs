//! SQLite connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! for performance and concurrency (WAL mode), and creating the `entries`
//! table. The schema version lives in `PRAGMA user_version`.

use crate::Error;
use crate::clock::{Clock, SystemClock};
use std::path::Path;
use std::sync::Arc;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

/// Schema version written to `user_version` once `entries` exists.
pub const SCHEMA_VERSION: i64 = 1;

/// Expiry and update times are unix milliseconds; a NULL expiry never expires.
const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS entries (
        key TEXT PRIMARY KEY,
        value BLOB NOT NULL,
        expires_at INTEGER,
        updated_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_entries_expires_at ON entries (expires_at);";

/// SQLite-backed TTL store.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pub(crate) conn: Connection,
    pub(crate) clock: Arc<dyn Clock>,
}

impl SqliteStore {
    /// Open a database at the specified path.
    ///
    /// Creates the file if it doesn't exist, applies performance pragmas,
    /// and creates the schema when the file is new.
    ///
    /// # Errors
    ///
    /// [`Error::MigrationFailed`] when the file carries a schema version this
    /// build does not know.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn, Arc::new(SystemClock)).await
    }

    /// Open an in-memory database for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        Self::open_in_memory_with_clock(Arc::new(SystemClock)).await
    }

    /// Open an in-memory database whose expiry decisions use `clock`.
    pub async fn open_in_memory_with_clock(clock: Arc<dyn Clock>) -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::prepare(conn, clock).await
    }

    async fn prepare(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self, Error> {
        conn.call(|conn| -> Result<(), Error> {
            conn.execute_batch(PRAGMAS)?;
            ensure_schema(conn)
        })
        .await
        .map_err(Error::from)?;

        Ok(Self { conn, clock })
    }
}

fn ensure_schema(conn: &rusqlite::Connection) -> Result<(), Error> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    match version {
        SCHEMA_VERSION => Ok(()),
        0 => {
            conn.execute_batch(SCHEMA)?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
            tracing::debug!(version = SCHEMA_VERSION, "created store schema");
            Ok(())
        }
        newer => Err(Error::MigrationFailed(format!(
            "store schema version {newer} is newer than supported version {SCHEMA_VERSION}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user_version(store: &SqliteStore) -> i64 {
        store
            .conn
            .call(|conn| conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_open_in_memory_creates_schema() {
        let store = SqliteStore::open_in_memory().await.unwrap();
        assert_eq!(user_version(&store).await, SCHEMA_VERSION);

        let has_entries: bool = store
            .conn
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='entries')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert!(has_entries);
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| -> Result<(), Error> {
            ensure_schema(conn)?;
            ensure_schema(conn)
        })
        .await
        .map_err(Error::from)
        .unwrap();
    }

    #[tokio::test]
    async fn test_newer_schema_is_rejected() {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1))
            .await
            .unwrap();

        let result = SqliteStore::prepare(conn, Arc::new(SystemClock)).await;
        assert!(matches!(result, Err(Error::MigrationFailed(_))));
    }
}
