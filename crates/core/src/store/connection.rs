//! Store connection management with pragma configuration.
//!
//! This module handles opening the SQLite database, applying required pragmas
//! (WAL mode), and running migrations.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA temp_store=MEMORY;";

/// Cache store handle.
///
/// Wraps a tokio-rusqlite Connection that runs database operations
/// on a background thread. The connection closes when the handle drops.
#[derive(Clone, Debug)]
pub struct CacheStore {
    pub(crate) conn: Connection,
}

impl CacheStore {
    /// Open an existing store at the specified path.
    ///
    /// Fails with `Error::StoreOpen` if the file does not exist or holds no
    /// `records` table. The schema is checked before any pragma is applied,
    /// so a file that is not a cache store is left as it was; a TTL reset
    /// never creates a cache.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::StoreOpen(format!("{}: no such store", path.display())));
        }
        let conn = Connection::open(path)
            .await
            .map_err(|e| Error::StoreOpen(format!("{}: {e}", path.display())))?;

        let is_store = conn
            .call(|conn| migrations::has_records_table(conn))
            .await
            .map_err(|e| Error::StoreOpen(format!("{}: {e}", path.display())))?;
        if !is_store {
            return Err(Error::StoreOpen(format!("{}: not a cache store (no records table)", path.display())));
        }

        Self::configure(&conn).await?;
        Ok(Self { conn })
    }

    /// Open a store, creating the file and schema if they don't exist.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let conn = Connection::open(path)
            .await
            .map_err(|e| Error::StoreOpen(format!("{}: {e}", path.display())))?;

        Self::init(conn).await
    }

    /// Open an in-memory store for testing.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::StoreOpen(e.to_string()))?;

        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        Self::configure(&conn).await?;

        migrations::run(&conn)
            .await
            .map_err(|e| Error::StoreOpen(e.to_string()))?;

        Ok(Self { conn })
    }

    async fn configure(conn: &Connection) -> Result<(), Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS))
            .await
            .map_err(|e| Error::StoreOpen(e.to_string()))
    }

    /// Close the store, flushing the background connection.
    pub async fn close(self) -> Result<(), Error> {
        self.conn.close().await.map_err(Error::Database)
    }
}
