//! Record scanning, point writes and compaction.

use async_trait::async_trait;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite::{self, OptionalExtension};

use super::connection::CacheStore;
use crate::Error;

/// A raw key/value pair as persisted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Key/value operations the TTL reset pass needs from a store.
///
/// `scan` must return records in ascending key order, strictly after
/// `after` when given. Paging on the last seen key is what makes writes
/// during a pass safe: a written key is never revisited and keys not yet
/// visited are unaffected.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn scan(&self, after: Option<&[u8]>, limit: usize) -> Result<Vec<Record>, Error>;

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error>;

    async fn compact(&self) -> Result<(), Error>;
}

/// Single-pass, lazily paged cursor over every record of a store.
pub struct RecordCursor<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    page_size: usize,
    last_key: Option<Vec<u8>>,
    page: std::vec::IntoIter<Record>,
    exhausted: bool,
}

impl<'a, S: RecordStore + ?Sized> RecordCursor<'a, S> {
    pub fn new(store: &'a S, page_size: usize) -> Self {
        Self { store, page_size: page_size.max(1), last_key: None, page: Vec::new().into_iter(), exhausted: false }
    }

    /// Next record, fetching another page when the current one runs out.
    ///
    /// Returns `None` once the store is exhausted. A scan failure is
    /// returned once as `Error::Iteration` and ends the cursor.
    pub async fn next(&mut self) -> Option<Result<Record, Error>> {
        if let Some(record) = self.page.next() {
            return Some(Ok(record));
        }
        if self.exhausted {
            return None;
        }

        let page = match self.store.scan(self.last_key.as_deref(), self.page_size).await {
            Ok(page) => page,
            Err(e) => {
                self.exhausted = true;
                return Some(Err(match e {
                    Error::Iteration(msg) => Error::Iteration(msg),
                    other => Error::Iteration(other.to_string()),
                }));
            }
        };

        if page.len() < self.page_size {
            self.exhausted = true;
        }
        self.last_key = page.last().map(|r| r.key.clone());
        self.page = page.into_iter();

        self.page.next().map(Ok)
    }
}

#[async_trait]
impl RecordStore for CacheStore {
    async fn scan(&self, after: Option<&[u8]>, limit: usize) -> Result<Vec<Record>, Error> {
        let after = after.map(<[u8]>::to_vec);
        let limit = limit as i64;
        self.conn
            .call(move |conn| -> Result<Vec<Record>, Error> {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM records
                     WHERE ?1 IS NULL OR key > ?1
                     ORDER BY key
                     LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![after, limit], |row| {
                    Ok(Record { key: row.get(0)?, value: row.get(1)? })
                })?;
                let records = rows.collect::<Result<Vec<_>, rusqlite::Error>>()?;
                Ok(records)
            })
            .await
            .map_err(|e| Error::Iteration(Error::from(e).to_string()))
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let key = key.to_vec();
        let value = value.to_vec();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO records (key, value) VALUES (?1, ?2)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    params![key, value],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| Error::Write(Error::from(e).to_string()))
    }

    /// Checkpoint the WAL and rebuild the database file.
    async fn compact(&self) -> Result<(), Error> {
        self.conn
            .call(|conn| -> Result<(), Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE); VACUUM;")?;
                Ok(())
            })
            .await
            .map_err(|e| Error::Compact(Error::from(e).to_string()))
    }
}

impl CacheStore {
    /// Get a record's value by key.
    ///
    /// Returns None if the key doesn't exist.
    pub async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let key = key.to_vec();
        self.conn
            .call(move |conn| -> Result<Option<Vec<u8>>, Error> {
                conn.query_row("SELECT value FROM records WHERE key = ?1", params![key], |row| row.get(0))
                    .optional()
                    .map_err(Error::from)
            })
            .await
            .map_err(Error::from)
    }

    /// Number of stored records.
    pub async fn count(&self) -> Result<u64, Error> {
        self.conn
            .call(|conn| -> Result<u64, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
                Ok(count as u64)
            })
            .await
            .map_err(Error::from)
    }
}
