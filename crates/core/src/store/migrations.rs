//! Store schema.
//!
//! The schema version lives in SQLite's `user_version` header field, so a
//! store carries no bookkeeping tables besides `records`.

use crate::Error;
use tokio_rusqlite::Connection;
use tokio_rusqlite::rusqlite;

const SCHEMA_VERSION: i64 = 1;
const SCHEMA: &str = include_str!("../../migrations/001_records.sql");

/// Create the `records` table unless the schema is already current.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` if the schema SQL fails to execute.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version >= SCHEMA_VERSION {
            return Ok(());
        }

        conn.execute_batch(&format!("{SCHEMA}\nPRAGMA user_version = {SCHEMA_VERSION};"))
            .map_err(|e| Error::MigrationFailed(format!("version {SCHEMA_VERSION}: {e}")))?;
        tracing::debug!(version = SCHEMA_VERSION, "Created store schema");
        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// Whether the `records` table exists. Reads only.
pub fn has_records_table(conn: &rusqlite::Connection) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='records')",
        [],
        |row| row.get(0),
    )
}
