//! Unified error types for reset-ttl.
//!
//! Variants fall into two tiers: fatal errors abort the run, per-record
//! errors are logged by the orchestrator and the pass continues.

use tokio_rusqlite::rusqlite;

/// Unified error types for the TTL reset pass.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cache store could not be opened.
    #[error("STORE_OPEN_FAILED: {0}")]
    StoreOpen(String),

    /// Policy source could not be read.
    #[error("POLICY_LOAD_FAILED: {path}: {reason}")]
    PolicyRead { path: String, reason: String },

    /// Policy source contains a rule that does not parse.
    #[error("POLICY_LOAD_FAILED: line {line}: {reason}")]
    PolicyParse { line: usize, reason: String },

    /// Scanning the store failed mid-pass.
    #[error("ITERATION_FAILED: {0}")]
    Iteration(String),

    /// A stored value is not a valid cache entry.
    #[error("DECODE_FAILED: {0}")]
    Decode(String),

    /// A cache entry could not be serialized.
    #[error("ENCODE_FAILED: {0}")]
    Encode(String),

    /// Writing a record back failed.
    #[error("WRITE_FAILED: {0}")]
    Write(String),

    /// Compacting the store failed.
    #[error("COMPACT_FAILED: {0}")]
    Compact(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),
}

impl Error {
    /// Whether this error aborts the whole run.
    ///
    /// Per-record failures (decode, encode, write) and compaction are
    /// recoverable; everything else stops the pass.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Decode(_) | Error::Encode(_) | Error::Write(_) | Error::Compact(_))
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}
