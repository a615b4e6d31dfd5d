//! SQLite-backed key/value store holding encoded cache entries.
//!
//! This module provides:
//!
//! - Connection setup with WAL pragmas and schema migrations
//! - Key-ordered, paged scanning that tolerates writes mid-pass
//! - Point writes and full-store compaction

pub mod connection;
pub mod migrations;
pub mod records;

pub use connection::CacheStore;
pub use records::{Record, RecordCursor, RecordStore};
