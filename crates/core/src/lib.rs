//! Core of reset-ttl: bulk, policy-driven re-expiry of a persistent HTTP
//! response cache.
//!
//! This crate provides:
//! - URL policy matching (`policy`)
//! - Cache entry encoding (`entry`)
//! - SQLite-backed record store with paged scanning (`store`)
//! - The TTL reset pass itself (`reset`)
//! - Layered configuration and unified error types

pub mod config;
pub mod entry;
pub mod error;
pub mod policy;
pub mod reset;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use entry::CacheEntry;
pub use error::Error;
pub use policy::{Policy, PolicySet};
pub use reset::{CompactionOutcome, RunOutcome, RunReport, reset_ttls, run};
pub use store::{CacheStore, Record, RecordCursor, RecordStore};
