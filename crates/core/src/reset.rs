//! Bulk TTL reset pass.
//!
//! Walks every record in the store, re-stamps `expires_at` from the first
//! matching policy and writes the entry back under its original key. Per
//! record failures are counted and logged; only store-open, policy-load and
//! scan failures abort the run. The store is compacted once the pass
//! reaches the end.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::entry;
use crate::policy::PolicySet;
use crate::store::{CacheStore, Record, RecordCursor, RecordStore};
use crate::Error;

/// Phase of a run in progress, reported in log events.
///
/// An aborted run surfaces to callers as a fatal `Error`; a finished one as
/// the `RunOutcome` of its report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Initializing,
    Processing,
    Finalizing,
    Aborted,
}

/// How a run that reached the end of the store finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// Records were updated but compaction failed.
    CompletedWithWarning,
}

/// Result of the compaction attempt that ends a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum CompactionOutcome {
    Compacted,
    Failed(String),
}

/// Counters accumulated over one pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Records visited by the scan.
    pub scanned: u64,
    /// Records re-stamped and written back.
    pub updated: u64,
    /// Updated records that had already expired before the pass.
    pub revived: u64,
    /// Records left untouched because no policy applies.
    pub no_policy: u64,
    pub decode_failures: u64,
    pub encode_failures: u64,
    pub write_failures: u64,
    pub compaction: CompactionOutcome,
}

impl RunReport {
    fn new() -> Self {
        Self {
            scanned: 0,
            updated: 0,
            revived: 0,
            no_policy: 0,
            decode_failures: 0,
            encode_failures: 0,
            write_failures: 0,
            compaction: CompactionOutcome::Compacted,
        }
    }

    pub fn outcome(&self) -> RunOutcome {
        match self.compaction {
            CompactionOutcome::Compacted => RunOutcome::Completed,
            CompactionOutcome::Failed(_) => RunOutcome::CompletedWithWarning,
        }
    }

    pub fn failures(&self) -> u64 {
        self.decode_failures + self.encode_failures + self.write_failures
    }
}

/// What happened to a single record.
enum Step {
    Updated { revived: bool },
    NoPolicy,
    DecodeFailed,
    EncodeFailed,
    WriteFailed,
}

/// Open the store named by `config`, load its policies and run the pass.
///
/// # Errors
///
/// Fails before touching any record if the store cannot be opened or the
/// policy file cannot be loaded, and stops mid-pass if scanning fails.
pub async fn run(config: &AppConfig) -> Result<RunReport, Error> {
    let mut state = RunState::Initializing;
    tracing::debug!(?state, store = %config.store_path().display(), "Starting TTL reset");

    let store = CacheStore::open(config.store_path()).await.inspect_err(|e| {
        state = RunState::Aborted;
        tracing::error!(?state, error = %e, "Failed to open cache store");
    })?;

    let policies = PolicySet::load(&config.policies_file).await.inspect_err(|e| {
        state = RunState::Aborted;
        tracing::error!(?state, error = %e, "Failed to load cache policies");
    })?;

    let report = reset_ttls(&store, &policies, config.page_size, Utc::now).await?;

    if let Err(e) = store.close().await {
        tracing::warn!(error = %e, "Failed to close cache store cleanly");
    }

    Ok(report)
}

/// Re-stamp every record of `store` whose URL matches a policy.
///
/// `now` is sampled once per updated record, so entries handled later in
/// a long pass get a slightly later baseline.
pub async fn reset_ttls<S, F>(store: &S, policies: &PolicySet, page_size: usize, mut now: F) -> Result<RunReport, Error>
where
    S: RecordStore + ?Sized,
    F: FnMut() -> DateTime<Utc>,
{
    let mut report = RunReport::new();
    let mut state = RunState::Processing;
    tracing::info!(?state, policies = policies.len(), "Resetting cache entry TTLs");

    let mut cursor = RecordCursor::new(store, page_size);
    while let Some(record) = cursor.next().await {
        let record = record.inspect_err(|e| {
            state = RunState::Aborted;
            tracing::error!(?state, scanned = report.scanned, error = %e, "Failed to iterate over cache");
        })?;
        report.scanned += 1;

        match reset_record(store, policies, &record, &mut now).await {
            Step::Updated { revived } => {
                report.updated += 1;
                report.revived += u64::from(revived);
            }
            Step::NoPolicy => report.no_policy += 1,
            Step::DecodeFailed => report.decode_failures += 1,
            Step::EncodeFailed => report.encode_failures += 1,
            Step::WriteFailed => report.write_failures += 1,
        }
    }

    state = RunState::Finalizing;
    tracing::debug!(?state, updated = report.updated, "Compacting cache store");
    if let Err(e) = store.compact().await {
        tracing::warn!(error = %e, "Failed to compact cache");
        report.compaction = CompactionOutcome::Failed(e.to_string());
    }

    tracing::info!(
        outcome = ?report.outcome(),
        scanned = report.scanned,
        updated = report.updated,
        no_policy = report.no_policy,
        failures = report.failures(),
        "TTL reset finished"
    );

    Ok(report)
}

async fn reset_record<S, F>(store: &S, policies: &PolicySet, record: &Record, now: &mut F) -> Step
where
    S: RecordStore + ?Sized,
    F: FnMut() -> DateTime<Utc>,
{
    let key = String::from_utf8_lossy(&record.key);

    let mut entry = match entry::decode(&record.value) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(%key, error = %e, "Failed to decode cache entry");
            return Step::DecodeFailed;
        }
    };

    let Some(ttl) = policies.ttl_for(&entry.url).and_then(|ttl| chrono::Duration::from_std(ttl).ok()) else {
        tracing::debug!(url = %entry.url, "Skipping entry: no matching policy");
        return Step::NoPolicy;
    };

    let stamp = now();
    let Some(expires_at) = stamp.checked_add_signed(ttl) else {
        tracing::debug!(url = %entry.url, "Skipping entry: ttl overflows timestamp range");
        return Step::NoPolicy;
    };
    let revived = entry.is_expired_at(stamp);
    entry.expires_at = expires_at;

    let encoded = match entry::encode(&entry) {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!(url = %entry.url, error = %e, "Failed to encode cache entry");
            return Step::EncodeFailed;
        }
    };

    if let Err(e) = store.put(&record.key, &encoded).await {
        tracing::warn!(url = %entry.url, %key, error = %e, "Failed to update cache entry");
        return Step::WriteFailed;
    }

    tracing::trace!(url = %entry.url, %expires_at, "Updated cache entry TTL");
    Step::Updated { revived }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::CacheEntry;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Mutex;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn encoded(url: &str) -> Vec<u8> {
        entry::encode(&CacheEntry::new(url, t0())).unwrap()
    }

    /// In-memory store that can be told to fail specific operations.
    #[derive(Default)]
    struct FaultyStore {
        records: Mutex<BTreeMap<Vec<u8>, Vec<u8>>>,
        fail_put: HashSet<Vec<u8>>,
        fail_scan_after: Option<Vec<u8>>,
        fail_compact: bool,
        puts: Mutex<u32>,
    }

    impl FaultyStore {
        fn with(records: &[(&str, Vec<u8>)]) -> Self {
            let map = records.iter().map(|(k, v)| (k.as_bytes().to_vec(), v.clone())).collect();
            Self { records: Mutex::new(map), ..Default::default() }
        }

        fn value(&self, key: &str) -> Vec<u8> {
            self.records.lock().unwrap()[key.as_bytes()].clone()
        }
    }

    #[async_trait]
    impl RecordStore for FaultyStore {
        async fn scan(&self, after: Option<&[u8]>, limit: usize) -> Result<Vec<Record>, Error> {
            if after.is_some() && after == self.fail_scan_after.as_deref() {
                return Err(Error::Iteration("disk read error".into()));
            }
            let records = self.records.lock().unwrap();
            Ok(records
                .iter()
                .filter(|(k, _)| after.is_none_or(|a| k.as_slice() > a))
                .take(limit)
                .map(|(k, v)| Record { key: k.clone(), value: v.clone() })
                .collect())
        }

        async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), Error> {
            if self.fail_put.contains(key) {
                return Err(Error::Write("database is locked".into()));
            }
            *self.puts.lock().unwrap() += 1;
            self.records.lock().unwrap().insert(key.to_vec(), value.to_vec());
            Ok(())
        }

        async fn compact(&self) -> Result<(), Error> {
            if self.fail_compact {
                return Err(Error::Compact("no space left on device".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_matched_entry_restamped_unmatched_untouched() {
        let store = FaultyStore::with(&[("a", encoded("https://x.com/a")), ("b", encoded("https://y.com/b"))]);
        let policies = PolicySet::parse("x.com 24h").unwrap();
        let before_b = store.value("b");
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();

        let report = reset_ttls(&store, &policies, 16, || now).await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.updated, 1);
        assert_eq!(report.revived, 1);
        assert_eq!(report.no_policy, 1);
        assert_eq!(report.outcome(), RunOutcome::Completed);

        let a = entry::decode(&store.value("a")).unwrap();
        assert_eq!(a.expires_at, now + chrono::Duration::hours(24));
        assert_eq!(store.value("b"), before_b);
    }

    #[tokio::test]
    async fn test_clock_sampled_per_record() {
        let store = FaultyStore::with(&[("a", encoded("https://x.com/1")), ("b", encoded("https://x.com/2"))]);
        let policies = PolicySet::parse("x\\.com 1h").unwrap();
        let mut tick = 0;

        reset_ttls(&store, &policies, 1, || {
            tick += 1;
            t0() + chrono::Duration::seconds(tick)
        })
        .await
        .unwrap();

        let a = entry::decode(&store.value("a")).unwrap();
        let b = entry::decode(&store.value("b")).unwrap();
        assert_eq!(b.expires_at - a.expires_at, chrono::Duration::seconds(1));
    }

    #[tokio::test]
    async fn test_decode_failure_is_isolated() {
        let store = FaultyStore::with(&[
            ("a", encoded("https://x.com/a")),
            ("b", b"\xff\xfe garbage".to_vec()),
            ("c", encoded("https://x.com/c")),
        ]);
        let policies = PolicySet::parse("x\\.com 1h").unwrap();

        let report = reset_ttls(&store, &policies, 2, Utc::now).await.unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.updated, 2);
        assert_eq!(report.decode_failures, 1);
        assert_eq!(store.value("b"), b"\xff\xfe garbage".to_vec());
    }

    #[tokio::test]
    async fn test_write_failure_is_isolated() {
        let mut store = FaultyStore::with(&[("a", encoded("https://x.com/a")), ("b", encoded("https://x.com/b"))]);
        store.fail_put.insert(b"a".to_vec());
        let policies = PolicySet::parse("x\\.com 1h").unwrap();

        let report = reset_ttls(&store, &policies, 16, Utc::now).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.write_failures, 1);
        assert_eq!(entry::decode(&store.value("a")).unwrap().expires_at, t0());
    }

    #[tokio::test]
    async fn test_scan_failure_aborts_without_compaction() {
        let mut store = FaultyStore::with(&[
            ("a", encoded("https://x.com/a")),
            ("b", encoded("https://x.com/b")),
            ("c", encoded("https://x.com/c")),
        ]);
        store.fail_scan_after = Some(b"b".to_vec());
        store.fail_compact = true;
        let policies = PolicySet::parse("x\\.com 1h").unwrap();

        let err = reset_ttls(&store, &policies, 2, Utc::now).await.unwrap_err();

        assert!(matches!(err, Error::Iteration(_)));
        assert!(err.is_fatal());
        assert_eq!(*store.puts.lock().unwrap(), 2);
        assert_eq!(entry::decode(&store.value("c")).unwrap().expires_at, t0());
    }

    #[tokio::test]
    async fn test_compaction_failure_is_a_warning() {
        let mut store = FaultyStore::with(&[("a", encoded("https://x.com/a"))]);
        store.fail_compact = true;
        let policies = PolicySet::parse("x\\.com 1h").unwrap();

        let report = reset_ttls(&store, &policies, 16, Utc::now).await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(report.outcome(), RunOutcome::CompletedWithWarning);
        assert!(matches!(report.compaction, CompactionOutcome::Failed(ref msg) if msg.contains("no space")));
    }

    #[tokio::test]
    async fn test_zero_ttl_policy_leaves_entry() {
        let store = FaultyStore::with(&[("a", encoded("https://x.com/a"))]);
        let policies = PolicySet::parse("x\\.com 0s").unwrap();

        let report = reset_ttls(&store, &policies, 16, Utc::now).await.unwrap();

        assert_eq!(report.updated, 0);
        assert_eq!(report.no_policy, 1);
        assert_eq!(*store.puts.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let store = FaultyStore::default();
        let policies = PolicySet::parse(".* 1h").unwrap();

        let report = reset_ttls(&store, &policies, 16, Utc::now).await.unwrap();
        assert_eq!(report.scanned, 0);
        assert_eq!(report.outcome(), RunOutcome::Completed);
    }

    #[tokio::test]
    async fn test_report_serializes() {
        let mut report = RunReport::new();
        report.compaction = CompactionOutcome::Failed("busy".into());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["compaction"]["status"], "failed");
        assert_eq!(json["compaction"]["error"], "busy");
        assert_eq!(serde_json::to_value(report.outcome()).unwrap(), "completed_with_warning");
    }
}
