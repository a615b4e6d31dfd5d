//! Cache entry record and its byte encoding.
//!
//! Stored values are JSON documents. Only `url` and `expires_at` are
//! interpreted here; every other field, known or not, survives a
//! decode/encode cycle unchanged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// One cached HTTP response.
///
/// Status, headers, body and whatever else the live cache stores are kept
/// verbatim in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub expires_at: DateTime<Utc>,

    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

impl CacheEntry {
    pub fn new(url: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self { url: url.into(), expires_at, payload: serde_json::Map::new() }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Decode a stored value into a cache entry.
pub fn decode(bytes: &[u8]) -> Result<CacheEntry, Error> {
    serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
}

/// Encode a cache entry into its stored representation.
pub fn encode(entry: &CacheEntry) -> Result<Vec<u8>, Error> {
    serde_json::to_vec(entry).map_err(|e| Error::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn restamp(raw: &[u8]) -> serde_json::Value {
        let mut entry = decode(raw).unwrap();
        entry.expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        serde_json::from_slice(&encode(&entry).unwrap()).unwrap()
    }

    #[test]
    fn test_restamp_changes_only_expires_at() {
        let raw = br#"{"url":"https://x.com/a","expires_at":"2024-01-01T00:00:00Z","status_code":304,"headers":{"Content-Type":"text/html"},"body":null,"created_at":"2024-01-01T08:00:00+08:00","hits":7}"#;
        let mut expected: serde_json::Value = serde_json::from_slice(raw).unwrap();
        expected["expires_at"] = serde_json::json!("2030-01-01T00:00:00Z");

        assert_eq!(restamp(raw), expected);
    }

    #[test]
    fn test_restamp_adds_no_fields() {
        let raw = br#"{"url":"https://x.com/a","expires_at":"2024-01-01T00:00:00Z"}"#;
        let json = restamp(raw);
        let mut keys: Vec<&str> = json.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["expires_at", "url"]);
    }

    #[test]
    fn test_decode_missing_url() {
        let err = decode(br#"{"expires_at":"2024-01-01T00:00:00Z"}"#).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode(b"\x00\x01not json"), Err(Error::Decode(_))));
    }

    #[test]
    fn test_is_expired_at() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let entry = CacheEntry::new("https://x.com/a", t0);
        assert!(entry.is_expired_at(t0));
        assert!(!entry.is_expired_at(t0 - chrono::Duration::seconds(1)));
    }
}
