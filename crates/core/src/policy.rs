//! URL freshness policies.
//!
//! A policy file lists one rule per line as `<regex> <duration>`:
//!
//! ```text
//! # news pages go stale quickly
//! ^https://news\.example\.com/   15m
//! example\.com                   24h
//! ```
//!
//! Matching is an unanchored regex search and the first matching rule wins,
//! the same discipline the live cache uses when it stamps fresh responses.
//!
//! TTLs accept humantime syntax (`24h`, `1h30m`, `7days`) as well as the Go
//! forms the live cache writes: fractions such as `1.5h` and a leading sign.
//! A negative TTL parses as zero, i.e. "no policy".

use std::path::Path;
use std::time::Duration;

use regex::Regex;

use crate::Error;

/// A single URL-pattern to TTL rule.
#[derive(Debug, Clone)]
pub struct Policy {
    pub pattern: Regex,
    pub ttl: Duration,
}

impl Policy {
    pub fn matches(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }
}

/// Ordered, read-only set of policies.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: Vec<Policy>,
}

impl PolicySet {
    /// Read and parse a policy file.
    ///
    /// # Errors
    ///
    /// Returns `Error::PolicyRead` if the file cannot be read and
    /// `Error::PolicyParse` on the first rule that does not parse.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::PolicyRead { path: path.display().to_string(), reason: e.to_string() })?;

        let set = Self::parse(&text)?;
        tracing::info!(path = %path.display(), policies = set.len(), "Loaded cache policies");
        Ok(set)
    }

    /// Parse policy rules from text.
    ///
    /// Blank lines and `#` comments are skipped. Every other line must hold
    /// exactly a regex and a TTL.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let mut policies = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            let [pattern, ttl] = fields.as_slice() else {
                return Err(Error::PolicyParse {
                    line: idx + 1,
                    reason: format!("expected `<pattern> <ttl>`, got {} fields", fields.len()),
                });
            };

            let pattern = Regex::new(pattern).map_err(|e| Error::PolicyParse { line: idx + 1, reason: e.to_string() })?;
            let ttl = parse_ttl(ttl)
                .map_err(|e| Error::PolicyParse { line: idx + 1, reason: format!("invalid ttl {ttl:?}: {e}") })?;

            policies.push(Policy { pattern, ttl });
        }

        Ok(Self { policies })
    }

    /// TTL of the first policy matching `url`.
    ///
    /// Returns `None` for an empty URL, when nothing matches, or when the
    /// first match carries a zero TTL.
    pub fn ttl_for(&self, url: &str) -> Option<Duration> {
        if url.is_empty() {
            return None;
        }
        self.policies
            .iter()
            .find(|p| p.matches(url))
            .map(|p| p.ttl)
            .filter(|ttl| !ttl.is_zero())
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Parse a policy TTL. Negative values clamp to zero.
fn parse_ttl(text: &str) -> Result<Duration, String> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let ttl = humantime::parse_duration(body)
        .or_else(|e| fractional_duration(body).ok_or_else(|| e.to_string()))?;

    Ok(if negative { Duration::ZERO } else { ttl })
}

/// Go `time.ParseDuration` units with decimal fractions, e.g. `1.5h`, `2h45.5m`.
fn fractional_duration(text: &str) -> Option<Duration> {
    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut rest = text;
    let mut secs = 0f64;

    if rest.is_empty() {
        return None;
    }
    while !rest.is_empty() {
        let (number, tail) = rest.split_at(rest.find(|c: char| !is_number(c)).unwrap_or(rest.len()));
        let (unit, next) = tail.split_at(tail.find(is_number).unwrap_or(tail.len()));

        let value: f64 = number.parse().ok()?;
        let scale = match unit {
            "ns" => 1e-9,
            "us" | "µs" | "μs" => 1e-6,
            "ms" => 1e-3,
            "s" => 1.0,
            "m" => 60.0,
            "h" => 3600.0,
            _ => return None,
        };
        secs += value * scale;
        rest = next;
    }

    Duration::try_from_secs_f64(secs).ok()
}
