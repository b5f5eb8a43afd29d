//! Content fingerprinting for change detection.
//!
//! The source API has no reliable "changed since" signal, so change
//! detection hashes the extracted field map instead. By digesting the
//! serialized map with keys in sorted order, two polls that produced
//! the same field values yield the same fingerprint no matter how the
//! maps were built.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// A content fingerprint plus the wall-clock time it was computed.
///
/// `captured_at` is ledger bookkeeping only. It is never part of the
/// digested content; folding it in would make every poll look changed
/// and defeat deduplication entirely.
#[derive(Debug, Clone)]
pub struct Fingerprint {
    /// SHA-256 hex digest of the field map.
    pub digest: String,
    /// When the fingerprint was computed.
    pub captured_at: DateTime<Utc>,
}

/// Compute the fingerprint of a field map.
///
/// The map is serialized to JSON and hashed. `BTreeMap` iterates in
/// lexicographic key order, so the serialization is deterministic and
/// independent of insertion order.
///
/// # Panics
///
/// Panics if the map cannot be serialized to JSON, which cannot happen
/// for a string-to-string map.
#[must_use]
pub fn fingerprint(fields: &BTreeMap<String, String>) -> Fingerprint {
    let json = serde_json::to_string(fields).expect("string map serialization should not fail");
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());

    Fingerprint {
        digest: format!("{:x}", hasher.finalize()),
        captured_at: Utc::now(),
    }
}
