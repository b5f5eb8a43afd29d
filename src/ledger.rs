//! The export ledger.
//!
//! Durable mapping from record identifier to the fingerprint last
//! exported for it and when it was last seen. The ledger is the source
//! of truth for "has this exact record state already been exported"
//! and the only long-lived mutable state in the process: loaded once
//! at startup, persisted after every mutation.
//!
//! # Durability
//!
//! Persistence is atomic: write to a temp file, `fsync`, then rename
//! over the target. A process kill mid-write leaves the previous
//! ledger intact rather than a truncated file. A missing or corrupt
//! ledger file degrades to an empty ledger with a logged warning — the
//! cost is re-exporting already-seen records, which produces new
//! suffixed documents rather than corrupting anything.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// What the ledger remembers about one record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Fingerprint of the record state last exported.
    pub fingerprint: String,
    /// When the record was last seen with this state.
    pub last_seen_at: DateTime<Utc>,
}

/// The export ledger: at most one entry per record identifier.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: HashMap<String, LedgerEntry>,
}

impl Ledger {
    /// Load the persisted ledger.
    ///
    /// Never fails the caller: a missing file is a fresh start and a
    /// corrupt or unreadable file degrades to an empty ledger with a
    /// logged warning.
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let entries = match fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "ledger file is corrupt, starting with an empty ledger"
                    );
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "ledger file is unreadable, starting with an empty ledger"
                );
                HashMap::new()
            }
        };

        Self {
            path: path.to_path_buf(),
            entries,
        }
    }

    /// Look up the last exported state for a record.
    #[must_use]
    pub fn lookup(&self, record_id: &str) -> Option<&LedgerEntry> {
        self.entries.get(record_id)
    }

    /// Record a successful export: insert or overwrite the entry.
    ///
    /// `last_seen_at` never moves backwards, even if the caller hands
    /// in an older timestamp.
    pub fn record_export(&mut self, record_id: &str, fingerprint: String, seen_at: DateTime<Utc>) {
        let last_seen_at = self
            .entries
            .get(record_id)
            .map_or(seen_at, |e| seen_at.max(e.last_seen_at));

        self.entries.insert(
            record_id.to_string(),
            LedgerEntry {
                fingerprint,
                last_seen_at,
            },
        );
    }

    /// Atomically write the full ledger to its file.
    ///
    /// # Errors
    ///
    /// Returns an error if any file operation fails. The in-memory
    /// ledger remains authoritative for the process lifetime; callers
    /// log the failure and continue rather than unwinding.
    pub fn persist(&self) -> Result<()> {
        let temp_path = self.path.with_extension("json.tmp");

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to temp file, sync to disk before rename
        {
            let file = File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, &self.entries)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }

        fs::rename(&temp_path, &self.path)?;

        Ok(())
    }

    /// Remove entries whose `last_seen_at` is strictly older than
    /// `now - retention`. Returns the number removed; callers persist
    /// when it is nonzero.
    pub fn prune(&mut self, retention: Duration, now: DateTime<Utc>) -> usize {
        let cutoff = now - retention;
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.last_seen_at >= cutoff);
        before - self.entries.len()
    }

    /// Number of tracked records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no records are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
