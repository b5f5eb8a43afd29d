//! Change detection.
//!
//! Per polled record: first the completion gate, then classification
//! against the ledger as NEW, CHANGED, or UNCHANGED. Records are
//! evaluated independently; nothing here depends on cross-record
//! ordering within a poll cycle.

use crate::extract::{ExtractedVisit, NOT_AVAILABLE};
use crate::ledger::Ledger;

/// How a polled record relates to the state last exported for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// No ledger entry exists for the record.
    New,
    /// A ledger entry exists and its fingerprint differs.
    Changed,
    /// A ledger entry exists with the same fingerprint.
    Unchanged,
}

impl Change {
    /// Whether this classification requires an export.
    #[must_use]
    pub const fn requires_export(self) -> bool {
        matches!(self, Self::New | Self::Changed)
    }
}

/// Completion gate, evaluated before any fingerprint comparison.
///
/// A record is export-eligible only once it carries a real waitlisted
/// timestamp — the visit has reached the physical check-in point.
/// Whether service has since completed does not hold the record back;
/// a served timestamp without a waitlisted one does not open the gate
/// either. Ineligible records are held regardless of how novel their
/// fingerprint is, so sign-in forms never print for visits that have
/// not checked in.
#[must_use]
pub fn export_eligible(visit: &ExtractedVisit) -> bool {
    visit.waitlisted_at() != NOT_AVAILABLE
}

/// Classify a record against the ledger.
#[must_use]
pub fn classify(ledger: &Ledger, record_id: &str, digest: &str) -> Change {
    match ledger.lookup(record_id) {
        None => Change::New,
        Some(entry) if entry.fingerprint == digest => Change::Unchanged,
        Some(_) => Change::Changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FieldTable, extract};
    use chrono::Utc;
    use chrono_tz::US::Eastern;
    use serde_json::json;
    use tempfile::TempDir;

    fn visit(raw: serde_json::Value) -> ExtractedVisit {
        extract(&raw, &FieldTable::default(), Eastern)
    }

    #[test]
    fn test_classify_new_changed_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::load(&dir.path().join("ledger.json"));

        assert_eq!(classify(&ledger, "v_1", "h1"), Change::New);

        ledger.record_export("v_1", "h1".into(), Utc::now());
        assert_eq!(classify(&ledger, "v_1", "h1"), Change::Unchanged);
        assert_eq!(classify(&ledger, "v_1", "h2"), Change::Changed);
    }

    #[test]
    fn test_requires_export() {
        assert!(Change::New.requires_export());
        assert!(Change::Changed.requires_export());
        assert!(!Change::Unchanged.requires_export());
    }

    #[test]
    fn test_gate_requires_waitlist_timestamp() {
        let not_checked_in = visit(json!({"id": "v_1"}));
        assert!(!export_eligible(&not_checked_in));

        let waitlisted = visit(json!({
            "id": "v_1",
            "waitlistTime": "2023-09-24T09:00:00.000Z",
        }));
        assert!(export_eligible(&waitlisted));
    }

    #[test]
    fn test_gate_serve_alone_is_not_enough() {
        // A served timestamp without a waitlisted one never opens the gate.
        let served_only = visit(json!({
            "id": "v_1",
            "serveTime": "2023-09-24T10:00:00.000Z",
        }));
        assert!(!export_eligible(&served_only));
    }

    #[test]
    fn test_gate_served_record_stays_eligible() {
        let completed = visit(json!({
            "id": "v_1",
            "waitlistTime": "2023-09-24T09:00:00.000Z",
            "serveTime": "2023-09-24T10:00:00.000Z",
        }));
        assert!(export_eligible(&completed));
    }
}
