//! Sync cycle driver.
//!
//! One cycle is a full fetch→extract→detect→render→persist pass over
//! the poll window. The driver owns the loop around it: a scheduler
//! tick runs a cycle whenever the poll cadence has elapsed, a janitor
//! tick prunes the ledger, and a short fixed sleep separates ticks.
//! Everything inside a cycle runs to completion before the next tick
//! is considered.
//!
//! Every stage reports a typed outcome. The driver aborts the cycle on
//! fetch failure (nothing was durably advanced, the next tick retries
//! from scratch) and continues past per-record render failures (the
//! record's ledger entry is not advanced, so it retries next cycle).

use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::detect::{classify, export_eligible};
use crate::error::Result;
use crate::extract::{FieldTable, extract};
use crate::fetch::VisitClient;
use crate::fingerprint::fingerprint;
use crate::ledger::Ledger;
use crate::render::write_form;

/// Sleep between driver loop ticks.
const TICK: std::time::Duration = std::time::Duration::from_secs(1);

/// What happened to one record within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Rendered and the ledger advanced.
    Exported,
    /// Fingerprint matched the ledger; nothing to do.
    Unchanged,
    /// Held back by the completion gate.
    Held,
    /// Render failed; the ledger was not advanced and the record
    /// retries next cycle.
    Failed,
}

/// Counters for one completed cycle.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CycleStats {
    /// Records returned by the fetch.
    pub fetched: usize,
    /// Documents written (ledger advanced).
    pub exported: usize,
    /// Records skipped with a matching fingerprint.
    pub unchanged: usize,
    /// Records held back by the completion gate.
    pub held: usize,
    /// Records whose render failed.
    pub failed: usize,
}

/// Orchestrates sync cycles and the surrounding loop.
pub struct Driver {
    client: VisitClient,
    table: FieldTable,
    config: Config,
}

impl Driver {
    /// Build a driver: resolves the field table and the API client.
    ///
    /// # Errors
    ///
    /// Returns an error when a configured field-table override file
    /// cannot be loaded.
    pub fn new(config: Config) -> Result<Self> {
        let table = FieldTable::load(config.field_table_path.as_deref())?;
        let client = VisitClient::new(&config);
        Ok(Self {
            client,
            table,
            config,
        })
    }

    /// Run one full sync cycle.
    ///
    /// # Errors
    ///
    /// Returns an error only when the fetch itself fails; per-record
    /// failures are absorbed into the stats.
    pub async fn run_cycle(&self, ledger: &mut Ledger) -> Result<CycleStats> {
        let now = Utc::now().with_timezone(&self.config.display_tz);
        let records = self.client.fetch(now).await?;
        Ok(self.process_records(&records, ledger))
    }

    /// Detect and export one poll window's records. Split from the
    /// fetch so the pipeline can be driven with canned records.
    pub fn process_records(&self, records: &[Value], ledger: &mut Ledger) -> CycleStats {
        let mut stats = CycleStats {
            fetched: records.len(),
            ..CycleStats::default()
        };

        for raw in records {
            match self.process_record(raw, ledger) {
                RecordOutcome::Exported => stats.exported += 1,
                RecordOutcome::Unchanged => stats.unchanged += 1,
                RecordOutcome::Held => stats.held += 1,
                RecordOutcome::Failed => stats.failed += 1,
            }
        }

        stats
    }

    /// Gate, classify, and (when required) export a single record.
    fn process_record(&self, raw: &Value, ledger: &mut Ledger) -> RecordOutcome {
        let visit = extract(raw, &self.table, self.config.display_tz);

        if !export_eligible(&visit) {
            debug!(record_id = %visit.record_id, "not yet waitlisted, holding");
            return RecordOutcome::Held;
        }

        let fp = fingerprint(&visit.fields);
        let change = classify(ledger, &visit.record_id, &fp.digest);
        if !change.requires_export() {
            debug!(record_id = %visit.record_id, "unchanged, skipping");
            return RecordOutcome::Unchanged;
        }

        let now = Utc::now().with_timezone(&self.config.display_tz);
        match write_form(&self.config.export_dir, &visit, now) {
            Ok(path) => {
                info!(
                    record_id = %visit.record_id,
                    change = ?change,
                    path = %path.display(),
                    "exported sign-in form"
                );
                ledger.record_export(&visit.record_id, fp.digest, fp.captured_at);
                if let Err(e) = ledger.persist() {
                    // Durability traded for availability: the in-memory
                    // ledger stays authoritative for this process.
                    warn!(error = %e, "ledger persist failed, continuing in memory");
                }
                RecordOutcome::Exported
            }
            Err(e) => {
                warn!(
                    record_id = %visit.record_id,
                    error = %e,
                    "render failed, will retry next cycle"
                );
                RecordOutcome::Failed
            }
        }
    }

    /// Janitor tick: prune stale ledger entries, persisting only when
    /// something was removed.
    pub fn run_janitor(&self, ledger: &mut Ledger) {
        let removed = ledger.prune(self.config.retention, Utc::now());
        if removed > 0 {
            debug!(removed, remaining = ledger.len(), "pruned stale ledger entries");
            if let Err(e) = ledger.persist() {
                warn!(error = %e, "ledger persist failed after pruning");
            }
        }
    }

    /// Drive the loop until externally terminated: scheduler tick,
    /// janitor tick, short sleep.
    pub async fn run(&self, ledger: &mut Ledger) {
        let mut last_poll: Option<Instant> = None;

        loop {
            let due = last_poll.is_none_or(|t| t.elapsed() >= self.config.poll_cadence);
            if due {
                last_poll = Some(Instant::now());
                match self.run_cycle(ledger).await {
                    Ok(stats) => info!(
                        fetched = stats.fetched,
                        exported = stats.exported,
                        unchanged = stats.unchanged,
                        held = stats.held,
                        failed = stats.failed,
                        "cycle complete"
                    ),
                    Err(e) => warn!(error = %e, "cycle aborted, retrying on next tick"),
                }
            }

            self.run_janitor(ledger);
            tokio::time::sleep(TICK).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        Config {
            api_key: "test-key".into(),
            api_url: "http://localhost:0".into(),
            export_dir: dir.path().join("export"),
            ledger_path: dir.path().join("ledger.json"),
            poll_cadence: std::time::Duration::from_secs(60),
            retention: Duration::days(3),
            display_tz: chrono_tz::US::Eastern,
            field_table_path: None,
            request_timeout: std::time::Duration::from_secs(5),
        }
    }

    fn driver(dir: &TempDir) -> Driver {
        Driver::new(test_config(dir)).unwrap()
    }

    fn waitlisted_record(id: &str, serve_time: Option<&str>) -> Value {
        json!({
            "id": id,
            "firstName": "Ada",
            "lastName": "Reyes",
            "phone": "555-0134",
            "waitlistTime": "2023-09-24T09:00:00.000Z",
            "serveTime": serve_time,
            "fields": {
                "tcY1X5Kb7h2uIWK53Lyg": ["Acme Freight"],
            }
        })
    }

    fn exported_files(dir: &TempDir) -> Vec<PathBuf> {
        fn walk(dir: &std::path::Path, out: &mut Vec<PathBuf>) {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.is_dir() {
                        walk(&path, out);
                    } else {
                        out.push(path);
                    }
                }
            }
        }
        let mut out = Vec::new();
        walk(&dir.path().join("export"), &mut out);
        out
    }

    #[test]
    fn test_idempotence_across_cycles() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let mut ledger = Ledger::load(&dir.path().join("ledger.json"));
        let records = [waitlisted_record("v_1", None)];

        let first = driver.process_records(&records, &mut ledger);
        assert_eq!(first.exported, 1);
        assert_eq!(ledger.len(), 1);

        // Same unchanged record next cycle: a no-op
        let second = driver.process_records(&records, &mut ledger);
        assert_eq!(second.exported, 0);
        assert_eq!(second.unchanged, 1);

        assert_eq!(exported_files(&dir).len(), 1);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_change_triggers_reexport() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let mut ledger = Ledger::load(&dir.path().join("ledger.json"));

        driver.process_records(&[waitlisted_record("v_1", None)], &mut ledger);
        let before = ledger.lookup("v_1").unwrap().clone();

        // Service completes: fingerprint differs, record re-exports
        let stats =
            driver.process_records(&[waitlisted_record("v_1", Some("2023-09-24T10:00:00.000Z"))], &mut ledger);

        assert_eq!(stats.exported, 1);
        assert_eq!(exported_files(&dir).len(), 2);
        let after = ledger.lookup("v_1").unwrap();
        assert_ne!(after.fingerprint, before.fingerprint);
        assert!(after.last_seen_at >= before.last_seen_at);
    }

    #[test]
    fn test_gate_holds_unwaitlisted_records() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let mut ledger = Ledger::load(&dir.path().join("ledger.json"));

        let record = json!({"id": "v_1", "firstName": "Ada"});
        let stats = driver.process_records(&[record], &mut ledger);

        assert_eq!(stats.held, 1);
        assert_eq!(stats.exported, 0);
        assert!(ledger.is_empty());
        assert!(exported_files(&dir).is_empty());
    }

    #[test]
    fn test_ledger_persisted_after_export() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let ledger_path = dir.path().join("ledger.json");
        let mut ledger = Ledger::load(&ledger_path);

        driver.process_records(&[waitlisted_record("v_1", None)], &mut ledger);

        // A fresh process sees the export
        let reloaded = Ledger::load(&ledger_path);
        assert!(reloaded.lookup("v_1").is_some());
    }

    #[test]
    fn test_pruned_record_reexports_as_new() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let mut ledger = Ledger::load(&dir.path().join("ledger.json"));
        let records = [waitlisted_record("v_1", None)];

        driver.process_records(&records, &mut ledger);

        // Simulate three quiet days, then the janitor tick
        let removed = ledger.prune(Duration::days(3), Utc::now() + Duration::days(4));
        assert_eq!(removed, 1);

        let stats = driver.process_records(&records, &mut ledger);
        assert_eq!(stats.exported, 1);
        assert_eq!(exported_files(&dir).len(), 2);
    }

    #[test]
    fn test_mixed_cycle_counts() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let mut ledger = Ledger::load(&dir.path().join("ledger.json"));

        driver.process_records(&[waitlisted_record("seen", None)], &mut ledger);

        let stats = driver.process_records(
            &[
                waitlisted_record("seen", None),
                waitlisted_record("fresh", None),
                json!({"id": "early"}),
            ],
            &mut ledger,
        );

        assert_eq!(stats.fetched, 3);
        assert_eq!(stats.unchanged, 1);
        assert_eq!(stats.exported, 1);
        assert_eq!(stats.held, 1);
        assert_eq!(stats.failed, 0);
    }

    #[test]
    fn test_scenario_waitlist_then_serve() {
        // R1 appears waitlisted: exported once. Unchanged next cycle:
        // skipped. serveTime arrives: re-exported, ledger updated.
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let mut ledger = Ledger::load(&dir.path().join("ledger.json"));

        let s1 = driver.process_records(&[waitlisted_record("r1", None)], &mut ledger);
        assert_eq!((s1.exported, s1.unchanged), (1, 0));
        let h1 = ledger.lookup("r1").unwrap().fingerprint.clone();

        let s2 = driver.process_records(&[waitlisted_record("r1", None)], &mut ledger);
        assert_eq!((s2.exported, s2.unchanged), (0, 1));
        assert_eq!(ledger.lookup("r1").unwrap().fingerprint, h1);

        let s3 = driver.process_records(
            &[waitlisted_record("r1", Some("2023-09-24T10:00:00.000Z"))],
            &mut ledger,
        );
        assert_eq!((s3.exported, s3.unchanged), (1, 0));
        assert_ne!(ledger.lookup("r1").unwrap().fingerprint, h1);
        assert_eq!(exported_files(&dir).len(), 2);
    }
}
