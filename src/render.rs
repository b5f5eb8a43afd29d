//! Sign-in form rendering.
//!
//! Turns one extracted visit into a printable plain-text driver
//! sign-in form under a dated directory hierarchy:
//!
//! ```text
//! <base>/Shipping <year>/<month name>/<YYYY-MM-DD>/<first>_<last>_<phone>.txt
//! ```
//!
//! Layout is a pure function of the field map; writing the file is the
//! only I/O. A target path that already exists is a filesystem naming
//! collision (two drivers with the same name and phone in one day),
//! not a duplicate export — the ledger handles deduplication by
//! content — so the writer appends an incrementing numeric suffix
//! until an unused path is found, never overwriting.

use std::fs::{self, File};
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use chrono_tz::Tz;

use crate::error::Result;
use crate::extract::{ExtractedVisit, PLACEHOLDER};

const FORM_EXT: &str = "txt";
const FORM_WIDTH: usize = 62;

/// Labeled field lines in printed order. `Driver Name` is composed
/// from two fields and handled separately.
const FORM_ROWS: [&str; 17] = [
    "Date",
    "Phone",
    "Carrier",
    "Broker",
    "Customer PO #",
    "Destination",
    "Trailer/Container Number",
    "Vehicle Type",
    "Scheduled Appointment Time",
    "Dispatcher Name",
    "Dispatcher Phone",
    "Customer Name",
    "Scanner",
    "Dock In Time",
    "Dock Out Time",
    "Timbers Used",
    "Poles Used",
];

/// Lay out the printable form for one visit. Pure.
#[must_use]
pub fn form_text(visit: &ExtractedVisit) -> String {
    let rule = "=".repeat(FORM_WIDTH);
    let title = "DRIVER SIGN IN FORM";
    let pad = (FORM_WIDTH.saturating_sub(title.len())) / 2;

    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    out.push_str(&" ".repeat(pad));
    out.push_str(title);
    out.push('\n');
    out.push_str(&rule);
    out.push_str("\n\n");

    out.push_str(&format!("Id: {}\n", visit.record_id));
    out.push_str(&format!(
        "Driver Name: {} {}\n",
        visit.field("First Name"),
        visit.field("Last Name")
    ));

    for label in FORM_ROWS {
        // Handwriting slots go where the original form put them
        if label == "Dock In Time" {
            out.push_str(&format!("Loader: {PLACEHOLDER}\n"));
        }
        out.push_str(&format!("{label}: {}\n", visit.field(label)));
    }

    out.push_str(&format!("Truck Assigned by: {PLACEHOLDER}\n"));
    out
}

/// Dated output directory for a given local date:
/// `<base>/Shipping <year>/<month name>/<YYYY-MM-DD>`.
#[must_use]
pub fn day_directory(base: &Path, now: DateTime<Tz>) -> PathBuf {
    base.join(now.format("Shipping %Y").to_string())
        .join(now.format("%B").to_string())
        .join(now.format("%Y-%m-%d").to_string())
}

/// File stem for one visit: `<first>_<last>_<phone>`, path separators
/// stripped so a hostile field value cannot escape the day directory.
fn file_stem(visit: &ExtractedVisit) -> String {
    let raw = format!(
        "{}_{}_{}",
        visit.field("First Name"),
        visit.field("Last Name"),
        visit.field("Phone")
    );
    raw.replace(['/', '\\'], "-")
}

/// First unused path for the stem inside `dir`: the bare name, then
/// `_1`, `_2`, ... suffixes.
fn resolve_collision(dir: &Path, stem: &str) -> PathBuf {
    let bare = dir.join(format!("{stem}.{FORM_EXT}"));
    if !bare.exists() {
        return bare;
    }

    let mut suffix = 1u32;
    loop {
        let candidate = dir.join(format!("{stem}_{suffix}.{FORM_EXT}"));
        if !candidate.exists() {
            return candidate;
        }
        suffix += 1;
    }
}

/// Render one visit to a form document under `base`.
///
/// Returns the path actually written. Failures are per-record: the
/// caller logs them, skips advancing the ledger for this record, and
/// continues with the rest of the cycle.
///
/// # Errors
///
/// Returns an error if the day directory cannot be created or the
/// document cannot be written.
pub fn write_form(base: &Path, visit: &ExtractedVisit, now: DateTime<Tz>) -> Result<PathBuf> {
    let dir = day_directory(base, now);
    fs::create_dir_all(&dir)?;

    let path = resolve_collision(&dir, &file_stem(visit));

    let file = File::create(&path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(form_text(visit).as_bytes())?;
    writer.flush()?;
    writer.get_ref().sync_all()?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{FieldTable, extract};
    use chrono::TimeZone as _;
    use chrono_tz::US::Eastern;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_visit() -> ExtractedVisit {
        let raw = json!({
            "id": "v_123",
            "firstName": "Ada",
            "lastName": "Reyes",
            "phone": "555-0134",
            "waitlistTime": "2023-09-24T09:00:00.000Z",
            "fields": {
                "tcY1X5Kb7h2uIWK53Lyg": ["Acme Freight"],
            }
        });
        extract(&raw, &FieldTable::default(), Eastern)
    }

    fn noon() -> DateTime<Tz> {
        Eastern.with_ymd_and_hms(2023, 9, 24, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_form_layout() {
        let text = form_text(&sample_visit());

        assert!(text.contains("DRIVER SIGN IN FORM"));
        assert!(text.contains("Id: v_123"));
        assert!(text.contains("Driver Name: Ada Reyes"));
        assert!(text.contains("Carrier: Acme Freight"));
        // Absent fields render as fill-in lines, never disappear
        assert!(text.contains(&format!("Destination: {PLACEHOLDER}")));
        assert!(text.contains(&format!("Loader: {PLACEHOLDER}")));
        assert!(text.contains(&format!("Truck Assigned by: {PLACEHOLDER}")));
    }

    #[test]
    fn test_day_directory_layout() {
        let dir = day_directory(Path::new("/exports"), noon());
        assert_eq!(
            dir,
            Path::new("/exports/Shipping 2023/September/2023-09-24")
        );
    }

    #[test]
    fn test_write_form_deterministic_path() {
        let base = TempDir::new().unwrap();
        let path = write_form(base.path(), &sample_visit(), noon()).unwrap();

        assert!(path.ends_with("Shipping 2023/September/2023-09-24/Ada_Reyes_555-0134.txt"));
        assert!(path.exists());
    }

    #[test]
    fn test_collision_appends_suffix() {
        let base = TempDir::new().unwrap();
        let visit = sample_visit();

        let first = write_form(base.path(), &visit, noon()).unwrap();
        let second = write_form(base.path(), &visit, noon()).unwrap();
        let third = write_form(base.path(), &visit, noon()).unwrap();

        assert!(first.ends_with("Ada_Reyes_555-0134.txt"));
        assert!(second.ends_with("Ada_Reyes_555-0134_1.txt"));
        assert!(third.ends_with("Ada_Reyes_555-0134_2.txt"));
        // All three files exist: collisions never overwrite
        assert!(first.exists() && second.exists() && third.exists());
    }

    #[test]
    fn test_path_separators_stripped_from_stem() {
        let raw = json!({
            "id": "v_9",
            "firstName": "../escape",
            "lastName": "Reyes",
            "phone": "555",
        });
        let visit = extract(&raw, &FieldTable::default(), Eastern);

        let base = TempDir::new().unwrap();
        let path = write_form(base.path(), &visit, noon()).unwrap();

        assert!(path.starts_with(base.path()));
        assert!(path.ends_with("..-escape_Reyes_555.txt"));
    }
}
