//! Field extraction.
//!
//! Maps one raw visit record (untyped JSON: top-level scalar
//! attributes plus a nested `fields` object keyed by opaque custom
//! field identifiers, each value a list) into the flat, named field
//! map that fingerprinting and rendering consume.
//!
//! Extraction is total: missing or malformed input resolves to
//! defaults, never an error. The mapping from opaque identifiers to
//! form labels lives in a [`FieldTable`] that can be overridden by an
//! external JSON file, so a schema change in the source account does
//! not require a rebuild.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::DateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Fill-in marker for absent custom-field values. Doubles as the
/// blank line a driver writes on in the printed form.
pub const PLACEHOLDER: &str = "_______________________";

/// Shown when a top-level attribute or timestamp is absent.
pub const NOT_AVAILABLE: &str = "N/A";

/// Field map key for the waitlisted timestamp. Always present in the
/// extracted map; the completion gate keys off it.
pub const WAITLISTED: &str = "Waitlisted";

/// Field map key for the served timestamp. Always present in the
/// extracted map.
pub const SERVED: &str = "Served";

/// Where a form field's value comes from in the raw record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum FieldSource {
    /// A top-level scalar attribute, e.g. `firstName`.
    Attribute {
        /// Attribute name in the raw record.
        key: String,
    },
    /// A top-level UTC timestamp attribute, converted to the display
    /// timezone.
    Timestamp {
        /// Attribute name in the raw record.
        key: String,
    },
    /// First element of a list-valued custom field.
    Custom {
        /// Opaque identifier assigned by the source account.
        id: String,
    },
}

/// One output field: its form label and where its value comes from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Label used as the field map key and on the printed form.
    pub label: String,
    /// Source of the value in the raw record.
    #[serde(flatten)]
    pub source: FieldSource,
}

/// The named configuration table mapping form labels to raw-record
/// sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldTable {
    /// Output fields in form order.
    pub fields: Vec<FieldSpec>,
}

impl FieldTable {
    /// Load a field table from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. A broken
    /// override file is a configuration problem; silently falling back
    /// to the built-in table would hide it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Load the override file when configured, the built-in table
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error only for an unreadable or unparseable override
    /// file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }
}

impl Default for FieldTable {
    /// Built-in table for the production visit account.
    fn default() -> Self {
        fn attr(label: &str, key: &str) -> FieldSpec {
            FieldSpec {
                label: label.to_string(),
                source: FieldSource::Attribute { key: key.to_string() },
            }
        }
        fn ts(label: &str, key: &str) -> FieldSpec {
            FieldSpec {
                label: label.to_string(),
                source: FieldSource::Timestamp { key: key.to_string() },
            }
        }
        fn custom(label: &str, id: &str) -> FieldSpec {
            FieldSpec {
                label: label.to_string(),
                source: FieldSource::Custom { id: id.to_string() },
            }
        }

        Self {
            fields: vec![
                attr("Id", "id"),
                ts("Date", "created"),
                attr("First Name", "firstName"),
                attr("Last Name", "lastName"),
                attr("Phone", "phone"),
                attr("Country", "country"),
                attr("City", "city"),
                custom("Carrier", "tcY1X5Kb7h2uIWK53Lyg"),
                custom("Vehicle Type", "i1I6xyqqxa6oTlE3DkYM"),
                custom("Trailer/Container Number", "uMvYMV9AWZ1OGIbA1JKn"),
                custom("Destination", "fikIvjiydrX5ofr6RvNi"),
                custom("Broker", "NIzqc21iVthkg02MTLGG"),
                custom("Scheduled Appointment Time", "7vccTLW6wx0uJTI8pTGV"),
                custom("Customer Name", "60kWvZTF6SNkCEECXi66"),
                custom("Scanner", "vGcgWk6xCnY3CjQuEgxa"),
                custom("Customer PO #", "L325nfBjUROuGPa3qUJu"),
                custom("Dispatcher Name", "w22E7B7dLi4SYeXxgzLG"),
                custom("Dispatcher Phone", "ot2ggPrasvp776PDLArX"),
                custom("Dock In Time", "8WHDY3nMaW2GlARauOn5"),
                custom("Dock Out Time", "BkDnZV8ZKyp8CH0oBacG"),
                custom("Poles Used", "DAFP7BsGgqUest0w98tL"),
                custom("Timbers Used", "RX6CchYy0g2NCGDu8wqx"),
            ],
        }
    }
}

/// One visit record after extraction: the ledger key plus the flat
/// field map everything downstream consumes.
#[derive(Debug, Clone)]
pub struct ExtractedVisit {
    /// Source-assigned record identifier; `N/A` when the record had
    /// none (degenerate but still processed, extraction being total).
    pub record_id: String,
    /// Flat label → value map, including the structural [`WAITLISTED`]
    /// and [`SERVED`] entries.
    pub fields: BTreeMap<String, String>,
}

impl ExtractedVisit {
    /// Field value by label, with the fill-in placeholder for labels
    /// the table did not produce.
    #[must_use]
    pub fn field(&self, label: &str) -> &str {
        self.fields.get(label).map_or(PLACEHOLDER, String::as_str)
    }

    /// Displayed waitlisted timestamp, `N/A` when the visit has not
    /// reached check-in.
    #[must_use]
    pub fn waitlisted_at(&self) -> &str {
        self.fields.get(WAITLISTED).map_or(NOT_AVAILABLE, String::as_str)
    }

    /// Displayed served timestamp, `N/A` while service is pending.
    #[must_use]
    pub fn served_at(&self) -> &str {
        self.fields.get(SERVED).map_or(NOT_AVAILABLE, String::as_str)
    }
}

/// Extract one raw record into a flat named field map.
///
/// For each configured field, pulls either a top-level attribute
/// (`N/A` when absent), a converted timestamp attribute, or the first
/// element of a list-valued custom field (placeholder when the list is
/// empty or the key absent). The waitlisted and served timestamps are
/// always extracted in addition to the table, because the completion
/// gate and the change fingerprint depend on them.
#[must_use]
pub fn extract(raw: &Value, table: &FieldTable, tz: Tz) -> ExtractedVisit {
    let mut fields = BTreeMap::new();

    for spec in &table.fields {
        let value = match &spec.source {
            FieldSource::Attribute { key } => attribute(raw, key),
            FieldSource::Timestamp { key } => utc_to_local(raw.get(key), tz),
            FieldSource::Custom { id } => custom_field(raw, id),
        };
        fields.insert(spec.label.clone(), value);
    }

    fields.insert(WAITLISTED.to_string(), utc_to_local(raw.get("waitlistTime"), tz));
    fields.insert(SERVED.to_string(), utc_to_local(raw.get("serveTime"), tz));

    let record_id = attribute(raw, "id");

    ExtractedVisit { record_id, fields }
}

/// Top-level scalar attribute, `N/A` when absent or non-scalar.
fn attribute(raw: &Value, key: &str) -> String {
    match raw.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

/// First element of a list-valued custom field, placeholder when the
/// list is empty, the key is absent, or `fields` is not an object.
fn custom_field(raw: &Value, id: &str) -> String {
    let head = raw
        .get("fields")
        .and_then(|fields| fields.get(id))
        .and_then(Value::as_array)
        .and_then(|list| list.first());

    match head {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => PLACEHOLDER.to_string(),
    }
}

/// Convert a UTC timestamp attribute to the display timezone.
///
/// Accepts RFC 3339 input (`2023-09-24T08:46:00.000Z`); anything
/// unparseable, absent, or null degrades to `N/A`.
fn utc_to_local(value: Option<&Value>, tz: Tz) -> String {
    let Some(Value::String(raw)) = value else {
        return NOT_AVAILABLE.to_string();
    };

    match DateTime::parse_from_rfc3339(raw) {
        Ok(utc) => utc.with_timezone(&tz).format("%Y-%m-%d %H:%M:%S %Z").to_string(),
        Err(_) => NOT_AVAILABLE.to_string(),
    }
}
