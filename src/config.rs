//! Startup configuration.
//!
//! Gatepass has no CLI surface: every setting is resolved once at
//! startup from `GATEPASS_*` environment variables, with file
//! fallbacks where the deployment historically used them (the API
//! key). A missing API key is the one unrecoverable startup error;
//! everything else has a built-in default.

use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Production visit-export endpoint.
pub const DEFAULT_API_URL: &str = "https://api.waitwhile.com/v2/visits/export";

/// File fallback for the API key when `GATEPASS_API_KEY` is unset.
const API_KEY_FILE: &str = "apikey.txt";

const DEFAULT_EXPORT_DIR: &str = "export";
const DEFAULT_LEDGER_PATH: &str = "ledger.json";
const DEFAULT_POLL_SECS: u64 = 60;
const DEFAULT_RETENTION_DAYS: i64 = 3;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DISPLAY_TZ: &str = "US/Eastern";

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// API key sent in the `apikey` request header.
    pub api_key: String,
    /// Visit-export endpoint URL.
    pub api_url: String,
    /// Base directory for rendered sign-in forms.
    pub export_dir: PathBuf,
    /// Path of the persisted export ledger.
    pub ledger_path: PathBuf,
    /// How often a full sync cycle runs.
    pub poll_cadence: Duration,
    /// Ledger entries unseen for longer than this are pruned.
    pub retention: chrono::Duration,
    /// Timezone used for displayed timestamps and dated directories.
    pub display_tz: Tz,
    /// Optional field-table override file.
    pub field_table_path: Option<PathBuf>,
    /// Per-request timeout for the visit API.
    pub request_timeout: Duration,
}

impl Config {
    /// Load configuration from the environment and local files.
    ///
    /// Priority per setting:
    /// 1. `GATEPASS_*` environment variable
    /// 2. File fallback (API key only: `apikey.txt` in the working directory)
    /// 3. Built-in default
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the API key cannot be
    /// resolved or a setting fails to parse. Callers should halt the
    /// process: nothing downstream can recover from bad configuration.
    pub fn load() -> Result<Self> {
        let api_key = resolve_api_key()?;
        let api_url = env_or("GATEPASS_API_URL", DEFAULT_API_URL);
        let export_dir = PathBuf::from(env_or("GATEPASS_EXPORT_DIR", DEFAULT_EXPORT_DIR));
        let ledger_path = PathBuf::from(env_or("GATEPASS_LEDGER", DEFAULT_LEDGER_PATH));

        let poll_secs = parse_setting("GATEPASS_POLL_SECS", env_var("GATEPASS_POLL_SECS"), DEFAULT_POLL_SECS)?;
        let retention_days = parse_setting(
            "GATEPASS_RETENTION_DAYS",
            env_var("GATEPASS_RETENTION_DAYS"),
            DEFAULT_RETENTION_DAYS,
        )?;
        if retention_days <= 0 {
            return Err(Error::Config(format!(
                "GATEPASS_RETENTION_DAYS must be positive, got {retention_days}"
            )));
        }
        let timeout_secs = parse_setting(
            "GATEPASS_HTTP_TIMEOUT_SECS",
            env_var("GATEPASS_HTTP_TIMEOUT_SECS"),
            DEFAULT_HTTP_TIMEOUT_SECS,
        )?;

        let display_tz = parse_timezone(&env_or("GATEPASS_TZ", DEFAULT_DISPLAY_TZ))?;
        let field_table_path = env_var("GATEPASS_FIELDS").map(PathBuf::from);

        Ok(Self {
            api_key,
            api_url,
            export_dir,
            ledger_path,
            poll_cadence: Duration::from_secs(poll_secs),
            retention: chrono::Duration::days(retention_days),
            display_tz,
            field_table_path,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Read a non-empty environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Environment variable with a default.
fn env_or(name: &str, default: &str) -> String {
    env_var(name).unwrap_or_else(|| default.to_string())
}

/// Resolve the API key.
///
/// Priority:
/// 1. `GATEPASS_API_KEY` environment variable
/// 2. `apikey.txt` in the working directory (trimmed)
fn resolve_api_key() -> Result<String> {
    if let Some(key) = env_var("GATEPASS_API_KEY") {
        return Ok(key);
    }

    let path = PathBuf::from(API_KEY_FILE);
    match fs::read_to_string(&path) {
        Ok(raw) => {
            let key = raw.trim().to_string();
            if key.is_empty() {
                Err(Error::MissingApiKey { path })
            } else {
                Ok(key)
            }
        }
        Err(_) => Err(Error::MissingApiKey { path }),
    }
}

/// Parse a setting from its raw environment value, falling back to the
/// default when unset. An unparseable value is a configuration error,
/// never a silent fallback.
fn parse_setting<T>(name: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
{
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("invalid {name}: {value:?}"))),
    }
}

fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| Error::Config(format!("unknown timezone: {name:?}")))
}
