//! Error types for gatepass.
//!
//! Provides structured error handling with:
//! - Category-based exit codes (2=config, 3=http, 4=io, 5=json)
//! - `#[from]` conversions for the I/O, JSON, and HTTP layers
//!
//! Only configuration errors are fatal: the sync loop logs and
//! recovers from everything else.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for gatepass operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while polling and exporting visit records.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API key not found: set GATEPASS_API_KEY or create {}", path.display())]
    MissingApiKey { path: PathBuf },

    #[error("Visit API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Visit API returned status {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Category-based exit code (1-5).
    ///
    /// Shell wrappers and service supervisors match on the exit code;
    /// only configuration errors actually reach `main`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) | Self::MissingApiKey { .. } => 2,
            Self::Http(_) | Self::ApiStatus { .. } => 3,
            Self::Io(_) => 4,
            Self::Json(_) => 5,
        }
    }

    /// Whether the next scheduled tick may succeed without operator
    /// intervention.
    ///
    /// True for network and disk failures; false for configuration
    /// errors, which require a restart with corrected settings.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::ApiStatus { .. } | Self::Io(_) | Self::Json(_)
        )
    }
}
