//! Natega-Sweep: a resumable bulk fetcher for exam result pages
//!
//! This crate fetches per-identifier result pages from a fixed set of
//! interchangeable mirror hosts, extracts a fixed set of fields from each
//! response, and persists both the extracted records and a progress
//! checkpoint so that a long range sweep can stop and resume where it left off.

pub mod config;
pub mod endpoint;
pub mod extract;
pub mod harvest;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Natega-Sweep operations
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error on {endpoint}: {source}")]
    Transport {
        endpoint: String,
        source: reqwest::Error,
    },

    #[error("Request timeout on {endpoint}")]
    Timeout { endpoint: String },

    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { endpoint: String, status: u16 },

    #[error("Challenge page returned for {id} by {endpoint}")]
    ChallengeDetected { id: u64, endpoint: String },

    #[error("Incomplete record for {id}: missing {missing}")]
    ExtractionIncomplete { id: u64, missing: &'static str },

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl SweepError {
    /// Returns true if this error came from the network layer
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::HttpStatus { .. }
        )
    }
}

/// Configuration-specific errors
///
/// These are only ever raised before any work is dispatched.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Endpoint set is empty")]
    EmptyEndpoints,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Result type alias for Natega-Sweep operations
pub type Result<T> = std::result::Result<T, SweepError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use endpoint::{Endpoint, EndpointRotator};
pub use extract::{ExtractedRecord, FieldExtractor, FieldName, ResultPageExtractor};
pub use harvest::{Dispatcher, RangeRequest, RunOutcome};
pub use output::{StatsReporter, StatsSnapshot};
pub use state::{Outcome, ScrapeState, SystemMode};
