//! Persisted progress record and the result-system flag

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which result system the mirrors are asked to query
///
/// Serialized as its numeric code, both in the form field and in the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SystemMode {
    /// Let the mirror search both systems
    Both,
    /// The modern system
    Modern,
    /// The legacy system
    Legacy,
}

impl SystemMode {
    /// Numeric code sent as the `system` form field
    pub fn code(&self) -> u8 {
        match self {
            Self::Both => 0,
            Self::Modern => 1,
            Self::Legacy => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Both),
            1 => Some(Self::Modern),
            2 => Some(Self::Legacy),
            _ => None,
        }
    }

    /// Flips between the modern and legacy systems
    ///
    /// `Both` toggles to `Modern`.
    pub fn toggled(&self) -> Self {
        match self {
            Self::Legacy => Self::Modern,
            Self::Modern | Self::Both => Self::Legacy,
        }
    }
}

impl TryFrom<u8> for SystemMode {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unknown system mode {}", code))
    }
}

impl From<SystemMode> for u8 {
    fn from(mode: SystemMode) -> u8 {
        mode.code()
    }
}

impl fmt::Display for SystemMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Both => write!(f, "both systems"),
            Self::Modern => write!(f, "modern system"),
            Self::Legacy => write!(f, "legacy system"),
        }
    }
}

/// Authoritative resume point for a sweep
///
/// Field names match the on-disk checkpoint format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeState {
    /// Completion watermark: every identifier up to this one has been processed
    #[serde(rename = "last_id", default)]
    pub last_processed_id: u64,

    #[serde(rename = "processed", default)]
    pub processed_count: u64,

    #[serde(rename = "success", default)]
    pub success_count: u64,

    #[serde(rename = "failures", default)]
    pub failure_count: u64,

    /// Responses classified as anti-automation challenges
    #[serde(rename = "captchas", default)]
    pub ambiguous_count: u64,

    #[serde(rename = "system", default = "default_mode")]
    pub mode: SystemMode,

    /// Run start as Unix seconds
    #[serde(default = "now_unix_seconds")]
    pub start_time: f64,
}

fn default_mode() -> SystemMode {
    SystemMode::Legacy
}

/// Current wall-clock time as fractional Unix seconds
pub fn now_unix_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

impl ScrapeState {
    /// Creates an empty state for a fresh run starting now
    pub fn new(mode: SystemMode) -> Self {
        Self {
            last_processed_id: 0,
            processed_count: 0,
            success_count: 0,
            failure_count: 0,
            ambiguous_count: 0,
            mode,
            start_time: now_unix_seconds(),
        }
    }

    /// Returns true if the counts satisfy `processed = success + failure + ambiguous`
    pub fn is_consistent(&self) -> bool {
        self.processed_count == self.success_count + self.failure_count + self.ambiguous_count
    }

    /// Returns true if `start_time` is finite and lies between the epoch and `now`
    pub fn has_plausible_start(&self, now: f64) -> bool {
        self.start_time.is_finite() && (0.0..=now).contains(&self.start_time)
    }

    /// Rebuilds `processed_count` from the per-category counts
    pub fn repair_counts(&mut self) {
        self.processed_count = self.success_count + self.failure_count + self.ambiguous_count;
    }

    /// First identifier a resumed range should dispatch
    ///
    /// Never lower than `requested_start`, never at or below the watermark.
    pub fn resume_start(&self, requested_start: u64) -> u64 {
        requested_start.max(self.last_processed_id.saturating_add(1))
    }
}
