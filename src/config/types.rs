use crate::state::SystemMode;
use serde::Deserialize;

/// Main configuration structure for Natega-Sweep
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(rename = "endpoint", default = "default_endpoints")]
    pub endpoints: Vec<EndpointEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sweep: SweepConfig::default(),
            output: OutputConfig::default(),
            endpoints: default_endpoints(),
        }
    }
}

/// Worker pool and request behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Requested worker count (clamped at dispatch time)
    pub threads: usize,

    /// Result system flag sent with every request
    pub mode: SystemMode,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms")]
    pub request_timeout_ms: u64,

    /// How long a worker waits on an empty queue before re-checking (milliseconds)
    #[serde(rename = "dequeue-timeout-ms")]
    pub dequeue_timeout_ms: u64,

    /// Lower bound of the per-request politeness delay (milliseconds)
    #[serde(rename = "min-delay-ms")]
    pub min_delay_ms: u64,

    /// Upper bound of the per-request politeness delay (milliseconds)
    #[serde(rename = "max-delay-ms")]
    pub max_delay_ms: u64,

    /// Interval between progress log lines during a range run (seconds)
    #[serde(rename = "progress-interval-secs")]
    pub progress_interval_secs: u64,

    /// Skip TLS certificate validation for all endpoints
    #[serde(rename = "accept-invalid-certs")]
    pub accept_invalid_certs: bool,

    /// Path of the result form on every endpoint
    #[serde(rename = "endpoint-path")]
    pub endpoint_path: String,

    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            threads: 20,
            mode: SystemMode::Legacy,
            request_timeout_ms: 10_000,
            dequeue_timeout_ms: 2_000,
            min_delay_ms: 50,
            max_delay_ms: 200,
            progress_interval_secs: 5,
            accept_invalid_certs: true,
            endpoint_path: "/Home/Natega".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36".to_string(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Path to the CSV results file
    #[serde(rename = "results-path")]
    pub results_path: String,

    /// Path to the JSON checkpoint file
    #[serde(rename = "checkpoint-path")]
    pub checkpoint_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            results_path: "results.csv".to_string(),
            checkpoint_path: "scraper_state.json".to_string(),
        }
    }
}

/// A single mirror host serving the result form
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointEntry {
    /// Host name, optionally with a port (e.g., "natega.youm7.com")
    pub host: String,

    #[serde(default = "default_scheme")]
    pub scheme: String,

    /// Query string appended to the referer (e.g., "?s=1")
    #[serde(rename = "referer-query", default)]
    pub referer_query: String,
}

impl EndpointEntry {
    /// Creates an https entry with no referer query
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            scheme: default_scheme(),
            referer_query: String::new(),
        }
    }
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_endpoints() -> Vec<EndpointEntry> {
    let mut entries: Vec<EndpointEntry> = [
        "natega.dostor.org",
        "natega.elbalad.news",
        "natega.youm7.com",
        "natega.elwatannews.com",
        "natega.gomhuriaonline.com",
    ]
    .into_iter()
    .map(EndpointEntry::new)
    .collect();

    // These two mirrors expect the search-page referer
    for entry in entries.iter_mut().take(2) {
        entry.referer_query = "?s=1".to_string();
    }
    entries
}
