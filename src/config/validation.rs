use crate::config::types::{Config, EndpointEntry, OutputConfig, SweepConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_sweep_config(&config.sweep)?;
    validate_output_config(&config.output)?;
    validate_endpoints(&config.endpoints)?;
    Ok(())
}

/// Validates worker and request settings
fn validate_sweep_config(config: &SweepConfig) -> Result<(), ConfigError> {
    if config.threads < 1 {
        return Err(ConfigError::Validation(format!(
            "threads must be >= 1, got {}",
            config.threads
        )));
    }

    if config.request_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "request_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.dequeue_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "dequeue_timeout_ms must be > 0".to_string(),
        ));
    }

    if config.min_delay_ms > config.max_delay_ms {
        return Err(ConfigError::Validation(format!(
            "min_delay_ms ({}) must not exceed max_delay_ms ({})",
            config.min_delay_ms, config.max_delay_ms
        )));
    }

    if !config.endpoint_path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "endpoint_path must start with '/', got '{}'",
            config.endpoint_path
        )));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.results_path.is_empty() {
        return Err(ConfigError::Validation(
            "results_path cannot be empty".to_string(),
        ));
    }

    if config.checkpoint_path.is_empty() {
        return Err(ConfigError::Validation(
            "checkpoint_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates the endpoint set
fn validate_endpoints(endpoints: &[EndpointEntry]) -> Result<(), ConfigError> {
    if endpoints.is_empty() {
        return Err(ConfigError::EmptyEndpoints);
    }

    for entry in endpoints {
        endpoint_base_url(entry)?;
    }

    Ok(())
}

/// Builds the base URL (`scheme://host/`) for an endpoint entry
///
/// Only http and https are accepted, and the host must not carry a path.
pub(crate) fn endpoint_base_url(entry: &EndpointEntry) -> Result<Url, ConfigError> {
    if entry.scheme != "http" && entry.scheme != "https" {
        return Err(ConfigError::InvalidEndpoint(format!(
            "scheme must be http or https, got '{}'",
            entry.scheme
        )));
    }

    let host = entry.host.trim();
    if host.is_empty() || host.contains('/') {
        return Err(ConfigError::InvalidEndpoint(format!(
            "invalid host '{}'",
            entry.host
        )));
    }

    let url = Url::parse(&format!("{}://{}/", entry.scheme, host))
        .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {}", entry.host, e)))?;

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidEndpoint(format!(
            "missing host in '{}'",
            entry.host
        )));
    }

    Ok(url)
}
