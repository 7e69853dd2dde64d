//! Mirror endpoints and their rotation
//!
//! An [`Endpoint`] is one interchangeable host serving the result form, along
//! with the per-host request template (origin and referer). The
//! [`EndpointRotator`] hands endpoints out in a fixed cyclic order.

mod rotator;

pub use rotator::EndpointRotator;

use crate::config::{Config, EndpointEntry};
use crate::ConfigError;
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER};
use url::Url;

/// One mirror host, immutable once built
#[derive(Debug, Clone)]
pub struct Endpoint {
    host: String,
    origin: String,
    referer: String,
    form_url: Url,
}

impl Endpoint {
    /// Builds an endpoint from its config entry
    ///
    /// # Arguments
    ///
    /// * `entry` - The configured host, scheme and referer query
    /// * `form_path` - Path of the result form on the host (e.g., "/Home/Natega")
    pub fn from_entry(entry: &EndpointEntry, form_path: &str) -> Result<Self, ConfigError> {
        let base = crate::config::endpoint_base_url(entry)?;
        let form_url = base
            .join(form_path)
            .map_err(|e| ConfigError::InvalidEndpoint(format!("{}: {}", entry.host, e)))?;

        let origin = base.as_str().trim_end_matches('/').to_string();
        let referer = format!("{}{}", base, entry.referer_query);

        Ok(Self {
            host: entry.host.trim().to_string(),
            origin,
            referer,
            form_url,
        })
    }

    /// Builds every endpoint named in the configuration, in order
    pub fn all_from_config(config: &Config) -> Result<Vec<Self>, ConfigError> {
        config
            .endpoints
            .iter()
            .map(|entry| Self::from_entry(entry, &config.sweep.endpoint_path))
            .collect()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Full URL the form is posted to
    pub fn form_url(&self) -> &Url {
        &self.form_url
    }

    pub fn referer(&self) -> &str {
        &self.referer
    }

    /// Per-host request headers layered over the client defaults
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(origin) = HeaderValue::from_str(&self.origin) {
            headers.insert(ORIGIN, origin);
        }
        if let Ok(referer) = HeaderValue::from_str(&self.referer) {
            headers.insert(REFERER, referer);
        }
        headers
    }
}
