//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests of a sweep:
//! - Building the shared client with the browser-like header template
//! - Posting the result form for one identifier to one endpoint
//! - Classifying transport failures

use crate::config::SweepConfig;
use crate::endpoint::Endpoint;
use crate::state::SystemMode;
use crate::SweepError;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL};
use reqwest::Client;
use std::time::Duration;

/// Raw response of one form submission
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body as text
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Headers sent with every request, regardless of endpoint
const COMMON_HEADERS: &[(&str, &str)] = &[
    ("sec-ch-ua", r#""Chromium";v="137", "Not/A)Brand";v="24""#),
    ("sec-ch-ua-mobile", "?0"),
    ("sec-ch-ua-platform", r#""Linux""#),
    ("upgrade-insecure-requests", "1"),
    ("sec-fetch-site", "same-origin"),
    ("sec-fetch-mode", "navigate"),
    ("sec-fetch-user", "?1"),
    ("sec-fetch-dest", "document"),
    ("priority", "u=0, i"),
];

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
        ),
    );
    for &(name, value) in COMMON_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
    headers
}

/// Builds the HTTP client shared by all workers
///
/// # Arguments
///
/// * `config` - Sweep settings (timeout, user agent, TLS posture)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &SweepConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(default_headers())
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .connect_timeout(Duration::from_millis(config.request_timeout_ms))
        .danger_accept_invalid_certs(config.accept_invalid_certs)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Posts the result form for one identifier
///
/// The body is returned whatever the status code; challenge pages are often
/// served with a non-2xx status and are classified by the caller.
///
/// # Errors
///
/// * `SweepError::Timeout` - The request exceeded the client timeout
/// * `SweepError::Transport` - Connection, TLS or body read failure
pub async fn fetch_record(
    client: &Client,
    endpoint: &Endpoint,
    id: u64,
    mode: SystemMode,
) -> Result<FetchResponse, SweepError> {
    let form = [
        ("seating_no", id.to_string()),
        ("system", mode.code().to_string()),
    ];

    tracing::trace!("POST {} seating_no={}", endpoint.form_url(), id);

    let response = client
        .post(endpoint.form_url().clone())
        .headers(endpoint.headers())
        .form(&form)
        .send()
        .await
        .map_err(|e| classify_error(endpoint, e))?;

    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| classify_error(endpoint, e))?;

    Ok(FetchResponse { status, body })
}

fn classify_error(endpoint: &Endpoint, error: reqwest::Error) -> SweepError {
    if error.is_timeout() {
        SweepError::Timeout {
            endpoint: endpoint.host().to_string(),
        }
    } else {
        SweepError::Transport {
            endpoint: endpoint.host().to_string(),
            source: error,
        }
    }
}
