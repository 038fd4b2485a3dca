//! Shared HTTP client for insight services.

use std::time::Duration;

use reqwest::Url;
use thiserror::Error;

/// Default whole-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str = concat!("tickerscope/", env!("CARGO_PKG_VERSION"));

/// A provider could not be constructed.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The underlying HTTP client could not be built.
    #[error("HTTP client construction failed: {0}")]
    Client(#[from] reqwest::Error),

    /// An endpoint is not an absolute http(s) URL.
    #[error("invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
}

/// Connection pool shared by every [`HttpStageProvider`](crate::HttpStageProvider).
///
/// Cloning is cheap; clones share the pool.
#[derive(Debug, Clone)]
pub struct InsightClient {
    http: reqwest::Client,
}

impl InsightClient {
    /// Builds a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }

    /// The underlying HTTP client.
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }
}

/// Parses and checks an insight-service endpoint.
pub fn parse_endpoint(raw: &str) -> Result<Url, ProviderError> {
    let invalid = |reason: String| ProviderError::InvalidEndpoint {
        endpoint: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|err| invalid(err.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}
