//! Types shared by the provider clients.

use serde_json::Value;

/// A decoded response from one of the provider APIs.
///
/// Only successful (2xx) responses are ever surfaced to callers; anything else is reported as an
/// absent result by [`ProviderClient`](super::ProviderClient).
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// The HTTP status code.
    pub status: u16,
    /// The decoded JSON body, `Value::Null` for empty bodies.
    pub body: Value,
}

impl ProviderResponse {
    /// The `data` member both providers wrap their payloads in.
    pub fn data(&self) -> Option<&Value> {
        self.body.get("data")
    }

    /// The `meta` member carrying pagination details.
    pub fn meta(&self) -> Option<&Value> {
        self.body.get("meta")
    }
}

/// Error types for provider transport operations
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}: {body}")]
    StatusError {
        status: u16,
        url: String,
        body: String,
    },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    UrlError(String),

    #[error("Invalid header value for {0}")]
    HeaderError(&'static str),
}

impl ProviderError {
    /// Whether retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::HttpError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ProviderError::StatusError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
