//!
//! HTTP client for the aggregator and ledger REST APIs.
//!
//! `HttpProviderClient` wraps a `reqwest` client configured with the provider's authentication
//! headers and a per-request timeout. Idempotent GETs are retried with exponential backoff within
//! a bounded time budget; POSTs are sent exactly once.

use super::types::*;
use crate::config::{AggregatorSettings, HttpSettings, LedgerSettings};
use backoff::{ExponentialBackoff, future::retry};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Url};
use secrecy::ExposeSecret;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Request/response capability for a single provider.
///
/// Both operations report any failure (transport error, timeout, non-2xx status, undecodable
/// body) as `None` after logging it. Callers treat `None` as "could not fetch" and skip.
#[async_trait::async_trait]
pub trait ProviderClient: Send + Sync {
	/// Issue a GET for `path` (relative to the provider's API root, query string allowed).
	async fn get(&self, path: &str) -> Option<ProviderResponse>;

	/// Issue a POST of `payload` to `path`.
	async fn post(&self, path: &str, payload: &Value) -> Option<ProviderResponse>;

	/// Get the name of this provider for logging.
	fn name(&self) -> &str;
}

/// reqwest-backed provider client
#[derive(Clone)]
pub struct HttpProviderClient {
	/// The underlying HTTP client, carrying auth headers and timeout.
	http_client: Client,
	/// API root every path is resolved against. Always ends in `/`.
	base_url: Url,
	/// Provider name used in log lines.
	name: String,
	/// Upper bound on the time spent retrying one GET.
	retry_budget: Duration,
}

impl HttpProviderClient {
	/// Create a new client.
	///
	/// # Arguments
	/// * `name` - Provider name for log lines.
	/// * `base_url` - API root; a trailing `/` is added when missing.
	/// * `headers` - Default headers sent with every request.
	/// * `http` - Timeout and retry budget.
	pub fn new(
		name: impl Into<String>,
		base_url: &str,
		headers: HeaderMap,
		http: &HttpSettings,
	) -> Result<Self, ProviderError> {
		let mut root = base_url.trim().to_string();
		if !root.ends_with('/') {
			root.push('/');
		}
		let base_url = Url::parse(&root).map_err(|e| ProviderError::UrlError(e.to_string()))?;

		let http_client = Client::builder()
			.timeout(http.timeout())
			.default_headers(headers)
			.build()?;

		Ok(Self {
			http_client,
			base_url,
			name: name.into(),
			retry_budget: http.retry_budget(),
		})
	}

	/// Client for the Salt Edge API, authenticated with `App-id` and `Secret` headers.
	pub fn salt_edge(
		settings: &AggregatorSettings,
		http: &HttpSettings,
	) -> Result<Self, ProviderError> {
		let mut headers = json_headers();
		headers.insert(
			HeaderName::from_static("app-id"),
			header_value(settings.app_id.expose_secret(), "App-id")?,
		);
		headers.insert(
			HeaderName::from_static("secret"),
			header_value(settings.secret.expose_secret(), "Secret")?,
		);
		Self::new("saltedge", &settings.base_url, headers, http)
	}

	/// Client for the Firefly III API, authenticated with a bearer token.
	pub fn firefly(settings: &LedgerSettings, http: &HttpSettings) -> Result<Self, ProviderError> {
		let mut headers = json_headers();
		let mut auth = header_value(
			&format!("Bearer {}", settings.access_token.expose_secret()),
			"Authorization",
		)?;
		auth.set_sensitive(true);
		headers.insert(AUTHORIZATION, auth);
		Self::new("firefly", &settings.base_url, headers, http)
	}

	fn resolve(&self, path: &str) -> Result<Url, ProviderError> {
		self.base_url
			.join(path.trim_start_matches('/'))
			.map_err(|e| ProviderError::UrlError(e.to_string()))
	}

	/// Send a single request and decode the body of a 2xx response.
	async fn execute(&self, request: reqwest::RequestBuilder, url: &Url) -> Result<ProviderResponse, ProviderError> {
		let response = request.send().await?;
		let status = response.status();
		let text = response.text().await?;

		if !status.is_success() {
			return Err(ProviderError::StatusError {
				status: status.as_u16(),
				url: url.to_string(),
				body: text,
			});
		}

		let body = if text.trim().is_empty() {
			Value::Null
		} else {
			serde_json::from_str(&text)?
		};

		Ok(ProviderResponse {
			status: status.as_u16(),
			body,
		})
	}

	/// GET with bounded exponential backoff on transient failures.
	pub async fn try_get(&self, path: &str) -> Result<ProviderResponse, ProviderError> {
		let url = self.resolve(path)?;
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.retry_budget),
			..ExponentialBackoff::default()
		};

		retry(policy, || async {
			debug!("[{}] GET {}", self.name, url);
			self.execute(self.http_client.get(url.clone()), &url)
				.await
				.map_err(|e| {
					if e.is_transient() {
						warn!("[{}] GET {} failed, retrying: {}", self.name, url, e);
						backoff::Error::transient(e)
					} else {
						backoff::Error::permanent(e)
					}
				})
		})
		.await
	}

	/// POST without retry; a creation call must not be repeated silently.
	pub async fn try_post(&self, path: &str, payload: &Value) -> Result<ProviderResponse, ProviderError> {
		let url = self.resolve(path)?;
		debug!("[{}] POST {}", self.name, url);
		self.execute(self.http_client.post(url.clone()).json(payload), &url)
			.await
	}
}

#[async_trait::async_trait]
impl ProviderClient for HttpProviderClient {
	async fn get(&self, path: &str) -> Option<ProviderResponse> {
		match self.try_get(path).await {
			Ok(response) => Some(response),
			Err(e) => {
				error!("[{}] Could not fetch {}: {}", self.name, path, e);
				None
			}
		}
	}

	async fn post(&self, path: &str, payload: &Value) -> Option<ProviderResponse> {
		match self.try_post(path, payload).await {
			Ok(response) => Some(response),
			Err(e) => {
				error!("[{}] Request to {} was rejected: {}", self.name, path, e);
				None
			}
		}
	}

	fn name(&self) -> &str {
		&self.name
	}
}

fn json_headers() -> HeaderMap {
	let mut headers = HeaderMap::new();
	headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
	headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	headers
}

fn header_value(value: &str, header: &'static str) -> Result<HeaderValue, ProviderError> {
	HeaderValue::from_str(value).map_err(|_| ProviderError::HeaderError(header))
}
