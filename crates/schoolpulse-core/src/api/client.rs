//! HTTP transport for the school backend's REST API.
//!
//! Every endpoint the poller and content store touch answers with the same
//! envelope: `{ "success": bool, "data"?: any, "message"?: string }`. The
//! [`Fetch`] trait is the seam both components depend on; [`HttpFetcher`] is
//! the production implementation over `reqwest`.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::FetchError;

// ============================================================================
// Constants
// ============================================================================

/// Backend used when neither the config file nor the environment names one.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Client-wide timeout used when a request does not carry its own.
/// 30s matches what a browser would wait before giving up on a page fetch.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Query parameter appended to cache-busted requests.
const CACHE_BUST_PARAM: &str = "_t";

/// Per-request knobs passed through the [`Fetch`] seam.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Overrides the transport's default timeout for this request.
    pub timeout: Option<Duration>,
    /// Ask every intermediate cache to skip its stored copy.
    pub no_cache: bool,
}

impl RequestOptions {
    /// Options used for background polling: bounded wait, never served from a cache.
    pub fn polling(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            no_cache: true,
        }
    }
}

/// Response body contract shared by every backend endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiEnvelope {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message.into()),
        }
    }

    /// Unwrap the payload, turning an application-level failure into an error.
    pub fn into_data(self) -> Result<Value, FetchError> {
        if !self.success {
            return Err(FetchError::Rejected(
                self.message
                    .unwrap_or_else(|| "request was not successful".to_string()),
            ));
        }
        self.data
            .ok_or_else(|| FetchError::InvalidResponse("success response without data".to_string()))
    }
}

/// Injected fetch capability: `GET endpoint -> envelope`.
///
/// Transport failures (timeouts, refused connections, bad status codes) are
/// returned as `Err`; a `success: false` body is returned as `Ok` and left to
/// the caller, see [`ApiEnvelope::into_data`].
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn get(&self, endpoint: &str, options: &RequestOptions) -> Result<ApiEnvelope, FetchError>;
}

/// `reqwest`-backed [`Fetch`] rooted at a base URL.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    base_url: String,
    default_timeout: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default client timeout
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            default_timeout: timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve an endpoint key against the base URL. Absolute URLs pass through.
    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    fn cache_busting_headers() -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        );
        headers.insert(header::PRAGMA, header::HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, header::HeaderValue::from_static("0"));
        headers
    }

    fn transport_error(&self, err: reqwest::Error, timeout: Option<Duration>) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout(timeout.unwrap_or(self.default_timeout))
        } else {
            FetchError::NetworkError(err)
        }
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn get(&self, endpoint: &str, options: &RequestOptions) -> Result<ApiEnvelope, FetchError> {
        let url = self.url_for(endpoint);

        let mut request = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json");
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }
        if options.no_cache {
            request = request
                .headers(Self::cache_busting_headers())
                .query(&[(CACHE_BUST_PARAM, Utc::now().timestamp_millis().to_string())]);
        }

        debug!(url = %url, no_cache = options.no_cache, "GET");
        let response = request
            .send()
            .await
            .map_err(|e| self.transport_error(e, options.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::from_status(status, &body));
        }

        response.json::<ApiEnvelope>().await.map_err(|e| {
            if e.is_timeout() {
                self.transport_error(e, options.timeout)
            } else {
                FetchError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", url, e))
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
