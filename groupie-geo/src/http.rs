//! HTTP client abstraction for testability
//!
//! Both the geocoding resolver and the tile fetcher talk to the network
//! through [`AsyncHttpClient`], so tests can swap in scripted clients that
//! record calls and measure concurrency.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use thiserror::Error;

/// User agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "groupie-tracker/1.0";

/// Transport-level failure of a single request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    /// Connection, DNS or body read failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// No complete response within the per-request timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The client could not be constructed or the request was malformed.
    #[error("client error: {0}")]
    Client(String),
}

/// Async HTTP GET used by the resolver and the tile fetcher.
///
/// Implementations return the full body of a 2xx response and map every
/// other outcome to an [`HttpError`].
pub trait AsyncHttpClient: Send + Sync {
    /// Performs a GET request bounded by `timeout`.
    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Bytes, HttpError>> + Send;
}

impl<C: AsyncHttpClient> AsyncHttpClient for Arc<C> {
    fn get(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Bytes, HttpError>> + Send {
        (**self).get(url, timeout)
    }
}

/// Real HTTP client implementation using reqwest.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client with the default user agent.
    pub fn new() -> Result<Self, HttpError> {
        Self::with_user_agent(DEFAULT_USER_AGENT)
    }

    /// Creates a client that identifies itself as `user_agent`.
    pub fn with_user_agent(user_agent: &str) -> Result<Self, HttpError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| HttpError::Client(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    async fn get(&self, url: &str, timeout: Duration) -> Result<Bytes, HttpError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                HttpError::Timeout(timeout)
            } else {
                HttpError::Transport(e.to_string())
            }
        };

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status(status.as_u16()));
        }

        response.bytes().await.map_err(map_err)
    }
}
