//! A [`ChainExecutor`] that forwards payloads to the chain-execution service
//! over HTTP.
//!
//! The service exposes a single `POST {base}/execute` route taking an
//! arbitrary JSON payload. An optional shared secret travels in the
//! `x-chain-secret` header. Replies of any status are returned as
//! [`ChainResponse`]; only transport failures are errors.

use std::time::Duration;

use http::{HeaderMap, HeaderValue};
use omrelay::execution::{BoxFuture, ChainExecutor, ChainResponse, ExecutionError};
use reqwest::Client;
use serde_json::Value;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::constants::{CHAIN_SECRET_HEADER, DEFAULT_TIMEOUT_SECS};
use crate::error::ClientError;
use crate::reply::post_json;

/// Client for the chain-execution service.
#[derive(Clone, Debug)]
pub struct ChainServiceClient {
    /// Full URL to `POST /execute`
    execute_url: Url,
    /// Shared Reqwest HTTP client
    client: Client,
    /// Headers sent with each request
    headers: HeaderMap,
    /// Request timeout
    timeout: Option<Duration>,
}

impl ChainServiceClient {
    /// Timeout applied unless overridden with [`Self::with_timeout`].
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

    /// Returns the computed `./execute` URL.
    pub const fn execute_url(&self) -> &Url {
        &self.execute_url
    }

    /// Returns the headers sent with every request.
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the configured timeout, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Constructs a client from a base URL.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::UrlParse`] if `./execute` cannot be joined.
    pub fn try_new(base_url: Url) -> Result<Self, ClientError> {
        let execute_url = base_url
            .join("./execute")
            .map_err(|e| ClientError::UrlParse {
                context: "Failed to construct ./execute URL",
                source: e,
            })?;
        Ok(Self {
            execute_url,
            client: Client::new(),
            headers: HeaderMap::new(),
            timeout: Some(Self::DEFAULT_TIMEOUT),
        })
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends `secret` in the `x-chain-secret` header. Empty secrets are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidHeader`] if the secret is not a valid
    /// header value.
    pub fn with_shared_secret(mut self, secret: &str) -> Result<Self, ClientError> {
        if secret.is_empty() {
            return Ok(self);
        }
        let mut value = HeaderValue::from_str(secret).map_err(|e| ClientError::InvalidHeader {
            name: CHAIN_SECRET_HEADER,
            source: e,
        })?;
        value.set_sensitive(true);
        self.headers.insert(CHAIN_SECRET_HEADER, value);
        Ok(self)
    }

    /// Sends one payload to `POST /execute`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the service cannot be reached or its body
    /// cannot be read.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "omrelay.chain_client.execute", skip_all, err, fields(url = %self.execute_url))
    )]
    pub async fn execute(&self, payload: &Value) -> Result<ChainResponse, ClientError> {
        let (status, data) = post_json(
            &self.client,
            &self.execute_url,
            &self.headers,
            self.timeout,
            "POST /execute",
            payload,
        )
        .await?;
        Ok(ChainResponse { status, data })
    }
}

impl ChainExecutor for ChainServiceClient {
    fn execute<'a>(&'a self, payload: &'a Value) -> BoxFuture<'a, Result<ChainResponse, ExecutionError>> {
        Box::pin(async move { Self::execute(self, payload).await.map_err(ExecutionError::new) })
    }
}

/// Converts a string URL into a `ChainServiceClient`, parsing the URL and calling `try_new`.
impl TryFrom<&str> for ChainServiceClient {
    type Error = ClientError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // Normalize: strip trailing slashes and add a single trailing slash
        let mut normalized = value.trim_end_matches('/').to_string();
        normalized.push('/');
        let url = Url::parse(&normalized).map_err(|e| ClientError::UrlParse {
            context: "Failed to parse base url",
            source: e,
        })?;
        Self::try_new(url)
    }
}

/// Converts a String URL into a `ChainServiceClient`.
impl TryFrom<String> for ChainServiceClient {
    type Error = ClientError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}
