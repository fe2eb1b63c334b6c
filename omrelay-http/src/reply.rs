//! Shared request plumbing for the `{status, data}` style services.

use std::time::Duration;

use http::HeaderMap;
use reqwest::Client;
use serde_json::{Value, json};
use url::Url;

use crate::error::ClientError;

/// POSTs `payload` as JSON and returns the status with the decoded body.
///
/// Bodies that are not JSON come back as `{"raw": "<text>"}`.
pub(crate) async fn post_json<T>(
    client: &Client,
    url: &Url,
    headers: &HeaderMap,
    timeout: Option<Duration>,
    context: &'static str,
    payload: &T,
) -> Result<(u16, Value), ClientError>
where
    T: serde::Serialize + Sync + ?Sized,
{
    let mut req = client.post(url.clone()).json(payload);
    for (key, value) in headers {
        req = req.header(key, value);
    }
    if let Some(timeout) = timeout {
        req = req.timeout(timeout);
    }
    let response = req
        .send()
        .await
        .map_err(|e| ClientError::Http { context, source: e })?;

    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| ClientError::ResponseBodyRead { context, source: e })?;
    let data = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "raw": text }));
    Ok((status, data))
}
