//! Axum route handlers for the executor.
//!
//! - `POST /execute` — signed webhook from the gateway
//! - `POST /chain/execute` — local proxy to the chain-execution service
//! - `GET /healthz` — liveness
//! - `GET /ws` — live operator session (see [`crate::ws`])

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use omrelay::auth::SignedRequest;
use omrelay::execution::SequentialBatch;
use omrelay::networks::TransferDefaults;
use omrelay::relay::{RelayEndpoint, RelayResponse};
use omrelay_http::chain::ChainServiceClient;
use omrelay_http::chat::ChatClient;
use omrelay_http::constants::{LOCAL_TOKEN_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use omrelay_http::error::ClientError;
use serde_json::{Value, json};
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ExecutorConfig;
use crate::error::ExecutorError;
use crate::speech::Speaker;

/// Everything the routes need, built once at startup.
#[derive(Debug)]
pub struct AppState {
    /// Webhook flow.
    pub relay: RelayEndpoint<ChainServiceClient>,
    /// Chain-execution service client.
    pub chain: ChainServiceClient,
    /// Chat client, present when an API key is configured.
    pub chat: Option<ChatClient>,
    /// Speech sink.
    pub speaker: Speaker,
    /// Token guarding `/chain/execute`.
    pub local_token: Option<String>,
    /// Defaults for transfers recognized in live sessions.
    pub transfer_defaults: TransferDefaults,
    /// Sentences for `tests` / `run_tests`.
    pub test_sentences: Vec<String>,
    /// Cancelled on shutdown; live sessions close when it fires.
    pub shutdown: CancellationToken,
}

/// Shared application state.
pub type ExecutorState = Arc<AppState>;

impl AppState {
    /// Builds the state from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if a service URL or credential is malformed.
    pub fn from_config(
        config: &ExecutorConfig,
        shutdown: CancellationToken,
    ) -> Result<Self, ClientError> {
        let mut chain = ChainServiceClient::try_from(config.chain_service.url.as_str())?
            .with_timeout(Duration::from_secs(config.chain_service.timeout_secs));
        if let Some(secret) = &config.chain_service.shared_secret {
            chain = chain.with_shared_secret(secret)?;
        }

        let chat = match &config.chat.api_key {
            Some(key) => {
                let url = Url::parse(&config.chat.url).map_err(|e| ClientError::UrlParse {
                    context: "Failed to parse chat url",
                    source: e,
                })?;
                Some(
                    ChatClient::try_new(url, key)?
                        .with_timeout(Duration::from_secs(config.chat.timeout_secs)),
                )
            }
            None => None,
        };

        Ok(Self {
            relay: RelayEndpoint::new(
                config.shared_secret.clone(),
                chain.clone(),
                config.enable_chain_execute,
            ),
            chain,
            chat,
            speaker: Speaker::new(config.tts),
            local_token: config.local_token.clone(),
            transfer_defaults: config.transfer.clone(),
            test_sentences: config.test_sentences.clone(),
            shutdown,
        })
    }
}

/// `POST /execute` — Verifies a signed webhook and relays its commands.
///
/// # Errors
///
/// 401 on missing or invalid signature, 500 when no secret is configured,
/// 400 on a non-UTF-8 or non-JSON body.
pub async fn post_execute(
    State(state): State<ExecutorState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RelayResponse>, ExecutorError> {
    let request = SignedRequest {
        timestamp: header_str(&headers, TIMESTAMP_HEADER),
        raw_body: &body,
        signature: header_str(&headers, SIGNATURE_HEADER),
    };
    let response = state.relay.handle(&request).await?;
    Ok(Json(response))
}

/// `POST /chain/execute` — Forwards a JSON object to the chain-execution
/// service, `times` times (capped).
///
/// A single item answers with the service's raw `{status, data}`; more than
/// one answers with the batch report.
///
/// # Errors
///
/// 401 on a bad local token, 400 when the body is not a JSON object, 502 when
/// the service is unreachable for a single call.
pub async fn post_chain_execute(
    State(state): State<ExecutorState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ExecutorError> {
    if let Some(expected) = state.local_token.as_deref().filter(|t| !t.is_empty()) {
        let supplied = header_str(&headers, LOCAL_TOKEN_HEADER).unwrap_or_default();
        if !bool::from(supplied.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(ExecutorError::InvalidLocalToken);
        }
    }

    let payload: Value = serde_json::from_slice(&body)?;
    if !payload.is_object() {
        return Err(ExecutorError::BodyNotObject);
    }

    let batch = SequentialBatch::from_payload(payload, 1);
    if batch.total() == 1 {
        let response = state.chain.execute(batch.payload()).await?;
        return Ok(Json(json!({
            "ok": response.is_success(),
            "chain_result": response,
        })));
    }

    let report = batch.run(&state.chain).await;
    tracing::info!(
        attempted = report.attempted,
        succeeded = report.succeeded,
        "chain batch finished"
    );
    Ok(Json(json!({
        "ok": report.succeeded == report.attempted,
        "chain_result": report,
    })))
}

/// `GET /healthz` — Liveness probe.
pub async fn get_healthz() -> Json<Value> {
    Json(json!({ "ok": true }))
}

/// Creates an Axum [`axum::Router`] with all executor endpoints.
pub fn executor_router(state: ExecutorState) -> axum::Router {
    axum::Router::new()
        .route("/execute", axum::routing::post(post_execute))
        .route("/chain/execute", axum::routing::post(post_chain_execute))
        .route("/healthz", axum::routing::get(get_healthz))
        .route("/ws", axum::routing::get(crate::ws::get_ws))
        .with_state(state)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
