//! The authenticated webhook path.
//!
//! [`RelayEndpoint::handle`] verifies a [`SignedRequest`], parses its body,
//! extracts commands from the upstream response it carries and, for the
//! chain-bound kinds, either runs them through a [`SequentialBatch`] or echoes
//! them back untouched when chain execution is disabled.

use serde::Serialize;
use serde_json::Value;

use crate::auth::{self, AuthError, SignedRequest};
use crate::command::{self, CommandKind};
use crate::execution::{BatchReport, ChainExecutor, SequentialBatch};

/// Reasons a webhook call is rejected before any command runs.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Signature verification failed.
    #[error(transparent)]
    Auth(#[from] AuthError),
    /// The verified body is not JSON.
    #[error("invalid JSON body")]
    InvalidJson(#[source] serde_json::Error),
}

/// What happened to one chain-bound command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    /// The command was forwarded; per-item results follow.
    Executed(BatchReport),
    /// Chain execution is disabled; nothing was sent.
    Skipped {
        /// Always `true`.
        skipped: bool,
        /// Why the command was not forwarded.
        reason: &'static str,
    },
}

impl CommandOutput {
    const fn disabled() -> Self {
        Self::Skipped {
            skipped: true,
            reason: "chain execution is disabled",
        }
    }
}

/// One entry of [`RelayResponse::executed`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutedCommand {
    /// Command kind.
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Payload that was (or would have been) forwarded.
    pub input: Value,
    /// Execution outcome.
    pub output: CommandOutput,
}

/// Body returned to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayResponse {
    /// Always `true` once the request is authenticated and parsed.
    pub accepted: bool,
    /// `openmind_status` as sent by the gateway.
    pub openmind_status: Value,
    /// `openmind_response` as sent by the gateway.
    pub openmind_response_preview: Value,
    /// Chain-bound commands in extraction order.
    pub executed: Vec<ExecutedCommand>,
}

/// Webhook handler state: the shared secret, the backend and the flag
/// deciding whether chain-bound commands are forwarded.
#[derive(Debug, Clone)]
pub struct RelayEndpoint<E> {
    secret: Option<String>,
    executor: E,
    execute_chain: bool,
}

impl<E: ChainExecutor> RelayEndpoint<E> {
    /// Creates an endpoint. An empty or absent secret rejects every call.
    pub const fn new(secret: Option<String>, executor: E, execute_chain: bool) -> Self {
        Self {
            secret,
            executor,
            execute_chain,
        }
    }

    /// Authenticates and processes one webhook call.
    ///
    /// # Errors
    ///
    /// [`RelayError::Auth`] when verification fails and
    /// [`RelayError::InvalidJson`] when the verified body is not JSON.
    /// Backend failures are not errors; they are reported per item.
    pub async fn handle(&self, request: &SignedRequest<'_>) -> Result<RelayResponse, RelayError> {
        let body = auth::verify(self.secret.as_deref(), request)?;
        let payload: Value = serde_json::from_str(body).map_err(RelayError::InvalidJson)?;

        let openmind_status = payload.get("openmind_status").cloned().unwrap_or(Value::Null);
        let upstream = payload
            .get("openmind_response")
            .filter(|v| !v.is_null())
            .unwrap_or(&payload);

        let mut executed = Vec::new();
        for cmd in command::extract(upstream) {
            if !cmd.kind.is_chain_bound() {
                continue;
            }
            let input = cmd.to_payload();
            let output = if self.execute_chain {
                let batch = SequentialBatch::from_payload(input.clone(), 1);
                CommandOutput::Executed(batch.run(&self.executor).await)
            } else {
                CommandOutput::disabled()
            };
            executed.push(ExecutedCommand {
                kind: cmd.kind,
                input,
                output,
            });
        }

        #[cfg(feature = "telemetry")]
        tracing::info!(
            commands = executed.len(),
            execute_chain = self.execute_chain,
            "webhook accepted"
        );

        Ok(RelayResponse {
            accepted: true,
            openmind_status,
            openmind_response_preview: payload
                .get("openmind_response")
                .cloned()
                .unwrap_or(Value::Null),
            executed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::testing::RecordingExecutor;
    use serde_json::json;

    const SECRET: &str = "relay-secret";
    const TS: &str = "1718000000";

    async fn call(
        endpoint: &RelayEndpoint<&RecordingExecutor>,
        body: &[u8],
    ) -> Result<RelayResponse, RelayError> {
        let sig = auth::sign(SECRET, TS, body);
        endpoint
            .handle(&SignedRequest {
                timestamp: Some(TS),
                raw_body: body,
                signature: Some(&sig),
            })
            .await
    }

    fn body(response: &Value) -> Vec<u8> {
        serde_json::to_vec(&json!({"openmind_status": 200, "openmind_response": response})).unwrap()
    }

    #[tokio::test]
    async fn test_disabled_echoes_chain_commands() {
        let executor = RecordingExecutor::default();
        let endpoint = RelayEndpoint::new(Some(SECRET.into()), &executor, false);
        let upstream = json!({"commands": [
            {"type": "move", "value": 1},
            {"type": "chain_execute", "value": {"to": "0x1"}},
        ]});

        let response = call(&endpoint, &body(&upstream)).await.unwrap();
        assert!(response.accepted);
        assert_eq!(response.openmind_status, json!(200));
        assert_eq!(response.openmind_response_preview, upstream);
        assert_eq!(response.executed.len(), 1);
        assert_eq!(response.executed[0].input, json!({"to": "0x1"}));
        assert_eq!(response.executed[0].output, CommandOutput::disabled());
        assert_eq!(executor.call_count(), 0);
    }

    #[tokio::test]
    async fn test_enabled_runs_batches_in_order() {
        let executor = RecordingExecutor::default();
        let endpoint = RelayEndpoint::new(Some(SECRET.into()), &executor, true);
        let upstream = json!({"commands": [
            {"type": "chain_execute", "value": {"n": 1, "times": 2}},
            {"type": "wallet_sign", "payload": {"msg": "hi"}},
        ]});

        let response = call(&endpoint, &body(&upstream)).await.unwrap();
        assert_eq!(response.executed.len(), 2);
        let CommandOutput::Executed(first) = &response.executed[0].output else {
            panic!("expected execution");
        };
        assert_eq!(first.attempted, 2);
        assert_eq!(
            *executor.calls.lock().unwrap(),
            vec![json!({"n": 1}), json!({"n": 1}), json!({"type": "wallet_sign", "msg": "hi"})]
        );
    }

    #[tokio::test]
    async fn test_commands_at_payload_root() {
        let executor = RecordingExecutor::default();
        let endpoint = RelayEndpoint::new(Some(SECRET.into()), &executor, true);
        let raw = br#"{"commands":[{"type":"wallet_send","value":{"to":"0x2"}}]}"#;

        let response = call(&endpoint, raw).await.unwrap();
        assert_eq!(response.openmind_status, Value::Null);
        assert_eq!(response.executed.len(), 1);
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_rejections() {
        let executor = RecordingExecutor::default();
        let endpoint = RelayEndpoint::new(Some(SECRET.into()), &executor, true);

        let err = call(&endpoint, b"not json").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidJson(_)));

        let err = endpoint
            .handle(&SignedRequest {
                timestamp: Some(TS),
                raw_body: b"{}",
                signature: Some("00"),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Auth(AuthError::InvalidSignature)));

        let unconfigured = RelayEndpoint::new(None, &executor, true);
        let err = call(&unconfigured, b"{}").await.unwrap_err();
        assert!(matches!(err, RelayError::Auth(AuthError::SecretNotConfigured)));
        assert_eq!(executor.call_count(), 0);
    }

    #[test]
    fn test_response_wire_format() {
        let response = RelayResponse {
            accepted: true,
            openmind_status: json!(200),
            openmind_response_preview: Value::Null,
            executed: vec![ExecutedCommand {
                kind: CommandKind::ChainExecute,
                input: json!({}),
                output: CommandOutput::disabled(),
            }],
        };
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "accepted": true,
                "openmind_status": 200,
                "openmind_response_preview": null,
                "executed": [{
                    "type": "chain_execute",
                    "input": {},
                    "output": {"skipped": true, "reason": "chain execution is disabled"}
                }]
            })
        );
    }
}
