//! Client for an OpenAI-compatible chat-completions endpoint.
//!
//! The relay only proxies: one system prompt, one user message, and the
//! reply handed back as `{status, data}` for display.

use std::time::Duration;

use http::{HeaderMap, HeaderValue, header};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::constants::DEFAULT_TIMEOUT_SECS;
use crate::error::ClientError;
use crate::reply::post_json;

/// Model used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// System prompt used when the caller does not supply one.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful robot.";

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    /// `system`, `user` or `assistant`.
    pub role: String,
    /// Message text.
    pub content: String,
}

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    /// Model name.
    pub model: String,
    /// Conversation, system prompt first.
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    /// Builds a single-turn request, applying the default model and prompt.
    #[must_use]
    pub fn single_turn(text: &str, model: Option<&str>, system: Option<&str>) -> Self {
        let model = model.filter(|m| !m.is_empty()).unwrap_or(DEFAULT_MODEL);
        let system = system.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SYSTEM_PROMPT);
        Self {
            model: model.to_owned(),
            messages: vec![
                ChatMessage {
                    role: "system".to_owned(),
                    content: system.to_owned(),
                },
                ChatMessage {
                    role: "user".to_owned(),
                    content: text.to_owned(),
                },
            ],
        }
    }
}

/// Status and decoded body of a chat-completions call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatReply {
    /// HTTP status.
    pub status: u16,
    /// Parsed body, or `{"raw": "<text>"}`.
    pub data: Value,
}

impl ChatReply {
    /// The first choice's message content, if present.
    #[must_use]
    pub fn assistant_text(&self) -> Option<&str> {
        self.data
            .get("choices")?
            .get(0)?
            .get("message")?
            .get("content")?
            .as_str()
    }

    /// Text to speak: the assistant message, or the serialized body when the
    /// reply has no recognizable message.
    #[must_use]
    pub fn speakable_text(&self) -> String {
        self.assistant_text()
            .map_or_else(|| self.data.to_string(), str::to_owned)
    }
}

/// Chat-completions client authenticated with a bearer key.
#[derive(Clone, Debug)]
pub struct ChatClient {
    url: Url,
    client: Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl ChatClient {
    /// Timeout applied unless overridden with [`Self::with_timeout`].
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(DEFAULT_TIMEOUT_SECS);

    /// Creates a client for `url`.
    ///
    /// # Errors
    ///
    /// [`ClientError::MissingApiKey`] for an empty key and
    /// [`ClientError::InvalidHeader`] if the key is not a valid header value.
    pub fn try_new(url: Url, api_key: &str) -> Result<Self, ClientError> {
        if api_key.is_empty() {
            return Err(ClientError::MissingApiKey);
        }
        let mut bearer = HeaderValue::from_str(&format!("Bearer {api_key}")).map_err(|e| {
            ClientError::InvalidHeader {
                name: "authorization",
                source: e,
            }
        })?;
        bearer.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, bearer);
        Ok(Self {
            url,
            client: Client::new(),
            headers,
            timeout: Some(Self::DEFAULT_TIMEOUT),
        })
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sends `request` and returns the reply whatever its status.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] on transport failures.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "omrelay.chat_client.complete", skip_all, err, fields(model = %request.model))
    )]
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatReply, ClientError> {
        let (status, data) = post_json(
            &self.client,
            &self.url,
            &self.headers,
            self.timeout,
            "POST /chat/completions",
            request,
        )
        .await?;
        Ok(ChatReply { status, data })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_single_turn_defaults() {
        let request = ChatRequest::single_turn("hi", None, Some(""));
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "gpt-4.1-mini",
                "messages": [
                    {"role": "system", "content": "You are a helpful robot."},
                    {"role": "user", "content": "hi"}
                ]
            })
        );
    }

    #[test]
    fn test_empty_key_rejected() {
        let url = Url::parse("http://localhost/v1/chat/completions").unwrap();
        let err = ChatClient::try_new(url, "").unwrap_err();
        assert!(matches!(err, ClientError::MissingApiKey));
    }

    #[test]
    fn test_speakable_text_falls_back_to_body() {
        let reply = ChatReply {
            status: 401,
            data: json!({"error": "bad key"}),
        };
        assert_eq!(reply.assistant_text(), None);
        assert_eq!(reply.speakable_text(), r#"{"error":"bad key"}"#);
    }

    #[tokio::test]
    async fn test_complete_sends_bearer_and_extracts_text() {
        let mock_server = MockServer::start().await;
        let request = ChatRequest::single_turn("hello", Some("m1"), Some("be brief"));
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer k-123"))
            .and(body_json(&request))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let url = Url::parse(&format!("{}/v1/chat/completions", mock_server.uri())).unwrap();
        let client = ChatClient::try_new(url, "k-123").unwrap();
        let reply = client.complete(&request).await.unwrap();
        assert_eq!(reply.status, 200);
        assert_eq!(reply.assistant_text(), Some("hi there"));
    }
}
