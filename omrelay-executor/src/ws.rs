//! Live operator session over WebSocket.
//!
//! Each connection owns one [`ConversationSession`]. Messages are handled
//! strictly one at a time: a confirmed batch runs to completion before the
//! next inbound message is read.
//!
//! Inbound messages are either plain text or a JSON object tagged by `type`:
//!
//! - `{"type":"tests"}` — list the test sentences
//! - `{"type":"run_tests"}` — speak every test sentence, then `done`
//! - `{"type":"chat","text":..,"model"?:..,"system"?:..}` — ask the chat service
//! - `{"type":"chain_execute","payload":{..}}` — forward a payload (`times` honored)
//!
//! Anything else is treated as text: a transfer request, a confirm/cancel
//! keyword, or a line to speak back.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use omrelay::execution::{BoxFuture, SequentialBatch};
use omrelay::session::{ConversationSession, EventSink, SessionEvent, Step, stream_batch};
use omrelay_http::chat::ChatRequest;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::handlers::ExecutorState;

const HELLO: &str = r#"Connected. Send text to speak, or JSON: {"type":"chat","text":"..."}."#;

/// Structured inbound messages.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    Tests,
    RunTests,
    Chat {
        #[serde(default)]
        text: String,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        system: Option<String>,
    },
    ChainExecute {
        #[serde(default)]
        payload: Value,
    },
}

/// `GET /ws` — Upgrades to a live session.
pub async fn get_ws(ws: WebSocketUpgrade, State(state): State<ExecutorState>) -> Response {
    ws.on_upgrade(move |socket| run_session(socket, state))
}

/// Outbound half of a connection. Send failures mark it closed; the caller
/// stops reading once that happens.
struct Connection {
    socket: WebSocket,
    closed: bool,
}

impl EventSink for Connection {
    fn send(&mut self, event: SessionEvent) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.closed {
                return;
            }
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(error = %err, "failed to encode session event");
                    return;
                }
            };
            if let Err(err) = self.socket.send(Message::Text(text.into())).await {
                tracing::debug!(error = %err, "session socket closed while sending");
                self.closed = true;
            }
        })
    }
}

/// Drives one connection until the client leaves or the server shuts down.
pub async fn run_session(socket: WebSocket, state: ExecutorState) {
    let mut conn = Connection {
        socket,
        closed: false,
    };
    let mut session = ConversationSession::new(state.transfer_defaults.clone());
    tracing::info!("session opened");

    conn.send(SessionEvent::Hello {
        message: HELLO.to_owned(),
        chat_enabled: state.chat.is_some(),
    })
    .await;

    while !conn.closed {
        let message = tokio::select! {
            () = state.shutdown.cancelled() => break,
            message = conn.socket.recv() => message,
        };
        match message {
            Some(Ok(Message::Text(text))) => {
                handle_message(&state, &mut session, &mut conn, text.as_str()).await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                tracing::debug!(error = %err, "session receive failed");
                break;
            }
        }
    }

    tracing::info!(
        pending_discarded = session.is_awaiting_confirmation(),
        "session closed"
    );
}

async fn handle_message(
    state: &ExecutorState,
    session: &mut ConversationSession,
    conn: &mut Connection,
    raw: &str,
) {
    match serde_json::from_str::<ClientMessage>(raw) {
        Ok(ClientMessage::Tests) => {
            conn.send(SessionEvent::Tests {
                sentences: state.test_sentences.clone(),
            })
            .await;
        }
        Ok(ClientMessage::RunTests) => {
            for sentence in &state.test_sentences {
                speak(state, conn, sentence).await;
            }
            conn.send(SessionEvent::Done).await;
        }
        Ok(ClientMessage::Chat {
            text,
            model,
            system,
        }) => chat(state, conn, text.trim(), model.as_deref(), system.as_deref()).await,
        Ok(ClientMessage::ChainExecute { payload }) => {
            if !payload.is_object() {
                conn.send(SessionEvent::error("chain_execute payload must be a JSON object"))
                    .await;
                return;
            }
            let batch = SequentialBatch::from_payload(payload, 1);
            stream_batch(batch, &state.chain, conn).await;
        }
        Err(_) => handle_text(state, session, conn, raw.trim()).await,
    }
}

async fn handle_text(
    state: &ExecutorState,
    session: &mut ConversationSession,
    conn: &mut Connection,
    text: &str,
) {
    if text.is_empty() {
        return;
    }
    match session.handle_text(text) {
        Step::Reply(event) => {
            if let SessionEvent::Confirm { message, .. } | SessionEvent::NeedMore { message, .. } =
                &event
            {
                state.speaker.speak(message);
            }
            conn.send(event).await;
        }
        Step::Execute(confirmed) => {
            tracing::info!(transfer = %confirmed.intent, total = confirmed.batch.total(), "executing confirmed transfer");
            let report = stream_batch(confirmed.batch, &state.chain, conn).await;
            tracing::info!(
                attempted = report.attempted,
                succeeded = report.succeeded,
                "confirmed transfer finished"
            );
        }
        Step::Unhandled => speak(state, conn, text).await,
    }
}

async fn chat(
    state: &ExecutorState,
    conn: &mut Connection,
    text: &str,
    model: Option<&str>,
    system: Option<&str>,
) {
    if text.is_empty() {
        conn.send(SessionEvent::error("Missing text")).await;
        return;
    }
    let Some(client) = &state.chat else {
        conn.send(SessionEvent::error(
            "Chat disabled: set OM_API_KEY on the executor machine.",
        ))
        .await;
        return;
    };

    let reply = match client.complete(&ChatRequest::single_turn(text, model, system)).await {
        Ok(reply) => reply,
        Err(err) => {
            tracing::warn!(error = %err, "chat request failed");
            conn.send(SessionEvent::error(err.to_string())).await;
            return;
        }
    };
    let spoken = reply.speakable_text();
    conn.send(SessionEvent::OpenmindResult {
        result: json!({ "status": reply.status, "data": reply.data }),
    })
    .await;

    if !spoken.is_empty() {
        speak(state, conn, &spoken).await;
    }
}

async fn speak(state: &ExecutorState, conn: &mut Connection, text: &str) {
    state.speaker.speak(text);
    conn.send(SessionEvent::Spoken {
        text: text.to_owned(),
    })
    .await;
}
