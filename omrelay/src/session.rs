//! Per-connection confirmation state machine.
//!
//! A [`ConversationSession`] holds at most one transfer awaiting
//! confirmation. It is owned by a single connection loop and dropped with
//! it; nothing here is shared or persisted.
//!
//! ```text
//!            intent (token known)             confirm keyword
//!   Idle ────────────────────────▶ Awaiting ──────────────────▶ execute batch ─▶ Idle
//!    ▲  ▲                            │  │
//!    │  └────── cancel keyword ──────┘  └── new intent: replaces pending
//!    └── intent (token unknown): need_more, stays put
//! ```
//!
//! Input that is neither a keyword nor a recognized transfer is reported as
//! [`Step::Unhandled`] and left to the caller's default handling.

use alloy_primitives::Address;
use serde::Serialize;
use serde_json::Value;

use crate::command::Command;
use crate::execution::{BatchReport, BoxFuture, ChainExecutor, ExecutionResult, SequentialBatch};
use crate::intent::{TransferIntent, parse_transfer};
use crate::networks::TransferDefaults;

const CONFIRM_WORDS: &[&str] = &[
    "确认", "确定", "是", "是的", "好", "好的", "执行", "confirm", "yes", "y", "ok", "okay",
];

const CANCEL_WORDS: &[&str] = &[
    "取消", "不要", "不用了", "算了", "否", "cancel", "no", "n", "stop", "abort",
];

/// Outbound event sent to the connected client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Greeting sent once the connection opens.
    Hello {
        /// Usage hint.
        message: String,
        /// Whether `chat` messages can be served.
        chat_enabled: bool,
    },
    /// The configured test sentences.
    Tests {
        /// Sentences in playback order.
        sentences: Vec<String>,
    },
    /// Text that was handed to the speech sink.
    Spoken {
        /// The spoken text.
        text: String,
    },
    /// A multi-step request finished.
    Done,
    /// A request could not be served.
    Error {
        /// Description of the problem.
        error: String,
    },
    /// Raw reply from the chat-completion service.
    OpenmindResult {
        /// `{status, data}` as returned by the service.
        result: Value,
    },
    /// Outcome of one chain execution.
    ChainResult {
        /// 1-based item index.
        index: u32,
        /// Items in the batch.
        total: u32,
        /// Whether the backend answered 2xx.
        ok: bool,
        /// Backend status, absent when unreachable.
        #[serde(skip_serializing_if = "Option::is_none")]
        status: Option<u16>,
        /// Backend body.
        data: Value,
        /// Transport error, if any.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// A transfer is pending and needs an explicit confirm or cancel.
    Confirm {
        /// Prompt for the operator.
        message: String,
        /// The pending transfer.
        intent: TransferIntent,
    },
    /// A transfer was recognized but the token is unknown.
    NeedMore {
        /// Clarification request.
        message: String,
        /// Amount understood so far.
        amount: String,
        /// Recipient understood so far.
        recipient: Address,
    },
    /// The pending transfer was discarded.
    Cancelled {
        /// Acknowledgment.
        message: String,
    },
    /// Informational notice.
    Info {
        /// Notice text.
        message: String,
    },
    /// An execution is about to start.
    Progress {
        /// 1-based item index.
        index: u32,
        /// Items in the batch.
        total: u32,
        /// Progress text.
        message: String,
    },
}

impl SessionEvent {
    /// Shorthand for an [`SessionEvent::Info`] event.
    pub fn info(message: impl Into<String>) -> Self {
        Self::Info {
            message: message.into(),
        }
    }

    /// Shorthand for an [`SessionEvent::Error`] event.
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error {
            error: error.into(),
        }
    }
}

impl From<ExecutionResult> for SessionEvent {
    fn from(result: ExecutionResult) -> Self {
        Self::ChainResult {
            index: result.index,
            total: result.total,
            ok: result.is_success(),
            status: result.status,
            data: result.data,
            error: result.error,
        }
    }
}

/// Destination for session events, typically a WebSocket.
///
/// Delivery failures are swallowed by implementations: a batch that has
/// started keeps running even if the client went away.
pub trait EventSink: Send {
    /// Delivers one event.
    fn send(&mut self, event: SessionEvent) -> BoxFuture<'_, ()>;
}

impl EventSink for Vec<SessionEvent> {
    fn send(&mut self, event: SessionEvent) -> BoxFuture<'_, ()> {
        self.push(event);
        Box::pin(async {})
    }
}

/// A confirmed transfer, ready to run.
#[derive(Debug, Clone)]
pub struct ConfirmedTransfer {
    /// The intent the operator confirmed.
    pub intent: TransferIntent,
    /// Batch sending the transfer `capped_repeat()` times.
    pub batch: SequentialBatch,
}

/// What the connection loop should do with an utterance.
#[derive(Debug, Clone)]
pub enum Step {
    /// Send this event; nothing else to do.
    Reply(SessionEvent),
    /// Run this transfer, streaming progress (see [`stream_batch`]).
    Execute(ConfirmedTransfer),
    /// Not a keyword and not a transfer; default handling applies.
    Unhandled,
}

#[derive(Debug, Clone)]
struct PendingTransfer {
    intent: TransferIntent,
    command: Command,
}

/// Confirmation state for one connection.
#[derive(Debug, Clone, Default)]
pub struct ConversationSession {
    defaults: TransferDefaults,
    pending: Option<PendingTransfer>,
}

impl ConversationSession {
    /// Creates an idle session using `defaults` for recognized transfers.
    #[must_use]
    pub const fn new(defaults: TransferDefaults) -> Self {
        Self {
            defaults,
            pending: None,
        }
    }

    /// The transfer awaiting confirmation, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&TransferIntent> {
        self.pending.as_ref().map(|p| &p.intent)
    }

    /// Whether a transfer is awaiting confirmation.
    #[must_use]
    pub const fn is_awaiting_confirmation(&self) -> bool {
        self.pending.is_some()
    }

    /// Advances the state machine with one utterance.
    pub fn handle_text(&mut self, text: &str) -> Step {
        let word = normalize_keyword(text);

        if CONFIRM_WORDS.contains(&word.as_str()) {
            return self.pending.take().map_or_else(
                || Step::Reply(SessionEvent::info("没有待确认的转账 / nothing to confirm")),
                |pending| {
                    #[cfg(feature = "telemetry")]
                    tracing::info!(transfer = %pending.intent, "transfer confirmed");
                    let batch = SequentialBatch::new(
                        pending.command.to_payload(),
                        u64::from(pending.intent.capped_repeat()),
                    );
                    Step::Execute(ConfirmedTransfer {
                        intent: pending.intent,
                        batch,
                    })
                },
            );
        }

        if CANCEL_WORDS.contains(&word.as_str()) {
            return Step::Reply(if self.pending.take().is_some() {
                #[cfg(feature = "telemetry")]
                tracing::info!("pending transfer cancelled");
                SessionEvent::Cancelled {
                    message: "已取消 / cancelled".to_owned(),
                }
            } else {
                SessionEvent::info("没有待取消的转账 / nothing to cancel")
            });
        }

        let Some(intent) = parse_transfer(text) else {
            return Step::Unhandled;
        };

        let Some(command) = intent.to_command(&self.defaults) else {
            return Step::Reply(SessionEvent::NeedMore {
                message: format!(
                    "请说明代币：USDC 还是 ETH？例如「转 {} USDC 到 {}」/ which token, USDC or ETH?",
                    intent.amount, intent.recipient
                ),
                amount: intent.amount,
                recipient: intent.recipient,
            });
        };

        #[cfg(feature = "telemetry")]
        tracing::info!(
            transfer = %intent,
            replaced = self.pending.is_some(),
            "transfer awaiting confirmation"
        );
        let message = format!(
            "确认转账 {} {} 到 {}，共 {} 次？回复「确认」执行或「取消」放弃 / reply confirm or cancel",
            intent.amount,
            intent.token_symbol(),
            intent.recipient,
            intent.capped_repeat()
        );
        self.pending = Some(PendingTransfer {
            intent: intent.clone(),
            command,
        });
        Step::Reply(SessionEvent::Confirm { message, intent })
    }
}

/// Runs a batch to completion, emitting a `progress` event before and a
/// `chain_result` event after every item, then an `info` summary.
pub async fn stream_batch<E, S>(
    mut batch: SequentialBatch,
    executor: &E,
    sink: &mut S,
) -> BatchReport
where
    E: ChainExecutor + ?Sized,
    S: EventSink + ?Sized,
{
    let total = batch.total();
    while let Some(index) = batch.next_index() {
        sink.send(SessionEvent::Progress {
            index,
            total,
            message: format!("执行中 {index}/{total} / executing {index} of {total}"),
        })
        .await;
        if let Some(result) = batch.step(executor).await {
            sink.send(result.into()).await;
        }
    }
    let report = batch.into_report();
    sink.send(SessionEvent::info(format!(
        "完成 {}/{} / {} of {} succeeded",
        report.succeeded, report.attempted, report.succeeded, report.attempted
    )))
    .await;
    report
}

fn normalize_keyword(text: &str) -> String {
    text.trim()
        .trim_matches(|c: char| {
            c.is_whitespace() || matches!(c, '。' | '！' | '!' | '.' | '，' | ',' | '？' | '?')
        })
        .to_lowercase()
}
