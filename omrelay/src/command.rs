//! Typed commands and extraction from upstream responses of unknown shape.
//!
//! Upstream model/gateway output arrives in several layouts. [`extract`]
//! tries each known layout in a fixed order and degrades to an empty list
//! when none matches; it never fails.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The kind of a [`Command`].
///
/// Names outside the known set are kept as [`CommandKind::Unknown`] so that
/// filtering can happen at the consumer, not during extraction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CommandKind {
    /// ERC-20 token transfer.
    TransferErc20,
    /// Native currency transfer.
    TransferNative,
    /// Opaque payload for the chain-execution service.
    ChainExecute,
    /// Wallet send request.
    WalletSend,
    /// Wallet signing request.
    WalletSign,
    /// Any other command name, preserved verbatim.
    Unknown(String),
}

impl CommandKind {
    /// Returns the wire name of this kind.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::TransferErc20 => "transfer_erc20",
            Self::TransferNative => "transfer_native",
            Self::ChainExecute => "chain_execute",
            Self::WalletSend => "wallet_send",
            Self::WalletSign => "wallet_sign",
            Self::Unknown(name) => name,
        }
    }

    /// Whether commands of this kind are forwarded to the chain-execution
    /// service by the webhook relay.
    #[must_use]
    pub const fn is_chain_bound(&self) -> bool {
        matches!(self, Self::ChainExecute | Self::WalletSend | Self::WalletSign)
    }
}

impl From<&str> for CommandKind {
    fn from(value: &str) -> Self {
        match value {
            "transfer_erc20" => Self::TransferErc20,
            "transfer_native" => Self::TransferNative,
            "chain_execute" => Self::ChainExecute,
            "wallet_send" => Self::WalletSend,
            "wallet_sign" => Self::WalletSign,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

impl From<String> for CommandKind {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<CommandKind> for String {
    fn from(value: CommandKind) -> Self {
        match value {
            CommandKind::Unknown(name) => name,
            known => known.as_str().to_owned(),
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized instruction destined for execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Command kind, serialized as `type`.
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Opaque command body.
    #[serde(default)]
    pub value: Value,
}

impl Command {
    /// Creates a command from its parts.
    #[must_use]
    pub const fn new(kind: CommandKind, value: Value) -> Self {
        Self { kind, value }
    }

    /// Payload forwarded to the chain-execution service for this command.
    ///
    /// `chain_execute` bodies are forwarded verbatim. Other kinds carry their
    /// name in a `type` field: merged into an object body, or wrapping any
    /// other body as `{"type", "value"}`.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        if self.kind == CommandKind::ChainExecute {
            return self.value.clone();
        }
        match &self.value {
            Value::Object(map) => {
                let mut map = map.clone();
                map.insert("type".to_owned(), Value::String(self.kind.to_string()));
                Value::Object(map)
            }
            other => serde_json::json!({ "type": self.kind.as_str(), "value": other }),
        }
    }

    /// Builds a command from a JSON element if it is an object with a string
    /// `type`. The body is taken from `value`, then `payload`.
    fn from_element(element: &Value) -> Option<Self> {
        let obj = element.as_object()?;
        let kind = obj.get("type")?.as_str()?;
        let value = ["value", "payload"]
            .iter()
            .filter_map(|key| obj.get(*key))
            .find(|v| !v.is_null())
            .cloned()
            .unwrap_or(Value::Null);
        Some(Self::new(CommandKind::from(kind), value))
    }
}

/// Extracts an ordered command list from an upstream response.
///
/// Shapes are tried in this order:
///
/// 1. `{"commands": [...]}`
/// 2. `{"choices": [{"message": {"content": "<json>"}}]}` where the content
///    is a command array, a single command object, or `{"commands": [...]}`
/// 3. a `{"status": .., "data": {...}}` envelope, unwrapped once and retried
///    against shapes 1 and 2
///
/// Anything else yields an empty list.
///
/// # Examples
///
/// ```
/// use serde_json::json;
///
/// let cmds = omrelay::command::extract(&json!({
///     "commands": [{"type": "move"}, {"type": "chain_execute", "value": {"a": 1}}]
/// }));
/// assert_eq!(cmds.len(), 2);
/// assert_eq!(cmds[1].value, json!({"a": 1}));
/// ```
#[must_use]
pub fn extract(response: &Value) -> Vec<Command> {
    if let Some(commands) = from_commands_field(response) {
        return commands;
    }
    if let Some(commands) = from_chat_completion(response) {
        return commands;
    }
    if let Some(data) = response.get("data").filter(|d| d.is_object()) {
        if let Some(commands) = from_commands_field(data) {
            return commands;
        }
        if let Some(commands) = from_chat_completion(data) {
            return commands;
        }
    }
    Vec::new()
}

fn from_commands_field(value: &Value) -> Option<Vec<Command>> {
    value
        .as_object()?
        .get("commands")?
        .as_array()
        .map(|elements| filter_commands(elements))
}

fn from_chat_completion(value: &Value) -> Option<Vec<Command>> {
    let content = value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?;
    let parsed: Value = serde_json::from_str(strip_code_fence(content)).ok()?;
    match &parsed {
        Value::Array(elements) => Some(filter_commands(elements)),
        Value::Object(_) => {
            if let Some(command) = Command::from_element(&parsed) {
                Some(vec![command])
            } else {
                from_commands_field(&parsed)
            }
        }
        _ => None,
    }
}

/// Models often wrap JSON in a markdown fence; tolerate that.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

fn filter_commands(elements: &[Value]) -> Vec<Command> {
    elements.iter().filter_map(Command::from_element).collect()
}
