//! Executor server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax. A
//! fixed set of environment variables then overrides the file.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 8765
//! shared_secret = "$EXECUTOR_SHARED_SECRET"
//! enable_chain_execute = false
//! tts = "print"
//!
//! [chain_service]
//! url = "http://127.0.0.1:8790"
//! shared_secret = "${CHAIN_SERVICE_SHARED_SECRET}"
//!
//! [transfer]
//! chain_id = 84532
//! rpc_url = "https://sepolia.base.org"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to configuration file (default: `config.toml`)
//! - `HOST`, `PORT` — Bind address and port
//! - `EXECUTOR_SHARED_SECRET` — Webhook HMAC secret
//! - `EXECUTOR_LOCAL_TOKEN` — Token required on `/chain/execute`
//! - `ENABLE_CHAIN_EXECUTE` — Forward webhook chain commands (`1`/`true`/`yes`/`on`)
//! - `CHAIN_SERVICE_URL`, `CHAIN_SERVICE_SHARED_SECRET` — Chain-execution service
//! - `OM_API_KEY` or `OPENMIND_API_KEY`, `OPENMIND_URL` — Chat completions
//! - `EXECUTOR_TTS` — Speech mode (`mac_say`, `print`, `none`)
//! - `DEFAULT_TOKEN_ADDRESS`, `DEFAULT_CHAIN_ID`, `DEFAULT_RPC_URL` — Transfer defaults
//!
//! Empty variables count as unset.

use std::net::IpAddr;
use std::path::Path;

use alloy_primitives::Address;
use omrelay::networks::TransferDefaults;
use omrelay_http::constants::{DEFAULT_CHAIN_SERVICE_URL, DEFAULT_OPENMIND_URL, DEFAULT_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

use crate::speech::SpeechMode;

/// Top-level executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `8765`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// HMAC secret shared with the gateway. Unset rejects every webhook.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Token required in `x-local-token` on `/chain/execute`, if set.
    #[serde(default)]
    pub local_token: Option<String>,

    /// Whether webhook chain commands are forwarded (default: `false`).
    #[serde(default)]
    pub enable_chain_execute: bool,

    /// Chain-execution service.
    #[serde(default)]
    pub chain_service: ChainServiceConfig,

    /// Chat-completions service.
    #[serde(default)]
    pub chat: ChatConfig,

    /// Speech sink mode.
    #[serde(default)]
    pub tts: SpeechMode,

    /// Chain parameters for transfers recognized in the live session.
    #[serde(default)]
    pub transfer: TransferDefaults,

    /// Sentences returned by `tests` and spoken by `run_tests`.
    #[serde(default = "default_test_sentences")]
    pub test_sentences: Vec<String>,
}

/// Chain-execution service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainServiceConfig {
    /// Base URL; `/execute` is appended.
    #[serde(default = "default_chain_service_url")]
    pub url: String,

    /// Sent as `x-chain-secret` when set.
    #[serde(default)]
    pub shared_secret: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Chat-completions settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Endpoint URL.
    #[serde(default = "default_chat_url")]
    pub url: String,

    /// Bearer key. Chat is disabled without one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChainServiceConfig {
    fn default() -> Self {
        Self {
            url: default_chain_service_url(),
            shared_secret: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            url: default_chat_url(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    8765
}

fn default_chain_service_url() -> String {
    DEFAULT_CHAIN_SERVICE_URL.to_owned()
}

fn default_chat_url() -> String {
    DEFAULT_OPENMIND_URL.to_owned()
}

const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_test_sentences() -> Vec<String> {
    [
        "你好，我是本地执行器。",
        "Hello, this is the local executor speaking.",
        "转 1 USDC 到 0x1111111111111111111111111111111111111111",
        "send 0.001 ETH to 0x1111111111111111111111111111111111111111",
        "转 0.5 给 0x1111111111111111111111111111111111111111",
        "转账 3 次 每次 1 USDC 到 0x1111111111111111111111111111111111111111",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            shared_secret: None,
            local_token: None,
            enable_chain_execute: false,
            chain_service: ChainServiceConfig::default(),
            chat: ChatConfig::default(),
            tts: SpeechMode::default(),
            transfer: TransferDefaults::default(),
            test_sentences: default_test_sentences(),
        }
    }
}

impl ExecutorConfig {
    /// Loads configuration from a specific file path. A missing file yields
    /// the defaults.
    ///
    /// After parsing, `$VAR` / `${VAR}` references are expanded and the
    /// environment overrides listed in the module docs are applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let content = if path.exists() {
            std::fs::read_to_string(path)?
        } else {
            // If no config file exists, use empty TOML and rely on defaults
            String::new()
        };
        Self::from_toml(&content, |name| std::env::var(name).ok())
    }

    /// Parses `content`, resolving variables and overrides through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml<F>(content: &str, lookup: F) -> Result<Self, Box<dyn std::error::Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expanded = expand_env_vars(content, &lookup);
        let mut config: Self = toml::from_str(&expanded)?;
        config.apply_overrides(&lookup);
        config.drop_empty_secrets();
        Ok(config)
    }

    fn apply_overrides<F>(&mut self, lookup: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(addr) = var("HOST").and_then(|h| h.parse().ok()) {
            self.host = addr;
        }
        if let Some(port) = var("PORT").and_then(|p| p.parse().ok()) {
            self.port = port;
        }
        if let Some(secret) = var("EXECUTOR_SHARED_SECRET") {
            self.shared_secret = Some(secret);
        }
        if let Some(token) = var("EXECUTOR_LOCAL_TOKEN") {
            self.local_token = Some(token);
        }
        if let Some(flag) = var("ENABLE_CHAIN_EXECUTE") {
            self.enable_chain_execute = parse_flag(&flag);
        }
        if let Some(url) = var("CHAIN_SERVICE_URL") {
            self.chain_service.url = url;
        }
        if let Some(secret) = var("CHAIN_SERVICE_SHARED_SECRET") {
            self.chain_service.shared_secret = Some(secret);
        }
        if let Some(key) = var("OM_API_KEY").or_else(|| var("OPENMIND_API_KEY")) {
            self.chat.api_key = Some(key);
        }
        if let Some(url) = var("OPENMIND_URL") {
            self.chat.url = url;
        }
        if let Some(mode) = var("EXECUTOR_TTS") {
            self.tts = SpeechMode::from(mode);
        }
        match var("DEFAULT_TOKEN_ADDRESS").map(|a| a.trim().parse::<Address>()) {
            Some(Ok(address)) => self.transfer.token_address = address,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "ignoring invalid DEFAULT_TOKEN_ADDRESS");
            }
            None => {}
        }
        if let Some(chain_id) = var("DEFAULT_CHAIN_ID").and_then(|c| c.trim().parse().ok()) {
            self.transfer.chain_id = chain_id;
        }
        if let Some(rpc_url) = var("DEFAULT_RPC_URL") {
            self.transfer.rpc_url = rpc_url;
        }
    }

    /// Unresolved `$VAR` references and blank strings mean "not configured".
    fn drop_empty_secrets(&mut self) {
        for slot in [
            &mut self.shared_secret,
            &mut self.local_token,
            &mut self.chain_service.shared_secret,
            &mut self.chat.api_key,
        ] {
            if slot
                .as_deref()
                .is_some_and(|v| v.trim().is_empty() || v.starts_with('$'))
            {
                *slot = None;
            }
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Expands `$VAR` and `${VAR}` patterns in a string using `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_env_vars<F>(input: &str, lookup: &F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next(); // consume '{'
        }

        let mut var_name = String::new();
        while let Some(&c) = chars.peek() {
            if braced {
                if c == '}' {
                    chars.next();
                    break;
                }
            } else if !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            var_name.push(c);
            chars.next();
        }

        match lookup(&var_name) {
            Some(val) if !var_name.is_empty() => result.push_str(&val),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&var_name);
                if braced && !var_name.is_empty() {
                    result.push('}');
                }
            }
        }
    }

    result
}
