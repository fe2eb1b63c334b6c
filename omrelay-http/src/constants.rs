//! Header names and default endpoints shared by the relay's HTTP surfaces.

/// Webhook timestamp header (gateway → relay).
pub const TIMESTAMP_HEADER: &str = "x-om-timestamp";

/// Webhook signature header (gateway → relay).
pub const SIGNATURE_HEADER: &str = "x-om-signature";

/// Shared-secret header sent to the chain-execution service.
pub const CHAIN_SECRET_HEADER: &str = "x-chain-secret";

/// Optional token guarding the local `/chain/execute` route.
pub const LOCAL_TOKEN_HEADER: &str = "x-local-token";

/// Default chain-execution service base URL.
pub const DEFAULT_CHAIN_SERVICE_URL: &str = "http://127.0.0.1:8790";

/// Default OpenAI-compatible chat-completions endpoint.
pub const DEFAULT_OPENMIND_URL: &str = "https://api.openmind.org/api/core/openai/chat/completions";

/// Default timeout for outbound calls, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
