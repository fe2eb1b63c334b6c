//! Local executor server for the signed-command relay.
//!
//! Exposes the signed webhook, a local chain-execution proxy, a health probe
//! and the live operator session over WebSocket.
//!
//! # Modules
//!
//! - [`config`] — Server configuration with environment variable expansion
//! - [`error`] — Route error types
//! - [`handlers`] — Axum route handlers, shared state and router builder
//! - [`speech`] — Text-to-speech sink
//! - [`util`] — Shutdown signal handling
//! - [`ws`] — WebSocket session loop

pub mod config;
pub mod error;
pub mod handlers;
pub mod speech;
pub mod util;
pub mod ws;

pub use handlers::{AppState, ExecutorState, executor_router};
