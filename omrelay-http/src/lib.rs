//! HTTP transport for the signed-command relay.
//!
//! Provides the header names used on the relay's own routes and
//! (feature-gated) clients for the two services the relay calls out to.
//!
//! # Modules
//!
//! - [`constants`] — Header names, default URLs and timeouts
//! - [`error`] — Client error types (feature: `client`)
//! - [`chain`] — Chain-execution service client (feature: `client`)
//! - [`chat`] — Chat-completions client (feature: `client`)

pub mod constants;

#[cfg(feature = "client")]
pub mod chain;
#[cfg(feature = "client")]
pub mod chat;
#[cfg(feature = "client")]
pub mod error;
#[cfg(feature = "client")]
mod reply;
