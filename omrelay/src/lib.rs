#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core of the signed-command relay.
//!
//! The relay sits between a remote gateway sending signed webhook calls, an
//! interactive operator typing or speaking free text, and a local
//! chain-execution service that performs side-effecting transfers. This crate
//! holds every step where untrusted input turns into an ordered side effect;
//! transports live in `omrelay-http` and `omrelay-executor`.
//!
//! # Overview
//!
//! Webhook path: [`auth`] verifies the request, [`command`] extracts typed
//! commands from the upstream response and [`relay`] forwards the chain-bound
//! ones through [`execution`].
//!
//! Interactive path: [`intent`] recognizes a transfer in free text and
//! [`session`] holds it until the operator confirms, then drives a capped,
//! strictly sequential batch.
//!
//! # Modules
//!
//! - [`auth`] - HMAC-SHA256 request signing and constant-time verification
//! - [`command`] - Typed commands and extraction from variant upstream shapes
//! - [`execution`] - Backend trait and sequential batches with per-item results
//! - [`intent`] - Chinese/English transfer grammar
//! - [`networks`] - Default chain parameters for recognized transfers
//! - [`relay`] - The authenticated webhook flow
//! - [`session`] - Per-connection confirmation state machine and events
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod auth;
pub mod command;
pub mod execution;
pub mod intent;
pub mod networks;
pub mod relay;
pub mod session;
