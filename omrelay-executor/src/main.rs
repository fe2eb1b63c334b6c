//! Local executor HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory, if present)
//! cargo run -p omrelay-executor --release
//!
//! # Custom config path and port
//! omrelay-executor --config /etc/omrelay/config.toml --port 9000
//!
//! # Configure logging level
//! RUST_LOG=debug omrelay-executor
//! ```
//!
//! A `.env` file in the working directory is loaded before anything else.
//! See [`omrelay_executor::config`] for every recognized variable.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::http::Method;
use clap::Parser;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use omrelay_executor::config::ExecutorConfig;
use omrelay_executor::util::SigDown;
use omrelay_executor::{AppState, ExecutorState, executor_router};

/// Command-line flags. Flags win over the config file and environment.
#[derive(Debug, Parser)]
#[command(name = "omrelay-executor", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Bind address.
    #[arg(long)]
    host: Option<IpAddr>,

    /// Bind port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("Executor failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ExecutorConfig::load_from(&cli.config)?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    tracing::info!(
        host = %config.host,
        port = config.port,
        chain_service = %config.chain_service.url,
        chain_execute = config.enable_chain_execute,
        chat_enabled = config.chat.api_key.is_some(),
        tts = %config.tts,
        "Loaded configuration"
    );
    if config.shared_secret.is_none() {
        tracing::warn!("EXECUTOR_SHARED_SECRET is not set, /execute will reject every request");
    }

    let sig_down = SigDown::try_new()?;
    let state: ExecutorState = Arc::new(AppState::from_config(
        &config,
        sig_down.cancellation_token(),
    )?);

    let app = Router::new()
        .merge(executor_router(Arc::clone(&state)))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Executor listening on http://{addr}");

    let token = sig_down.cancellation_token();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { token.cancelled().await })
        .await?;

    sig_down.recv().await;
    tracing::info!("Executor shut down gracefully");
    Ok(())
}
