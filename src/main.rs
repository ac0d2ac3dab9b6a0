//! ws-redirect
//!
//! Starts the redirecting responder, then drives a client conversation
//! through it.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌──────────────────────── process ────────────────────────┐
//!   │                                                          │
//!   │  client (exchange)            responder                  │
//!   │  ┌───────────┐  ws://…-4   ┌──────────────┐              │
//!   │  │ Connector │────────────▶│ plain        │── 301 ──┐    │
//!   │  │  + chain  │◀────────────│ listener     │         │    │
//!   │  │           │             └──────────────┘         │    │
//!   │  │           │  wss://…-N  ┌──────────────┐         │    │
//!   │  │           │────────────▶│ secure       │◀────────┘    │
//!   │  │           │◀── 301 ─────│ listener     │── N-1 ──┐    │
//!   │  │           │             │              │◀────────┘    │
//!   │  │  Session  │◀══ 101 ═════│ echo (N = 0) │              │
//!   │  └───────────┘             └──────────────┘              │
//!   │                                                          │
//!   │  config · logging · TLS contexts · shutdown              │
//!   └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use ws_redirect::config::{load_config, AppConfig};
use ws_redirect::lifecycle::{signals, Shutdown};
use ws_redirect::net::TlsContexts;
use ws_redirect::observability::logging;
use ws_redirect::{run_chat, Connector, Report, Responder};

#[derive(Parser, Debug)]
#[command(name = "ws-redirect")]
#[command(about = "Follow a WebSocket redirect chain and chat with the echo at its end", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start URL; defaults to the local responder's chain
    #[arg(short, long)]
    url: Option<String>,

    /// Redirects followed before giving up
    #[arg(long)]
    redirect_limit: Option<u32>,

    /// Chain index requested when no URL is given
    #[arg(long)]
    start_index: Option<u32>,

    /// Log filter directive, used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(url) = &self.url {
            config.client.url = Some(url.clone());
        }
        if let Some(limit) = self.redirect_limit {
            config.client.redirect_limit = limit;
        }
        if let Some(index) = self.start_index {
            config.client.start_index = index;
        }
        if let Some(level) = &self.log_level {
            config.observability.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "ws-redirect starting");

    let tls = TlsContexts::from_config(&config.tls)?;
    let responder = Responder::bind(&config.responder, tls.server.clone()).await?;
    let start_url = config
        .client
        .url
        .clone()
        .unwrap_or_else(|| responder.chain_url(config.client.start_index));

    tracing::info!(
        plain = %responder.plain_addr(),
        secure = %responder.secure_addr(),
        start_url = %start_url,
        redirect_limit = config.client.redirect_limit,
        "Responder listening"
    );

    let shutdown = Shutdown::new();
    let server = tokio::spawn(responder.run(shutdown.subscribe()));
    let signals = tokio::spawn(signals::forward_ctrl_c(shutdown.clone()));

    let connector = Connector::from_config(tls.client, &config.client);
    let outcome = tokio::select! {
        outcome = run_chat(&connector, &start_url, &config.client) => Some(outcome),
        _ = wait_for(&shutdown) => None,
    };

    shutdown.trigger();
    signals.abort();
    match tokio::time::timeout(Duration::from_secs(5), server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!(error = %Report(&e), "Responder failed"),
        Ok(Err(e)) => tracing::error!(error = %e, "Responder task panicked"),
        Err(_) => tracing::warn!("Responder did not stop in time"),
    }

    match outcome {
        Some(Ok(transcript)) => {
            tracing::info!(
                encrypted = transcript.encrypted,
                replies = transcript.replies.len(),
                "Conversation complete"
            );
            Ok(())
        }
        Some(Err(e)) => {
            tracing::error!(error = %Report(&e), "Conversation failed");
            Err(e.into())
        }
        None => {
            tracing::info!("Interrupted before the conversation finished");
            Ok(())
        }
    }
}

async fn wait_for(shutdown: &Shutdown) {
    let mut rx = shutdown.subscribe();
    let _ = rx.recv().await;
}
