//! # iothread-echo
//!
//! Runs the reference echo server until ctrl-c, then drains connections.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use iothread_server::EchoServer;
use iothread_settings::IoThreadSettings;

/// iothread echo server.
#[derive(Parser, Debug)]
#[command(name = "iothread-echo", about = "Echo server built on the iothread runtime")]
struct Cli {
    /// Settings file (defaults to `~/.iothread/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Log level filter (overrides settings; `RUST_LOG` wins over both).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, settings: &mut IoThreadSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let path = args
        .config
        .clone()
        .unwrap_or_else(iothread_settings::settings_path);
    let mut settings = iothread_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    args.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    if settings.logging.json {
        iothread_core::logging::init_json_subscriber(&settings.logging.level);
    } else {
        iothread_core::logging::init_subscriber(&settings.logging.level);
    }

    let server = Arc::new(EchoServer::new(settings));
    let listener = server.bind().await?;
    let addr = listener.local_addr().context("Failed to read local address")?;
    tracing::info!(%addr, "iothread echo server listening");

    let accept = {
        let server = server.clone();
        tokio::spawn(async move { server.serve(listener).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!(connections = server.connection_count(), "shutting down");
    let drained = server.graceful_shutdown().await;
    let _ = accept.await;

    if drained {
        tracing::info!("shutdown complete");
    } else {
        tracing::warn!("shutdown timed out with connections still open");
    }
    Ok(())
}
