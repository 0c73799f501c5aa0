//! `parley`: WebSocket signaling relay.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use parley_server::{RelayMode, ServerConfig};
use parley_settings::RelaySettings;
use parley_telemetry::LogConfig;

/// WebSocket signaling relay.
#[derive(Parser, Debug)]
#[command(name = "parley", about = "WebSocket signaling relay")]
struct Cli {
    /// Settings file (defaults to `$PARLEY_SETTINGS` or `./parley.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run in pairing mode.
    #[arg(long)]
    pairing: bool,

    /// Port to bind (0 for auto-assign). Overrides settings and `PORT`.
    #[arg(long)]
    port: Option<u16>,
}

impl Cli {
    fn load(&self) -> anyhow::Result<RelaySettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(parley_settings::settings_path);
        let mut settings = parley_settings::load_settings_from_path(&path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?;
        self.apply(&mut settings);
        Ok(settings)
    }

    fn apply(&self, settings: &mut RelaySettings) {
        if self.pairing {
            settings.mode = RelayMode::Pairing;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.load()?;
    let _ = parley_telemetry::init_logging(&LogConfig::from(&settings.logging));

    let handle = parley_server::start(ServerConfig::from_settings(&settings))
        .await
        .context("failed to start relay")?;
    tracing::info!(addr = %handle.local_addr(), mode = %settings.mode, "parley ready");

    shutdown_signal().await?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.context("failed to listen for ctrl-c")?,
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}
