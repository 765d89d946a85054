//! nvr serve - run the daemon in the foreground
//!
//! Installs builtin and discovered plugins, starts the enabled ones in
//! dependency order and serves the management API until Ctrl-C.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use nvr_core::NvrConfig;
use nvr_server::NvrServer;
use tracing::info;

use crate::daemon::build_manager;

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on (overrides the config file)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to (overrides the config file)
    #[arg(long)]
    pub host: Option<String>,

    /// Install plugins but do not start them
    #[arg(long)]
    pub no_start: bool,

    /// Keep state in memory only
    #[arg(long)]
    pub ephemeral: bool,
}

fn apply_overrides(config: &mut NvrConfig, args: &ServeArgs) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if args.no_start {
        config.plugins.auto_start = false;
    }
    if args.ephemeral {
        config.storage.in_memory = true;
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
}

pub async fn run(args: ServeArgs, config_path: &Path) -> Result<()> {
    let mut config = NvrConfig::load(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    apply_overrides(&mut config, &args);

    let manager = build_manager(&config).await?;

    if config.plugins.auto_start {
        let report = manager.start_all().await;
        for (id, error) in &report.failed {
            tracing::error!(plugin = %id, kind = %error.kind(), error = %error, "Plugin failed to start");
        }
        info!(
            started = report.started.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "Plugins started"
        );
    }

    let server = NvrServer::new(config.server.clone(), manager.clone());
    info!("Starting nvr server on {}", server.addr());
    let served = server.run(shutdown_signal()).await;

    for (id, error) in manager.shutdown().await {
        tracing::warn!(plugin = %id, kind = %error.kind(), error = %error, "Plugin did not stop cleanly");
    }

    served.map_err(Into::into)
}
