use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use symfopi::config::{AppConfig, DEFAULT_CONFIG_PATH};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "symfopi",
    about = "Motion-aware music playback controller with an HTTP control surface"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/symfopi_config.json)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the control surface listen address
    #[arg(long)]
    addr: Option<SocketAddr>,
    /// Enable motion monitoring as soon as the managers start
    #[arg(long)]
    enable_motion: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_from_file(
        cli.config
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
    );
    if let Some(addr) = cli.addr {
        config.server.addr = addr;
    }
    if cli.enable_motion {
        config.motion.enable_on_start = true;
    }
    config.validate().context("invalid configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("building tokio runtime")?;

    runtime.block_on(async move {
        let shutdown = CancellationToken::new();
        tokio::spawn(cancel_on_signal(shutdown.clone()));

        info!("Starting symfopi on {}", config.server.addr);
        symfopi::run(config, shutdown).await
    })
}

/// Cancel `shutdown` on SIGINT, or SIGTERM where available.
async fn cancel_on_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received interrupt"),
        _ = terminate => info!("Received terminate"),
    }
    shutdown.cancel();
}
