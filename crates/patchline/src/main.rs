use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use patchconf::PatchConfig;
use patchline::daemon::Daemon;
use patchline::source::NullSource;
use patchline::sync::SyncHub;
use patchline::transport::{Transport, UdpTransport};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// The Patchline graph mirror daemon
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file path (overrides ./patchline.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// UDP listen address override
    #[arg(long)]
    listen: Option<String>,

    /// UDP port override
    #[arg(short, long)]
    port: Option<u16>,

    /// Exit once the last observer disannounces
    #[arg(long)]
    exit_when_idle: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = PatchConfig::load_from(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(listen) = cli.listen {
        config.bind.listen = listen;
    }
    if let Some(port) = cli.port {
        config.bind.port = port;
    }

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.telemetry.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let bind_addr: SocketAddr = format!("{}:{}", config.bind.listen, config.bind.port)
        .parse()
        .context("Invalid bind address")?;
    let transport = Arc::new(
        UdpTransport::bind(bind_addr)
            .await
            .context("Failed to bind UDP socket")?,
    );
    tracing::info!("patchline listening on {}", transport.local_addr());

    let (inbound_tx, inbound_rx) = mpsc::channel(1024);
    let receiver = transport.spawn_receiver(inbound_tx);

    let hub = SyncHub::new(
        transport.clone(),
        &config.sync,
        config.paths.spool_dir.clone(),
    );

    // The audio backend attaches through the source seam; without one the
    // daemon serves an empty graph and logs observer requests.
    let (_source_tx, source_rx) = mpsc::channel(1024);
    let source = Arc::new(NullSource);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_token.cancel();
        }
    });

    let daemon = Daemon::new(hub, source);
    let result = daemon
        .run(source_rx, inbound_rx, shutdown, cli.exit_when_idle)
        .await;

    receiver.abort();
    result
}
