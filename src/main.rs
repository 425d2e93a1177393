use anyhow::Result;
use clap::Parser;
use ringkv::cluster::ClusterDatabase;
use ringkv::config::ServerConfig;
use ringkv::dispatch::StandaloneDatabase;
use ringkv::server;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Address to bind to
    #[arg(long)]
    bind: Option<String>,

    #[arg(long, short)]
    port: Option<u16>,

    /// Identifier (address) of this node in a cluster
    #[arg(long)]
    self_node: Option<String>,

    /// Peer node address; repeat for several peers
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Enable the append-only log
    #[arg(long)]
    append_only: bool,
}

impl Cli {
    fn into_config(self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(self_node) = self.self_node {
            config.self_node = self_node;
        }
        if !self.peers.is_empty() {
            config.peers = self.peers;
        }
        if self.append_only {
            config.append_only = true;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .init();

    info!("ringkv v{} starting", env!("CARGO_PKG_VERSION"));

    let addr = config.listen_addr();
    if config.is_cluster() {
        info!("Cluster mode: self {} with {} peers", config.self_node, config.peers.len());
        let engine = ClusterDatabase::open(&config).await?;
        server::listen_and_serve(&addr, engine, shutdown_signal()).await
    } else {
        info!("Standalone mode with {} databases", config.database_count());
        let engine = StandaloneDatabase::open(&config).await?;
        server::listen_and_serve(&addr, engine, shutdown_signal()).await
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
