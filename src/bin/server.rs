//! Sudoku Tunnel Server
//!
//! The remote relay:
//! - Accepts tunnel connections and answers the control handshake
//! - Serves SOCKS5 CONNECT on the decoded stream
//! - Dials destinations and relays until both sides close

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use sudoku_tunnel::{
    config::{generate_example_config, Config},
    sudoku::Catalog,
    transport::{NoProtection, SocketProtector},
    tunnel::RemoteRelay,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Sudoku Tunnel Server - remote relay with a built-in SOCKS5 gateway
#[derive(Parser, Debug)]
#[command(name = "sudoku-server")]
#[command(about = "Sudoku Tunnel Server - remote relay with a built-in SOCKS5 gateway")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print an example configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.generate_config {
        let example = toml::to_string_pretty(&generate_example_config())
            .context("Failed to serialize example config")?;
        println!("{}", example);
        return Ok(());
    }

    let config_found = Path::new(&args.config).exists();
    let config = if config_found {
        Config::load(&args.config).context("Failed to load configuration")?
    } else {
        Config::default()
    };

    // Initialize logging
    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    let subscriber = tracing_subscriber::fmt().with_env_filter(level);
    match config.logging.format.as_str() {
        "compact" => subscriber.compact().init(),
        _ => subscriber.pretty().init(),
    }

    if !config_found {
        warn!("Config file {} not found, using defaults", args.config);
    }

    let mut server_config = config.server.unwrap_or_default();
    if let Some(listen) = args.listen {
        server_config.listen = listen;
    }

    info!("Sudoku Tunnel Server v{}", sudoku_tunnel::VERSION);

    let catalog = tokio::task::spawn_blocking(Catalog::build)
        .await
        .context("Catalog task failed")?
        .context("Failed to build puzzle catalog")?;
    info!("Puzzle catalog ready ({} grids)", catalog.grids().len());

    let relay = RemoteRelay::new(
        Arc::new(catalog),
        server_config.relay.relay_options(),
        server_config.max_connections,
    )
    .with_protector(protector(server_config.protect_path.as_deref()));
    let relay = Arc::new(relay);

    let listener = TcpListener::bind(&server_config.listen)
        .await
        .context("Failed to bind to address")?;

    tokio::select! {
        result = relay.run_on(listener) => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
        }
    }

    Ok(())
}

fn protector(path: Option<&str>) -> Arc<dyn SocketProtector> {
    match path {
        #[cfg(unix)]
        Some(path) => {
            info!("Protecting outbound sockets via {}", path);
            Arc::new(sudoku_tunnel::transport::UnixSocketProtector::new(
                path,
                std::time::Duration::from_secs(2),
            ))
        }
        #[cfg(not(unix))]
        Some(_) => {
            warn!("protect_path is only supported on Unix, ignoring");
            Arc::new(NoProtection)
        }
        None => Arc::new(NoProtection),
    }
}
