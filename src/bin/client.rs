//! Sudoku Tunnel Client
//!
//! The local relay:
//! - Accepts plain connections from SOCKS5-speaking applications
//! - Opens one obfuscated tunnel connection per application connection
//! - Reports traffic counters to the log and optionally a Unix socket

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use sudoku_tunnel::{
    config::{generate_example_config, Config},
    obfuscation::ObfuscationCode,
    sudoku::Catalog,
    transport::{spawn_reporter, LogSink, NoProtection, SocketProtector, TrafficStats},
    tunnel::LocalRelay,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Sudoku Tunnel Client - local relay for SOCKS5 applications
#[derive(Parser, Debug)]
#[command(name = "sudoku-client")]
#[command(about = "Sudoku Tunnel Client - local relay for SOCKS5 applications")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Print an example configuration and exit
    #[arg(long)]
    generate_config: bool,

    /// Local listen address (overrides config)
    #[arg(short, long)]
    listen: Option<String>,

    /// Remote relay address (overrides config)
    #[arg(short, long)]
    server: Option<String>,

    /// Obfuscation code, 0 or 1 (overrides config)
    #[arg(long)]
    code: Option<u8>,

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

    let mut client_config = config.client.unwrap_or_default();
    if let Some(listen) = args.listen {
        client_config.listen = listen;
    }
    if let Some(server) = args.server {
        client_config.server = server;
    }
    if let Some(code) = args.code {
        client_config.code = ObfuscationCode::try_from(code).context("Invalid --code")?;
    }

    info!("Sudoku Tunnel Client v{}", sudoku_tunnel::VERSION);

    let catalog = tokio::task::spawn_blocking(Catalog::build)
        .await
        .context("Catalog task failed")?
        .context("Failed to build puzzle catalog")?;
    info!("Puzzle catalog ready ({} grids)", catalog.grids().len());

    let stats = Arc::new(TrafficStats::new());
    let mut reporters = Vec::new();
    if client_config.report_interval_secs > 0 {
        reporters.push(spawn_reporter(
            Arc::clone(&stats),
            Arc::new(LogSink),
            Duration::from_secs(client_config.report_interval_secs),
        ));
    }
    if let Some(path) = &client_config.stats_socket {
        #[cfg(unix)]
        {
            info!("Writing traffic counters to {}", path);
            reporters.push(spawn_reporter(
                Arc::clone(&stats),
                Arc::new(sudoku_tunnel::transport::UnixSocketSink::new(path)),
                Duration::from_secs(client_config.stats_interval_secs.max(1)),
            ));
        }
        #[cfg(not(unix))]
        warn!("stats_socket {} is only supported on Unix, ignoring", path);
    }

    let relay = LocalRelay::new(
        client_config.server.clone(),
        Arc::new(catalog),
        client_config.code,
        client_config.relay.relay_options(),
    )
    .with_decoys(client_config.decoy_domains.clone(), client_config.decoy_port)
    .with_protector(protector(client_config.protect_path.as_deref()))
    .with_stats(Arc::clone(&stats));
    let relay = Arc::new(relay);

    let listener = TcpListener::bind(&client_config.listen)
        .await
        .context("Failed to bind to address")?;
    info!("Point SOCKS5 applications at {}", client_config.listen);

    let outcome = tokio::select! {
        result = relay.run_on(listener) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            Ok(())
        }
    };

    for reporter in reporters {
        reporter.abort();
    }

    let totals = stats.snapshot();
    info!(
        "Relayed {} bytes upstream, {} bytes downstream",
        totals.upstream, totals.downstream
    );

    if let Err(e) = outcome {
        error!("Client stopped: {}", e);
        return Err(e.into());
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
                Duration::from_secs(2),
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
