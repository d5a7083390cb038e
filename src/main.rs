//! socksrelay - SOCKS5 and HTTP-CONNECT proxy server
//!
//! This is the main entry point for the socksrelay binary.

use anyhow::{bail, Result};
use clap::Parser;
use socksrelay::config::load_config;
use socksrelay::{HttpServer, Socks5Server};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// socksrelay - SOCKS5 and HTTP-CONNECT proxy server
#[derive(Parser, Debug)]
#[command(name = "socksrelay")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Enable JSON logging format
    #[arg(long)]
    json_log: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(&args.log_level, args.json_log)?;

    let config = load_config(&args.config)?;
    if !config.has_listener() {
        bail!("No listener configured; add a [socks5] or [http] section");
    }

    info!("socksrelay v{}", socksrelay::VERSION);
    info!("Configuration loaded from: {:?}", args.config);

    let mut servers = JoinSet::new();
    let mut stops: Vec<Box<dyn Fn() + Send>> = Vec::new();

    if let Some(socks5) = config.socks5 {
        let server = Arc::new(Socks5Server::new(&socks5));
        let stop = server.clone();
        stops.push(Box::new(move || stop.shutdown()));
        servers.spawn(async move { server.listen_and_serve(socks5.listen.as_str()).await });
    }

    if let Some(http) = config.http {
        let server = Arc::new(HttpServer::new(&http)?);
        let stop = server.clone();
        stops.push(Box::new(move || stop.shutdown()));
        servers.spawn(async move { server.listen_and_serve(http.listen.as_str()).await });
    }

    tokio::select! {
        result = shutdown_signal() => {
            result?;
            for stop in &stops {
                stop();
            }
        }
        // a listener that exits early (bind failure) takes the process down
        Some(joined) = servers.join_next() => {
            for stop in &stops {
                stop();
            }
            match joined {
                Ok(Err(e)) => error!("Server exited: {}", e),
                Err(e) => error!("Server task failed: {}", e),
                Ok(Ok(())) => {}
            }
        }
    }

    while let Some(joined) = servers.join_next().await {
        if let Ok(Err(e)) = joined {
            error!("Server exited: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}

/// Setup logging based on the command line. `RUST_LOG` directives, when
/// set, take precedence over `--log-level`.
fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(parse_level(level)).into())
        .from_env_lossy();

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}
