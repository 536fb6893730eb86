//! rondo daemon
//!
//! Round-robin HTTP load balancer that only forwards to upstreams its health
//! monitors currently consider live.

use anyhow::Context;
use clap::Parser;
use rondo_core::{LogFormat, LoggingConfig, ProxyConfig};
use rondo_network::{initialize_upstreams, HealthSettings, HttpProber, ReverseProxy};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// rondod - round-robin HTTP load balancer
#[derive(Parser, Debug)]
#[command(name = "rondod")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the proxy listener
    #[arg(long)]
    address: Option<String>,

    /// Port for the proxy listener
    #[arg(long)]
    port: Option<u16>,

    /// Upstream base address, in rotation order (repeatable)
    #[arg(long = "upstream", value_name = "URL")]
    upstreams: Vec<String>,

    /// Seconds between health checks
    #[arg(long)]
    health_interval: Option<u64>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,

    /// Log format (text or json)
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Args {
    /// Merge the config file (if any) with command-line overrides
    fn load_config(&self) -> anyhow::Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::from_file(path)?,
            None => ProxyConfig::default(),
        };

        if let Some(address) = &self.address {
            config.listener.address = address.clone();
        }
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if !self.upstreams.is_empty() {
            config.upstreams = self.upstreams.clone();
        }
        if let Some(interval) = self.health_interval {
            config.health.interval_secs = interval;
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        eprintln!("Failed to set subscriber: {}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = args.load_config()?;

    init_logging(&config.logging);
    info!("Starting rondo daemon v{}", env!("CARGO_PKG_VERSION"));

    // Shared by every health monitor; cancelled once on shutdown
    let cancel = CancellationToken::new();

    let prober = Arc::new(HttpProber::new(config.health.timeout())?);
    let client = ReverseProxy::client()?;
    let upstreams = initialize_upstreams(
        &config.upstreams,
        HealthSettings::from(&config.health),
        prober,
        client,
        &cancel,
    );
    let (dispatcher, monitors) = upstreams
        .into_dispatcher()
        .context("No upstream addresses available")?;

    info!(
        upstreams = ?dispatcher.addresses(),
        interval_secs = config.health.interval_secs,
        "Upstream pool ready"
    );

    let addr = format!("{}:{}", config.listener.address, config.listener.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let served = rondo_api::serve(listener, Arc::new(dispatcher), shutdown_signal()).await;
    if let Err(e) = &served {
        error!(error = %e, "Server error");
    }

    info!("Stopping health monitors");
    cancel.cancel();
    monitors.join().await;
    info!("Shutdown complete");

    served.context("Server error")
}

/// Resolve on Ctrl+C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}
