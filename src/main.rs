//! Availability monitor binary

use availability_monitor::cli::Cli;
use availability_monitor::config::{self, Config};
use availability_monitor::{
    AvailabilityAggregator, MonitorError, ProbeExecutor, ProbeRegistry, Reporter, Result,
    SchedulingLoop,
};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    initialize_tracing();

    info!("Starting availability monitor v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    if cli.config.is_none() {
        info!("Using default config file path ({})", config::DEFAULT_PROBES_PATH);
    }
    let config = Config::from_cli(cli);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        return Err(MonitorError::Config(e));
    }

    let definitions = config::load_probe_definitions(&config.probes_path).map_err(|e| {
        error!("Failed to load probes from {}: {}", config.probes_path.display(), e);
        e
    })?;

    let registry = ProbeRegistry::from_definitions(definitions);
    info!(
        "Monitor configuration - Probes: {}, Interval: {:?}, Timeout: {:?}, Latency threshold: {:?}, Concurrency: {}",
        registry.len(),
        config.round_interval,
        config.request_timeout,
        config.latency_threshold,
        config.max_concurrency
    );

    let executor = ProbeExecutor::new(config.request_timeout, config.latency_threshold)?;
    let token = CancellationToken::new();
    let scheduler = SchedulingLoop::new(registry, Arc::new(executor), &config, token.clone());

    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });

    let registry = scheduler.run().await;

    // Report final availability
    let report = Reporter::report(&AvailabilityAggregator::aggregate(&registry));
    let json = serde_json::to_string(&report)?;
    info!(report = %json, "Final availability report");

    info!("Availability monitor shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

/// Initialize structured logging
fn initialize_tracing() {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .json();

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
