//! JobWatch - CI job telemetry collector
//!
//! `start` spawns the background sampler, `finish` stops it and publishes the
//! report. `run` is the background sampler itself.

use anyhow::{Context, Result};
use clap::Parser;
use jobwatch::{
    cli::{Cli, Command},
    config::Config,
    lifecycle,
    provider::HostMetricsProvider,
    report::{self, chart_client::QuickChartClient, ReportBuilder},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let loaded = match &cli.command {
        Command::Run {
            resolved_config: Some(path),
        } => Config::from_resolved(path),
        _ => Config::load(&cli.args),
    };
    let (config, load_error) = match loaded {
        Ok(config) => (config, None),
        Err(e) => (Config::fallback(&cli.args), Some(e)),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(e) = load_error {
        warn!(error = ?e, "Failed to load configuration; using defaults");
    }
    let config = config.sanitized();

    match cli.command {
        Command::Start => {
            match lifecycle::start(&config).await {
                Ok(marker) => info!(pid = marker.pid, port = marker.port, "Sampling started"),
                Err(e) => error!(error = ?e, "Failed to start background sampler"),
            }
            Ok(())
        }
        Command::Finish { no_report } => {
            finish(&config, no_report).await;
            Ok(())
        }
        Command::Run { .. } => run(config).await,
    }
}

async fn finish(config: &Config, no_report: bool) {
    let Some(collected) = lifecycle::finish(config).await else {
        return;
    };
    if no_report {
        info!("Report disabled; collected state was flushed only.");
        return;
    }

    let charts = match QuickChartClient::new(
        config.report.chart_service_url.clone(),
        Duration::from_millis(config.report.chart_timeout_ms),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "Failed to build chart client; skipping report");
            return;
        }
    };

    let steps = match &config.report.steps_file {
        Some(path) => report::load_steps(path).await,
        None => Vec::new(),
    };
    let markdown = ReportBuilder::new(config, charts)
        .build(&collected, &steps)
        .await;
    if let Err(e) = report::publish(&markdown, &config.report).await {
        error!(error = ?e, "Failed to publish report");
    }
}

async fn run(config: Config) -> Result<()> {
    info!("-------------------- Configuration --------------------");
    info!("State Dir: {}", config.state_dir.display());
    info!("Sampling Frequency: {}ms", config.sampling.frequency_ms);
    info!("Metrics Enabled: {}", config.metrics.enabled);
    info!("Process Trace Enabled: {}", config.process_trace.enabled);
    info!("Control Port: {}", config.control.port);
    info!("-------------------------------------------------------");

    let listener = TcpListener::bind(("127.0.0.1", config.control.port))
        .await
        .with_context(|| format!("failed to bind control port {}", config.control.port))?;
    let provider = Arc::new(HostMetricsProvider::new());
    lifecycle::run_background(config, provider, listener, lifecycle::termination_signal()).await
}
