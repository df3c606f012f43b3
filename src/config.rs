//! Configuration management for JobWatch
//!
//! This module defines the main `Config` struct and its sub-structs,
//! responsible for holding all application settings. It uses the `figment`
//! crate to layer defaults, a `jobwatch.toml` file, `JOBWATCH_` environment
//! variables and command-line overrides.

use crate::cli::ConfigArgs;
use anyhow::{Context, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_CONFIG_FILE: &str = "jobwatch.toml";

/// Longest accepted sampling interval: one day.
pub const MAX_FREQUENCY_MS: u64 = 24 * 60 * 60 * 1000;

/// The main configuration struct for the application.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    /// The logging level for the application.
    pub log_level: String,
    /// Directory holding the persisted documents, the lifecycle marker and
    /// the background sampler's log.
    pub state_dir: PathBuf,
    pub sampling: SamplingConfig,
    pub metrics: MetricsConfig,
    pub process_trace: ProcessTraceConfig,
    pub control: ControlConfig,
    pub report: ReportConfig,
}

/// Configuration for the sampling loop.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct SamplingConfig {
    /// Interval between ticks in milliseconds.
    pub frequency_ms: u64,
}

/// Configuration for host metric collection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MetricsConfig {
    /// Collect CPU, memory, network and disk histories and chart them.
    pub enabled: bool,
}

/// Configuration for process tracing and its report sections.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProcessTraceConfig {
    pub enabled: bool,
    /// Processes shorter than this are left out of the report. `-1` disables.
    pub min_duration_ms: i64,
    /// Keep common shell utilities (`sh`, `cat`, `sed`, ...) in the report.
    pub include_system: bool,
    pub chart_show: bool,
    /// Maximum number of rows in the process chart.
    pub chart_max_count: usize,
    pub table_show: bool,
}

/// Configuration for the background sampler's control endpoint.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ControlConfig {
    /// Loopback port the background sampler listens on.
    pub port: u16,
    /// How long `finish` waits for the sampler's final flush.
    pub finish_timeout_ms: u64,
}

/// The color scheme of rendered charts.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theme::Light => write!(f, "light"),
            Theme::Dark => write!(f, "dark"),
        }
    }
}

/// Configuration for the final report.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ReportConfig {
    pub title: String,
    pub theme: Theme,
    /// Endpoint of the chart rendering service.
    pub chart_service_url: String,
    pub chart_timeout_ms: u64,
    pub chart_width: u32,
    pub chart_height: u32,
    /// File the markdown report is appended to. Printed to stdout when unset.
    pub job_summary_path: Option<PathBuf>,
    /// JSON list of job steps to chart alongside the processes.
    pub steps_file: Option<PathBuf>,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { frequency_ms: 5000 }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for ProcessTraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_duration_ms: -1,
            include_system: false,
            chart_show: true,
            chart_max_count: 100,
            table_show: false,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            port: 7777,
            finish_timeout_ms: 30_000,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: "Job Telemetry".to_string(),
            theme: Theme::Light,
            chart_service_url: "https://quickchart.io/chart/create".to_string(),
            chart_timeout_ms: 10_000,
            chart_width: 800,
            chart_height: 400,
            job_summary_path: None,
            steps_file: None,
        }
    }
}

impl Config {
    /// Loads the configuration by layering defaults, the TOML file,
    /// `JOBWATCH_` environment variables and command-line overrides.
    ///
    /// Nested keys are addressed with a double underscore in the environment,
    /// e.g. `JOBWATCH_SAMPLING__FREQUENCY_MS=1000`.
    pub fn load(args: &ConfigArgs) -> Result<Self> {
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("JOBWATCH_").split("__"))
            .merge(args.clone())
            .extract()?;
        Ok(config)
    }

    /// The configuration used when [`Config::load`] fails: defaults with only
    /// the command-line overrides applied.
    pub fn fallback(args: &ConfigArgs) -> Self {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(args.clone())
            .extract()
            .unwrap_or_default()
    }

    /// Replaces out-of-range values with their defaults, logging each one.
    pub fn sanitized(mut self) -> Self {
        let defaults = Config::default();
        if self.sampling.frequency_ms == 0 {
            warn!(
                default = defaults.sampling.frequency_ms,
                "sampling.frequency_ms must be positive; using default"
            );
            self.sampling.frequency_ms = defaults.sampling.frequency_ms;
        } else if self.sampling.frequency_ms > MAX_FREQUENCY_MS {
            warn!(
                value = self.sampling.frequency_ms,
                max = MAX_FREQUENCY_MS,
                "sampling.frequency_ms too large; capping"
            );
            self.sampling.frequency_ms = MAX_FREQUENCY_MS;
        }
        if self.process_trace.chart_max_count == 0 {
            warn!(
                default = defaults.process_trace.chart_max_count,
                "process_trace.chart_max_count must be positive; using default"
            );
            self.process_trace.chart_max_count = defaults.process_trace.chart_max_count;
        }
        if self.process_trace.min_duration_ms < -1 {
            warn!(
                value = self.process_trace.min_duration_ms,
                "process_trace.min_duration_ms below -1; disabling the filter"
            );
            self.process_trace.min_duration_ms = -1;
        }
        self
    }

    /// Path of the resolved configuration handed to the background sampler.
    pub fn resolved_config_path(&self) -> PathBuf {
        self.state_dir.join("config.json")
    }

    /// Reads a configuration written by `start` for the background sampler.
    pub fn from_resolved(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read resolved config {}", path.display()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

// Provide a default implementation for tests and easy setup.
impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            state_dir: std::env::temp_dir().join("jobwatch"),
            sampling: SamplingConfig::default(),
            metrics: MetricsConfig::default(),
            process_trace: ProcessTraceConfig::default(),
            control: ControlConfig::default(),
            report: ReportConfig::default(),
        }
    }
}
