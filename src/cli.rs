//! Command-Line Interface (CLI) argument parsing.
//!
//! This module defines the command-line arguments for the application using the
//! `clap` crate. These arguments are parsed at startup and then merged with
//! the configuration from the `jobwatch.toml` file and environment variables.

use clap::{Args, Parser, Subcommand};
use figment::{
    value::{Dict, Map, Tag, Value},
    Error, Metadata, Profile, Provider,
};
use std::path::PathBuf;

/// Samples host metrics and the process table while a CI job runs, then
/// reports on them when the job ends.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub args: ConfigArgs,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Spawn the detached background sampler and return immediately.
    Start,
    /// Stop the background sampler, read back what it collected and publish the report.
    Finish {
        /// Stop and flush the sampler without publishing a report.
        #[arg(long)]
        no_report: bool,
    },
    /// Run the sampler in the foreground. Used by `start`.
    #[command(hide = true)]
    Run {
        /// Resolved configuration written by `start`.
        #[arg(long, value_name = "FILE")]
        resolved_config: Option<PathBuf>,
    },
}

/// Command-line overrides for the configuration file.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ConfigArgs {
    /// Path to the TOML configuration file.
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for the persisted state and the sampler log.
    #[arg(long, value_name = "DIR", global = true)]
    pub state_dir: Option<PathBuf>,

    /// Sampling interval in milliseconds.
    #[arg(long, value_name = "MS", global = true)]
    pub frequency_ms: Option<u64>,

    /// Leave processes shorter than this out of the report (-1 disables).
    #[arg(long, value_name = "MS", allow_negative_numbers = true, global = true)]
    pub min_duration_ms: Option<i64>,

    /// Maximum number of rows in the process chart.
    #[arg(long, value_name = "N", global = true)]
    pub chart_max_count: Option<usize>,

    /// Show the process chart.
    #[arg(long, value_name = "BOOL", global = true)]
    pub chart_show: Option<bool>,

    /// Show the process table.
    #[arg(long, value_name = "BOOL", global = true)]
    pub table_show: Option<bool>,

    /// File the markdown report is appended to.
    #[arg(long, value_name = "FILE", env = "GITHUB_STEP_SUMMARY", global = true)]
    pub job_summary: Option<PathBuf>,
}

impl Provider for ConfigArgs {
    fn metadata(&self) -> Metadata {
        Metadata::named("Command-Line Arguments")
    }

    fn data(&self) -> Result<Map<Profile, Dict>, Error> {
        let mut dict = Dict::new();

        if let Some(dir) = &self.state_dir {
            dict.insert(
                "state_dir".into(),
                Value::from(dir.display().to_string()),
            );
        }

        let mut sampling = Dict::new();
        if let Some(frequency) = self.frequency_ms {
            sampling.insert("frequency_ms".into(), Value::from(frequency));
        }

        let mut process_trace = Dict::new();
        if let Some(min) = self.min_duration_ms {
            process_trace.insert("min_duration_ms".into(), Value::from(min));
        }
        if let Some(count) = self.chart_max_count {
            process_trace.insert("chart_max_count".into(), Value::from(count as u64));
        }
        if let Some(show) = self.chart_show {
            process_trace.insert("chart_show".into(), Value::from(show));
        }
        if let Some(show) = self.table_show {
            process_trace.insert("table_show".into(), Value::from(show));
        }

        let mut report = Dict::new();
        if let Some(path) = &self.job_summary {
            report.insert(
                "job_summary_path".into(),
                Value::from(path.display().to_string()),
            );
        }

        for (key, section) in [
            ("sampling", sampling),
            ("process_trace", process_trace),
            ("report", report),
        ] {
            if !section.is_empty() {
                dict.insert(key.into(), Value::Dict(Tag::Default, section));
            }
        }

        let mut map = Map::new();
        map.insert(Profile::Default, dict);
        Ok(map)
    }
}
