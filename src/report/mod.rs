//! Turns what the sampler collected into a markdown job summary.
//!
//! Completed processes go through the minimum-duration and system-process
//! filters exactly once. The gantt chart and the table are both drawn from
//! that filtered list. Metric histories are sent to the chart rendering
//! service in both themes; a chart the service could not render is left out.

pub mod chart_client;
pub mod charts;
pub mod gantt;
pub mod table;

use crate::config::{Config, ProcessTraceConfig, ReportConfig, Theme};
use crate::core::{Collected, CompletedProcess, Millis};
use anyhow::{Context, Result};
use chart_client::ChartClient;
use charts::{metric_charts, MetricChart};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

/// Short-lived shell utilities hidden from the process report by default.
pub const SYSTEM_PROCESS_NAMES: &[&str] = &[
    "awk", "basename", "cat", "cut", "date", "dirname", "env", "expr", "grep", "head", "id", "ls",
    "mkdir", "mktemp", "ps", "readlink", "rm", "sed", "sh", "sleep", "sort", "tail", "tee",
    "touch", "tr", "uname", "wc", "which", "xargs",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Success,
    Failure,
    Skipped,
    Cancelled,
    #[default]
    #[serde(other)]
    Other,
}

/// One step of the CI job, as reported by the source-control platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStep {
    pub name: String,
    #[serde(default)]
    pub status: StepStatus,
    pub started_at: Option<Millis>,
    pub completed_at: Option<Millis>,
}

/// Reads the job steps from `path`. A missing or malformed file yields no steps.
pub async fn load_steps(path: &Path) -> Vec<JobStep> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Could not read job steps");
            return Vec::new();
        }
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Malformed job steps; skipping step trace");
        Vec::new()
    })
}

/// Applies the minimum-duration and system-process filters.
///
/// A `min_duration_ms` of `-1` keeps every process.
pub fn filter_processes<'a>(
    completed: &'a [CompletedProcess],
    min_duration_ms: i64,
    include_system: bool,
) -> Vec<&'a CompletedProcess> {
    completed
        .iter()
        .filter(|p| min_duration_ms < 0 || p.duration >= min_duration_ms)
        .filter(|p| include_system || !SYSTEM_PROCESS_NAMES.contains(&p.name.as_str()))
        .collect()
}

/// Builds the markdown report from collected state.
pub struct ReportBuilder {
    report: ReportConfig,
    trace: ProcessTraceConfig,
    metrics_enabled: bool,
    charts: Arc<dyn ChartClient>,
}

impl ReportBuilder {
    pub fn new(config: &Config, charts: Arc<dyn ChartClient>) -> Self {
        Self {
            report: config.report.clone(),
            trace: config.process_trace.clone(),
            metrics_enabled: config.metrics.enabled,
            charts,
        }
    }

    #[instrument(skip_all, fields(completed = collected.processes.completed.len(), steps = steps.len()))]
    pub async fn build(&self, collected: &Collected, steps: &[JobStep]) -> String {
        let mut out = format!("## {}\n\n", self.report.title);

        if self.metrics_enabled {
            let section = self.metrics_section(&metric_charts(&collected.metrics)).await;
            if !section.is_empty() {
                out.push_str("### Metrics\n\n");
                out.push_str(&section);
            }
        }

        let step_rows = gantt::step_rows(steps);
        if !step_rows.is_empty() {
            out.push_str("### Steps\n\n");
            out.push_str(&gantt::render("Steps", &step_rows));
            out.push('\n');
        }

        if self.trace.enabled {
            out.push_str(&self.process_section(&collected.processes.completed));
        }

        debug!(bytes = out.len(), "Report built");
        out
    }

    fn process_section(&self, completed: &[CompletedProcess]) -> String {
        let filtered = filter_processes(
            completed,
            self.trace.min_duration_ms,
            self.trace.include_system,
        );
        if filtered.is_empty() || !(self.trace.chart_show || self.trace.table_show) {
            return String::new();
        }

        let mut out = String::from("### Processes\n\n");
        if self.trace.chart_show {
            let selected = gantt::top_k_by_duration(&filtered, self.trace.chart_max_count);
            out.push_str(&gantt::render("Processes", &gantt::process_rows(&selected)));
            out.push('\n');
        }
        if self.trace.table_show {
            out.push_str(&table::render(&filtered));
            out.push('\n');
        }
        out
    }

    /// Renders every chart in both themes and embeds whatever came back.
    async fn metrics_section(&self, charts: &[MetricChart]) -> String {
        let preferred = self.report.theme;
        let other = match preferred {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        };

        let renders = charts.iter().map(|chart| async move {
            let (main, alt) = futures::join!(
                self.render(chart, preferred),
                self.render(chart, other)
            );
            (chart.title, main, alt)
        });

        let mut out = String::new();
        for (title, main, alt) in join_all(renders).await {
            let image = match (main, alt) {
                (Some(main), Some(alt)) => format!(
                    "<picture>\n  <source media=\"(prefers-color-scheme: {other})\" srcset=\"{alt}\">\n  <img alt=\"{title}\" src=\"{main}\">\n</picture>"
                ),
                (Some(url), None) | (None, Some(url)) => format!("![{title}]({url})"),
                (None, None) => continue,
            };
            out.push_str(&image);
            out.push_str("\n\n");
        }
        out
    }

    async fn render(&self, chart: &MetricChart, theme: Theme) -> Option<String> {
        let request = chart.request(theme, self.report.chart_width, self.report.chart_height);
        match self.charts.render(&request).await {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(chart = chart.title, %theme, error = %e, "Chart omitted");
                None
            }
        }
    }
}

/// Appends `markdown` to the job summary file, or prints it when none is set.
pub async fn publish(markdown: &str, config: &ReportConfig) -> Result<()> {
    let Some(path) = &config.job_summary_path else {
        println!("{markdown}");
        return Ok(());
    };

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .with_context(|| format!("failed to open job summary {}", path.display()))?;
    file.write_all(markdown.as_bytes()).await?;
    file.flush().await?;
    info!(path = %path.display(), "Report published");
    Ok(())
}
