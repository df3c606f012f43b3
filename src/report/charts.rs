//! Chart.js configurations for the metric histories, as sent to the chart
//! rendering service.

use crate::config::Theme;
use crate::core::{MetricHistograms, Millis};
use chrono::DateTime;
use serde::Serialize;
use serde_json::{json, Value};

/// Body of a chart rendering request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    pub width: u32,
    pub height: u32,
    pub background_color: String,
    pub chart: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    StackedArea,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: &'static str,
    pub color: &'static str,
    pub values: Vec<f64>,
}

/// One metric chart, independent of theme.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricChart {
    pub title: &'static str,
    pub kind: ChartKind,
    pub timestamps: Vec<Millis>,
    pub series: Vec<Series>,
}

struct Palette {
    background: &'static str,
    axis: &'static str,
    grid: &'static str,
}

fn palette(theme: Theme) -> Palette {
    match theme {
        Theme::Light => Palette {
            background: "white",
            axis: "#000000",
            grid: "#d0d7de",
        },
        Theme::Dark => Palette {
            background: "#0d1117",
            axis: "#ffffff",
            grid: "#30363d",
        },
    }
}

fn time_label(ms: Millis) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%H:%M:%S").to_string())
        .unwrap_or_else(|| ms.to_string())
}

impl MetricChart {
    /// Builds the request for this chart in `theme`.
    pub fn request(&self, theme: Theme, width: u32, height: u32) -> ChartRequest {
        let palette = palette(theme);
        let stacked = self.kind == ChartKind::StackedArea;

        let datasets: Vec<Value> = self
            .series
            .iter()
            .map(|series| {
                json!({
                    "label": series.label,
                    "data": series.values,
                    "borderColor": series.color,
                    "backgroundColor": series.color,
                    "fill": stacked,
                    "pointRadius": 0,
                })
            })
            .collect();

        let axis = |stacked: bool| {
            json!([{
                "stacked": stacked,
                "ticks": { "fontColor": palette.axis },
                "gridLines": { "color": palette.grid },
            }])
        };

        ChartRequest {
            width,
            height,
            background_color: palette.background.to_string(),
            chart: json!({
                "type": "line",
                "data": {
                    "labels": self.timestamps.iter().map(|t| time_label(*t)).collect::<Vec<_>>(),
                    "datasets": datasets,
                },
                "options": {
                    "title": { "display": true, "text": self.title, "fontColor": palette.axis },
                    "legend": { "labels": { "fontColor": palette.axis } },
                    "scales": { "xAxes": axis(false), "yAxes": axis(stacked) },
                },
            }),
        }
    }
}

/// The charts for every non-empty metric history.
pub fn metric_charts(metrics: &MetricHistograms) -> Vec<MetricChart> {
    let mut charts = Vec::new();

    if !metrics.cpu.is_empty() {
        charts.push(MetricChart {
            title: "CPU Load (%)",
            kind: ChartKind::StackedArea,
            timestamps: metrics.cpu.iter().map(|s| s.timestamp).collect(),
            series: vec![
                Series {
                    label: "User Load",
                    color: "#e41a1c99",
                    values: metrics.cpu.iter().map(|s| s.user_load).collect(),
                },
                Series {
                    label: "System Load",
                    color: "#ff7f0099",
                    values: metrics.cpu.iter().map(|s| s.system_load).collect(),
                },
            ],
        });
    }
    if !metrics.memory.is_empty() {
        charts.push(MetricChart {
            title: "Memory Usage (MB)",
            kind: ChartKind::StackedArea,
            timestamps: metrics.memory.iter().map(|s| s.timestamp).collect(),
            series: vec![
                Series {
                    label: "Used",
                    color: "#377eb899",
                    values: metrics.memory.iter().map(|s| s.active_mb).collect(),
                },
                Series {
                    label: "Free",
                    color: "#4daf4a99",
                    values: metrics.memory.iter().map(|s| s.available_mb).collect(),
                },
            ],
        });
    }
    if !metrics.network.is_empty() {
        charts.push(MetricChart {
            title: "Network I/O (MB)",
            kind: ChartKind::Line,
            timestamps: metrics.network.iter().map(|s| s.timestamp).collect(),
            series: vec![
                Series {
                    label: "Read",
                    color: "#be4d25",
                    values: metrics.network.iter().map(|s| s.rx_mb as f64).collect(),
                },
                Series {
                    label: "Write",
                    color: "#6c25be",
                    values: metrics.network.iter().map(|s| s.tx_mb as f64).collect(),
                },
            ],
        });
    }
    if !metrics.disk.is_empty() {
        charts.push(MetricChart {
            title: "Disk I/O (MB)",
            kind: ChartKind::Line,
            timestamps: metrics.disk.iter().map(|s| s.timestamp).collect(),
            series: vec![
                Series {
                    label: "Read",
                    color: "#be4d25",
                    values: metrics.disk.iter().map(|s| s.rx_mb as f64).collect(),
                },
                Series {
                    label: "Write",
                    color: "#6c25be",
                    values: metrics.disk.iter().map(|s| s.wx_mb as f64).collect(),
                },
            ],
        });
    }
    if !metrics.disk_size.is_empty() {
        charts.push(MetricChart {
            title: "Disk Usage (MB)",
            kind: ChartKind::StackedArea,
            timestamps: metrics.disk_size.iter().map(|s| s.timestamp).collect(),
            series: vec![
                Series {
                    label: "Used",
                    color: "#377eb899",
                    values: metrics.disk_size.iter().map(|s| s.used_mb).collect(),
                },
                Series {
                    label: "Free",
                    color: "#4daf4a99",
                    values: metrics.disk_size.iter().map(|s| s.available_mb).collect(),
                },
            ],
        });
    }
    charts
}
