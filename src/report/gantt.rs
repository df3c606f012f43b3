//! Mermaid gantt charts of processes and job steps.

use super::{JobStep, StepStatus};
use crate::core::{CompletedProcess, Millis};
use std::fmt::Write;

/// Visual style of one gantt row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowStyle {
    #[default]
    Normal,
    /// Failed lifecycles.
    Crit,
    /// Skipped lifecycles.
    Done,
}

impl RowStyle {
    fn tag(self) -> Option<&'static str> {
        match self {
            RowStyle::Normal => None,
            RowStyle::Crit => Some("crit"),
            RowStyle::Done => Some("done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GanttRow {
    pub label: String,
    pub start: Millis,
    pub end: Millis,
    pub style: RowStyle,
}

/// Picks the `k` longest processes and orders them by start time.
///
/// Ties in duration keep their input order.
pub fn top_k_by_duration<'a>(processes: &[&'a CompletedProcess], k: usize) -> Vec<&'a CompletedProcess> {
    let mut selected = processes.to_vec();
    selected.sort_by(|a, b| b.duration.cmp(&a.duration));
    selected.truncate(k);
    selected.sort_by_key(|p| p.start_time);
    selected
}

pub fn process_rows(processes: &[&CompletedProcess]) -> Vec<GanttRow> {
    processes
        .iter()
        .map(|p| GanttRow {
            label: p.name.clone(),
            start: p.start_time,
            end: p.end_time,
            style: RowStyle::Normal,
        })
        .collect()
}

/// One row per step with known timing, in start order.
pub fn step_rows(steps: &[JobStep]) -> Vec<GanttRow> {
    let mut rows: Vec<GanttRow> = steps
        .iter()
        .filter_map(|step| {
            let start = step.started_at?;
            let end = step.completed_at.unwrap_or(start).max(start);
            let style = match step.status {
                StepStatus::Failure => RowStyle::Crit,
                StepStatus::Skipped => RowStyle::Done,
                _ => RowStyle::Normal,
            };
            Some(GanttRow {
                label: step.name.clone(),
                start,
                end,
                style,
            })
        })
        .collect();
    rows.sort_by_key(|row| row.start);
    rows
}

/// Makes `label` safe to place before the `:` separator of a gantt row.
pub fn escape_label(label: &str) -> String {
    label
        .replace(':', "#colon;")
        .replace(['\n', '\r'], " ")
        .trim()
        .to_string()
}

/// Renders `rows` as a fenced mermaid gantt block.
pub fn render(title: &str, rows: &[GanttRow]) -> String {
    let mut out = String::new();
    out.push_str("```mermaid\ngantt\n");
    let _ = writeln!(out, "  title {}", escape_label(title));
    out.push_str("  dateFormat x\n");
    out.push_str("  axisFormat %H:%M:%S\n");
    for row in rows {
        let label = escape_label(&row.label);
        let label = if label.is_empty() { "-" } else { &label };
        match row.style.tag() {
            Some(tag) => {
                let _ = writeln!(out, "  {} : {}, {}, {}", label, tag, row.start, row.end);
            }
            None => {
                let _ = writeln!(out, "  {} : {}, {}", label, row.start, row.end);
            }
        }
    }
    out.push_str("```\n");
    out
}
