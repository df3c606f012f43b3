//! Fixed-width text table of completed processes.

use crate::core::{CompletedProcess, Millis};
use chrono::DateTime;
use itertools::Itertools;

const HEADERS: [&str; 6] = [
    "NAME",
    "START TIME",
    "DURATION (ms)",
    "MAX CPU %",
    "MAX MEM %",
    "COMMAND + PARAMS",
];

fn format_time(ms: Millis) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn cells(process: &CompletedProcess) -> [String; 6] {
    [
        process.name.clone(),
        format_time(process.start_time),
        process.duration.to_string(),
        format!("{:.2}", process.max_cpu),
        format!("{:.2}", process.max_mem),
        process.command_line(),
    ]
}

/// Renders `processes` in start order as a fenced block of padded columns.
pub fn render(processes: &[&CompletedProcess]) -> String {
    let mut ordered = processes.to_vec();
    ordered.sort_by_key(|p| p.start_time);
    let rows: Vec<[String; 6]> = ordered.into_iter().map(cells).collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| -> String {
        let last = cells.len() - 1;
        cells
            .iter()
            .zip(widths)
            .enumerate()
            .map(|(i, (cell, width))| {
                if i == last {
                    cell.to_string()
                } else {
                    format!("{cell:<width$}")
                }
            })
            .join("  ")
    };

    let fence = fence_for(&rows);
    let mut out = format!("{fence}\n");
    out.push_str(&line(&HEADERS[..]));
    out.push('\n');
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push_str(&line(&cells));
        out.push('\n');
    }
    out.push_str(&fence);
    out.push('\n');
    out
}

// A fence must be longer than any backtick run inside it.
fn fence_for(rows: &[[String; 6]]) -> String {
    let longest_run = rows
        .iter()
        .flatten()
        .flat_map(|cell| cell.split(|c: char| c != '`'))
        .map(str::len)
        .max()
        .unwrap_or(0);
    "`".repeat((longest_run + 1).max(3))
}
