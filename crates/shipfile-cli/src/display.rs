//! Display formatting for CLI output
//!
//! Provides structured display for:
//! - the release table printed by `list`
//! - per-release outcomes of sync, diff, delete, test and status

use console::style;
use serde::Serialize;
use shipfile_core::ReleaseSpec;
use shipfile_exec::ReleaseOutcome;
use std::collections::BTreeMap;

/// One row of `shipfile list`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReleaseRow {
    pub name: String,
    pub namespace: String,
    pub enabled: bool,
    pub labels: String,
    pub chart: String,
    pub version: String,
}

impl ReleaseRow {
    pub fn from_release(release: &ReleaseSpec) -> Self {
        Self {
            name: release.name.clone(),
            namespace: release.namespace.clone().unwrap_or_default(),
            enabled: release.installed,
            labels: format_labels(&release.labels),
            chart: release.chart.clone(),
            version: release.version.clone().unwrap_or_default(),
        }
    }
}

/// `k1:v1,k2:v2`, sorted by key
pub fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Lay out rows as aligned columns; the first line is the header
pub fn release_table(rows: &[ReleaseRow]) -> Vec<String> {
    const HEADERS: [&str; 6] = ["NAME", "NAMESPACE", "ENABLED", "LABELS", "CHART", "VERSION"];

    let cells: Vec<[String; 6]> = rows
        .iter()
        .map(|row| {
            [
                row.name.clone(),
                row.namespace.clone(),
                row.enabled.to_string(),
                row.labels.clone(),
                row.chart.clone(),
                row.version.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    let line = |cols: [&str; 6]| {
        cols.iter()
            .zip(widths)
            .map(|(col, width)| format!("{:<width$}", col, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    std::iter::once(line(HEADERS))
        .chain(cells.iter().map(|row| line(row.each_ref().map(String::as_str))))
        .collect()
}

/// Print the outcomes of one state's releases
pub fn print_outcomes(file: &str, outcomes: &[ReleaseOutcome]) {
    if outcomes.is_empty() {
        return;
    }

    println!("{}", style(file).bold());
    for outcome in outcomes {
        match &outcome.result {
            Ok(output) => {
                println!(
                    "  {} {} {}",
                    style("✓").green(),
                    outcome.operation,
                    style(&outcome.release).cyan()
                );
                for line in output.lines().filter(|l| !l.trim().is_empty()) {
                    println!("    {}", style(line).dim());
                }
            }
            Err(err) => {
                println!(
                    "  {} {} {}: {}",
                    style("✗").red(),
                    outcome.operation,
                    style(&outcome.release).cyan(),
                    style(err).red()
                );
            }
        }
    }
}
