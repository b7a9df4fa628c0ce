//! Table output formatting for CLI commands
//!
//! Tier breakdowns, failure reasons and model lists using comfy-table.
//! Supports color-coded cells, automatic column sizing, and `NO_COLOR`.

use comfy_table::{presets, Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use std::collections::BTreeMap;
use std::env;

use super::{percent, truncate};
use crate::domain::models::report::ErrorFrequency;
use crate::domain::models::{AggregateReport, GroupStats, TargetThresholds};

/// Table formatter for CLI output
pub struct TableFormatter {
    /// Whether to use colors in output
    use_colors: bool,
    /// Maximum width for tables (None = auto)
    max_width: Option<usize>,
}

impl TableFormatter {
    pub fn new() -> Self {
        Self {
            use_colors: supports_color(),
            max_width: None,
        }
    }

    pub const fn with_config(use_colors: bool, max_width: Option<usize>) -> Self {
        Self {
            use_colors,
            max_width,
        }
    }

    /// Table with the shared preset and a bold header row.
    pub fn base_table(&self, header: &[&str]) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        if let Some(width) = self.max_width {
            table.set_width(u16::try_from(width).unwrap_or(u16::MAX));
        }

        table.set_header(
            header
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
        table
    }

    /// Cell showing whether a target was met.
    pub fn status_cell(&self, met: bool) -> Cell {
        match (self.use_colors, met) {
            (true, true) => Cell::new("met").fg(Color::Green),
            (true, false) => Cell::new("not met").fg(Color::Red),
            (false, true) => Cell::new("✓ met"),
            (false, false) => Cell::new("✗ not met"),
        }
    }

    fn stats_row(&self, label: &str, stats: &GroupStats, target: Option<f64>) -> Vec<Cell> {
        let (target_cell, status) = match target {
            Some(target) => (
                Cell::new(percent(target)).set_alignment(CellAlignment::Right),
                self.status_cell(stats.pass_rate >= target),
            ),
            None => (Cell::new("-"), Cell::new("-")),
        };
        let score = stats
            .score
            .as_ref()
            .map_or_else(|| "-".to_string(), |s| format!("{:.1}", s.mean));

        vec![
            Cell::new(label),
            Cell::new(stats.total).set_alignment(CellAlignment::Right),
            Cell::new(stats.passed).set_alignment(CellAlignment::Right),
            Cell::new(percent(stats.pass_rate)).set_alignment(CellAlignment::Right),
            target_cell,
            status,
            Cell::new(stats.low_confidence).set_alignment(CellAlignment::Right),
            Cell::new(score).set_alignment(CellAlignment::Right),
        ]
    }

    /// Per-tier and overall pass rates against their targets.
    pub fn format_report(&self, report: &AggregateReport, targets: &TargetThresholds) -> String {
        let mut table = self.base_table(&[
            "Tier",
            "Total",
            "Passed",
            "Pass rate",
            "Target",
            "Status",
            "Low conf.",
            "Mean score",
        ]);

        for (tier, stats) in &report.by_tier {
            table.add_row(self.stats_row(tier, stats, targets.by_tier.get(tier).copied()));
        }
        let mut overall = self.stats_row("overall", &report.overall, Some(targets.overall));
        for cell in &mut overall {
            *cell = cell.clone().add_attribute(Attribute::Bold);
        }
        table.add_row(overall);

        table.to_string()
    }

    /// Failure reasons, most frequent first.
    pub fn format_failure_reasons(&self, reasons: &BTreeMap<String, usize>) -> String {
        let mut sorted: Vec<(&String, &usize)> = reasons.iter().collect();
        sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut table = self.base_table(&["Failure reason", "Count"]);
        for (reason, count) in sorted {
            table.add_row(vec![
                Cell::new(reason),
                Cell::new(count).set_alignment(CellAlignment::Right),
            ]);
        }
        table.to_string()
    }

    /// Most frequent normalized error messages.
    pub fn format_common_errors(&self, errors: &[ErrorFrequency]) -> String {
        let mut table = self.base_table(&["Common error", "Count"]);
        for error in errors {
            table.add_row(vec![
                Cell::new(truncate(&error.message, 80)),
                Cell::new(error.count).set_alignment(CellAlignment::Right),
            ]);
        }
        table.to_string()
    }
}

impl Default for TableFormatter {
    fn default() -> Self {
        Self::new()
    }
}

/// Check if color output is supported
fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }

    if let Ok(term) = env::var("TERM") {
        if term == "dumb" {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(total: usize, passed: usize) -> GroupStats {
        GroupStats {
            total,
            passed,
            failed: total - passed,
            pass_rate: passed as f64 / total as f64,
            ..GroupStats::default()
        }
    }

    #[test]
    fn test_format_report_rows() {
        let report = AggregateReport {
            overall: stats(4, 3),
            by_tier: BTreeMap::from([("tier1".to_string(), stats(2, 2)), ("tier2".to_string(), stats(2, 1))]),
            by_category: BTreeMap::new(),
            criteria_averages: BTreeMap::new(),
            common_errors: Vec::new(),
            targets: Default::default(),
        };
        let formatter = TableFormatter::with_config(false, None);
        let out = formatter.format_report(&report, &TargetThresholds::default());

        assert!(out.contains("tier1"));
        assert!(out.contains("100.0%"));
        assert!(out.contains("✗ not met"));
        assert!(out.contains("overall"));
        assert!(out.contains("75.0%"));
    }

    #[test]
    fn test_failure_reasons_sorted_by_count() {
        let reasons = BTreeMap::from([
            ("extraction_failed".to_string(), 1),
            ("value_incorrect".to_string(), 5),
        ]);
        let out = TableFormatter::with_config(false, None).format_failure_reasons(&reasons);
        assert!(out.find("value_incorrect").unwrap() < out.find("extraction_failed").unwrap());
    }
}
