//! Table rendering for CLI output using comfy-table.
//!
//! | Command | Table Function |
//! |---------|----------------|
//! | `rmerge scan` | `render_candidates_table()` |
//! | `rmerge run` (scan) | `render_scan_report_table()` |
//! | `rmerge run`, `rmerge report` | `render_analysis_table()`, `render_merge_table()` |
//! | `rmerge scenarios` | `render_scenario_table()` |

use std::path::Path;

use comfy_table::presets::NOTHING;
use comfy_table::{Cell, CellAlignment, ColumnConstraint, Table, Width};

use rmerge_core::{FragmentAnalysis, MergeResult, ScanCandidate, ScanReportEntry, ScenarioKind};

use super::color::terminal_width;
use super::format::{display_relative, truncate_str};
use super::style::Style;

fn plain_table() -> Table {
    let mut table = Table::new();
    table.load_preset(NOTHING);
    table
}

/// Widest a path column may get before truncation.
fn path_budget(other_columns: usize) -> usize {
    terminal_width().saturating_sub(other_columns).max(24)
}

/// Render discovered candidates for `rmerge scan`.
///
/// # Example Output
///
/// ```text
/// PATH              CLASS      CONF   REASON
/// proj-golden       golden     1.00   name-matches-golden-pattern,git-remote-found
/// fragment-alpha    fragment   0.50   name-matches-fragment-pattern,missing-git-directory
/// ```
pub fn render_candidates_table(style: &Style, candidates: &[ScanCandidate], base: &Path) -> String {
    if candidates.is_empty() {
        return String::new();
    }

    let mut table = plain_table();
    table.set_header(vec![
        Cell::new("PATH"),
        Cell::new("CLASS"),
        Cell::new("CONF").set_alignment(CellAlignment::Right),
        Cell::new("REASON"),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(12)),
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),
        ColumnConstraint::LowerBoundary(Width::Fixed(5)),
    ]);

    let budget = path_budget(60);
    for candidate in candidates {
        table.add_row(vec![
            Cell::new(truncate_str(&display_relative(&candidate.path, base), budget)),
            Cell::new(candidate.classification.to_string()),
            Cell::new(style.confidence(candidate.confidence)).set_alignment(CellAlignment::Right),
            Cell::new(&candidate.reason),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render the scan report of one workspace.
///
/// # Example Output
///
/// ```text
/// SOURCE            ACTION             FRAGMENT
/// proj-golden       workspace-golden   -
/// fragment-alpha    ingested           001-fragment-alpha-1a2b3c4d
/// ```
pub fn render_scan_report_table(style: &Style, entries: &[ScanReportEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }

    let mut table = plain_table();
    table.set_header(vec![
        Cell::new("SOURCE"),
        Cell::new("ACTION"),
        Cell::new("FRAGMENT"),
    ]);

    let budget = path_budget(50);
    for entry in entries {
        let source = Path::new(&entry.source)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.source.clone());
        table.add_row(vec![
            Cell::new(truncate_str(&source, budget)),
            Cell::new(style.status(&entry.action.to_string())),
            Cell::new(entry.fragment_id.as_deref().unwrap_or("-")),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render fragment analyses.
///
/// # Example Output
///
/// ```text
/// FRAGMENT                      STATUS     DIFF
/// 001-fragment-alpha-1a2b3c4d   non-git    added:1 (file.txt)
/// 002-fragment-beta-5e6f7a8b    in-sync    -
/// ```
pub fn render_analysis_table(style: &Style, analyses: &[FragmentAnalysis]) -> String {
    if analyses.is_empty() {
        return String::new();
    }

    let mut table = plain_table();
    table.set_header(vec![
        Cell::new("FRAGMENT"),
        Cell::new("STATUS"),
        Cell::new("DIFF"),
        Cell::new("HANDLERS"),
    ]);
    table.set_constraints(vec![
        ColumnConstraint::LowerBoundary(Width::Fixed(12)),
        ColumnConstraint::LowerBoundary(Width::Fixed(8)),
    ]);

    let budget = path_budget(50);
    for analysis in analyses {
        table.add_row(vec![
            Cell::new(&analysis.fragment_id),
            Cell::new(style.status(analysis.status.as_str())),
            Cell::new(truncate_str(
                analysis.diff_summary.as_deref().unwrap_or("-"),
                budget,
            )),
            Cell::new(if analysis.handlers.is_empty() {
                "-".to_string()
            } else {
                analysis.handlers.join(", ")
            }),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render merge results.
pub fn render_merge_table(style: &Style, merges: &[MergeResult]) -> String {
    if merges.is_empty() {
        return String::new();
    }

    let mut table = plain_table();
    table.set_header(vec![
        Cell::new("FRAGMENT"),
        Cell::new("STATUS"),
        Cell::new("WORKTREE"),
    ]);

    let budget = path_budget(45);
    for merge in merges {
        table.add_row(vec![
            Cell::new(&merge.fragment_id),
            Cell::new(style.status(merge.status.as_str())),
            Cell::new(truncate_str(&merge.worktree, budget)),
        ]);
    }

    table.trim_fmt().to_string()
}

/// Render the static scenario catalogue for `rmerge scenarios`.
pub fn render_scenario_table() -> String {
    let mut table = plain_table();
    table.set_header(vec![
        Cell::new("KIND"),
        Cell::new("HANDLER"),
        Cell::new("STRATEGY"),
        Cell::new("DESCRIPTION"),
    ]);

    for kind in ScenarioKind::ALL {
        table.add_row(vec![
            Cell::new(kind.as_str()),
            Cell::new(kind.handler_id()),
            Cell::new(kind.strategy().as_str()),
            Cell::new(kind.description()),
        ]);
    }

    table.trim_fmt().to_string()
}
