//! Plain-text and Markdown rendering of analysis and merge results.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::errors::MergerError;
use crate::inspect::{AnalysisFile, FragmentAnalysis};
use crate::merge::{MergeReportFile, MergeResult};

/// Terminal summary of a run.
pub fn summarize(analyses: &[FragmentAnalysis], merges: Option<&[MergeResult]>) -> String {
    let mut out = String::new();
    out.push_str("Fragment Analysis Summary\n");
    out.push_str("========================\n");
    for analysis in analyses {
        let _ = write!(out, "- {}: {}", analysis.fragment_id, analysis.status);
        if let Some(diff) = &analysis.diff_summary {
            let _ = write!(out, " ({})", diff);
        }
        if !analysis.handlers.is_empty() {
            let _ = write!(out, " [handlers: {}]", analysis.handlers.join(", "));
        }
        out.push('\n');
    }

    if let Some(merges) = merges.filter(|m| !m.is_empty()) {
        out.push_str("\nMerge Results\n");
        out.push_str("=============\n");
        for result in merges {
            let _ = writeln!(
                out,
                "- {}: {} ({})",
                result.fragment_id, result.status, result.message
            );
        }
    }
    out.trim_end().to_string()
}

/// Render the Markdown report.
pub fn render_markdown(analyses: &[FragmentAnalysis], merges: Option<&[MergeResult]>) -> String {
    let mut lines: Vec<String> = vec!["# Repo Merger Report".into(), String::new()];

    lines.push("## Fragment Status".into());
    lines.push(String::new());
    for analysis in analyses {
        lines.push(format!("- **{}**: {}", analysis.fragment_id, analysis.status));
        if let Some(git) = &analysis.git {
            lines.push(format!(
                "  - HEAD: `{}` | Branch: `{}` | Dirty: {}",
                git.head.as_deref().unwrap_or("none"),
                git.branch.as_deref().unwrap_or("none"),
                git.is_dirty
            ));
        }
        if let Some(diff) = &analysis.diff_summary {
            lines.push(format!("  - Diff: {}", diff));
        }
        if let Some(manifest) = &analysis.manifest_path {
            lines.push(format!("  - Manifest: `{}`", manifest.display()));
        }
        if !analysis.handlers.is_empty() {
            let handlers: Vec<String> = analysis.handlers.iter().map(|h| format!("`{}`", h)).collect();
            lines.push(format!("  - Handlers: {}", handlers.join(", ")));
        }
        lines.push(String::new());
    }

    if let Some(merges) = merges.filter(|m| !m.is_empty()) {
        lines.push("## Merge Results".into());
        lines.push(String::new());
        for result in merges {
            lines.push(format!("- **{}**: {}", result.fragment_id, result.status));
            lines.push(format!("  - Worktree: `{}`", result.worktree));
            if !result.message.is_empty() {
                lines.push(format!("  - Notes: {}", result.message));
            }
            lines.push(String::new());
        }
    }

    format!("{}\n", lines.join("\n").trim_end())
}

/// Write `report.md`.
pub fn write_markdown_report(
    path: &Path,
    analyses: &[FragmentAnalysis],
    merges: Option<&[MergeResult]>,
) -> Result<(), MergerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_markdown(analyses, merges))?;
    tracing::info!("Wrote report to {}", path.display());
    Ok(())
}

/// Read `analysis.json`. A missing file yields an empty list.
pub fn load_analysis(path: &Path) -> Result<Vec<FragmentAnalysis>, MergerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file: AnalysisFile = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(file.fragments)
}

/// Read `merge_report.json`. A missing file yields an empty list.
pub fn load_merge_report(path: &Path) -> Result<Vec<MergeResult>, MergerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file: MergeReportFile = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(file.merges)
}
