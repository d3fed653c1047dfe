//! Merge application: overlay each fragment onto a fresh checkout of golden.
//!
//! "Merge" here means copying a fragment's files over a detached worktree of
//! the golden mirror and reporting `git status --short`. There is no content
//! merge and no conflict detection; each fragment gets its own checkout.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::MergerError;
use crate::fragments::FragmentRecord;
use crate::fsutil::overlay_files;
use crate::git::{has_git_entry, run_git, status_short};
use crate::inspect::resolve_repo_path;
use crate::workspace::Workspace;

/// Outcome of applying one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeStatus {
    /// No resolvable repository; nothing was checked out.
    Skipped,
    /// Dry run; nothing was checked out.
    DryRun,
    /// The overlay changed the checkout.
    Applied,
    /// The overlay left the checkout unchanged.
    Clean,
}

impl MergeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::DryRun => "dry-run",
            Self::Applied => "applied",
            Self::Clean => "clean",
        }
    }
}

impl std::fmt::Display for MergeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeResult {
    pub fragment_id: String,
    /// Checkout path, or `n/a` when skipped.
    pub worktree: String,
    pub status: MergeStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct MergeReportFile {
    pub(crate) merges: Vec<MergeResult>,
}

/// Records to process given an optional resume marker.
///
/// Everything before the first record whose id equals the marker is
/// dropped. An unknown marker yields nothing.
pub fn resume_slice<'a>(
    records: &'a [FragmentRecord],
    resume_from: Option<&str>,
) -> &'a [FragmentRecord] {
    match resume_from {
        None => records,
        Some(marker) => match records.iter().position(|r| r.fragment_id == marker) {
            Some(start) => &records[start..],
            None => &[],
        },
    }
}

/// Apply every (resumed) record onto its own checkout of golden.
///
/// Unless `dry_run`, `merge_report.json` is written with the processed
/// records.
///
/// # Errors
///
/// [`MergerError::GoldenNotVersioned`] if golden has no `.git`; any failing
/// git command aborts the run.
pub fn merge_fragments(
    records: &[FragmentRecord],
    workspace: &Workspace,
    dry_run: bool,
    resume_from: Option<&str>,
) -> Result<Vec<MergeResult>, MergerError> {
    let selected = resume_slice(records, resume_from);
    if let Some(marker) = resume_from {
        let skipped = records.len() - selected.len();
        if selected.is_empty() {
            tracing::warn!("Resume marker {} not found; nothing to merge", marker);
        } else if skipped > 0 {
            tracing::info!("Resuming at {} (skipped {} fragment(s))", marker, skipped);
        }
    }

    let worktrees = workspace.worktrees_dir();
    let mut results = Vec::with_capacity(selected.len());
    for record in selected {
        results.push(merge_one(record, workspace.golden(), &worktrees, dry_run)?);
    }

    if dry_run {
        tracing::info!("Dry run: merge report not written.");
    } else {
        write_merge_report(&workspace.merge_report_path(), &results)?;
    }
    Ok(results)
}

fn merge_one(
    record: &FragmentRecord,
    golden: &Path,
    worktrees: &Path,
    dry_run: bool,
) -> Result<MergeResult, MergerError> {
    let Some(source) = resolve_repo_path(record) else {
        return Ok(MergeResult {
            fragment_id: record.fragment_id.clone(),
            worktree: "n/a".to_string(),
            status: MergeStatus::Skipped,
            message: "Fragment has no git metadata or recovered repo.".to_string(),
        });
    };

    let checkout = worktrees.join(&record.fragment_id);
    if dry_run {
        tracing::info!(
            "Dry run: would create worktree {} for fragment {}",
            checkout.display(),
            record.fragment_id
        );
        return Ok(MergeResult {
            fragment_id: record.fragment_id.clone(),
            worktree: checkout.display().to_string(),
            status: MergeStatus::DryRun,
            message: String::new(),
        });
    }

    prepare_checkout(golden, &checkout)?;
    let written = overlay_files(&source, &checkout)?;
    tracing::debug!(
        "Overlaid {} file(s) from {} onto {}",
        written,
        source.display(),
        checkout.display()
    );

    let status = status_short(&checkout)?;
    let changed = !status.trim().is_empty();
    Ok(MergeResult {
        fragment_id: record.fragment_id.clone(),
        worktree: checkout.display().to_string(),
        status: if changed {
            MergeStatus::Applied
        } else {
            MergeStatus::Clean
        },
        message: if changed {
            status.trim().to_string()
        } else {
            "No changes detected.".to_string()
        },
    })
}

/// Discard any previous checkout at `checkout` and add a fresh detached one.
fn prepare_checkout(golden: &Path, checkout: &Path) -> Result<(), MergerError> {
    if !has_git_entry(golden) {
        return Err(MergerError::GoldenNotVersioned(golden.to_path_buf()));
    }
    if checkout.exists() {
        fs::remove_dir_all(checkout)?;
    }
    if let Some(parent) = checkout.parent() {
        fs::create_dir_all(parent)?;
    }
    run_git(golden, &["worktree", "prune"])?;
    let checkout_arg = checkout.to_string_lossy();
    run_git(
        golden,
        &["worktree", "add", "--detach", "-f", &checkout_arg, "HEAD"],
    )?;
    Ok(())
}

fn write_merge_report(path: &Path, results: &[MergeResult]) -> Result<(), MergerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = MergeReportFile {
        merges: results.to_vec(),
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    tracing::info!("Wrote merge report to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragments::{ingest_fragments, SourceKind};
    use crate::git::{git_available, run_git_with_env};
    use crate::workspace::{mirror_golden, prepare_workspace};
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn record(id: &str) -> FragmentRecord {
        FragmentRecord {
            fragment_id: id.to_string(),
            source: PathBuf::from("/src").join(id),
            destination: PathBuf::from("/nonexistent/fragments").join(id),
            kind: SourceKind::Directory,
            timestamp: String::new(),
            has_history: false,
            recovered_repo: None,
            copied: false,
        }
    }

    fn ids(results: &[MergeResult]) -> Vec<&str> {
        results.iter().map(|r| r.fragment_id.as_str()).collect()
    }

    #[test]
    fn test_resume_slice() {
        let records = vec![record("A"), record("B"), record("C")];
        let all: Vec<_> = resume_slice(&records, None).iter().map(|r| &r.fragment_id).collect();
        assert_eq!(all, ["A", "B", "C"]);
        let from_b: Vec<_> = resume_slice(&records, Some("B"))
            .iter()
            .map(|r| &r.fragment_id)
            .collect();
        assert_eq!(from_b, ["B", "C"]);
        assert!(resume_slice(&records, Some("Z")).is_empty());
    }

    #[test]
    fn test_resume_emits_marker_and_later_records_only() {
        let temp = TempDir::new().unwrap();
        let ws = prepare_workspace(&temp.path().join("workspace"), "demo", false, false).unwrap();
        let records = vec![record("A"), record("B"), record("C")];

        let results = merge_fragments(&records, &ws, false, Some("B")).unwrap();
        assert_eq!(ids(&results), ["B", "C"]);
        assert!(results.iter().all(|r| r.status == MergeStatus::Skipped));
        assert!(results.iter().all(|r| r.worktree == "n/a"));

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(ws.merge_report_path()).unwrap()).unwrap();
        assert_eq!(raw["merges"].as_array().unwrap().len(), 2);
        assert_eq!(raw["merges"][0]["status"], "skipped");
    }

    #[test]
    fn test_dry_run_makes_no_checkout() {
        let temp = TempDir::new().unwrap();
        let ws = prepare_workspace(&temp.path().join("workspace"), "demo", false, false).unwrap();
        let dest = temp.path().join("frag");
        fs::create_dir_all(dest.join(".git")).unwrap();
        let mut rec = record("001-frag-00000000");
        rec.destination = dest;

        let results = merge_fragments(&[rec], &ws, true, None).unwrap();
        assert_eq!(results[0].status, MergeStatus::DryRun);
        assert!(results[0].worktree.ends_with("worktrees/001-frag-00000000"));
        assert!(!ws.worktrees_dir().exists());
        assert!(!ws.merge_report_path().exists());
    }

    #[test]
    fn test_unversioned_golden_is_rejected() {
        let temp = TempDir::new().unwrap();
        let ws = prepare_workspace(&temp.path().join("workspace"), "demo", false, false).unwrap();
        let dest = temp.path().join("frag");
        fs::create_dir_all(dest.join(".git")).unwrap();
        let mut rec = record("001-frag-00000000");
        rec.destination = dest;

        let err = merge_fragments(&[rec], &ws, false, None).unwrap_err();
        assert!(matches!(err, MergerError::GoldenNotVersioned(_)));
    }

    #[test]
    fn test_overlay_applied_and_clean() {
        if !git_available() {
            eprintln!("skipping: git not available");
            return;
        }
        let identity = [
            ("GIT_AUTHOR_NAME", "Test"),
            ("GIT_AUTHOR_EMAIL", "test@example.com"),
            ("GIT_COMMITTER_NAME", "Test"),
            ("GIT_COMMITTER_EMAIL", "test@example.com"),
        ];
        let temp = TempDir::new().unwrap();
        let golden = temp.path().join("proj-golden");
        fs::create_dir_all(&golden).unwrap();
        run_git(&golden, &["init", "-q"]).unwrap();
        fs::write(golden.join("app.txt"), "v1").unwrap();
        run_git(&golden, &["add", "-A"]).unwrap();
        run_git_with_env(
            &golden,
            &["-c", "commit.gpgsign=false", "commit", "-q", "-m", "init"],
            &identity,
        )
        .unwrap();

        let ws = prepare_workspace(&temp.path().join("workspace"), "demo", false, false).unwrap();
        mirror_golden(&golden, ws.golden(), false, false).unwrap();

        let same = temp.path().join("fragment-same");
        crate::git::clone_repo(&golden, &same).unwrap();
        let changed = temp.path().join("fragment-changed");
        crate::git::clone_repo(&golden, &changed).unwrap();
        fs::write(changed.join("app.txt"), "v2").unwrap();
        fs::write(changed.join("new.txt"), "n").unwrap();

        let records = ingest_fragments(&[same, changed], &ws, false).unwrap();
        let results = merge_fragments(&records, &ws, false, None).unwrap();

        assert_eq!(results[0].status, MergeStatus::Clean);
        assert_eq!(results[0].message, "No changes detected.");
        assert_eq!(results[1].status, MergeStatus::Applied);
        assert!(results[1].message.contains("app.txt"));
        assert!(results[1].message.contains("new.txt"));
        assert_eq!(
            fs::read_to_string(ws.worktrees_dir().join(&records[1].fragment_id).join("app.txt"))
                .unwrap(),
            "v2"
        );

        // A second run discards and recreates the checkouts.
        let again = merge_fragments(&records, &ws, false, None).unwrap();
        assert_eq!(again[0].status, MergeStatus::Clean);
        assert_eq!(again[1].status, MergeStatus::Applied);
    }
}
