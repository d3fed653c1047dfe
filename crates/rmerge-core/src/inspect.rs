//! Fragment inspection: content diff against golden plus git metadata.
//!
//! Status derivation:
//!
//! | destination | repo path | diff  | status     |
//! |-------------|-----------|-------|------------|
//! | missing     | -         | -     | `missing`  |
//! | present     | yes       | clean | `in-sync`  |
//! | present     | yes       | dirty | `diverged` |
//! | present     | no        | clean | `matched`  |
//! | present     | no        | dirty | `non-git`  |

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::GIT_DIR;
use crate::digest::{build_manifest, diff_manifests, write_manifest, FileManifestEntry};
use crate::errors::MergerError;
use crate::fragments::FragmentRecord;
use crate::git::{status_short, try_git};
use crate::scenarios::{context, ScenarioKind, ScenarioRegistry};
use crate::workspace::Workspace;

/// Derived state of one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisStatus {
    Missing,
    InSync,
    Diverged,
    Matched,
    NonGit,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::InSync => "in-sync",
            Self::Diverged => "diverged",
            Self::Matched => "matched",
            Self::NonGit => "non-git",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Git metadata of a fragment's resolvable repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitInfo {
    pub head: Option<String>,
    pub branch: Option<String>,
    pub is_dirty: bool,
    /// Raw `git status --short` output.
    pub status: String,
}

/// Inspection outcome for one fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentAnalysis {
    pub fragment_id: String,
    pub status: AnalysisStatus,
    pub diff_summary: Option<String>,
    pub git: Option<GitInfo>,
    pub manifest_path: Option<PathBuf>,
    /// Handler ids of scenarios flagged while inspecting.
    #[serde(default)]
    pub handlers: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct AnalysisFile {
    pub(crate) fragments: Vec<FragmentAnalysis>,
}

/// The repository that stands for a fragment's history, if any.
///
/// A recovered repository wins when it still exists; otherwise the
/// destination itself when it carries `.git`.
pub fn resolve_repo_path(record: &FragmentRecord) -> Option<PathBuf> {
    if let Some(recovered) = &record.recovered_repo {
        if recovered.exists() {
            return Some(recovered.clone());
        }
    }
    if record.destination.join(GIT_DIR).exists() {
        return Some(record.destination.clone());
    }
    None
}

/// Read head, branch and status of `repo`.
///
/// Head and branch lookups may fail; the status query may not.
pub fn gather_git_info(repo: &Path) -> Result<GitInfo, MergerError> {
    let head = try_git(repo, &["rev-parse", "HEAD"])?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let branch = try_git(repo, &["rev-parse", "--abbrev-ref", "HEAD"])?
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());
    let status = status_short(repo)?;
    Ok(GitInfo {
        head,
        branch,
        is_dirty: !status.trim().is_empty(),
        status,
    })
}

/// Inspect every record against the workspace golden.
///
/// Returns one analysis per record in input order and, unless `dry_run`,
/// writes `analysis.json`.
pub fn inspect_fragments(
    records: &[FragmentRecord],
    workspace: &Workspace,
    dry_run: bool,
    registry: &mut ScenarioRegistry,
) -> Result<Vec<FragmentAnalysis>, MergerError> {
    let golden_manifest = build_manifest(workspace.golden())?;
    let mut analyses = Vec::with_capacity(records.len());
    for record in records {
        analyses.push(inspect_one(
            record,
            workspace,
            &golden_manifest,
            dry_run,
            registry,
        )?);
    }

    if dry_run {
        tracing::info!("Dry run: analysis file not written.");
    } else {
        write_analysis(&workspace.analysis_path(), &analyses)?;
    }
    Ok(analyses)
}

fn inspect_one(
    record: &FragmentRecord,
    workspace: &Workspace,
    golden_manifest: &[FileManifestEntry],
    dry_run: bool,
    registry: &mut ScenarioRegistry,
) -> Result<FragmentAnalysis, MergerError> {
    let fragment = &record.destination;
    let mut handlers = Vec::new();

    if !fragment.exists() {
        tracing::warn!(
            "Fragment {} is missing at {}",
            record.fragment_id,
            fragment.display()
        );
        handlers.push(
            registry
                .flag(
                    ScenarioKind::MissingFragment,
                    ScenarioKind::MissingFragment.description(),
                    context([
                        ("fragment_id", record.fragment_id.clone()),
                        ("path", fragment.display().to_string()),
                    ]),
                )
                .to_string(),
        );
        return Ok(FragmentAnalysis {
            fragment_id: record.fragment_id.clone(),
            status: AnalysisStatus::Missing,
            diff_summary: None,
            git: None,
            manifest_path: None,
            handlers,
        });
    }

    let fragment_manifest = build_manifest(fragment)?;
    let diff = diff_manifests(golden_manifest, &fragment_manifest);
    let mut git = None;
    let mut manifest_path = None;

    let status = match resolve_repo_path(record) {
        Some(repo) => {
            match gather_git_info(&repo) {
                Ok(info) => git = Some(info),
                Err(e @ MergerError::GitCommand { .. }) => {
                    handlers.push(
                        registry
                            .flag(
                                ScenarioKind::GitInspectionError,
                                ScenarioKind::GitInspectionError.description(),
                                context([
                                    ("fragment_id", record.fragment_id.clone()),
                                    ("error", e.to_string()),
                                ]),
                            )
                            .to_string(),
                    );
                }
                Err(e) => return Err(e),
            }
            if diff.is_clean() {
                AnalysisStatus::InSync
            } else {
                AnalysisStatus::Diverged
            }
        }
        None => {
            if record.has_history {
                handlers.push(
                    registry
                        .flag(
                            ScenarioKind::GitMetadataMissing,
                            ScenarioKind::GitMetadataMissing.description(),
                            context([
                                ("fragment_id", record.fragment_id.clone()),
                                ("path", fragment.display().to_string()),
                            ]),
                        )
                        .to_string(),
                );
            }
            if diff.is_clean() {
                AnalysisStatus::Matched
            } else {
                let path = workspace.manifest_path(&record.fragment_id);
                if dry_run {
                    tracing::info!(
                        "Dry run: would write manifest for fragment {} to {}",
                        record.fragment_id,
                        path.display()
                    );
                } else {
                    write_manifest(&path, &fragment_manifest)?;
                    manifest_path = Some(path);
                }
                AnalysisStatus::NonGit
            }
        }
    };

    tracing::debug!("Fragment {} -> {}", record.fragment_id, status);
    Ok(FragmentAnalysis {
        fragment_id: record.fragment_id.clone(),
        status,
        diff_summary: diff.summary(),
        git,
        manifest_path,
        handlers,
    })
}

fn write_analysis(path: &Path, analyses: &[FragmentAnalysis]) -> Result<(), MergerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = AnalysisFile {
        fragments: analyses.to_vec(),
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)?;
    tracing::info!("Wrote analysis report to {}", path.display());
    Ok(())
}
