//! History recovery for fragments ingested without version control.
//!
//! A recovered repository is a copy of the fragment's content under
//! `<workspace>/recovered/<fragment_id>/` with a single commit made under a
//! fixed identity, so the same content always recovers the same way
//! regardless of the caller's git configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    GIT_DIR, RECOVERY_AUTHOR_EMAIL, RECOVERY_AUTHOR_NAME, RECOVERY_COMMIT_MESSAGE,
};
use crate::errors::MergerError;
use crate::fragments::{FragmentRecord, SourceKind};
use crate::fsutil::copy_tree_without_vcs;
use crate::git::{run_git, run_git_with_env};
use crate::workspace::Workspace;

/// Outcome of recovering one fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecoveryStatus {
    Recovered,
    DryRun,
}

impl std::fmt::Display for RecoveryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Recovered => write!(f, "recovered"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryResult {
    pub fragment_id: String,
    pub recovered_path: PathBuf,
    pub status: RecoveryStatus,
    pub message: String,
}

/// Synthesize history for every record whose destination is a directory
/// without `.git`.
///
/// Files, version-controlled destinations and destinations that have vanished
/// since ingestion are left alone. On success the
/// record's `recovered_repo` is set. Under `dry_run` nothing is copied and
/// records are not touched.
///
/// # Errors
///
/// Any failing git command aborts with [`MergerError::GitCommand`].
pub fn recover_fragments(
    records: &mut [FragmentRecord],
    workspace: &Workspace,
    dry_run: bool,
) -> Result<Vec<RecoveryResult>, MergerError> {
    let recovered_root = workspace.recovered_dir();
    let mut results = Vec::new();

    for record in records.iter_mut() {
        let fragment = record.destination.clone();
        let target = recovered_root.join(&record.fragment_id);
        // Destinations are not materialized under dry run, go by the ingested kind.
        if dry_run {
            if record.kind != SourceKind::Directory {
                continue;
            }
            tracing::info!(
                "Dry run: would recover fragment {} into {}",
                fragment.display(),
                target.display()
            );
            results.push(RecoveryResult {
                fragment_id: record.fragment_id.clone(),
                recovered_path: target,
                status: RecoveryStatus::DryRun,
                message: String::new(),
            });
            continue;
        }

        if !fragment.is_dir() {
            if !fragment.exists() {
                tracing::warn!(
                    "Fragment {} no longer exists at {}, skipping recovery",
                    record.fragment_id,
                    fragment.display()
                );
            } else {
                tracing::debug!("Skipping recovery for file fragment {}", record.fragment_id);
            }
            continue;
        }
        if fragment.join(GIT_DIR).exists() {
            continue;
        }

        recover_one(&fragment, &target)?;
        record.recovered_repo = Some(target.clone());
        tracing::info!("Recovered fragment {} into {}", record.fragment_id, target.display());
        results.push(RecoveryResult {
            fragment_id: record.fragment_id.clone(),
            recovered_path: target,
            status: RecoveryStatus::Recovered,
            message: RECOVERY_COMMIT_MESSAGE.to_string(),
        });
    }
    Ok(results)
}

fn recover_one(fragment: &Path, target: &Path) -> Result<(), MergerError> {
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    fs::create_dir_all(target)?;
    copy_tree_without_vcs(fragment, target)?;
    init_history(target)
}

fn init_history(repo: &Path) -> Result<(), MergerError> {
    run_git(repo, &["init", "--quiet"])?;
    run_git(repo, &["add", "-A"])?;
    let identity = [
        ("GIT_AUTHOR_NAME", RECOVERY_AUTHOR_NAME),
        ("GIT_AUTHOR_EMAIL", RECOVERY_AUTHOR_EMAIL),
        ("GIT_COMMITTER_NAME", RECOVERY_AUTHOR_NAME),
        ("GIT_COMMITTER_EMAIL", RECOVERY_AUTHOR_EMAIL),
    ];
    run_git_with_env(
        repo,
        &[
            "-c",
            "commit.gpgsign=false",
            "commit",
            "--quiet",
            "--allow-empty",
            "-m",
            RECOVERY_COMMIT_MESSAGE,
        ],
        &identity,
    )?;
    Ok(())
}
