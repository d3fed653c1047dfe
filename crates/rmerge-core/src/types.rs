//! Common types used throughout rmerge.
//!
//! This module contains the option structs accepted by
//! [`MergerEngine::run`](crate::engine::MergerEngine::run) and the result
//! types it returns.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fragments::FragmentRecord;
use crate::inspect::FragmentAnalysis;
use crate::ledger::ScanReportEntry;
use crate::merge::MergeResult;
use crate::recovery::RecoveryResult;
use crate::scenarios::UnhandledScenario;
use crate::workspace::GoldenStatus;

// ============================================================================
// RunMode
// ============================================================================

/// What a run does after inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Ingest and inspect only.
    #[default]
    Analyze,
    /// Also overlay every fragment onto a checkout of golden.
    Merge,
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Analyze => write!(f, "analyze"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "analyze" => Ok(Self::Analyze),
            "merge" => Ok(Self::Merge),
            _ => Err(format!(
                "Invalid run mode '{}'. Expected: analyze or merge",
                s
            )),
        }
    }
}

// ============================================================================
// Command Options
// ============================================================================

/// Discovery settings for a scanning run.
///
/// Patterns left as `None` fall back to the configuration.
#[derive(Debug, Default, Clone)]
pub struct ScanOptions {
    /// Directory holding golden and fragment candidates.
    pub source: PathBuf,
    /// Create `source` when it does not exist.
    pub create_structure: bool,
    pub golden_pattern: Option<String>,
    pub fragment_pattern: Option<String>,
}

/// Options for a reconciliation run.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    /// Parent of all per-golden workspaces.
    pub workspace_root: PathBuf,
    /// Explicit golden. Required unless `scan` is set.
    pub golden: Option<PathBuf>,
    /// Explicit fragment sources, ingested before scanned ones.
    pub fragments: Vec<PathBuf>,
    /// Explicit workspace identifier.
    pub identifier: Option<String>,
    pub mode: RunMode,
    /// Compute everything, mutate nothing.
    pub dry_run: bool,
    /// Replace existing workspace directories and golden mirror.
    pub force: bool,
    /// Synthesize history for fragments without it.
    pub recover_missing: bool,
    /// Fragment id to resume merging from.
    pub resume_from: Option<String>,
    pub scan: Option<ScanOptions>,
}

// ============================================================================
// Results
// ============================================================================

/// Everything one workspace produced during a run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceOutcome {
    pub identifier: String,
    pub root: PathBuf,
    pub golden: PathBuf,
    pub golden_status: GoldenStatus,
    pub fragments: Vec<FragmentRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub recoveries: Vec<RecoveryResult>,
    pub analyses: Vec<FragmentAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merges: Option<Vec<MergeResult>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scan_entries: Vec<ScanReportEntry>,
    /// Scan candidates queued for ingestion in this workspace.
    #[serde(skip)]
    pub pending_fragments: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<UnhandledScenario>,
}

/// Counters across every workspace of a scanning run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub goldens: usize,
    pub pending_fragments: usize,
    pub fragments_ingested: usize,
    pub goldens_installed: usize,
    pub goldens_existing: usize,
    pub goldens_replaced: usize,
}

impl ScanStats {
    /// Fold one workspace into the counters.
    pub fn record(&mut self, outcome: &WorkspaceOutcome) {
        self.goldens += 1;
        self.pending_fragments += outcome.pending_fragments;
        self.fragments_ingested += outcome.fragments.len();
        match outcome.golden_status {
            GoldenStatus::Installed => self.goldens_installed += 1,
            GoldenStatus::Existing => self.goldens_existing += 1,
            GoldenStatus::Replaced => self.goldens_replaced += 1,
            GoldenStatus::DryRun => {}
        }
    }
}

/// Result of [`MergerEngine::run`](crate::engine::MergerEngine::run).
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub mode: RunMode,
    pub dry_run: bool,
    pub workspaces: Vec<WorkspaceOutcome>,
    /// Present for scanning runs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan: Option<ScanStats>,
}

impl RunSummary {
    /// Scenarios flagged in any workspace.
    pub fn scenarios(&self) -> impl Iterator<Item = &UnhandledScenario> {
        self.workspaces.iter().flat_map(|w| w.scenarios.iter())
    }
}
