//! Common constants used throughout rmerge-core.
//!
//! This module centralizes workspace layout names, artifact filenames, and
//! calibration constants so every stage agrees on where things live.

// ============================================================================
// Version-Control Metadata
// ============================================================================

/// The standard git metadata directory name.
pub const GIT_DIR: &str = ".git";

/// Version-control metadata directories that are never descended into while
/// scanning and never included in content manifests.
pub const VCS_METADATA_DIRS: &[&str] = &[".git", ".hg", ".svn"];

/// Check if a path component names version-control metadata.
#[inline]
pub fn is_vcs_metadata(name: &str) -> bool {
    VCS_METADATA_DIRS.contains(&name)
}

// ============================================================================
// Workspace Layout
// ============================================================================

/// Mirror of the authoritative tree.
pub const GOLDEN_DIR: &str = "golden";

/// Ingested fragment copies, one directory per fragment id.
pub const FRAGMENTS_DIR: &str = "fragments";

/// Synthesized history for fragments that had none.
pub const RECOVERED_DIR: &str = "recovered";

/// Ephemeral merge checkouts.
pub const WORKTREES_DIR: &str = "worktrees";

/// Per-fragment content manifests.
pub const MANIFESTS_DIR: &str = "manifests";

// ============================================================================
// Artifact Filenames
// ============================================================================

/// Ledger of previously ingested scan candidates.
pub const SCAN_MANIFEST_FILENAME: &str = "scan_manifest.json";

/// Per-run report of scan decisions.
pub const SCAN_REPORT_FILENAME: &str = "scan_report.json";

/// All fragment records of the latest ingestion.
pub const FRAGMENTS_MANIFEST_FILENAME: &str = "fragments_manifest.json";

/// Inspection results.
pub const ANALYSIS_FILENAME: &str = "analysis.json";

/// Merge-application results.
pub const MERGE_REPORT_FILENAME: &str = "merge_report.json";

/// Flagged scenarios that asked to be persisted.
pub const SCENARIOS_FILENAME: &str = "scenarios.json";

/// Human-readable report.
pub const REPORT_FILENAME: &str = "report.md";

// ============================================================================
// Configuration
// ============================================================================

/// The name of the global configuration directory (`~/.rmerge/`).
pub const RMERGE_HOME_DIR: &str = ".rmerge";

/// The name of the global configuration file.
pub const GLOBAL_CONFIG_FILENAME: &str = "config.yaml";

/// Default glob for golden directory names.
pub const DEFAULT_GOLDEN_PATTERN: &str = "*golden*";

/// Default glob for fragment directory names.
pub const DEFAULT_FRAGMENT_PATTERN: &str = "fragment*";

// ============================================================================
// Recovery Identity
// ============================================================================

/// Author/committer name for synthesized history.
pub const RECOVERY_AUTHOR_NAME: &str = "repo-merger";

/// Author/committer email for synthesized history.
pub const RECOVERY_AUTHOR_EMAIL: &str = "repo-merger@example.com";

/// Commit message for synthesized history.
pub const RECOVERY_COMMIT_MESSAGE: &str = "Recovered snapshot";

// ============================================================================
// Calibration
// ============================================================================

/// Score gap that maps to full classification confidence.
pub const CONFIDENCE_DIVISOR: f64 = 4.0;

/// Example paths listed per category in a diff summary.
pub const DIFF_SUMMARY_EXAMPLES: usize = 3;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_vcs_metadata() {
        assert!(is_vcs_metadata(".git"));
        assert!(is_vcs_metadata(".hg"));
        assert!(is_vcs_metadata(".svn"));
        assert!(!is_vcs_metadata("src"));
        assert!(!is_vcs_metadata(".github"));
    }
}
