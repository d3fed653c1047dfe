//! Workspace layout and bootstrapping.
//!
//! This module provides the [`Workspace`] type, which owns every derived
//! artifact of a reconciliation run under `<root>/<identifier>/`, plus the
//! helpers that derive the identifier, create the directories, and mirror
//! the golden tree into place.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::{
    ANALYSIS_FILENAME, FRAGMENTS_DIR, FRAGMENTS_MANIFEST_FILENAME, GIT_DIR, GOLDEN_DIR,
    MANIFESTS_DIR, MERGE_REPORT_FILENAME, RECOVERED_DIR, REPORT_FILENAME, SCAN_MANIFEST_FILENAME,
    SCAN_REPORT_FILENAME, SCENARIOS_FILENAME, WORKTREES_DIR,
};
use crate::errors::MergerError;
use crate::fsutil::copy_tree;
use crate::git::{clone_repo, is_bare_repo};

// ============================================================================
// Workspace
// ============================================================================

/// A per-project reconciliation workspace.
///
/// Layout:
///
/// ```text
/// <root>/golden/                    mirror of the authoritative tree
/// <root>/fragments/<fragment_id>/   ingested copies
/// <root>/recovered/<fragment_id>/   synthesized history
/// <root>/worktrees/<fragment_id>/   ephemeral merge checkouts
/// <root>/manifests/<fragment_id>.json
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Workspace root (`<workspace_root>/<identifier>`).
    root: PathBuf,

    /// Mirror of the golden tree.
    golden: PathBuf,

    /// Parent of all ingested fragments.
    fragments: PathBuf,
}

impl Workspace {
    /// Describe the workspace rooted at `root` without touching disk.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            golden: root.join(GOLDEN_DIR),
            fragments: root.join(FRAGMENTS_DIR),
            root,
        }
    }

    /// Open an existing workspace directory.
    ///
    /// # Errors
    ///
    /// Returns [`MergerError::PathNotFound`] if `root` is not a directory.
    pub fn open(root: &Path) -> Result<Self, MergerError> {
        let root = root
            .canonicalize()
            .map_err(|_| MergerError::PathNotFound(root.display().to_string()))?;
        if !root.is_dir() {
            return Err(MergerError::PathNotFound(root.display().to_string()));
        }
        Ok(Self::at(root))
    }

    /// Get the workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the golden mirror directory.
    pub fn golden(&self) -> &Path {
        &self.golden
    }

    /// Get the directory holding ingested fragments.
    pub fn fragments(&self) -> &Path {
        &self.fragments
    }

    /// Destination of one ingested fragment.
    pub fn fragment_dir(&self, fragment_id: &str) -> PathBuf {
        self.fragments.join(fragment_id)
    }

    /// Parent of recovered repositories.
    pub fn recovered_dir(&self) -> PathBuf {
        self.root.join(RECOVERED_DIR)
    }

    /// Parent of ephemeral merge checkouts.
    pub fn worktrees_dir(&self) -> PathBuf {
        self.root.join(WORKTREES_DIR)
    }

    /// Parent of per-fragment content manifests.
    pub fn manifests_dir(&self) -> PathBuf {
        self.root.join(MANIFESTS_DIR)
    }

    /// Returns `<root>/manifests/<fragment_id>.json`.
    pub fn manifest_path(&self, fragment_id: &str) -> PathBuf {
        self.manifests_dir().join(format!("{}.json", fragment_id))
    }

    /// Returns `<root>/scan_manifest.json`.
    pub fn scan_manifest_path(&self) -> PathBuf {
        self.root.join(SCAN_MANIFEST_FILENAME)
    }

    /// Returns `<root>/scan_report.json`.
    pub fn scan_report_path(&self) -> PathBuf {
        self.root.join(SCAN_REPORT_FILENAME)
    }

    /// Returns `<root>/fragments_manifest.json`.
    pub fn fragments_manifest_path(&self) -> PathBuf {
        self.root.join(FRAGMENTS_MANIFEST_FILENAME)
    }

    /// Returns `<root>/analysis.json`.
    pub fn analysis_path(&self) -> PathBuf {
        self.root.join(ANALYSIS_FILENAME)
    }

    /// Returns `<root>/merge_report.json`.
    pub fn merge_report_path(&self) -> PathBuf {
        self.root.join(MERGE_REPORT_FILENAME)
    }

    /// Returns `<root>/scenarios.json`.
    pub fn scenarios_path(&self) -> PathBuf {
        self.root.join(SCENARIOS_FILENAME)
    }

    /// Returns `<root>/report.md`.
    pub fn report_path(&self) -> PathBuf {
        self.root.join(REPORT_FILENAME)
    }
}

// ============================================================================
// Identifier Derivation
// ============================================================================

fn sanitize_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("valid sanitize regex"))
}

/// Sanitize a workspace identifier.
///
/// Runs of characters outside `[A-Za-z0-9._-]` collapse to `-`, leading and
/// trailing dashes are trimmed, and an empty result becomes `workspace`.
pub fn sanitize_identifier(value: &str) -> String {
    let replaced = sanitize_regex().replace_all(value.trim(), "-");
    let trimmed = replaced.trim_matches('-');
    if trimmed.is_empty() {
        "workspace".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Derive the workspace identifier for a golden repository.
///
/// Precedence: explicit identifier, then the `origin` remote's
/// `owner-repo` slug, then the golden directory's name.
pub fn derive_identifier(golden: &Path, explicit: Option<&str>) -> String {
    if let Some(explicit) = explicit.filter(|s| !s.trim().is_empty()) {
        return sanitize_identifier(explicit);
    }

    if let Some(config) = resolve_git_config(golden) {
        if let Some(url) = origin_url(&crate::git::read_git_config(&config)) {
            return sanitize_identifier(&slug_from_remote(&url));
        }
    }

    let fallback = golden
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    sanitize_identifier(&fallback)
}

/// Locate the git config for a working tree, worktree pointer, or bare repo.
fn resolve_git_config(golden: &Path) -> Option<PathBuf> {
    let git_entry = golden.join(GIT_DIR);
    if git_entry.is_dir() {
        let config = git_entry.join("config");
        if config.is_file() {
            return Some(config);
        }
    }
    if git_entry.is_file() {
        let pointer = fs::read_to_string(&git_entry).ok()?;
        if let Some(gitdir) = pointer.trim().strip_prefix("gitdir:") {
            let config = golden.join(gitdir.trim()).join("config");
            if config.is_file() {
                return Some(config);
            }
        }
    }
    let bare_config = golden.join("config");
    if bare_config.is_file() {
        return Some(bare_config);
    }
    None
}

/// Extract `url` from the `[remote "origin"]` section of git config text.
fn origin_url(config_text: &str) -> Option<String> {
    let mut in_origin = false;
    for line in config_text.lines() {
        let line = line.trim();
        if line.starts_with('[') {
            in_origin = line == "[remote \"origin\"]";
            continue;
        }
        if !in_origin {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            if key.trim() == "url" && !value.trim().is_empty() {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

/// Turn a remote URL into an `owner-repo` slug.
fn slug_from_remote(url: &str) -> String {
    let cleaned = url.trim();
    let cleaned = cleaned.strip_suffix(".git").unwrap_or(cleaned);
    let cleaned = cleaned.replace(':', "/");
    let parts: Vec<&str> = cleaned.split('/').filter(|s| !s.is_empty()).collect();
    let Some(repo) = parts.last() else {
        return "workspace".to_string();
    };
    let owner = if parts.len() >= 2 {
        parts[parts.len() - 2].rsplit('@').next()
    } else {
        None
    };
    match owner {
        Some(owner) => format!("{}-{}", owner, repo),
        None => repo.to_string(),
    }
}

// ============================================================================
// Bootstrapping
// ============================================================================

fn ensure_directory_state(
    path: &Path,
    dry_run: bool,
    force: bool,
    describe: &str,
) -> Result<(), MergerError> {
    if path.exists() {
        if !path.is_dir() {
            return Err(MergerError::WorkspaceCollision {
                describe: describe.to_string(),
                path: path.to_path_buf(),
            });
        }
        if !force {
            tracing::debug!("Reusing existing {} at {}", describe, path.display());
            return Ok(());
        }
        if dry_run {
            tracing::info!("Dry run: would remove existing {} at {}", describe, path.display());
            return Ok(());
        }
        fs::remove_dir_all(path)?;
    }
    if dry_run {
        tracing::info!("Dry run: would create {} at {}", describe, path.display());
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Create `<workspace_root>/<identifier>/{golden,fragments}`.
///
/// Existing directories are reused unless `force` is set, in which case they
/// are removed and recreated. Under `dry_run` nothing is touched.
///
/// # Errors
///
/// Returns [`MergerError::WorkspaceCollision`] if one of the paths exists and
/// is not a directory.
pub fn prepare_workspace(
    workspace_root: &Path,
    identifier: &str,
    dry_run: bool,
    force: bool,
) -> Result<Workspace, MergerError> {
    if !workspace_root.exists() {
        if dry_run {
            tracing::info!("Dry run: would create directory {}", workspace_root.display());
        } else {
            fs::create_dir_all(workspace_root)?;
        }
    }

    let workspace = Workspace::at(workspace_root.join(identifier));
    ensure_directory_state(workspace.root(), dry_run, force, "workspace root")?;
    ensure_directory_state(workspace.golden(), dry_run, force, "golden directory")?;
    ensure_directory_state(workspace.fragments(), dry_run, force, "fragments directory")?;
    Ok(workspace)
}

/// What [`mirror_golden`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GoldenStatus {
    /// Golden was copied or cloned into an empty destination.
    Installed,
    /// A populated destination was kept.
    Existing,
    /// A populated destination was replaced.
    Replaced,
    /// Nothing was done.
    DryRun,
}

impl std::fmt::Display for GoldenStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Installed => write!(f, "installed"),
            Self::Existing => write!(f, "existing"),
            Self::Replaced => write!(f, "replaced"),
            Self::DryRun => write!(f, "dry-run"),
        }
    }
}

/// Mirror the golden repository into the workspace.
///
/// Bare repositories are cloned; anything else is copied recursively with
/// symlinks preserved. A populated destination is kept unless `replace`.
pub fn mirror_golden(
    source: &Path,
    destination: &Path,
    dry_run: bool,
    replace: bool,
) -> Result<GoldenStatus, MergerError> {
    if !source.exists() {
        return Err(MergerError::PathNotFound(format!(
            "Golden repository path does not exist: {}",
            source.display()
        )));
    }

    if dry_run {
        tracing::info!(
            "Dry run: would mirror {} -> {}",
            source.display(),
            destination.display()
        );
        return Ok(GoldenStatus::DryRun);
    }

    let mut status = GoldenStatus::Installed;
    if destination.exists() {
        if !destination.is_dir() {
            return Err(MergerError::WorkspaceCollision {
                describe: "golden destination".to_string(),
                path: destination.to_path_buf(),
            });
        }
        let populated = fs::read_dir(destination)?.next().is_some();
        if populated {
            if !replace {
                tracing::info!(
                    "Golden destination already populated at {}; skipping mirror.",
                    destination.display()
                );
                return Ok(GoldenStatus::Existing);
            }
            status = GoldenStatus::Replaced;
        }
        fs::remove_dir_all(destination)?;
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    if is_bare_repo(source) {
        tracing::info!("Cloning bare repository from {}", source.display());
        clone_repo(source, destination)?;
    } else {
        tracing::info!("Copying golden repository into {}", destination.display());
        copy_tree(source, destination)?;
    }
    Ok(status)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("demo"), "demo");
        assert_eq!(sanitize_identifier("  my project!! "), "my-project");
        assert_eq!(sanitize_identifier("v1.2_beta"), "v1.2_beta");
        assert_eq!(sanitize_identifier("///"), "workspace");
        assert_eq!(sanitize_identifier(""), "workspace");
    }

    #[test]
    fn test_slug_from_remote() {
        assert_eq!(slug_from_remote("git@github.com:acme/widget.git"), "acme-widget");
        assert_eq!(slug_from_remote("https://github.com/acme/widget"), "acme-widget");
        assert_eq!(slug_from_remote("widget.git"), "widget");
        assert_eq!(slug_from_remote(""), "workspace");
    }

    #[test]
    fn test_origin_url_ignores_other_remotes() {
        let config = "[core]\n\tbare = false\n[remote \"upstream\"]\n\turl = git@x:up/one.git\n[remote \"origin\"]\n\turl = git@x:me/two.git\n";
        assert_eq!(origin_url(config).as_deref(), Some("git@x:me/two.git"));
        assert_eq!(origin_url("[core]\n"), None);
    }

    #[test]
    fn test_derive_identifier_precedence() {
        let temp = TempDir::new().unwrap();
        let golden = temp.path().join("proj-golden");
        fs::create_dir_all(golden.join(".git")).unwrap();

        // Directory name fallback.
        assert_eq!(derive_identifier(&golden, None), "proj-golden");

        // Remote slug wins over the directory name.
        fs::write(
            golden.join(".git/config"),
            "[remote \"origin\"]\n\turl = git@example.com:demo/repo.git\n",
        )
        .unwrap();
        assert_eq!(derive_identifier(&golden, None), "demo-repo");

        // Explicit identifier wins over everything.
        assert_eq!(derive_identifier(&golden, Some("My Demo")), "My-Demo");
    }

    #[test]
    fn test_workspace_paths() {
        let ws = Workspace::at("/tmp/ws/demo");
        assert!(ws.golden().ends_with("demo/golden"));
        assert!(ws.fragments().ends_with("demo/fragments"));
        assert!(ws.fragment_dir("001-a-12345678").ends_with("fragments/001-a-12345678"));
        assert!(ws.recovered_dir().ends_with("demo/recovered"));
        assert!(ws.worktrees_dir().ends_with("demo/worktrees"));
        assert!(ws.manifest_path("001-a").ends_with("manifests/001-a.json"));
        assert!(ws.scan_manifest_path().ends_with("scan_manifest.json"));
        assert!(ws.analysis_path().ends_with("analysis.json"));
        assert!(ws.merge_report_path().ends_with("merge_report.json"));
        assert!(ws.report_path().ends_with("report.md"));
    }

    #[test]
    fn test_prepare_workspace_creates_layout() {
        let temp = TempDir::new().unwrap();
        let ws = prepare_workspace(&temp.path().join("workspace"), "demo", false, false).unwrap();
        assert!(ws.golden().is_dir());
        assert!(ws.fragments().is_dir());
    }

    #[test]
    fn test_prepare_workspace_dry_run_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("workspace");
        let ws = prepare_workspace(&root, "demo", true, false).unwrap();
        assert!(!root.exists());
        assert!(ws.root().ends_with("workspace/demo"));
    }

    #[test]
    fn test_prepare_workspace_force_clears_contents() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("workspace");
        let ws = prepare_workspace(&root, "demo", false, false).unwrap();
        fs::write(ws.golden().join("stale.txt"), "old").unwrap();

        let ws = prepare_workspace(&root, "demo", false, true).unwrap();
        assert!(ws.golden().is_dir());
        assert!(!ws.golden().join("stale.txt").exists());
    }

    #[test]
    fn test_prepare_workspace_rejects_file_collision() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("workspace");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join("demo"), "not a dir").unwrap();

        let err = prepare_workspace(&root, "demo", false, false).unwrap_err();
        assert!(matches!(err, MergerError::WorkspaceCollision { .. }));
    }

    #[test]
    fn test_mirror_golden_copies_then_keeps_existing() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("golden-src");
        fs::create_dir_all(source.join("src")).unwrap();
        fs::write(source.join("src/app.txt"), "one").unwrap();
        let ws = prepare_workspace(&temp.path().join("workspace"), "demo", false, false).unwrap();

        let status = mirror_golden(&source, ws.golden(), false, false).unwrap();
        assert_eq!(status, GoldenStatus::Installed);
        assert_eq!(fs::read_to_string(ws.golden().join("src/app.txt")).unwrap(), "one");

        fs::write(source.join("src/app.txt"), "two").unwrap();
        let status = mirror_golden(&source, ws.golden(), false, false).unwrap();
        assert_eq!(status, GoldenStatus::Existing);
        assert_eq!(fs::read_to_string(ws.golden().join("src/app.txt")).unwrap(), "one");

        let status = mirror_golden(&source, ws.golden(), false, true).unwrap();
        assert_eq!(status, GoldenStatus::Replaced);
        assert_eq!(fs::read_to_string(ws.golden().join("src/app.txt")).unwrap(), "two");
    }

    #[test]
    fn test_mirror_golden_missing_source() {
        let temp = TempDir::new().unwrap();
        let err = mirror_golden(
            &temp.path().join("nope"),
            &temp.path().join("golden"),
            false,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, MergerError::PathNotFound(_)));
    }
}
