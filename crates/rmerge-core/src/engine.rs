//! rmerge engine – the orchestrator for reconciliation runs.
//!
//! The [`MergerEngine`] drives one run end to end:
//!
//! ```text
//! scan (optional) -> per golden:
//!   identifier -> workspace -> mirror golden -> ingest -> [recover]
//!   -> inspect -> report -> [merge -> report] -> ledger + scan report
//!   -> scenarios
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::MergerConfig;
use crate::errors::MergerError;
use crate::fragments::{ingest_fragments, write_fragment_manifest};
use crate::inspect::{inspect_fragments, FragmentAnalysis};
use crate::ledger::ScanContext;
use crate::merge::{merge_fragments, MergeResult};
use crate::recovery::recover_fragments;
use crate::report::{load_analysis, load_merge_report, summarize, write_markdown_report};
use crate::scan::{assign_fragments, scan_for_repos, Classification, ScanCandidate};
use crate::scenarios::ScenarioRegistry;
use crate::types::{RunMode, RunOptions, RunSummary, ScanOptions, ScanStats, WorkspaceOutcome};
use crate::workspace::{derive_identifier, mirror_golden, prepare_workspace, Workspace};

// ============================================================================
// MergerEngine
// ============================================================================

/// The main engine for reconciliation runs.
///
/// # Example
///
/// ```ignore
/// use rmerge_core::{MergerEngine, RunOptions};
///
/// let engine = MergerEngine::with_defaults()?;
/// let summary = engine.run(&RunOptions {
///     workspace_root: "merged".into(),
///     golden: Some("src/proj-golden".into()),
///     fragments: vec!["src/fragment-alpha".into()],
///     ..Default::default()
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct MergerEngine {
    /// Configuration loaded from `~/.rmerge/config.yaml`.
    config: MergerConfig,
}

/// One golden to process, with what the scan found for it.
struct PlannedRun {
    golden: PathBuf,
    identifier: String,
    context: Option<ScanContext>,
}

impl MergerEngine {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    /// Create an engine from a loaded configuration.
    pub fn from_config(config: MergerConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Create an engine with the default configuration file, or defaults if
    /// there is none.
    pub fn with_defaults() -> anyhow::Result<Self> {
        let config = MergerConfig::load_default()?;
        Self::from_config(config)
    }

    /// Create an engine with configuration from a specific path.
    pub fn with_config(path: &Path) -> anyhow::Result<Self> {
        let config = MergerConfig::from_path(path)?;
        Self::from_config(config)
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    // -------------------------------------------------------------------------
    // Operations
    // -------------------------------------------------------------------------

    /// Classify candidates under `source` without touching any workspace.
    ///
    /// `None` patterns fall back to the configuration. Configured exclusions
    /// are always applied.
    pub fn scan(
        &self,
        source: &Path,
        golden_pattern: Option<&str>,
        fragment_pattern: Option<&str>,
        exclude: &[PathBuf],
    ) -> Result<Vec<ScanCandidate>, MergerError> {
        let mut excluded = self.config.scan.exclude.clone();
        excluded.extend(exclude.iter().cloned());
        scan_for_repos(
            source,
            golden_pattern.unwrap_or(&self.config.scan.golden_pattern),
            fragment_pattern.unwrap_or(&self.config.scan.fragment_pattern),
            &excluded,
        )
    }

    /// Load the persisted analysis and merge results of a workspace.
    pub fn load_report(
        &self,
        workspace_dir: &Path,
    ) -> Result<(Vec<FragmentAnalysis>, Vec<MergeResult>), MergerError> {
        let workspace = Workspace::open(workspace_dir)?;
        let analyses = load_analysis(&workspace.analysis_path())?;
        let merges = load_merge_report(&workspace.merge_report_path())?;
        Ok((analyses, merges))
    }

    /// Execute a reconciliation run.
    ///
    /// # Errors
    ///
    /// Returns [`MergerError::InvalidArgument`] when neither a golden nor a
    /// scan is requested, or when a scan finds no golden. Any stage error
    /// aborts the run.
    pub fn run(&self, options: &RunOptions) -> Result<RunSummary, MergerError> {
        let workspace_root = absolute(&options.workspace_root)?;
        tracing::info!("Workspace root: {}", workspace_root.display());

        let mut summary = RunSummary {
            mode: options.mode,
            dry_run: options.dry_run,
            workspaces: Vec::new(),
            scan: None,
        };

        let Some(scan) = &options.scan else {
            let golden = options.golden.as_ref().ok_or_else(|| {
                MergerError::InvalidArgument(
                    "--golden is required (or use --scan to discover repos).".to_string(),
                )
            })?;
            let run = PlannedRun {
                golden: golden.clone(),
                identifier: String::new(),
                context: None,
            };
            summary
                .workspaces
                .push(self.process(options, &workspace_root, run)?);
            return Ok(summary);
        };

        let runs = self.plan_scan_runs(options, scan, &workspace_root)?;
        if runs.is_empty() {
            return Err(MergerError::InvalidArgument(
                "Scan did not identify any golden repositories.".to_string(),
            ));
        }

        let mut stats = ScanStats::default();
        for run in runs {
            let outcome = self.process(options, &workspace_root, run)?;
            stats.record(&outcome);
            summary.workspaces.push(outcome);
        }
        tracing::info!(
            "Scan summary{}: {} golden(s), {} pending, {} ingested, {} installed, {} existing, {} replaced",
            if options.dry_run { " (dry-run)" } else { "" },
            stats.goldens,
            stats.pending_fragments,
            stats.fragments_ingested,
            stats.goldens_installed,
            stats.goldens_existing,
            stats.goldens_replaced
        );
        summary.scan = Some(stats);
        Ok(summary)
    }

    // -------------------------------------------------------------------------
    // Planning
    // -------------------------------------------------------------------------

    fn plan_scan_runs(
        &self,
        options: &RunOptions,
        scan: &ScanOptions,
        workspace_root: &Path,
    ) -> Result<Vec<PlannedRun>, MergerError> {
        let source = absolute(&scan.source)?;
        if !source.exists() {
            if !scan.create_structure {
                return Err(MergerError::ScanSourceMissing(source.display().to_string()));
            }
            tracing::info!("Creating scan source directory at {}", source.display());
            fs::create_dir_all(&source)?;
        }

        let candidates = self.scan(
            &source,
            scan.golden_pattern.as_deref(),
            scan.fragment_pattern.as_deref(),
            &[workspace_root.to_path_buf()],
        )?;
        let (goldens, fragments): (Vec<ScanCandidate>, Vec<ScanCandidate>) = candidates
            .into_iter()
            .filter(|c| c.classification != Classification::Unknown)
            .partition(|c| c.classification == Classification::Golden);
        tracing::info!(
            "Scan found {} golden and {} fragment candidate(s)",
            goldens.len(),
            fragments.len()
        );

        if let Some(golden) = &options.golden {
            let golden = absolute(golden)?;
            let identifier = derive_identifier(&golden, options.identifier.as_deref());
            let context = ScanContext::build(
                &workspace_root.join(&identifier),
                &golden,
                None,
                &fragments,
                &[],
            );
            return Ok(vec![PlannedRun {
                golden,
                identifier,
                context: Some(context),
            }]);
        }

        if goldens.is_empty() {
            return Err(MergerError::InvalidArgument(
                "Scan found no golden repositories. Consider specifying --golden or adjust patterns."
                    .to_string(),
            ));
        }

        let assignment = assign_fragments(&goldens, &fragments);
        let mut runs = Vec::with_capacity(goldens.len());
        for golden in &goldens {
            let identifier = derive_identifier(&golden.path, None);
            let context = ScanContext::build(
                &workspace_root.join(&identifier),
                &golden.path,
                Some(golden),
                assignment.fragments_for(&golden.path),
                &assignment.unassigned,
            );
            runs.push(PlannedRun {
                golden: golden.path.clone(),
                identifier,
                context: Some(context),
            });
        }
        Ok(runs)
    }

    // -------------------------------------------------------------------------
    // Single workspace
    // -------------------------------------------------------------------------

    fn process(
        &self,
        options: &RunOptions,
        workspace_root: &Path,
        run: PlannedRun,
    ) -> Result<WorkspaceOutcome, MergerError> {
        let PlannedRun {
            golden,
            identifier,
            mut context,
        } = run;
        let golden = golden.canonicalize().map_err(|_| {
            MergerError::PathNotFound(format!(
                "Golden repository path does not exist: {}",
                golden.display()
            ))
        })?;
        tracing::info!("Golden repo: {}", golden.display());

        let identifier = if identifier.is_empty() {
            derive_identifier(&golden, options.identifier.as_deref())
        } else {
            identifier
        };
        tracing::info!("Workspace identifier: {}", identifier);

        let workspace =
            prepare_workspace(workspace_root, &identifier, options.dry_run, options.force)?;

        let mut sources = options.fragments.clone();
        if let Some(context) = &context {
            sources.extend(context.fragments_to_ingest());
        }
        let sources = normalize_sources(&sources);

        let golden_status =
            mirror_golden(&golden, workspace.golden(), options.dry_run, options.force)?;
        tracing::info!("Golden mirror: {}", golden_status);

        let mut records = Vec::new();
        if sources.is_empty() {
            tracing::info!("No fragments provided for ingestion.");
        } else {
            records = ingest_fragments(&sources, &workspace, options.dry_run)?;
            tracing::info!("Processed {} fragment(s)", records.len());
        }

        let mut recoveries = Vec::new();
        if options.recover_missing && !records.is_empty() {
            recoveries = recover_fragments(&mut records, &workspace, options.dry_run)?;
            tracing::info!("Recovery results: {} fragment(s)", recoveries.len());
            if !options.dry_run {
                write_fragment_manifest(&workspace.fragments_manifest_path(), &records)?;
            }
        }

        let mut registry = ScenarioRegistry::new();
        let mut analyses = Vec::new();
        if !records.is_empty() {
            analyses = inspect_fragments(&records, &workspace, options.dry_run, &mut registry)?;
            tracing::info!("Inspection results for {} fragment(s)", analyses.len());
            if !options.dry_run {
                emit_report(&workspace, &analyses, None)?;
            }
        }

        let merges = match options.mode {
            RunMode::Analyze => {
                tracing::info!("Analyze mode complete for workspace {}", workspace.root().display());
                None
            }
            RunMode::Merge => {
                let merges = merge_fragments(
                    &records,
                    &workspace,
                    options.dry_run,
                    options.resume_from.as_deref(),
                )?;
                tracing::info!("Merge results: {} fragment(s)", merges.len());
                if !options.dry_run {
                    emit_report(&workspace, &analyses, Some(&merges))?;
                }
                Some(merges)
            }
        };

        let mut scan_entries = Vec::new();
        let mut pending_fragments = 0;
        if let Some(context) = context.as_mut() {
            pending_fragments = context.pending_count();
            context.finalize(&records, &identifier, options.dry_run)?;
            scan_entries = context.entries().to_vec();
        }

        if !options.dry_run {
            registry.save(&workspace.scenarios_path())?;
        }

        tracing::info!("Workspace ready at {}", workspace.root().display());
        Ok(WorkspaceOutcome {
            identifier,
            root: workspace.root().to_path_buf(),
            golden,
            golden_status,
            fragments: records,
            recoveries,
            analyses,
            merges,
            scan_entries,
            pending_fragments,
            scenarios: registry.entries().to_vec(),
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolve `path` against the current directory without requiring it to exist.
fn absolute(path: &Path) -> Result<PathBuf, MergerError> {
    if let Ok(canonical) = path.canonicalize() {
        return Ok(canonical);
    }
    Ok(std::path::absolute(path)?)
}

/// Canonicalize and drop duplicate sources, keeping first occurrences.
///
/// Paths that cannot be canonicalized are kept as given so ingestion can
/// report them.
fn normalize_sources(sources: &[PathBuf]) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(sources.len());
    for source in sources {
        let resolved = source.canonicalize().unwrap_or_else(|_| source.clone());
        if seen.insert(resolved.clone()) {
            out.push(resolved);
        }
    }
    out
}

fn emit_report(
    workspace: &Workspace,
    analyses: &[FragmentAnalysis],
    merges: Option<&[MergeResult]>,
) -> Result<(), MergerError> {
    if analyses.is_empty() {
        tracing::info!("No analyses available; skipping report generation.");
        return Ok(());
    }
    tracing::debug!("\n{}", summarize(analyses, merges));
    write_markdown_report(&workspace.report_path(), analyses, merges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::AnalysisStatus;
    use crate::ledger::ScanAction;
    use crate::workspace::GoldenStatus;
    use tempfile::TempDir;

    fn engine() -> MergerEngine {
        MergerEngine::from_config(MergerConfig::default()).unwrap()
    }

    fn source_tree(temp: &TempDir) -> PathBuf {
        let src = temp.path().join("src");
        let golden = src.join("proj-golden");
        fs::create_dir_all(golden.join(".git")).unwrap();
        fs::write(
            golden.join(".git/config"),
            "[remote \"origin\"]\n\turl = git@example.com:demo/proj.git\n",
        )
        .unwrap();
        fs::write(golden.join("README.md"), "golden").unwrap();

        let fragment = src.join("fragment-alpha");
        fs::create_dir_all(&fragment).unwrap();
        fs::write(fragment.join("file.txt"), "alpha").unwrap();
        fs::write(fragment.join("README.md"), "golden").unwrap();
        src
    }

    #[test]
    fn test_run_requires_golden_or_scan() {
        let temp = TempDir::new().unwrap();
        let err = engine()
            .run(&RunOptions {
                workspace_root: temp.path().join("ws"),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, MergerError::InvalidArgument(_)));
    }

    #[test]
    fn test_explicit_run_analyzes_fragment() {
        let temp = TempDir::new().unwrap();
        let src = source_tree(&temp);
        let summary = engine()
            .run(&RunOptions {
                workspace_root: temp.path().join("ws"),
                golden: Some(src.join("proj-golden")),
                fragments: vec![src.join("fragment-alpha"), src.join("fragment-alpha")],
                identifier: Some("demo".into()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(summary.workspaces.len(), 1);
        let outcome = &summary.workspaces[0];
        assert_eq!(outcome.identifier, "demo");
        assert_eq!(outcome.golden_status, GoldenStatus::Installed);
        assert_eq!(outcome.fragments.len(), 1, "duplicates are dropped");
        assert_eq!(outcome.analyses[0].status, AnalysisStatus::NonGit);
        assert_eq!(
            outcome.analyses[0].diff_summary.as_deref(),
            Some("added:1 (file.txt)")
        );
        assert!(outcome.root.join("report.md").is_file());
        assert!(outcome.root.join("analysis.json").is_file());
        assert!(outcome.root.join("fragments_manifest.json").is_file());
        assert!(summary.scan.is_none());
    }

    #[test]
    fn test_scan_run_derives_identifier_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let src = source_tree(&temp);
        let options = RunOptions {
            workspace_root: temp.path().join("ws"),
            scan: Some(ScanOptions {
                source: src.clone(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let first = engine().run(&options).unwrap();
        let outcome = &first.workspaces[0];
        assert_eq!(outcome.identifier, "demo-proj");
        assert_eq!(outcome.fragments.len(), 1);
        let stats = first.scan.as_ref().unwrap();
        assert_eq!(stats.goldens, 1);
        assert_eq!(stats.pending_fragments, 1);
        assert_eq!(stats.goldens_installed, 1);
        assert!(outcome
            .scan_entries
            .iter()
            .any(|e| e.action == ScanAction::Ingested));
        assert!(outcome.root.join("scan_manifest.json").is_file());

        let second = engine().run(&options).unwrap();
        let outcome = &second.workspaces[0];
        assert!(outcome.fragments.is_empty());
        assert_eq!(outcome.golden_status, GoldenStatus::Existing);
        assert!(outcome
            .scan_entries
            .iter()
            .any(|e| e.action == ScanAction::Existing));
    }

    #[test]
    fn test_scan_run_missing_source() {
        let temp = TempDir::new().unwrap();
        let options = RunOptions {
            workspace_root: temp.path().join("ws"),
            scan: Some(ScanOptions {
                source: temp.path().join("nope"),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = engine().run(&options).unwrap_err();
        assert!(matches!(err, MergerError::ScanSourceMissing(_)));
    }

    #[test]
    fn test_scan_run_create_structure_then_no_golden() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("fresh");
        let options = RunOptions {
            workspace_root: temp.path().join("ws"),
            scan: Some(ScanOptions {
                source: source.clone(),
                create_structure: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = engine().run(&options).unwrap_err();
        assert!(source.is_dir());
        assert!(matches!(err, MergerError::InvalidArgument(_)));
    }

    #[test]
    fn test_dry_run_leaves_disk_untouched() {
        let temp = TempDir::new().unwrap();
        let src = source_tree(&temp);
        let ws = temp.path().join("ws");
        let summary = engine()
            .run(&RunOptions {
                workspace_root: ws.clone(),
                golden: Some(src.join("proj-golden")),
                fragments: vec![src.join("fragment-alpha")],
                mode: RunMode::Merge,
                dry_run: true,
                ..Default::default()
            })
            .unwrap();

        assert!(!ws.exists());
        let outcome = &summary.workspaces[0];
        assert_eq!(outcome.golden_status, GoldenStatus::DryRun);
        assert_eq!(outcome.fragments.len(), 1);
        assert!(outcome.merges.is_some());
    }

    #[test]
    fn test_load_report_reads_persisted_results() {
        let temp = TempDir::new().unwrap();
        let src = source_tree(&temp);
        let engine = engine();
        let summary = engine
            .run(&RunOptions {
                workspace_root: temp.path().join("ws"),
                golden: Some(src.join("proj-golden")),
                fragments: vec![src.join("fragment-alpha")],
                ..Default::default()
            })
            .unwrap();

        let (analyses, merges) = engine.load_report(&summary.workspaces[0].root).unwrap();
        assert_eq!(analyses, summary.workspaces[0].analyses);
        assert!(merges.is_empty());
    }

    #[test]
    fn test_normalize_sources_dedups() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        fs::create_dir_all(&a).unwrap();
        let out = normalize_sources(&[a.clone(), a.join("."), temp.path().join("missing")]);
        assert_eq!(out.len(), 2);
    }
}
