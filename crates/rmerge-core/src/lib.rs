//! # rmerge-core
//!
//! **Repository fragment reconciliation** – core engine library.
//!
//! This crate takes one authoritative ("golden") copy of a repository and any
//! number of partial or divergent copies ("fragments"), stages them in a
//! workspace, compares each fragment against golden and optionally overlays
//! every fragment onto its own checkout of golden. It is consumed by the
//! `rmerge` CLI.
//!
//! ## Main Types
//!
//! - [`MergerEngine`] – the main entry point for reconciliation runs
//! - [`Workspace`] – the on-disk layout of one golden's workspace
//! - [`MergerError`] – domain-specific error type
//!
//! ## Modules
//!
//! - [`scan`] – candidate discovery and golden/fragment classification
//! - [`ledger`] – idempotent scan bookkeeping (`scan_manifest.json`)
//! - [`fragments`] – fragment ingestion
//! - [`recovery`] – synthesized history for unversioned fragments
//! - [`inspect`] – fragment-vs-golden comparison
//! - [`merge`] – overlay of fragments onto golden checkouts
//! - [`report`] – text and Markdown reporting
//! - [`scenarios`] – registry of unhandled situations
//!
//! ## Example
//!
//! ```ignore
//! use rmerge_core::{MergerEngine, RunMode, RunOptions};
//!
//! let engine = MergerEngine::with_defaults()?;
//! let summary = engine.run(&RunOptions {
//!     workspace_root: "merged".into(),
//!     golden: Some("src/proj-golden".into()),
//!     fragments: vec!["src/fragment-alpha".into()],
//!     mode: RunMode::Merge,
//!     ..Default::default()
//! })?;
//! for workspace in &summary.workspaces {
//!     println!("{}: {} fragment(s)", workspace.identifier, workspace.fragments.len());
//! }
//! ```

// Modules
pub mod config;
pub mod constants;
pub mod digest;
pub mod engine;
pub mod errors;
pub mod fragments;
pub mod fsutil;
pub mod git;
pub mod inspect;
pub mod ledger;
pub mod merge;
pub mod recovery;
pub mod report;
pub mod scan;
pub mod scenarios;
pub mod types;
pub mod workspace;

// Re-exports for convenience
pub use config::{MergerConfig, ScanConfig, WorkspaceConfig};
pub use constants::{
    ANALYSIS_FILENAME, FRAGMENTS_MANIFEST_FILENAME, GLOBAL_CONFIG_FILENAME, MERGE_REPORT_FILENAME,
    REPORT_FILENAME, RMERGE_HOME_DIR, SCAN_MANIFEST_FILENAME, SCAN_REPORT_FILENAME,
    SCENARIOS_FILENAME,
};
pub use digest::{
    build_manifest, diff_manifests, diff_trees, directory_digest, FileManifestEntry, ManifestDiff,
};
pub use engine::MergerEngine;
pub use errors::MergerError;
pub use fragments::{ingest_fragments, FragmentRecord, SourceKind};
pub use inspect::{inspect_fragments, AnalysisStatus, FragmentAnalysis, GitInfo};
pub use ledger::{Ledger, LedgerEntry, ScanAction, ScanContext, ScanReportEntry};
pub use merge::{merge_fragments, MergeResult, MergeStatus};
pub use recovery::{recover_fragments, RecoveryResult, RecoveryStatus};
pub use report::{render_markdown, summarize, write_markdown_report};
pub use scan::{
    assign_fragments, classify, scan_for_repos, Classification, ScanCandidate, Signals, Verdict,
};
pub use scenarios::{HandlingStrategy, ScenarioKind, ScenarioRegistry, UnhandledScenario};
pub use types::{RunMode, RunOptions, RunSummary, ScanOptions, ScanStats, WorkspaceOutcome};
pub use workspace::{derive_identifier, mirror_golden, prepare_workspace, GoldenStatus, Workspace};
