//! Ingestion ledger and per-run scan bookkeeping.
//!
//! The [`Ledger`] (`scan_manifest.json`) remembers which source paths were
//! already ingested and with which directory digest. It is loaded once at
//! the start of a run, threaded through the stages by reference, and saved
//! once at the end.
//!
//! [`ScanContext`] pairs a ledger with the decisions taken for one golden's
//! scan candidates and writes them to `scan_report.json`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::MergerError;
use crate::fragments::FragmentRecord;
use crate::scan::{Classification, ScanCandidate};

// ============================================================================
// Ledger
// ============================================================================

/// One previously ingested source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub source: String,
    /// Always `fragment`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Workspace identifier that owns the fragment.
    pub identifier: String,
    pub fragment_id: String,
    pub digest: String,
    pub destination: String,
    /// RFC 3339 timestamp of the last recording.
    pub updated_at: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerFile {
    #[serde(default)]
    entries: Vec<LedgerEntry>,
}

/// Persisted map from source path to its last ingestion.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    entries: BTreeMap<String, LedgerEntry>,
    dirty: bool,
}

impl Ledger {
    /// Load the ledger at `path`.
    ///
    /// A missing, unreadable, or corrupt file yields an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut entries = BTreeMap::new();

        match fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<LedgerFile>(&text) {
                Ok(file) => {
                    for entry in file.entries {
                        entries.insert(entry.source.clone(), entry);
                    }
                }
                Err(e) => {
                    tracing::warn!("Ignoring unreadable ledger {}: {}", path.display(), e);
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Ignoring unreadable ledger {}: {}", path.display(), e);
            }
        }

        Self {
            path,
            entries,
            dirty: false,
        }
    }

    /// Where the ledger is persisted.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the ledger changed since it was loaded or last saved.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn lookup(&self, source: &Path) -> Option<&LedgerEntry> {
        self.entries.get(source.to_string_lossy().as_ref())
    }

    /// True if `candidate` was ingested before and has not changed since.
    pub fn is_unchanged(&self, candidate: &ScanCandidate) -> bool {
        self.lookup(&candidate.path)
            .is_some_and(|entry| entry.digest == candidate.digest)
    }

    /// Record (or replace) the ingestion of `source`.
    pub fn record(
        &mut self,
        source: &Path,
        digest: &str,
        fragment_id: &str,
        destination: &Path,
        identifier: &str,
    ) {
        let key = source.to_string_lossy().into_owned();
        self.entries.insert(
            key.clone(),
            LedgerEntry {
                source: key,
                kind: "fragment".to_string(),
                identifier: identifier.to_string(),
                fragment_id: fragment_id.to_string(),
                digest: digest.to_string(),
                destination: destination.to_string_lossy().into_owned(),
                updated_at: Utc::now().to_rfc3339(),
            },
        );
        self.dirty = true;
    }

    /// Persist the ledger if it changed. Returns whether a write happened.
    pub fn save(&mut self) -> Result<bool, MergerError> {
        if !self.dirty {
            return Ok(false);
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = LedgerFile {
            entries: self.entries.values().cloned().collect(),
        };
        fs::write(&self.path, serde_json::to_string_pretty(&file)?)?;
        self.dirty = false;
        tracing::debug!("Saved ledger with {} entries to {}", self.len(), self.path.display());
        Ok(true)
    }
}

// ============================================================================
// Scan Report
// ============================================================================

/// Decision taken for one scan candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanAction {
    /// A discovered golden other than the one in use.
    Candidate,
    /// The golden mirrored into this workspace.
    WorkspaceGolden,
    /// Already ingested and unchanged.
    Existing,
    /// Queued for ingestion.
    Ingest,
    /// No golden claimed this fragment.
    Unassigned,
    /// Ingested during this run.
    Ingested,
    /// Would have been ingested.
    DryRun,
}

impl ScanAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Candidate => "candidate",
            Self::WorkspaceGolden => "workspace-golden",
            Self::Existing => "existing",
            Self::Ingest => "ingest",
            Self::Unassigned => "unassigned",
            Self::Ingested => "ingested",
            Self::DryRun => "dry-run",
        }
    }
}

impl std::fmt::Display for ScanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of `scan_report.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReportEntry {
    pub source: String,
    pub classification: Classification,
    pub confidence: f64,
    pub action: ScanAction,
    pub reason: String,
    pub fragment_id: Option<String>,
    pub destination: Option<String>,
}

impl ScanReportEntry {
    fn new(
        source: &Path,
        classification: Classification,
        confidence: f64,
        action: ScanAction,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            source: source.to_string_lossy().into_owned(),
            classification,
            confidence,
            action,
            reason: reason.into(),
            fragment_id: None,
            destination: None,
        }
    }
}

#[derive(Serialize)]
struct ScanReportFile<'a> {
    entries: &'a [ScanReportEntry],
}

// ============================================================================
// Scan Context
// ============================================================================

/// Scan decisions for one golden, backed by that workspace's ledger.
#[derive(Debug)]
pub struct ScanContext {
    ledger: Ledger,
    report_path: PathBuf,
    entries: Vec<ScanReportEntry>,
    pending: BTreeMap<String, ScanCandidate>,
    pending_order: Vec<PathBuf>,
}

impl ScanContext {
    /// Build the context for `golden` inside workspace root `root`.
    ///
    /// `golden_candidate` is the scan candidate the golden came from, if any
    /// (`None` when the caller named the golden explicitly).
    pub fn build(
        root: &Path,
        golden: &Path,
        golden_candidate: Option<&ScanCandidate>,
        fragments: &[ScanCandidate],
        unassigned: &[ScanCandidate],
    ) -> Self {
        let ledger = Ledger::load(root.join(crate::constants::SCAN_MANIFEST_FILENAME));
        let mut context = Self {
            ledger,
            report_path: root.join(crate::constants::SCAN_REPORT_FILENAME),
            entries: Vec::new(),
            pending: BTreeMap::new(),
            pending_order: Vec::new(),
        };

        match golden_candidate {
            Some(candidate) => {
                let is_workspace_golden = same_path(&candidate.path, golden);
                let (action, reason) = if is_workspace_golden {
                    (
                        ScanAction::WorkspaceGolden,
                        "Matches discovered golden candidate.".to_string(),
                    )
                } else {
                    (ScanAction::Candidate, candidate.reason.clone())
                };
                context.entries.push(ScanReportEntry::new(
                    &candidate.path,
                    Classification::Golden,
                    candidate.confidence,
                    action,
                    reason,
                ));
            }
            None => context.entries.push(ScanReportEntry::new(
                golden,
                Classification::Golden,
                1.0,
                ScanAction::WorkspaceGolden,
                "User-specified golden repository.",
            )),
        }

        for candidate in fragments {
            let (action, reason) = if context.ledger.is_unchanged(candidate) {
                tracing::debug!("Fragment unchanged since last ingest: {}", candidate.path.display());
                (
                    ScanAction::Existing,
                    "Fragment already ingested into workspace.".to_string(),
                )
            } else {
                context.add_pending(candidate);
                (ScanAction::Ingest, candidate.reason.clone())
            };
            context.entries.push(ScanReportEntry::new(
                &candidate.path,
                Classification::Fragment,
                candidate.confidence,
                action,
                reason,
            ));
        }

        for candidate in unassigned {
            context.entries.push(ScanReportEntry::new(
                &candidate.path,
                Classification::Fragment,
                candidate.confidence,
                ScanAction::Unassigned,
                "No matching golden candidate identified.",
            ));
        }

        context
    }

    fn add_pending(&mut self, candidate: &ScanCandidate) {
        let key = candidate.path.to_string_lossy().into_owned();
        if self.pending.insert(key, candidate.clone()).is_none() {
            self.pending_order.push(candidate.path.clone());
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn entries(&self) -> &[ScanReportEntry] {
        &self.entries
    }

    /// Number of fragment candidates queued for ingestion.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Source paths queued for ingestion, in scan order.
    pub fn fragments_to_ingest(&self) -> Vec<PathBuf> {
        self.pending_order.clone()
    }

    /// Record ingestion results, then persist the ledger and scan report.
    ///
    /// Under `dry_run` queued entries are relabelled `dry-run` and nothing is
    /// written.
    pub fn finalize(
        &mut self,
        records: &[FragmentRecord],
        identifier: &str,
        dry_run: bool,
    ) -> Result<(), MergerError> {
        if dry_run {
            for entry in &mut self.entries {
                if entry.action == ScanAction::Ingest {
                    entry.action = ScanAction::DryRun;
                }
            }
            return Ok(());
        }

        for record in records {
            let source = record.source.to_string_lossy();
            let Some(candidate) = self.pending.get(source.as_ref()) else {
                continue;
            };
            self.ledger.record(
                &record.source,
                &candidate.digest,
                &record.fragment_id,
                &record.destination,
                identifier,
            );
            for entry in &mut self.entries {
                if entry.source == source {
                    entry.action = ScanAction::Ingested;
                    entry.fragment_id = Some(record.fragment_id.clone());
                    entry.destination = Some(record.destination.to_string_lossy().into_owned());
                }
            }
        }

        self.ledger.save()?;
        self.write_report()
    }

    fn write_report(&self) -> Result<(), MergerError> {
        if let Some(parent) = self.report_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = ScanReportFile {
            entries: &self.entries,
        };
        fs::write(&self.report_path, serde_json::to_string_pretty(&file)?)?;
        tracing::info!("Scan report written to {}", self.report_path.display());
        Ok(())
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragments::SourceKind;
    use tempfile::TempDir;

    fn candidate(path: &Path, digest: &str) -> ScanCandidate {
        ScanCandidate {
            path: path.to_path_buf(),
            classification: Classification::Fragment,
            confidence: 0.5,
            reason: "name-matches-fragment-pattern,missing-git-directory".to_string(),
            digest: digest.to_string(),
        }
    }

    fn record(source: &Path, id: &str, root: &Path) -> FragmentRecord {
        FragmentRecord {
            fragment_id: id.to_string(),
            source: source.to_path_buf(),
            destination: root.join("fragments").join(id),
            kind: SourceKind::Directory,
            timestamp: "2026-01-01T00:00:00+00:00".to_string(),
            has_history: false,
            recovered_repo: None,
            copied: true,
        }
    }

    #[test]
    fn test_ledger_missing_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let ledger = Ledger::load(temp.path().join("scan_manifest.json"));
        assert!(ledger.is_empty());
        assert!(!ledger.is_dirty());
    }

    #[test]
    fn test_ledger_corrupt_file_is_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scan_manifest.json");
        fs::write(&path, "{ not json").unwrap();
        let ledger = Ledger::load(&path);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_ledger_save_only_when_dirty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scan_manifest.json");
        let mut ledger = Ledger::load(&path);
        assert!(!ledger.save().unwrap());
        assert!(!path.exists());

        ledger.record(
            Path::new("/src/fragment-a"),
            "abc",
            "001-fragment-a-00000000",
            Path::new("/ws/fragments/001-fragment-a-00000000"),
            "demo",
        );
        assert!(ledger.save().unwrap());
        assert!(!ledger.save().unwrap());

        let reloaded = Ledger::load(&path);
        let entry = reloaded.lookup(Path::new("/src/fragment-a")).unwrap();
        assert_eq!(entry.kind, "fragment");
        assert_eq!(entry.identifier, "demo");
        assert_eq!(entry.digest, "abc");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["entries"][0]["type"], "fragment");
    }

    #[test]
    fn test_ledger_unchanged_requires_matching_digest() {
        let temp = TempDir::new().unwrap();
        let mut ledger = Ledger::load(temp.path().join("scan_manifest.json"));
        let src = Path::new("/src/fragment-a");
        ledger.record(src, "d1", "001", Path::new("/ws/f/001"), "demo");

        assert!(ledger.is_unchanged(&candidate(src, "d1")));
        assert!(!ledger.is_unchanged(&candidate(src, "d2")));
        assert!(!ledger.is_unchanged(&candidate(Path::new("/src/other"), "d1")));
    }

    #[test]
    fn test_scan_context_second_run_marks_existing() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("ws/demo");
        let golden = temp.path().join("proj-golden");
        let src = temp.path().join("fragment-a");
        let fragments = vec![candidate(&src, "d1")];

        let mut first = ScanContext::build(&root, &golden, None, &fragments, &[]);
        assert_eq!(first.fragments_to_ingest(), vec![src.clone()]);
        first
            .finalize(&[record(&src, "001-fragment-a-12345678", &root)], "demo", false)
            .unwrap();
        assert_eq!(first.entries()[1].action, ScanAction::Ingested);
        assert!(root.join("scan_report.json").is_file());

        let second = ScanContext::build(&root, &golden, None, &fragments, &[]);
        assert!(second.fragments_to_ingest().is_empty());
        assert_eq!(second.entries()[1].action, ScanAction::Existing);

        // A changed digest re-queues it.
        let changed = vec![candidate(&src, "d2")];
        let third = ScanContext::build(&root, &golden, None, &changed, &[]);
        assert_eq!(third.pending_count(), 1);
    }

    #[test]
    fn test_scan_context_dry_run_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("ws/demo");
        let golden = temp.path().join("proj-golden");
        let src = temp.path().join("fragment-a");
        let unassigned = vec![candidate(&temp.path().join("fragment-z"), "z")];

        let mut context =
            ScanContext::build(&root, &golden, None, &[candidate(&src, "d1")], &unassigned);
        context.finalize(&[], "demo", true).unwrap();

        assert_eq!(context.entries()[0].action, ScanAction::WorkspaceGolden);
        assert_eq!(context.entries()[1].action, ScanAction::DryRun);
        assert_eq!(context.entries()[2].action, ScanAction::Unassigned);
        assert!(!root.join("scan_manifest.json").exists());
        assert!(!root.join("scan_report.json").exists());
    }

    #[test]
    fn test_scan_context_golden_candidate_labels() {
        let temp = TempDir::new().unwrap();
        let golden = temp.path().join("proj-golden");
        let other = temp.path().join("other-golden");
        let mut golden_candidate = candidate(&golden, "g");
        golden_candidate.classification = Classification::Golden;
        let mut other_candidate = candidate(&other, "o");
        other_candidate.classification = Classification::Golden;

        let context = ScanContext::build(temp.path(), &golden, Some(&golden_candidate), &[], &[]);
        assert_eq!(context.entries()[0].action, ScanAction::WorkspaceGolden);

        let context = ScanContext::build(temp.path(), &golden, Some(&other_candidate), &[], &[]);
        assert_eq!(context.entries()[0].action, ScanAction::Candidate);
    }
}
