//! Repository discovery and golden/fragment classification.
//!
//! Scanning is split in two halves:
//!
//! - [`Signals`] are probed from disk for one directory, and [`classify`]
//!   turns them into a [`Classification`] with a [`ScoreBreakdown`]. This
//!   half is pure and holds the whole scoring table.
//! - [`scan_for_repos`] walks a source tree, decides which directories are
//!   candidates, probes their signals, and attaches a content digest.
//!
//! ## Scoring
//!
//! | Signal                                  | Golden | Fragment |
//! |-----------------------------------------|--------|----------|
//! | name matches golden pattern             | +2     |          |
//! | name matches fragment pattern           |        | +1       |
//! | `.git` directory                        | +2     |          |
//! | ... with a remote / without a remote    | +1     | +1       |
//! | bare repository layout                  | +3     |          |
//! | ... with a remote                       | +1     |          |
//! | no version-control metadata at all      |        | +1       |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glob::Pattern;
use ignore::{DirEntry, WalkBuilder};
use serde::{Deserialize, Serialize};

use crate::constants::{is_vcs_metadata, CONFIDENCE_DIVISOR, GIT_DIR};
use crate::digest::directory_digest;
use crate::errors::MergerError;
use crate::git::{has_git_dir, has_remote_from_config, is_bare_repo, read_git_config};

// ============================================================================
// Classification
// ============================================================================

/// Outcome of classifying one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Classification {
    Golden,
    Fragment,
    Unknown,
}

impl Classification {
    /// Lowercase label used in reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Golden => "golden",
            Self::Fragment => "fragment",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Version-control layout observed at a candidate's root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsLayout {
    /// A `.git` metadata directory.
    WorkingTree { has_remote: bool },
    /// `HEAD` + `objects/` + `refs/` with no `.git` entry.
    Bare { has_remote: bool },
    /// Nothing recognizable.
    None,
}

/// Everything the scoring table looks at for one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signals {
    pub name_matches_golden: bool,
    pub name_matches_fragment: bool,
    pub layout: VcsLayout,
}

impl Signals {
    /// Probe the signals of `path` against two compiled name patterns.
    pub fn probe(path: &Path, golden: &Pattern, fragment: &Pattern) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let layout = if has_git_dir(path) {
            VcsLayout::WorkingTree {
                has_remote: has_remote_from_config(&read_git_config(
                    &path.join(GIT_DIR).join("config"),
                )),
            }
        } else if is_bare_repo(path) {
            VcsLayout::Bare {
                has_remote: has_remote_from_config(&read_git_config(&path.join("config"))),
            }
        } else {
            VcsLayout::None
        };

        Self {
            name_matches_golden: golden.matches(&name),
            name_matches_fragment: fragment.matches(&name),
            layout,
        }
    }
}

/// Scores and triggered signal names behind a classification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub golden: u32,
    pub fragment: u32,
    pub reasons: Vec<&'static str>,
}

impl ScoreBreakdown {
    fn golden(&mut self, points: u32, reason: Option<&'static str>) {
        self.golden += points;
        self.reasons.extend(reason);
    }

    fn fragment(&mut self, points: u32, reason: Option<&'static str>) {
        self.fragment += points;
        self.reasons.extend(reason);
    }

    /// Comma-joined signal names, or `no-heuristics`.
    pub fn reason(&self) -> String {
        if self.reasons.is_empty() {
            "no-heuristics".to_string()
        } else {
            self.reasons.join(",")
        }
    }

    /// `min(1, |golden - fragment| / 4)`.
    pub fn confidence(&self) -> f64 {
        let gap = (i64::from(self.golden) - i64::from(self.fragment)).unsigned_abs() as f64;
        (gap / CONFIDENCE_DIVISOR).min(1.0)
    }
}

/// Result of [`classify`].
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub classification: Classification,
    pub confidence: f64,
    pub breakdown: ScoreBreakdown,
}

/// Apply the scoring table to a set of signals.
pub fn classify(signals: &Signals) -> Verdict {
    let mut score = ScoreBreakdown::default();

    if signals.name_matches_golden {
        score.golden(2, Some("name-matches-golden-pattern"));
    }
    if signals.name_matches_fragment {
        score.fragment(1, Some("name-matches-fragment-pattern"));
    }

    match signals.layout {
        VcsLayout::WorkingTree { has_remote } => {
            score.golden(2, None);
            if has_remote {
                score.golden(1, Some("git-remote-found"));
            } else {
                score.fragment(1, Some("git-metadata-no-remote"));
            }
        }
        VcsLayout::Bare { has_remote } => {
            score.golden(3, None);
            if has_remote {
                score.golden(1, Some("bare-repo-with-remote"));
            } else {
                score.reasons.push("bare-repo");
            }
        }
        VcsLayout::None => score.fragment(1, Some("missing-git-directory")),
    }

    let golden = i64::from(score.golden);
    let fragment = i64::from(score.fragment);
    let classification = if golden - fragment >= 1 {
        Classification::Golden
    } else if fragment - golden >= 0 {
        Classification::Fragment
    } else {
        Classification::Unknown
    };

    Verdict {
        classification,
        confidence: score.confidence(),
        breakdown: score,
    }
}

// ============================================================================
// Scanning
// ============================================================================

/// A directory that looks like a repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanCandidate {
    pub path: PathBuf,
    pub classification: Classification,
    pub confidence: f64,
    pub reason: String,
    /// [`directory_digest`] of the candidate at scan time.
    pub digest: String,
}

/// Compile a name glob.
pub fn compile_pattern(pattern: &str) -> Result<Pattern, MergerError> {
    Pattern::new(pattern).map_err(|e| MergerError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

fn looks_like_repo(path: &Path, golden: &Pattern, fragment: &Pattern) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    golden.matches(&name) || fragment.matches(&name) || has_git_dir(path) || is_bare_repo(path)
}

/// Walk `source` and classify every candidate directory.
///
/// Excluded paths and version-control metadata directories are pruned. The
/// walk keeps descending into candidates, so nested repositories are found
/// too. `unknown` candidates are dropped. Output is in walk order (sorted by
/// file name at each level).
///
/// # Errors
///
/// Returns [`MergerError::ScanSourceMissing`] if `source` does not exist and
/// [`MergerError::InvalidPattern`] if a pattern does not compile.
pub fn scan_for_repos(
    source: &Path,
    golden_pattern: &str,
    fragment_pattern: &str,
    exclude: &[PathBuf],
) -> Result<Vec<ScanCandidate>, MergerError> {
    let source = source
        .canonicalize()
        .map_err(|_| MergerError::ScanSourceMissing(source.display().to_string()))?;
    let golden = compile_pattern(golden_pattern)?;
    let fragment = compile_pattern(fragment_pattern)?;

    let excluded: Vec<PathBuf> = exclude
        .iter()
        .map(|p| p.canonicalize().unwrap_or_else(|_| p.clone()))
        .collect();

    let mut builder = WalkBuilder::new(&source);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry: &DirEntry| {
            if entry.depth() > 0 && is_vcs_metadata(&entry.file_name().to_string_lossy()) {
                return false;
            }
            !excluded.iter().any(|ex| entry.path().starts_with(ex))
        });

    let mut candidates = Vec::new();
    for result in builder.build() {
        let entry = result.map_err(|e| {
            MergerError::WalkFailed(format!("Failed to scan {}: {}", source.display(), e))
        })?;
        if !entry.file_type().is_some_and(|t| t.is_dir()) {
            continue;
        }
        let path = entry.path();
        if !looks_like_repo(path, &golden, &fragment) {
            continue;
        }

        let verdict = classify(&Signals::probe(path, &golden, &fragment));
        if verdict.classification == Classification::Unknown {
            tracing::debug!("Dropping unclassifiable candidate {}", path.display());
            continue;
        }

        tracing::debug!(
            "{} -> {} ({:.2}, {})",
            path.display(),
            verdict.classification,
            verdict.confidence,
            verdict.breakdown.reason()
        );
        candidates.push(ScanCandidate {
            path: path.to_path_buf(),
            classification: verdict.classification,
            confidence: verdict.confidence,
            reason: verdict.breakdown.reason(),
            digest: directory_digest(path)?,
        });
    }
    Ok(candidates)
}

// ============================================================================
// Fragment Assignment
// ============================================================================

/// Number of leading path components two paths share.
fn common_components(a: &Path, b: &Path) -> usize {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Fragments grouped under their golden, plus those nobody claimed.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub by_golden: BTreeMap<PathBuf, Vec<ScanCandidate>>,
    pub unassigned: Vec<ScanCandidate>,
}

impl Assignment {
    /// Fragments assigned to `golden`, in scan order.
    pub fn fragments_for(&self, golden: &Path) -> &[ScanCandidate] {
        self.by_golden.get(golden).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Attach every fragment to the golden sharing the longest path prefix.
///
/// Ties go to the earlier golden. A fragment sharing no component with any
/// golden stays unassigned.
pub fn assign_fragments(goldens: &[ScanCandidate], fragments: &[ScanCandidate]) -> Assignment {
    let mut assignment = Assignment::default();
    for golden in goldens {
        assignment.by_golden.entry(golden.path.clone()).or_default();
    }

    for fragment in fragments {
        let mut best: Option<(&ScanCandidate, usize)> = None;
        for golden in goldens {
            let score = common_components(&golden.path, &fragment.path);
            if score > best.map_or(0, |(_, s)| s) {
                best = Some((golden, score));
            }
        }
        match best {
            Some((golden, _)) => assignment
                .by_golden
                .entry(golden.path.clone())
                .or_default()
                .push(fragment.clone()),
            None => assignment.unassigned.push(fragment.clone()),
        }
    }
    assignment
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn signals(golden: bool, fragment: bool, layout: VcsLayout) -> Signals {
        Signals {
            name_matches_golden: golden,
            name_matches_fragment: fragment,
            layout,
        }
    }

    #[test]
    fn test_golden_name_with_remote_is_golden() {
        let verdict = classify(&signals(
            true,
            false,
            VcsLayout::WorkingTree { has_remote: true },
        ));
        assert_eq!(verdict.classification, Classification::Golden);
        assert_eq!(verdict.breakdown.golden, 5);
        assert_eq!(verdict.breakdown.fragment, 0);
        assert!(verdict.breakdown.golden >= verdict.breakdown.fragment + 1);
        assert_eq!(verdict.confidence, 1.0);
        assert_eq!(
            verdict.breakdown.reason(),
            "name-matches-golden-pattern,git-remote-found"
        );
    }

    #[test]
    fn test_plain_fragment_dir_is_fragment() {
        let verdict = classify(&signals(false, true, VcsLayout::None));
        assert_eq!(verdict.classification, Classification::Fragment);
        assert_eq!(verdict.breakdown.fragment, 2);
        assert_eq!(verdict.confidence, 0.5);
        assert_eq!(
            verdict.breakdown.reason(),
            "name-matches-fragment-pattern,missing-git-directory"
        );
    }

    #[test]
    fn test_git_without_remote_leans_golden() {
        // 2 golden vs 1 fragment.
        let verdict = classify(&signals(
            false,
            false,
            VcsLayout::WorkingTree { has_remote: false },
        ));
        assert_eq!(verdict.classification, Classification::Golden);
        assert_eq!(verdict.confidence, 0.25);
    }

    #[test]
    fn test_fragment_name_with_local_git_ties_to_fragment() {
        // 2 golden vs 2 fragment: a tie is a fragment.
        let verdict = classify(&signals(
            false,
            true,
            VcsLayout::WorkingTree { has_remote: false },
        ));
        assert_eq!(verdict.classification, Classification::Fragment);
        assert_eq!(verdict.confidence, 0.0);
    }

    #[test]
    fn test_bare_repo_scores() {
        let verdict = classify(&signals(false, false, VcsLayout::Bare { has_remote: false }));
        assert_eq!(verdict.classification, Classification::Golden);
        assert_eq!(verdict.breakdown.golden, 3);
        assert_eq!(verdict.breakdown.reason(), "bare-repo");

        let verdict = classify(&signals(false, false, VcsLayout::Bare { has_remote: true }));
        assert_eq!(verdict.breakdown.golden, 4);
        assert_eq!(verdict.breakdown.reason(), "bare-repo-with-remote");
    }

    #[test]
    fn test_classify_is_deterministic() {
        let s = signals(true, true, VcsLayout::WorkingTree { has_remote: true });
        assert_eq!(classify(&s), classify(&s));
    }

    fn scan_fixture() -> TempDir {
        let temp = TempDir::new().unwrap();
        let golden = temp.path().join("proj-golden");
        fs::create_dir_all(golden.join(".git")).unwrap();
        fs::write(
            golden.join(".git/config"),
            "[remote \"origin\"]\n\turl = git@example.com:demo/proj.git\n",
        )
        .unwrap();
        fs::write(golden.join("README.md"), "golden").unwrap();

        let fragment = temp.path().join("fragment-alpha");
        fs::create_dir_all(&fragment).unwrap();
        fs::write(fragment.join("file.txt"), "alpha").unwrap();

        fs::create_dir_all(temp.path().join("unrelated")).unwrap();
        temp
    }

    #[test]
    fn test_scan_finds_golden_and_fragment() {
        let temp = scan_fixture();
        let found = scan_for_repos(temp.path(), "*golden*", "fragment*", &[]).unwrap();

        assert_eq!(found.len(), 2);
        let golden: Vec<_> = found
            .iter()
            .filter(|c| c.classification == Classification::Golden)
            .collect();
        let fragments: Vec<_> = found
            .iter()
            .filter(|c| c.classification == Classification::Fragment)
            .collect();
        assert_eq!(golden.len(), 1);
        assert_eq!(fragments.len(), 1);
        assert!(golden[0].path.ends_with("proj-golden"));
        assert!(fragments[0].path.ends_with("fragment-alpha"));
        assert_eq!(fragments[0].digest.len(), 64);
    }

    #[test]
    fn test_scan_respects_exclusions() {
        let temp = scan_fixture();
        let found = scan_for_repos(
            temp.path(),
            "*golden*",
            "fragment*",
            &[temp.path().join("fragment-alpha")],
        )
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].classification, Classification::Golden);
    }

    fn make_bare_repo(path: &Path, config: &str) {
        fs::create_dir_all(path.join("objects")).unwrap();
        fs::create_dir_all(path.join("refs/heads")).unwrap();
        fs::write(path.join("HEAD"), "ref: refs/heads/main\n").unwrap();
        fs::write(path.join("config"), config).unwrap();
    }

    #[test]
    fn test_scan_detects_bare_repositories() {
        let temp = TempDir::new().unwrap();
        make_bare_repo(&temp.path().join("store.git"), "[core]\n\tbare = true\n");
        make_bare_repo(
            &temp.path().join("mirror"),
            "[core]\n\tbare = true\n[remote \"origin\"]\n\turl = https://example.com/acme/widget.git\n",
        );

        let found = scan_for_repos(temp.path(), "*golden*", "fragment*", &[]).unwrap();
        assert_eq!(found.len(), 2);

        let mirror = &found[0];
        assert!(mirror.path.ends_with("mirror"));
        assert_eq!(mirror.classification, Classification::Golden);
        assert_eq!(mirror.reason, "bare-repo-with-remote");
        assert!((mirror.confidence - 1.0).abs() < f64::EPSILON);

        let store = &found[1];
        assert!(store.path.ends_with("store.git"));
        assert_eq!(store.classification, Classification::Golden);
        assert_eq!(store.reason, "bare-repo");
        assert!((store.confidence - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_scan_missing_source() {
        let temp = TempDir::new().unwrap();
        let err = scan_for_repos(&temp.path().join("nope"), "*golden*", "fragment*", &[])
            .unwrap_err();
        assert!(matches!(err, MergerError::ScanSourceMissing(_)));
    }

    #[test]
    fn test_scan_invalid_pattern() {
        let temp = TempDir::new().unwrap();
        let err = scan_for_repos(temp.path(), "[", "fragment*", &[]).unwrap_err();
        assert!(matches!(err, MergerError::InvalidPattern { .. }));
    }

    fn candidate(path: &str, classification: Classification) -> ScanCandidate {
        ScanCandidate {
            path: PathBuf::from(path),
            classification,
            confidence: 1.0,
            reason: String::new(),
            digest: String::new(),
        }
    }

    #[test]
    fn test_assign_fragments_by_longest_prefix() {
        let goldens = vec![
            candidate("/src/a/proj-golden", Classification::Golden),
            candidate("/src/b/other-golden", Classification::Golden),
        ];
        let fragments = vec![
            candidate("/src/b/fragment-1", Classification::Fragment),
            candidate("/src/a/deep/fragment-2", Classification::Fragment),
        ];
        let assignment = assign_fragments(&goldens, &fragments);

        let a = assignment.fragments_for(Path::new("/src/a/proj-golden"));
        let b = assignment.fragments_for(Path::new("/src/b/other-golden"));
        assert_eq!(a.len(), 1);
        assert!(a[0].path.ends_with("fragment-2"));
        assert_eq!(b.len(), 1);
        assert!(b[0].path.ends_with("fragment-1"));
        assert!(assignment.unassigned.is_empty());
    }

    #[test]
    fn test_assign_without_goldens_leaves_all_unassigned() {
        let fragments = vec![candidate("/src/fragment-1", Classification::Fragment)];
        let assignment = assign_fragments(&[], &fragments);
        assert_eq!(assignment.unassigned.len(), 1);
    }
}
