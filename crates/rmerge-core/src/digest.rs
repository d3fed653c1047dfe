//! Content fingerprints for directory trees.
//!
//! Two fingerprints are computed here:
//!
//! - [`directory_digest`]: one cheap SHA-256 over the sorted
//!   `(relative path, size, mtime)` triples of every file under a directory.
//!   It changes whenever a file is touched and is used by the ledger to
//!   decide whether a scan candidate changed since it was ingested.
//! - [`build_manifest`]: a per-file content manifest (path, size, SHA-256 of
//!   the bytes) excluding version-control metadata. Two manifests are
//!   compared with [`diff_manifests`] to measure how a fragment differs
//!   from golden.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use ignore::{DirEntry, WalkBuilder};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::{is_vcs_metadata, DIFF_SUMMARY_EXAMPLES};
use crate::errors::MergerError;

// ============================================================================
// Walking
// ============================================================================

/// Collect every regular file under `root` (following file symlinks, never
/// descending into directory symlinks), sorted by relative path.
///
/// When `skip_vcs` is set, version-control metadata entries are pruned. A
/// missing root has no files.
fn collect_files(root: &Path, skip_vcs: bool) -> Result<Vec<(String, PathBuf)>, MergerError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b));
    if skip_vcs {
        builder.filter_entry(|entry: &DirEntry| {
            entry.depth() == 0 || !is_vcs_metadata(&entry.file_name().to_string_lossy())
        });
    }

    let mut files = Vec::new();
    for result in builder.build() {
        let entry = result.map_err(|e| {
            MergerError::WalkFailed(format!("Failed to walk {}: {}", root.display(), e))
        })?;
        let path = entry.path();
        if path == root {
            continue;
        }

        // Follow symlinks for the type check only, like a plain stat.
        let is_file = match fs::metadata(path) {
            Ok(meta) => meta.is_file(),
            Err(_) => {
                tracing::debug!("Skipping unreadable entry {}", path.display());
                false
            }
        };
        if !is_file {
            continue;
        }

        let rel = match path.strip_prefix(root) {
            Ok(rel) => rel,
            Err(_) => continue,
        };
        files.push((relative_key(rel), path.to_path_buf()));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

/// Normalize a relative path to a `/`-separated key.
pub fn relative_key(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

// ============================================================================
// Hashing
// ============================================================================

/// SHA-256 of a file's contents, hex encoded.
pub fn sha256_file(path: &Path) -> Result<String, MergerError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Combined digest of a directory for scan idempotency.
///
/// Covers every file, metadata directories included, by relative path,
/// size and modification time in nanoseconds. File contents are not read.
pub fn directory_digest(root: &Path) -> Result<String, MergerError> {
    let mut hasher = Sha256::new();
    for (rel, path) in collect_files(root, false)? {
        let meta = fs::metadata(&path)?;
        let mtime_ns = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        hasher.update(rel.as_bytes());
        hasher.update([0u8]);
        hasher.update(meta.len().to_string().as_bytes());
        hasher.update([0u8]);
        hasher.update(mtime_ns.to_string().as_bytes());
        hasher.update([b'\n']);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ============================================================================
// Content Manifests
// ============================================================================

/// One file's fingerprint in a content manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifestEntry {
    /// `/`-separated path relative to the manifest root.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex SHA-256 of the contents.
    pub sha256: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ManifestFile {
    files: Vec<FileManifestEntry>,
}

/// Build the content manifest of a tree, excluding version-control metadata.
///
/// Entries are sorted by path.
pub fn build_manifest(root: &Path) -> Result<Vec<FileManifestEntry>, MergerError> {
    let mut entries = Vec::new();
    for (rel, path) in collect_files(root, true)? {
        let size = fs::metadata(&path)?.len();
        entries.push(FileManifestEntry {
            path: rel,
            size,
            sha256: sha256_file(&path)?,
        });
    }
    Ok(entries)
}

/// Write a manifest as `{"files": [...]}`.
pub fn write_manifest(path: &Path, entries: &[FileManifestEntry]) -> Result<(), MergerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let payload = ManifestFile {
        files: entries.to_vec(),
    };
    fs::write(path, serde_json::to_string_pretty(&payload)?)?;
    Ok(())
}

/// Read a manifest written by [`write_manifest`].
pub fn read_manifest(path: &Path) -> Result<Vec<FileManifestEntry>, MergerError> {
    let content = fs::read_to_string(path)?;
    let manifest: ManifestFile = serde_json::from_str(&content)?;
    Ok(manifest.files)
}

// ============================================================================
// Diffing
// ============================================================================

/// Path-level difference between golden and a fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestDiff {
    /// Paths only the fragment has.
    pub added: Vec<String>,
    /// Paths only golden has.
    pub removed: Vec<String>,
    /// Shared paths whose content hashes differ.
    pub modified: Vec<String>,
}

impl ManifestDiff {
    /// True when no path was added, removed, or modified.
    pub fn is_clean(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Human-readable summary, or `None` for a clean diff.
    ///
    /// Format: `added:2 (a, b); removed:1 (c); modified:4 (d, e, f)`, listing
    /// at most three example paths per category.
    pub fn summary(&self) -> Option<String> {
        if self.is_clean() {
            return None;
        }
        let parts: Vec<String> = [
            ("added", &self.added),
            ("removed", &self.removed),
            ("modified", &self.modified),
        ]
        .into_iter()
        .filter(|(_, paths)| !paths.is_empty())
        .map(|(label, paths)| {
            let examples: Vec<&str> = paths
                .iter()
                .take(DIFF_SUMMARY_EXAMPLES)
                .map(String::as_str)
                .collect();
            format!("{}:{} ({})", label, paths.len(), examples.join(", "))
        })
        .collect();
        Some(parts.join("; "))
    }
}

/// Set difference of two manifests keyed by path.
pub fn diff_manifests(golden: &[FileManifestEntry], fragment: &[FileManifestEntry]) -> ManifestDiff {
    let golden_map: BTreeMap<&str, &str> = golden
        .iter()
        .map(|e| (e.path.as_str(), e.sha256.as_str()))
        .collect();
    let fragment_map: BTreeMap<&str, &str> = fragment
        .iter()
        .map(|e| (e.path.as_str(), e.sha256.as_str()))
        .collect();

    let mut diff = ManifestDiff::default();
    for (path, hash) in &fragment_map {
        match golden_map.get(path) {
            None => diff.added.push(path.to_string()),
            Some(golden_hash) if golden_hash != hash => diff.modified.push(path.to_string()),
            Some(_) => {}
        }
    }
    for path in golden_map.keys() {
        if !fragment_map.contains_key(path) {
            diff.removed.push(path.to_string());
        }
    }
    diff
}

/// Build both manifests and diff them.
pub fn diff_trees(golden: &Path, fragment: &Path) -> Result<ManifestDiff, MergerError> {
    let golden_entries = build_manifest(golden)?;
    let fragment_entries = build_manifest(fragment)?;
    Ok(diff_manifests(&golden_entries, &fragment_entries))
}

// ============================================================================
// Tests
// ============================================================================
