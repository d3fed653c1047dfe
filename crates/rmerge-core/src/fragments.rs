//! Fragment ingestion.
//!
//! Each fragment source is copied into `<workspace>/fragments/<fragment_id>/`
//! under an id that is stable for a given absolute source path and position.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::constants::GIT_DIR;
use crate::errors::MergerError;
use crate::fsutil::{copy_file_with_metadata, copy_tree};
use crate::workspace::Workspace;

/// What a fragment source is on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// A directory with version-control metadata.
    GitLike,
    /// A plain directory.
    Directory,
    /// A regular file.
    File,
    /// Anything else (sockets, dangling links, ...).
    Other,
}

impl SourceKind {
    /// Classify `path`, following symlinks.
    pub fn detect(path: &Path) -> Self {
        if path.is_dir() {
            if path.join(GIT_DIR).exists() {
                Self::GitLike
            } else {
                Self::Directory
            }
        } else if path.is_file() {
            Self::File
        } else {
            Self::Other
        }
    }

    /// Only version-controlled sources carry history.
    pub fn has_history(&self) -> bool {
        match self {
            Self::GitLike => true,
            Self::Directory | Self::File | Self::Other => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GitLike => "git-like",
            Self::Directory => "directory",
            Self::File => "file",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fragment after ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub fragment_id: String,
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(rename = "source_type")]
    pub kind: SourceKind,
    /// RFC 3339 time of ingestion.
    pub timestamp: String,
    #[serde(rename = "has_git")]
    pub has_history: bool,
    /// Set by recovery once synthetic history exists.
    #[serde(default)]
    pub recovered_repo: Option<PathBuf>,
    /// False when the destination already existed and was reused.
    #[serde(default)]
    pub copied: bool,
}

#[derive(Serialize, Deserialize)]
struct FragmentsManifest {
    fragments: Vec<FragmentRecord>,
}

/// Keep alphanumerics, `-` and `_`; everything else becomes `-`.
pub fn sanitize_name(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// `{index:03}-{sanitized basename}-{sha1(source)[..8]}`.
///
/// `index` is 1-based. `source` should already be absolute.
pub fn fragment_id(source: &Path, index: usize) -> String {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "fragment".to_string());
    let digest = Sha1::digest(source.to_string_lossy().as_bytes());
    let short = hex::encode(digest);
    format!("{:03}-{}-{}", index, sanitize_name(&name), &short[..8])
}

/// Copy every source into the workspace and produce one record per source.
///
/// Records come back in input order. A missing source aborts the batch. An
/// existing destination of the right kind is reused (`copied: false`); one
/// of the wrong kind is a [`MergerError::FragmentCollision`]. Unless
/// `dry_run`, `fragments_manifest.json` is rewritten with all records.
pub fn ingest_fragments(
    sources: &[PathBuf],
    workspace: &Workspace,
    dry_run: bool,
) -> Result<Vec<FragmentRecord>, MergerError> {
    let mut records = Vec::with_capacity(sources.len());
    for (offset, source) in sources.iter().enumerate() {
        records.push(ingest_one(source, offset + 1, workspace, dry_run)?);
    }

    if dry_run {
        tracing::info!("Dry run: fragment manifest not written.");
    } else {
        write_fragment_manifest(&workspace.fragments_manifest_path(), &records)?;
    }
    Ok(records)
}

fn ingest_one(
    source: &Path,
    index: usize,
    workspace: &Workspace,
    dry_run: bool,
) -> Result<FragmentRecord, MergerError> {
    let source = source.canonicalize().map_err(|_| {
        MergerError::PathNotFound(format!("Fragment path does not exist: {}", source.display()))
    })?;

    let fragment_id = fragment_id(&source, index);
    let destination = workspace.fragment_dir(&fragment_id);
    let kind = SourceKind::detect(&source);
    let mut copied = false;

    if dry_run {
        tracing::info!(
            "Dry run: would copy fragment {} -> {} (type={})",
            source.display(),
            destination.display(),
            kind
        );
    } else if destination.exists() || destination.is_symlink() {
        check_reusable(&source, &destination)?;
        tracing::debug!(
            "Fragment destination {} already present; skipping copy",
            destination.display()
        );
    } else if source.is_dir() {
        tracing::info!(
            "Copying fragment directory {} -> {}",
            source.display(),
            destination.display()
        );
        copy_tree(&source, &destination)?;
        copied = true;
    } else {
        tracing::info!(
            "Copying fragment file {} -> {}",
            source.display(),
            destination.display()
        );
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_file_with_metadata(&source, &destination)?;
        copied = true;
    }

    Ok(FragmentRecord {
        fragment_id,
        source,
        destination,
        kind,
        timestamp: Utc::now().to_rfc3339(),
        has_history: kind.has_history(),
        recovered_repo: None,
        copied,
    })
}

fn check_reusable(source: &Path, destination: &Path) -> Result<(), MergerError> {
    let reason = if source.is_dir() && !destination.is_dir() {
        Some("source is a directory but destination is not")
    } else if !source.is_dir() && destination.is_dir() {
        Some("source is a file but destination is a directory")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(MergerError::FragmentCollision {
            path: destination.to_path_buf(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Write `{"fragments": [...]}` to `path`.
pub fn write_fragment_manifest(path: &Path, records: &[FragmentRecord]) -> Result<(), MergerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let manifest = FragmentsManifest {
        fragments: records.to_vec(),
    };
    fs::write(path, serde_json::to_string_pretty(&manifest)?)?;
    tracing::info!("Wrote fragment manifest to {}", path.display());
    Ok(())
}

/// Read back a fragments manifest. A missing file yields no records.
pub fn read_fragment_manifest(path: &Path) -> Result<Vec<FragmentRecord>, MergerError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let manifest: FragmentsManifest = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(manifest.fragments)
}
