//! Filesystem copy helpers shared by ingestion, recovery, and merge overlay.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use ignore::{DirEntry, WalkBuilder};

use crate::constants::is_vcs_metadata;
use crate::errors::MergerError;

/// Copy a single file, carrying permissions and modification time over.
pub fn copy_file_with_metadata(source: &Path, destination: &Path) -> Result<(), MergerError> {
    let meta = fs::metadata(source)?;
    let mut reader = File::open(source)?;
    let mut writer = File::create(destination)?;
    io::copy(&mut reader, &mut writer)?;
    if let Ok(modified) = meta.modified() {
        writer.set_modified(modified)?;
    }
    drop(writer);
    // Permissions last, a read-only source would otherwise block the mtime write.
    fs::set_permissions(destination, meta.permissions())?;
    Ok(())
}

/// Recreate a symlink at `destination` pointing where `source` points.
#[cfg(unix)]
fn copy_symlink(source: &Path, destination: &Path) -> Result<(), MergerError> {
    let target = fs::read_link(source)?;
    std::os::unix::fs::symlink(target, destination)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, destination: &Path) -> Result<(), MergerError> {
    // No portable link creation; fall back to copying what the link resolves to.
    if source.is_dir() {
        copy_tree(source, destination)
    } else {
        copy_file_with_metadata(source, destination)
    }
}

/// Recursively copy `source` to `destination`, preserving symlinks as links.
pub fn copy_tree(source: &Path, destination: &Path) -> Result<(), MergerError> {
    copy_tree_inner(source, destination, false)
}

/// Same as [`copy_tree`], skipping version-control metadata directories.
pub fn copy_tree_without_vcs(source: &Path, destination: &Path) -> Result<(), MergerError> {
    copy_tree_inner(source, destination, true)
}

fn copy_tree_inner(source: &Path, destination: &Path, skip_vcs: bool) -> Result<(), MergerError> {
    let mut builder = WalkBuilder::new(source);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry: &DirEntry| {
            entry.depth() == 0
                || !skip_vcs
                || !is_vcs_metadata(&entry.file_name().to_string_lossy())
        });

    fs::create_dir_all(destination)?;
    for result in builder.build() {
        let entry = result.map_err(|e| {
            MergerError::WalkFailed(format!("Failed to walk {}: {}", source.display(), e))
        })?;
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        if rel.as_os_str().is_empty() {
            continue;
        }
        let to = destination.join(rel);
        if file_type.is_symlink() {
            copy_symlink(entry.path(), &to)?;
        } else if file_type.is_dir() {
            fs::create_dir_all(&to)?;
        } else {
            copy_file_with_metadata(entry.path(), &to)?;
        }
    }
    Ok(())
}

fn remove_existing(path: &Path) -> Result<(), MergerError> {
    let meta = fs::symlink_metadata(path)?;
    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Overwrite files under `target` with every file under `source`.
///
/// Version-control metadata is never copied. Symlinks replace whatever sits
/// at their path in `target`. Parent directories are created as needed. Returns the number of files written.
pub fn overlay_files(source: &Path, target: &Path) -> Result<usize, MergerError> {
    let mut builder = WalkBuilder::new(source);
    builder
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(|entry: &DirEntry| {
            entry.depth() == 0 || !is_vcs_metadata(&entry.file_name().to_string_lossy())
        });

    let mut written = 0;
    for result in builder.build() {
        let entry = result.map_err(|e| {
            MergerError::WalkFailed(format!("Failed to walk {}: {}", source.display(), e))
        })?;
        let path = entry.path();
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_dir() {
            continue;
        }
        let Ok(rel) = path.strip_prefix(source) else {
            continue;
        };
        let dest = target.join(rel);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        if file_type.is_symlink() {
            // Links are recreated, not written through.
            if fs::symlink_metadata(&dest).is_ok() {
                remove_existing(&dest)?;
            }
            copy_symlink(path, &dest)?;
        } else {
            copy_file_with_metadata(path, &dest)?;
        }
        written += 1;
    }
    Ok(written)
}
