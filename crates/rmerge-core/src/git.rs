//! Git plumbing.
//!
//! Every interaction with version control goes through the `git` executable.
//! Commands whose failure is fatal go through [`run_git`]; lookups whose
//! failure is tolerated go through [`try_git`], which logs and returns `None`.

use std::ffi::OsStr;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::process::{Command, Output};

use crate::constants::GIT_DIR;
use crate::errors::MergerError;

// ============================================================================
// Layout Probes
// ============================================================================

/// Check whether `path` has a standard `.git` metadata directory.
pub fn has_git_dir(path: &Path) -> bool {
    path.join(GIT_DIR).is_dir()
}

/// Check whether `path` has any `.git` entry (directory or worktree pointer file).
pub fn has_git_entry(path: &Path) -> bool {
    path.join(GIT_DIR).exists()
}

/// Check whether `path` is laid out like a bare repository.
///
/// A bare repository has a `HEAD` file, an `objects/` store and a `refs/`
/// directory, but no `.git` entry of its own.
pub fn is_bare_repo(path: &Path) -> bool {
    path.join("HEAD").is_file()
        && path.join("objects").is_dir()
        && path.join("refs").is_dir()
        && !path.join(GIT_DIR).exists()
}

/// Read a git config file, returning an empty string if it is unreadable.
pub fn read_git_config(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_default()
}

/// Check whether git config text declares a remote.
pub fn has_remote_from_config(config_text: &str) -> bool {
    let lowered = config_text.to_lowercase();
    lowered.contains("remote \"") || lowered.contains("url =")
}

// ============================================================================
// Command Execution
// ============================================================================

fn spawn<I, S>(cwd: &Path, args: I, env: &[(&str, &str)]) -> Result<Output, MergerError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut command = Command::new("git");
    command.arg("-C").arg(cwd).args(args);
    for (key, value) in env {
        command.env(key, value);
    }
    command.output().map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            MergerError::GitUnavailable(e.to_string())
        } else {
            MergerError::Io(e)
        }
    })
}

/// Run a git command in `cwd`, failing on a non-zero exit.
///
/// Returns stdout. The error carries the command line and stderr verbatim.
pub fn run_git(cwd: &Path, args: &[&str]) -> Result<String, MergerError> {
    run_git_with_env(cwd, args, &[])
}

/// Same as [`run_git`] with extra environment variables.
pub fn run_git_with_env(
    cwd: &Path,
    args: &[&str],
    env: &[(&str, &str)],
) -> Result<String, MergerError> {
    let output = spawn(cwd, args, env)?;
    if !output.status.success() {
        return Err(MergerError::git_command(args, &output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Run a git command whose failure is tolerated.
///
/// A non-zero exit is logged at debug level and yields `None`. A missing
/// git executable is still an error.
pub fn try_git(cwd: &Path, args: &[&str]) -> Result<Option<String>, MergerError> {
    let output = spawn(cwd, args, &[])?;
    if !output.status.success() {
        tracing::debug!(
            "git {} failed for {}: {}",
            args.join(" "),
            cwd.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}

/// Clone `source` into `destination`.
pub fn clone_repo(source: &Path, destination: &Path) -> Result<(), MergerError> {
    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    let source_arg = source.to_string_lossy();
    let dest_arg = destination.to_string_lossy();
    run_git(parent, &["clone", "--quiet", &source_arg, &dest_arg])?;
    Ok(())
}

/// Short working-tree status (`git status --short`).
pub fn status_short(repo: &Path) -> Result<String, MergerError> {
    run_git(repo, &["status", "--short"])
}

/// Check whether the git executable can be started.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
