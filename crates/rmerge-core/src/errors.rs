//! Error types for rmerge-core.

use std::path::PathBuf;

use thiserror::Error;

/// Domain-specific errors for reconciliation runs.
///
/// Only conditions that stop a run are errors. Per-fragment anomalies
/// (a fragment vanished, history could not be read) are recorded through
/// the [`ScenarioRegistry`](crate::scenarios::ScenarioRegistry) instead.
#[derive(Error, Debug)]
pub enum MergerError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// A required path does not exist.
    #[error("Path not found: {0}")]
    PathNotFound(String),

    /// The directory to scan does not exist.
    #[error("Scan source directory does not exist: {0}. Use --scan-create-structure to create it.")]
    ScanSourceMissing(String),

    /// A glob pattern could not be compiled.
    #[error("Invalid pattern `{pattern}`: {reason}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Parser diagnostic.
        reason: String,
    },

    /// A configuration value is invalid.
    #[error("Invalid configuration: {message}. {hint}")]
    InvalidConfiguration {
        /// Description of the invalid configuration.
        message: String,
        /// Actionable hint on how to fix it.
        hint: String,
    },

    /// Global configuration file could not be read or parsed.
    #[error("Global config invalid: {0}")]
    InvalidGlobalConfig(String),

    /// Invalid argument provided to a command.
    #[error("{0}")]
    InvalidArgument(String),

    /// The mirrored golden has no version-control metadata, so no checkout
    /// can be made from it.
    #[error("Golden at `{0}` has no git metadata; merge mode needs a git golden.")]
    GoldenNotVersioned(PathBuf),

    // =========================================================================
    // Collision Errors
    // =========================================================================
    /// A fragment destination exists but cannot be reused.
    #[error("Fragment destination `{path}` cannot be reused: {reason}")]
    FragmentCollision {
        /// The colliding destination path.
        path: PathBuf,
        /// Why the existing entry is not reusable.
        reason: String,
    },

    /// A workspace directory exists but is not a directory.
    #[error("Existing {describe} is not a directory: {path}")]
    WorkspaceCollision {
        /// Which workspace directory collided.
        describe: String,
        /// The colliding path.
        path: PathBuf,
    },

    // =========================================================================
    // External Tool Errors
    // =========================================================================
    /// A git command exited with a non-zero status.
    #[error("`{command}` failed: {stderr}")]
    GitCommand {
        /// The command line that was run.
        command: String,
        /// Diagnostic output of the command, verbatim.
        stderr: String,
    },

    /// The git executable could not be started.
    #[error("git executable not available: {0}")]
    GitUnavailable(String),

    /// Walking a directory tree failed.
    #[error("Directory walk failed: {0}")]
    WalkFailed(String),

    // =========================================================================
    // Wrapped Errors
    // =========================================================================
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization/deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A wrapped generic error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MergerError {
    /// Build a [`MergerError::GitCommand`] from argv and captured stderr.
    pub fn git_command(args: &[&str], stderr: &[u8]) -> Self {
        Self::GitCommand {
            command: format!("git {}", args.join(" ")),
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        }
    }
}
