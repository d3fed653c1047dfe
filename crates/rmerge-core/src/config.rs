//! Configuration types for rmerge.
//!
//! [`MergerConfig`] is the user-level configuration stored in
//! `~/.rmerge/config.yaml`. Every field has a default, so a missing file is
//! not an error.
//!
//! ```yaml
//! scan:
//!   golden_pattern: "*golden*"
//!   fragment_pattern: "fragment*"
//!   exclude:
//!     - /home/me/src/archive
//! workspace:
//!   root: /home/me/merged
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_FRAGMENT_PATTERN, DEFAULT_GOLDEN_PATTERN, GLOBAL_CONFIG_FILENAME, RMERGE_HOME_DIR,
};
use crate::errors::MergerError;
use crate::scan::compile_pattern;

// ============================================================================
// MergerConfig
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergerConfig {
    /// Repository discovery settings.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Workspace defaults.
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

impl MergerConfig {
    /// Load the configuration from `~/.rmerge/config.yaml`.
    ///
    /// # Errors
    ///
    /// Returns [`MergerError::InvalidGlobalConfig`] if the file exists but cannot be parsed.
    pub fn load_default() -> Result<Self, MergerError> {
        match Self::default_path() {
            Some(path) => Self::from_path(&path),
            None => {
                tracing::debug!("Could not determine home directory, using default config");
                Ok(Self::default())
            }
        }
    }

    /// Load the configuration from a specific path.
    ///
    /// If the file does not exist, returns the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`MergerError::InvalidGlobalConfig`] if the file exists but cannot be parsed.
    /// Returns [`MergerError::InvalidConfiguration`] if validation fails.
    pub fn from_path(path: &Path) -> Result<Self, MergerError> {
        if !path.exists() {
            tracing::debug!("Config not found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| {
            MergerError::InvalidGlobalConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| {
            MergerError::InvalidGlobalConfig(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        for warning in config.validate()? {
            tracing::warn!("Config warning: {}", warning);
        }
        Ok(config)
    }

    /// Get the default config directory (`~/.rmerge`).
    pub fn default_dir() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(RMERGE_HOME_DIR))
    }

    /// Get the default config file path (`~/.rmerge/config.yaml`).
    pub fn default_path() -> Option<PathBuf> {
        Self::default_dir().map(|d| d.join(GLOBAL_CONFIG_FILENAME))
    }

    /// Validate the configuration.
    ///
    /// Both name patterns must compile. Non-fatal issues come back as
    /// warnings.
    pub fn validate(&self) -> Result<Vec<String>, MergerError> {
        let mut warnings = Vec::new();
        for (key, pattern) in [
            ("scan.golden_pattern", &self.scan.golden_pattern),
            ("scan.fragment_pattern", &self.scan.fragment_pattern),
        ] {
            if pattern.trim().is_empty() {
                return Err(MergerError::InvalidConfiguration {
                    message: format!("{} is empty", key),
                    hint: "Set a glob such as `*golden*` or `fragment*`.".to_string(),
                });
            }
            compile_pattern(pattern).map_err(|e| MergerError::InvalidConfiguration {
                message: format!("{} is not a valid glob", key),
                hint: e.to_string(),
            })?;
        }

        if self.scan.golden_pattern == self.scan.fragment_pattern {
            warnings.push(format!(
                "scan.golden_pattern and scan.fragment_pattern are both `{}`; name signals will cancel out",
                self.scan.golden_pattern
            ));
        }
        for path in &self.scan.exclude {
            if path.is_relative() {
                warnings.push(format!(
                    "scan.exclude entry {} is relative; it is resolved against the current directory",
                    path.display()
                ));
            }
        }
        Ok(warnings)
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Glob matched against directory names to spot golden repositories.
    #[serde(default = "default_golden_pattern")]
    pub golden_pattern: String,

    /// Glob matched against directory names to spot fragments.
    #[serde(default = "default_fragment_pattern")]
    pub fragment_pattern: String,

    /// Extra paths never descended into while scanning.
    #[serde(default)]
    pub exclude: Vec<PathBuf>,
}

fn default_golden_pattern() -> String {
    DEFAULT_GOLDEN_PATTERN.to_string()
}

fn default_fragment_pattern() -> String {
    DEFAULT_FRAGMENT_PATTERN.to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            golden_pattern: default_golden_pattern(),
            fragment_pattern: default_fragment_pattern(),
            exclude: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Default workspace root when `--workspace` is not given.
    #[serde(default)]
    pub root: Option<PathBuf>,
}
