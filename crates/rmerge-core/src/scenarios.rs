//! Catalogue of anomalies the pipeline records instead of resolving.
//!
//! Every kind the pipeline can flag is listed in [`ScenarioKind`] with a
//! fixed handler id and [`HandlingStrategy`]. New kinds are added here by a
//! developer; nothing is generated at run time.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::MergerError;

/// How a flagged scenario is followed up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlingStrategy {
    /// Logged only.
    Log,
    /// Logged and written to `scenarios.json`.
    Persist,
    /// Persisted and shown to the user at the end of the run.
    Surface,
}

impl HandlingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Persist => "persist",
            Self::Surface => "surface",
        }
    }

    /// Whether entries of this strategy end up in `scenarios.json`.
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persist | Self::Surface)
    }
}

/// Known anomaly kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    /// An ingested fragment is gone from the workspace.
    MissingFragment,
    /// A fragment ingested as version-controlled has no usable history.
    GitMetadataMissing,
    /// The working-tree status of a fragment could not be read.
    GitInspectionError,
}

impl ScenarioKind {
    /// Every kind, in catalogue order.
    pub const ALL: [ScenarioKind; 3] = [
        Self::MissingFragment,
        Self::GitMetadataMissing,
        Self::GitInspectionError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingFragment => "missing-fragment",
            Self::GitMetadataMissing => "git-metadata-missing",
            Self::GitInspectionError => "git-inspection-error",
        }
    }

    /// Stable handler id recorded on analyses.
    pub fn handler_id(&self) -> &'static str {
        match self {
            Self::MissingFragment => "handle_missing_fragment",
            Self::GitMetadataMissing => "handle_git_metadata_missing",
            Self::GitInspectionError => "handle_git_inspection_error",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::MissingFragment => "Fragment path missing in workspace.",
            Self::GitMetadataMissing => "Fragment expected git metadata but none found.",
            Self::GitInspectionError => "Failed to gather git metadata for fragment.",
        }
    }

    pub fn strategy(&self) -> HandlingStrategy {
        match self {
            Self::MissingFragment => HandlingStrategy::Surface,
            Self::GitMetadataMissing => HandlingStrategy::Persist,
            // The history itself is intact, the read is retried next run.
            Self::GitInspectionError => HandlingStrategy::Log,
        }
    }
}

impl std::fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One flagged occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnhandledScenario {
    pub handler: String,
    pub kind: ScenarioKind,
    pub description: String,
    #[serde(default)]
    pub context: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ScenariosFile<'a> {
    scenarios: Vec<&'a UnhandledScenario>,
}

/// Collects flagged scenarios for one run.
#[derive(Debug, Default)]
pub struct ScenarioRegistry {
    entries: Vec<UnhandledScenario>,
}

impl ScenarioRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an occurrence of `kind` and return its handler id.
    pub fn flag(
        &mut self,
        kind: ScenarioKind,
        description: &str,
        context: BTreeMap<String, String>,
    ) -> &'static str {
        let handler = kind.handler_id();
        tracing::warn!("Unhandled scenario '{}' captured. Handler: {}", description, handler);
        self.entries.push(UnhandledScenario {
            handler: handler.to_string(),
            kind,
            description: description.to_string(),
            context,
        });
        handler
    }

    pub fn entries(&self) -> &[UnhandledScenario] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries the user should see once the run ends.
    pub fn surfaced(&self) -> impl Iterator<Item = &UnhandledScenario> {
        self.entries
            .iter()
            .filter(|e| e.kind.strategy() == HandlingStrategy::Surface)
    }

    /// Write persisted entries to `path`. Returns how many were written.
    pub fn save(&self, path: &Path) -> Result<usize, MergerError> {
        let scenarios: Vec<&UnhandledScenario> = self
            .entries
            .iter()
            .filter(|e| e.kind.strategy().is_persisted())
            .collect();
        if scenarios.is_empty() {
            return Ok(0);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let count = scenarios.len();
        fs::write(path, serde_json::to_string_pretty(&ScenariosFile { scenarios })?)?;
        tracing::info!("Wrote {} scenario(s) to {}", count, path.display());
        Ok(count)
    }
}

/// Build a scenario context map from string pairs.
pub fn context<const N: usize>(pairs: [(&str, String); N]) -> BTreeMap<String, String> {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
