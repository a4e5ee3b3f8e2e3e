use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::CatalogError;

const BUILTIN_OVERRIDES: &str = include_str!("../data/history_overrides.toml");

#[derive(Debug, Deserialize)]
struct OverridesFile {
    version: String,
    #[serde(default)]
    legacy_descriptor_names: Vec<String>,
    #[serde(default)]
    tracked_rule_files: Vec<String>,
    #[serde(default)]
    projects: BTreeMap<String, ProjectFile>,
}

#[derive(Debug, Default, Deserialize)]
struct ProjectFile {
    #[serde(default)]
    broken_rule_files: Vec<String>,
    #[serde(default)]
    descriptor_directories: Vec<DirectoryEntry>,
    #[serde(default)]
    descriptor_names: Vec<NameEntry>,
}

#[derive(Debug, Deserialize)]
struct DirectoryEntry {
    directory: String,
    revisions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct NameEntry {
    name: String,
    revisions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct RevisionOverride {
    value: String,
    revisions: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct ProjectOverrides {
    broken_rule_files: BTreeSet<String>,
    descriptor_directories: Vec<RevisionOverride>,
    descriptor_names: Vec<RevisionOverride>,
}

/// Per-project corrections for descriptors that were relocated or renamed
/// and rule files that never resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalOverrides {
    version: String,
    legacy_descriptor_names: BTreeSet<String>,
    tracked_rule_files: BTreeSet<String>,
    projects: BTreeMap<String, ProjectOverrides>,
}

impl HistoricalOverrides {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_OVERRIDES)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: OverridesFile = toml::from_str(raw)?;

        let projects = file
            .projects
            .into_iter()
            .map(|(name, project)| (name, ProjectOverrides::from(project)))
            .collect::<BTreeMap<_, _>>();

        let overrides = Self {
            version: file.version,
            legacy_descriptor_names: file
                .legacy_descriptor_names
                .iter()
                .map(|name| name.trim().to_ascii_lowercase())
                .collect(),
            tracked_rule_files: file
                .tracked_rule_files
                .iter()
                .map(|path| path.trim().to_ascii_lowercase())
                .collect(),
            projects,
        };
        tracing::debug!(
            version = %overrides.version,
            projects = overrides.projects.len(),
            "loaded historical overrides"
        );
        Ok(overrides)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Subdirectory holding the primary descriptor of `project` at `revision`.
    pub fn descriptor_directory(&self, project: &str, revision: &str) -> Option<&str> {
        let project = self.projects.get(project)?;
        lookup_revision(&project.descriptor_directories, revision)
    }

    /// Alternate descriptor file name used by `project` at `revision`.
    pub fn descriptor_name(&self, project: &str, revision: &str) -> Option<&str> {
        let project = self.projects.get(project)?;
        lookup_revision(&project.descriptor_names, revision)
    }

    pub fn is_known_broken(&self, project: &str, rule_file: &str) -> bool {
        self.projects
            .get(project)
            .is_some_and(|project| project.broken_rule_files.contains(rule_file.trim()))
    }

    pub fn is_legacy_descriptor_name(&self, path: &str) -> bool {
        self.legacy_descriptor_names
            .contains(&path.trim().to_ascii_lowercase())
    }

    pub fn is_tracked_rule_file(&self, path: &str) -> bool {
        self.tracked_rule_files
            .contains(&path.trim().to_ascii_lowercase())
    }
}

impl From<ProjectFile> for ProjectOverrides {
    fn from(project: ProjectFile) -> Self {
        Self {
            broken_rule_files: project
                .broken_rule_files
                .into_iter()
                .map(|path| path.trim().to_owned())
                .collect(),
            descriptor_directories: project
                .descriptor_directories
                .into_iter()
                .map(|entry| {
                    RevisionOverride::new(entry.directory.trim_end_matches('/'), entry.revisions)
                })
                .collect(),
            descriptor_names: project
                .descriptor_names
                .into_iter()
                .map(|entry| RevisionOverride::new(&entry.name, entry.revisions))
                .collect(),
        }
    }
}

impl RevisionOverride {
    fn new(value: &str, revisions: Vec<String>) -> Self {
        Self {
            value: value.trim().to_owned(),
            revisions: revisions
                .iter()
                .map(|revision| revision.trim().to_ascii_lowercase())
                .collect(),
        }
    }
}

fn lookup_revision<'a>(entries: &'a [RevisionOverride], revision: &str) -> Option<&'a str> {
    let revision = revision.trim().to_ascii_lowercase();
    entries
        .iter()
        .find(|entry| entry.revisions.contains(&revision))
        .map(|entry| entry.value.as_str())
}
