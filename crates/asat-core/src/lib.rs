mod git;
mod patterns;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use git::{ChangeKind, ChangedPath, CheckoutSession, GitContext, GitError, GitWorkingCopy};
pub use patterns::{ExclusionReason, PatternMatcher, PatternShape};

pub const UNKNOWN_COORDINATE: &str = "unknown";
pub const DEFAULT_LANGUAGE: &str = "java";
pub const DEFAULT_MINIMUM_PRIORITY: u32 = 5;

pub type RevisionHash = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    pub hash: RevisionHash,
    pub parents: Vec<RevisionHash>,
    pub timestamp: i64,
}

impl Revision {
    pub fn new(hash: impl Into<String>, parents: Vec<String>, timestamp: i64) -> Self {
        Self {
            hash: normalize_hash(&hash.into()),
            parents: parents.iter().map(|parent| normalize_hash(parent)).collect(),
            timestamp,
        }
    }

    pub fn is_origin(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Identity of one build module inside a (possibly multi-module) descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub group: String,
    pub artifact: String,
    pub version: String,
}

impl ModuleIdentity {
    pub fn from_coordinates(
        group: Option<&str>,
        artifact: Option<&str>,
        version: Option<&str>,
    ) -> Self {
        Self {
            group: coordinate_or_unknown(group),
            artifact: coordinate_or_unknown(artifact),
            version: coordinate_or_unknown(version),
        }
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.group, self.artifact, self.version)
    }
}

/// Effective static-analysis setup of one module at one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfiguration {
    pub source_directory: Option<String>,
    pub test_source_directory: Option<String>,
    pub rule_set: BTreeSet<String>,
    pub custom_rule_files: BTreeSet<String>,
    pub file_excludes: BTreeSet<String>,
    pub file_includes: BTreeSet<String>,
    pub root_excludes: BTreeSet<String>,
    pub exclude_from_failure_files: BTreeSet<String>,
    pub uses_pmd: bool,
    pub uses_checkstyle: bool,
    pub uses_findbugs: bool,
    pub uses_spotbugs: bool,
    pub uses_sonar: bool,
    pub uses_error_prone: bool,
    pub minimum_priority: u32,
    pub language: String,
    pub include_tests: bool,
    pub plugin_version: Option<String>,
    pub plugin_build_count: u32,
    pub plugin_reporting_count: u32,
}

impl Default for ModuleConfiguration {
    fn default() -> Self {
        Self {
            source_directory: None,
            test_source_directory: None,
            rule_set: BTreeSet::new(),
            custom_rule_files: BTreeSet::new(),
            file_excludes: BTreeSet::new(),
            file_includes: BTreeSet::new(),
            root_excludes: BTreeSet::new(),
            exclude_from_failure_files: BTreeSet::new(),
            uses_pmd: false,
            uses_checkstyle: false,
            uses_findbugs: false,
            uses_spotbugs: false,
            uses_sonar: false,
            uses_error_prone: false,
            minimum_priority: DEFAULT_MINIMUM_PRIORITY,
            language: DEFAULT_LANGUAGE.to_owned(),
            include_tests: false,
            plugin_version: None,
            plugin_build_count: 0,
            plugin_reporting_count: 0,
        }
    }
}

/// One emitted configuration record: a module's state starting at `revision`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigurationRow {
    pub revision: RevisionHash,
    pub module: ModuleIdentity,
    #[serde(flatten)]
    pub configuration: ModuleConfiguration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub file_path: String,
    pub line: u32,
    pub rule_id: String,
    pub message: String,
    /// 1-based ordinal of the warning within its file.
    pub position: u32,
}

pub fn normalize_path(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn normalize_hash(hash: &str) -> String {
    hash.trim().to_ascii_lowercase()
}

fn coordinate_or_unknown(value: Option<&str>) -> String {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(UNKNOWN_COORDINATE)
        .to_owned()
}
