use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use asat_core::{WarningRecord, normalize_path};
use serde::{Deserialize, Serialize};

use crate::AnalysisError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub line: u32,
    pub rule: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    #[serde(default)]
    pub loc: u64,
    #[serde(default)]
    pub lloc: u64,
    #[serde(default)]
    pub mccc: u64,
}

impl std::ops::AddAssign for FileMetrics {
    fn add_assign(&mut self, other: Self) {
        self.loc += other.loc;
        self.lloc += other.lloc;
        self.mccc += other.mccc;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    #[serde(default)]
    pub warnings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<FileMetrics>,
}

/// Lint output of every analysed file at one revision, keyed by path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionReport {
    pub files: BTreeMap<String, FileReport>,
}

impl RevisionReport {
    /// Findings of `path` ordered by line as warning records. Findings on
    /// the same line keep their recorded order; `position` numbers the
    /// result from 1.
    pub fn warnings(&self, path: &str) -> Vec<WarningRecord> {
        let Some(report) = self.files.get(path) else {
            return Vec::new();
        };
        let mut findings = report.warnings.iter().collect::<Vec<_>>();
        findings.sort_by_key(|finding| finding.line);
        findings
            .into_iter()
            .enumerate()
            .map(|(index, finding)| WarningRecord {
                file_path: path.to_owned(),
                line: finding.line,
                rule_id: finding.rule.clone(),
                message: finding.message.clone(),
                position: u32::try_from(index + 1).unwrap_or(u32::MAX),
            })
            .collect()
    }

    pub fn metrics(&self, path: &str) -> Option<FileMetrics> {
        self.files.get(path).and_then(|report| report.metrics)
    }
}

/// Read-only access to recorded lint findings and file metrics.
pub trait WarningSource {
    fn revision(&self, revision: &str) -> Result<RevisionReport, AnalysisError>;
}

impl<T: WarningSource + ?Sized> WarningSource for &T {
    fn revision(&self, revision: &str) -> Result<RevisionReport, AnalysisError> {
        (**self).revision(revision)
    }
}

/// Reads `<dir>/<revision>.json`, a map from file path to findings and
/// optional metrics. Revisions without a file have no findings.
#[derive(Debug, Clone)]
pub struct JsonWarningSource {
    dir: PathBuf,
}

impl JsonWarningSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl WarningSource for JsonWarningSource {
    fn revision(&self, revision: &str) -> Result<RevisionReport, AnalysisError> {
        let path = self.dir.join(format!("{revision}.json"));
        if !path.is_file() {
            tracing::debug!(revision, path = %path.display(), "no recorded warnings");
            return Ok(RevisionReport::default());
        }

        let raw = fs::read_to_string(&path)?;
        let report: RevisionReport = serde_json::from_str(&raw)?;
        Ok(RevisionReport {
            files: report
                .files
                .into_iter()
                .map(|(file, report)| (normalize_path(&file), report))
                .collect(),
        })
    }
}
