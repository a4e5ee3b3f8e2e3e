//! Warning deltas between consecutive path revisions and per-revision
//! warning summaries.

use std::collections::{BTreeMap, BTreeSet};

use asat_config::AnalysisConfig;
use asat_core::{ChangeKind, ChangedPath, ConfigurationRow, GitWorkingCopy, PatternMatcher, Revision};
use serde::Serialize;

use crate::AnalysisError;
use crate::align::{EditOperation, align};
use crate::source::{FileMetrics, RevisionReport, WarningSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeLocation {
    Code,
    Test,
}

/// Files changed between two consecutive revisions of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionChanges {
    pub previous: String,
    pub revision: String,
    pub changes: Vec<ChangedPath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDelta {
    pub revision: String,
    pub previous_revision: String,
    pub file_path: String,
    pub change_location: ChangeLocation,
    pub distance: usize,
    /// Per-rule change in warning count for this file.
    pub deltas: BTreeMap<String, i64>,
    /// Running per-rule total over all rows so far.
    pub cumulative: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarningCounts {
    pub files: usize,
    pub warnings: BTreeMap<String, u64>,
    pub metrics: FileMetrics,
}

impl WarningCounts {
    fn add_file(&mut self, report: &RevisionReport, path: &str) {
        self.files += 1;
        if let Some(file) = report.files.get(path) {
            for finding in &file.warnings {
                *self.warnings.entry(finding.rule.clone()).or_default() += 1;
            }
        }
        if let Some(metrics) = report.metrics(path) {
            self.metrics += metrics;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionSummary {
    pub revision: String,
    pub timestamp: i64,
    pub code: WarningCounts,
    pub test: WarningCounts,
    /// Production files the active configuration actually analyses.
    pub effective_code: WarningCounts,
    pub effective_rules: BTreeSet<String>,
    pub has_configuration: bool,
}

/// Changed paths for every consecutive pair in `path`.
pub fn collect_revision_changes(
    working_copy: &GitWorkingCopy,
    path: &[String],
) -> Result<Vec<RevisionChanges>, AnalysisError> {
    let mut steps = Vec::with_capacity(path.len().saturating_sub(1));
    for pair in path.windows(2) {
        steps.push(RevisionChanges {
            previous: pair[0].clone(),
            revision: pair[1].clone(),
            changes: working_copy.changed_paths(Some(&pair[0]), &pair[1])?,
        });
    }
    Ok(steps)
}

/// Per-step totals over every modified source file of the step. Steps
/// without such files still get a row with empty deltas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionDelta {
    pub revision: String,
    pub previous_revision: String,
    pub files: usize,
    pub deltas: BTreeMap<String, i64>,
    pub cumulative: BTreeMap<String, i64>,
    pub metrics: MetricsDelta,
    pub cumulative_metrics: MetricsDelta,
}

/// Signed change in file metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsDelta {
    pub loc: i64,
    pub lloc: i64,
    pub mccc: i64,
}

impl MetricsDelta {
    fn between(before: Option<FileMetrics>, after: Option<FileMetrics>) -> Self {
        let before = before.unwrap_or_default();
        let after = after.unwrap_or_default();
        Self {
            loc: signed(after.loc) - signed(before.loc),
            lloc: signed(after.lloc) - signed(before.lloc),
            mccc: signed(after.mccc) - signed(before.mccc),
        }
    }
}

impl std::ops::AddAssign for MetricsDelta {
    fn add_assign(&mut self, other: Self) {
        self.loc += other.loc;
        self.lloc += other.lloc;
        self.mccc += other.mccc;
    }
}

/// Per-file and per-revision delta rows of one path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeltaHistory {
    pub files: Vec<FileDelta>,
    pub revisions: Vec<RevisionDelta>,
}

/// Per-file rows only; see [`delta_history`].
pub fn warning_deltas<S: WarningSource>(
    source: &S,
    config: &AnalysisConfig,
    steps: &[RevisionChanges],
) -> Result<Vec<FileDelta>, AnalysisError> {
    Ok(delta_history(source, config, steps)?.files)
}

/// Aligns the ordered rule ids of every modified source file before and
/// after each step and turns the edit script into per-rule deltas, one row
/// per file and one aggregated row per step.
pub fn delta_history<S: WarningSource>(
    source: &S,
    config: &AnalysisConfig,
    steps: &[RevisionChanges],
) -> Result<DeltaHistory, AnalysisError> {
    let mut history = DeltaHistory::default();
    let mut cumulative: BTreeMap<String, i64> = BTreeMap::new();
    let mut cumulative_metrics = MetricsDelta::default();
    let mut cached: Option<(String, RevisionReport)> = None;

    for step in steps {
        let previous = match cached.take() {
            Some((revision, report)) if revision == step.previous => report,
            _ => source.revision(&step.previous)?,
        };
        let current = source.revision(&step.revision)?;

        let mut step_row = RevisionDelta {
            revision: step.revision.clone(),
            previous_revision: step.previous.clone(),
            files: 0,
            deltas: BTreeMap::new(),
            cumulative: BTreeMap::new(),
            metrics: MetricsDelta::default(),
            cumulative_metrics: MetricsDelta::default(),
        };

        for change in &step.changes {
            if change.kind != ChangeKind::Modified
                || !is_source_file(&change.path, config)
                || !is_source_file(change.previous_path(), config)
            {
                continue;
            }

            let before = rule_ids(&previous, change.previous_path());
            let after = rule_ids(&current, &change.path);
            let alignment = align(&before, &after)?;

            let mut deltas: BTreeMap<String, i64> = BTreeMap::new();
            for operation in &alignment.operations {
                let delta = match operation {
                    EditOperation::Add { .. } => 1,
                    EditOperation::Delete { .. } => -1,
                };
                *deltas.entry(operation.token().clone()).or_default() += delta;
            }
            deltas.retain(|_, delta| *delta != 0);
            for (rule, delta) in &deltas {
                *cumulative.entry(rule.clone()).or_default() += delta;
                *step_row.deltas.entry(rule.clone()).or_default() += delta;
            }

            step_row.files += 1;
            step_row.metrics += MetricsDelta::between(
                previous.metrics(change.previous_path()),
                current.metrics(&change.path),
            );

            history.files.push(FileDelta {
                revision: step.revision.clone(),
                previous_revision: step.previous.clone(),
                file_path: change.path.clone(),
                change_location: change_location(&change.path, config),
                distance: alignment.distance,
                deltas,
                cumulative: cumulative.clone(),
            });
        }

        step_row.deltas.retain(|_, delta| *delta != 0);
        cumulative_metrics += step_row.metrics;
        step_row.cumulative = cumulative.clone();
        step_row.cumulative_metrics = cumulative_metrics;
        history.revisions.push(step_row);

        cached = Some((step.revision.clone(), current));
    }

    tracing::info!(
        steps = steps.len(),
        files = history.files.len(),
        "computed warning deltas"
    );
    Ok(history)
}

/// Per-revision warning counts for production, test and effective files.
/// The configuration active at a revision is the latest set of rows at or
/// before it on `path`.
pub fn revision_summaries<S: WarningSource>(
    source: &S,
    config: &AnalysisConfig,
    path: &[Revision],
    configurations: &[ConfigurationRow],
) -> Result<Vec<RevisionSummary>, AnalysisError> {
    let mut by_revision: BTreeMap<&str, Vec<&ConfigurationRow>> = BTreeMap::new();
    for row in configurations {
        by_revision.entry(row.revision.as_str()).or_default().push(row);
    }

    let mut active: Vec<&ConfigurationRow> = Vec::new();
    let mut summaries = Vec::with_capacity(path.len());
    for revision in path {
        if let Some(rows) = by_revision.get(revision.hash.as_str()) {
            active = rows.clone();
        }

        let report = source.revision(&revision.hash)?;
        let effective = EffectiveFilter::new(&active, config);
        let mut summary = RevisionSummary {
            revision: revision.hash.clone(),
            timestamp: revision.timestamp,
            code: WarningCounts::default(),
            test: WarningCounts::default(),
            effective_code: WarningCounts::default(),
            effective_rules: active
                .iter()
                .flat_map(|row| row.configuration.rule_set.iter().cloned())
                .collect(),
            has_configuration: !active.is_empty(),
        };

        for file in report.files.keys().filter(|file| is_source_file(file, config)) {
            match change_location(file, config) {
                ChangeLocation::Test => summary.test.add_file(&report, file),
                ChangeLocation::Code => {
                    summary.code.add_file(&report, file);
                    if effective.includes(file) {
                        summary.effective_code.add_file(&report, file);
                    }
                }
            }
        }
        summaries.push(summary);
    }

    Ok(summaries)
}

struct EffectiveFilter {
    source_directories: BTreeSet<String>,
    matcher: PatternMatcher,
}

impl EffectiveFilter {
    fn new(active: &[&ConfigurationRow], config: &AnalysisConfig) -> Self {
        let mut source_directories = BTreeSet::new();
        let mut excludes = Vec::new();
        let mut root_excludes = Vec::new();

        for row in active {
            let configuration = &row.configuration;
            root_excludes.extend(configuration.root_excludes.iter().cloned());
            let Some(directory) = configuration
                .source_directory
                .as_deref()
                .filter(|directory| !directory.is_empty())
            else {
                continue;
            };
            // Source-file excludes are relative to the module's source directory.
            excludes.extend(
                configuration
                    .file_excludes
                    .iter()
                    .filter(|exclude| has_extension(exclude, &config.source_extension))
                    .map(|exclude| format!("{directory}/{exclude}")),
            );
            source_directories.insert(directory.to_owned());
        }

        Self {
            source_directories,
            matcher: PatternMatcher::new(excludes, root_excludes),
        }
    }

    fn includes(&self, path: &str) -> bool {
        self.source_directories
            .iter()
            .any(|directory| path.starts_with(directory.as_str()))
            && !self.matcher.is_excluded(path)
    }
}

fn rule_ids(report: &RevisionReport, path: &str) -> Vec<String> {
    report
        .warnings(path)
        .into_iter()
        .map(|warning| warning.rule_id)
        .collect()
}

fn signed(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn is_source_file(path: &str, config: &AnalysisConfig) -> bool {
    has_extension(path, &config.source_extension)
}

fn has_extension(path: &str, extension: &str) -> bool {
    path.to_lowercase().ends_with(&extension.to_lowercase())
}

fn change_location(path: &str, config: &AnalysisConfig) -> ChangeLocation {
    if path.contains(config.test_marker.as_str()) {
        ChangeLocation::Test
    } else {
        ChangeLocation::Code
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use asat_core::{ModuleConfiguration, ModuleIdentity};

    use super::*;
    use crate::source::{FileReport, Finding};

    struct MemorySource {
        reports: HashMap<String, RevisionReport>,
    }

    impl MemorySource {
        fn new(reports: Vec<(&str, Vec<(&str, Vec<&str>)>)>) -> Self {
            let reports = reports
                .into_iter()
                .map(|(revision, files)| {
                    let files = files
                        .into_iter()
                        .map(|(path, rules)| {
                            let warnings = rules
                                .into_iter()
                                .enumerate()
                                .map(|(line, rule)| Finding {
                                    line: u32::try_from(line + 1).expect("line"),
                                    rule: rule.to_owned(),
                                    message: String::new(),
                                })
                                .collect();
                            let report = FileReport {
                                warnings,
                                metrics: Some(FileMetrics {
                                    loc: 10,
                                    ..FileMetrics::default()
                                }),
                            };
                            (path.to_owned(), report)
                        })
                        .collect();
                    (revision.to_owned(), RevisionReport { files })
                })
                .collect();
            Self { reports }
        }
    }

    impl WarningSource for MemorySource {
        fn revision(&self, revision: &str) -> Result<RevisionReport, AnalysisError> {
            Ok(self.reports.get(revision).cloned().unwrap_or_default())
        }
    }

    fn modified(path: &str) -> ChangedPath {
        ChangedPath {
            kind: ChangeKind::Modified,
            path: path.to_owned(),
            old_path: None,
        }
    }

    fn step(previous: &str, revision: &str, changes: Vec<ChangedPath>) -> RevisionChanges {
        RevisionChanges {
            previous: previous.to_owned(),
            revision: revision.to_owned(),
            changes,
        }
    }

    #[test]
    fn deltas_follow_edit_script_and_accumulate() {
        let source = MemorySource::new(vec![
            ("r1", vec![("src/main/java/A.java", vec!["PMD_UI", "PMD_ECB"])]),
            (
                "r2",
                vec![
                    ("src/main/java/A.java", vec!["PMD_ECB", "PMD_GC"]),
                    ("src/test/java/ATest.java", vec!["PMD_UI"]),
                ],
            ),
            ("r3", vec![("src/main/java/A.java", vec!["PMD_ECB", "PMD_GC", "PMD_GC"])]),
        ]);
        let config = AnalysisConfig::default();
        let steps = vec![
            step(
                "r1",
                "r2",
                vec![
                    modified("src/main/java/A.java"),
                    modified("src/test/java/ATest.java"),
                    modified("README.md"),
                    ChangedPath {
                        kind: ChangeKind::Added,
                        path: "src/main/java/B.java".to_owned(),
                        old_path: None,
                    },
                ],
            ),
            step("r2", "r3", vec![modified("src/main/java/A.java")]),
        ];

        let rows = warning_deltas(&source, &config, &steps).expect("deltas");
        assert_eq!(rows.len(), 3);

        assert_eq!(rows[0].file_path, "src/main/java/A.java");
        assert_eq!(rows[0].change_location, ChangeLocation::Code);
        assert_eq!(rows[0].distance, 2);
        assert_eq!(
            rows[0].deltas,
            BTreeMap::from([("PMD_GC".to_owned(), 1), ("PMD_UI".to_owned(), -1)])
        );

        assert_eq!(rows[1].change_location, ChangeLocation::Test);
        assert_eq!(rows[1].deltas, BTreeMap::from([("PMD_UI".to_owned(), 1)]));
        assert_eq!(rows[1].cumulative.get("PMD_UI"), Some(&0));

        assert_eq!(rows[2].deltas, BTreeMap::from([("PMD_GC".to_owned(), 1)]));
        assert_eq!(rows[2].cumulative.get("PMD_GC"), Some(&2));
    }

    #[test]
    fn unchanged_warnings_produce_empty_deltas() {
        let source = MemorySource::new(vec![
            ("r1", vec![("A.java", vec!["PMD_UI"])]),
            ("r2", vec![("A.java", vec!["PMD_UI"])]),
        ]);
        let rows = warning_deltas(
            &source,
            &AnalysisConfig::default(),
            &[step("r1", "r2", vec![modified("A.java")])],
        )
        .expect("deltas");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].distance, 0);
        assert!(rows[0].deltas.is_empty());
    }

    #[test]
    fn revision_rows_sum_files_and_cover_quiet_steps() {
        let source = MemorySource::new(vec![
            (
                "r1",
                vec![
                    ("src/main/java/A.java", vec!["PMD_UI", "PMD_ECB"]),
                    ("src/main/java/B.java", vec!["PMD_GC"]),
                ],
            ),
            (
                "r2",
                vec![
                    ("src/main/java/A.java", vec!["PMD_ECB"]),
                    ("src/main/java/B.java", vec!["PMD_GC", "PMD_GC"]),
                ],
            ),
            ("r3", vec![("src/main/java/A.java", vec!["PMD_ECB"])]),
            ("r4", vec![("src/main/java/C.java", vec!["PMD_UI"])]),
        ]);
        let steps = vec![
            step(
                "r1",
                "r2",
                vec![
                    modified("src/main/java/A.java"),
                    modified("src/main/java/B.java"),
                ],
            ),
            step("r2", "r3", vec![modified("README.md")]),
            step("r3", "r4", vec![modified("src/main/java/C.java")]),
        ];

        let history =
            delta_history(&source, &AnalysisConfig::default(), &steps).expect("deltas");
        assert_eq!(history.files.len(), 3);
        assert_eq!(history.revisions.len(), 3);

        let first = &history.revisions[0];
        assert_eq!(first.revision, "r2");
        assert_eq!(first.previous_revision, "r1");
        assert_eq!(first.files, 2);
        assert_eq!(
            first.deltas,
            BTreeMap::from([("PMD_GC".to_owned(), 1), ("PMD_UI".to_owned(), -1)])
        );
        assert_eq!(first.metrics, MetricsDelta::default());

        let quiet = &history.revisions[1];
        assert_eq!(quiet.revision, "r3");
        assert_eq!(quiet.files, 0);
        assert!(quiet.deltas.is_empty());
        assert_eq!(quiet.cumulative, first.cumulative);

        let last = &history.revisions[2];
        assert_eq!(last.deltas, BTreeMap::from([("PMD_UI".to_owned(), 1)]));
        assert_eq!(last.cumulative.get("PMD_UI"), Some(&0));
        assert_eq!(last.cumulative.get("PMD_GC"), Some(&1));
        assert_eq!(last.metrics.loc, 10);
        assert_eq!(last.cumulative_metrics.loc, 10);
    }

    #[test]
    fn summaries_split_code_test_and_effective_files() {
        let source = MemorySource::new(vec![
            (
                "r1",
                vec![
                    ("src/main/java/A.java", vec!["PMD_UI", "PMD_UI"]),
                    ("src/main/java/gen/Generated.java", vec!["PMD_GC"]),
                    ("src/test/java/ATest.java", vec!["PMD_ECB"]),
                    ("tools/Script.java", vec!["PMD_ECB"]),
                ],
            ),
            ("r2", vec![("src/main/java/A.java", vec![])]),
        ]);
        let configuration = ModuleConfiguration {
            source_directory: Some("src/main/java".to_owned()),
            file_excludes: BTreeSet::from(["**/Generated.java".to_owned()]),
            rule_set: BTreeSet::from(["PMD_UI".to_owned()]),
            uses_pmd: true,
            ..ModuleConfiguration::default()
        };
        let rows = vec![ConfigurationRow {
            revision: "r1".to_owned(),
            module: ModuleIdentity::from_coordinates(Some("g"), Some("a"), Some("1")),
            configuration,
        }];
        let path = vec![
            Revision::new("r1", Vec::new(), 10),
            Revision::new("r2", vec!["r1".to_owned()], 20),
        ];

        let summaries =
            revision_summaries(&source, &AnalysisConfig::default(), &path, &rows).expect("summaries");
        assert_eq!(summaries.len(), 2);

        let first = &summaries[0];
        assert!(first.has_configuration);
        assert_eq!(first.code.files, 3);
        assert_eq!(first.test.files, 1);
        assert_eq!(first.effective_code.files, 1);
        assert_eq!(first.effective_code.warnings.get("PMD_UI"), Some(&2));
        assert_eq!(first.effective_code.metrics.loc, 10);
        assert_eq!(first.code.metrics.loc, 30);
        assert_eq!(first.effective_rules, BTreeSet::from(["PMD_UI".to_owned()]));

        let second = &summaries[1];
        assert!(second.has_configuration);
        assert_eq!(second.effective_code.files, 1);
        assert!(second.effective_code.warnings.is_empty());
    }

    #[test]
    fn summaries_without_configuration_have_no_effective_files() {
        let source = MemorySource::new(vec![("r1", vec![("src/main/java/A.java", vec!["PMD_UI"])])]);
        let path = vec![Revision::new("r1", Vec::new(), 10)];
        let summaries =
            revision_summaries(&source, &AnalysisConfig::default(), &path, &[]).expect("summaries");
        assert!(!summaries[0].has_configuration);
        assert_eq!(summaries[0].code.files, 1);
        assert_eq!(summaries[0].effective_code.files, 0);
    }
}
