use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use asat_config::AsatConfig;
use asat_core::{ConfigurationRow, GitWorkingCopy, ModuleConfiguration, ModuleIdentity};
use asat_rules::{HistoricalOverrides, RuleSetCatalog};
use serde::Serialize;

use crate::classify::FailureClassifier;
use crate::descriptor::{DescriptorContext, DescriptorLocation, parse_effective_descriptor, preflight};
use crate::error::{ResolutionError, ResolutionErrorKind, ResolveError, StepError};
use crate::evaluator::{BuildEvaluator, CommandEvaluator, EvaluationOutput};
use crate::extract::extract_descriptor_xml;
use crate::repair::repair_descriptor;

pub type ModuleConfigurations = BTreeMap<ModuleIdentity, ModuleConfiguration>;

/// Result of resolving one revision: either every module's configuration
/// (possibly none) or a recorded failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevisionOutcome {
    Resolved(ModuleConfigurations),
    Failed(ResolutionError),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HistoryResolution {
    pub configurations: Vec<ConfigurationRow>,
    pub errors: Vec<ResolutionError>,
}

pub struct ConfigurationResolver<E> {
    evaluator: E,
    catalog: RuleSetCatalog,
    overrides: HistoricalOverrides,
    classifier: FailureClassifier,
    project: Option<String>,
    descriptor_name: String,
}

impl ConfigurationResolver<CommandEvaluator> {
    /// Builds a resolver from workspace configuration. Data file paths are
    /// taken relative to `workspace_root`.
    pub fn from_config(config: &AsatConfig, workspace_root: &Path) -> Result<Self, ResolveError> {
        let catalog = match &config.resolver.catalog_path {
            Some(path) => RuleSetCatalog::load(workspace_root.join(path))?,
            None => RuleSetCatalog::builtin()?,
        };
        let overrides = match &config.resolver.overrides_path {
            Some(path) => HistoricalOverrides::load(workspace_root.join(path))?,
            None => HistoricalOverrides::builtin()?,
        };

        let mut resolver = Self::new(
            CommandEvaluator::from_config(&config.evaluator),
            catalog,
            overrides,
        )
        .with_descriptor_name(config.resolver.descriptor_name.clone());
        if let Some(project) = &config.resolver.project {
            resolver = resolver.with_project(project.clone());
        }
        Ok(resolver)
    }
}

impl<E: BuildEvaluator> ConfigurationResolver<E> {
    pub fn new(evaluator: E, catalog: RuleSetCatalog, overrides: HistoricalOverrides) -> Self {
        Self {
            evaluator,
            catalog,
            overrides,
            classifier: FailureClassifier::default(),
            project: None,
            descriptor_name: asat_config::DEFAULT_DESCRIPTOR_NAME.to_owned(),
        }
    }

    /// Project name used for historical override lookups.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_descriptor_name(mut self, name: impl Into<String>) -> Self {
        self.descriptor_name = name.into();
        self
    }

    pub fn with_classifier(mut self, classifier: FailureClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn catalog(&self) -> &RuleSetCatalog {
        &self.catalog
    }

    pub fn overrides(&self) -> &HistoricalOverrides {
        &self.overrides
    }

    pub fn descriptor_name(&self) -> &str {
        &self.descriptor_name
    }

    /// Resolves the working copy at `root`, which must already be checked out
    /// at `revision`. Repaired descriptors get their original content back and
    /// files created for the evaluation are removed again.
    pub fn resolve(&self, revision: &str, root: &Path) -> Result<RevisionOutcome, ResolveError> {
        let mut scratch = Scratch::default();
        let outcome = self.resolve_tracking(revision, root, &mut scratch);
        scratch.restore()?;
        outcome
    }

    /// Resolves `revisions` in order, checking each one out in turn. A module
    /// set is emitted only when it differs from the last successfully resolved
    /// one; failed revisions do not reset that comparison.
    pub fn resolve_history(
        &self,
        working_copy: &GitWorkingCopy,
        revisions: &[String],
    ) -> Result<HistoryResolution, ResolveError> {
        let mut history = HistoryResolution::default();
        let mut previous = ModuleConfigurations::new();

        for revision in revisions {
            let mut session = working_copy.checkout(revision)?;
            let mut scratch = Scratch::default();
            let outcome = self.resolve_tracking(revision, session.root(), &mut scratch);
            let restored = scratch.restore();
            for path in scratch.created {
                session.track_created(path);
            }
            session.finish()?;
            restored?;

            match outcome? {
                RevisionOutcome::Failed(error) => history.errors.push(error),
                RevisionOutcome::Resolved(modules) => {
                    if modules.is_empty() {
                        tracing::info!(revision = %revision, "no modules in descriptor");
                    }
                    if modules == previous {
                        tracing::debug!(revision = %revision, "configuration unchanged");
                        continue;
                    }
                    history
                        .configurations
                        .extend(modules.iter().map(|(module, configuration)| ConfigurationRow {
                            revision: revision.clone(),
                            module: module.clone(),
                            configuration: configuration.clone(),
                        }));
                    previous = modules;
                }
            }
        }

        tracing::info!(
            revisions = revisions.len(),
            configurations = history.configurations.len(),
            errors = history.errors.len(),
            "resolved configuration history"
        );
        Ok(history)
    }

    fn resolve_tracking(
        &self,
        revision: &str,
        root: &Path,
        scratch: &mut Scratch,
    ) -> Result<RevisionOutcome, ResolveError> {
        match self.resolve_modules(revision, root, scratch) {
            Ok(modules) => Ok(RevisionOutcome::Resolved(modules)),
            Err(StepError::Recorded {
                kind,
                detail_line,
                raw_output,
            }) => {
                tracing::warn!(revision, kind = %kind, detail = %detail_line, "revision not resolvable");
                Ok(RevisionOutcome::Failed(ResolutionError {
                    revision: revision.to_owned(),
                    kind,
                    detail_line,
                    raw_output,
                }))
            }
            Err(StepError::Fatal(err)) => {
                tracing::error!(revision, error = %err, "configuration resolution aborted");
                Err(err)
            }
        }
    }

    fn resolve_modules(
        &self,
        revision: &str,
        root: &Path,
        scratch: &mut Scratch,
    ) -> Result<ModuleConfigurations, StepError> {
        let location = preflight(
            root,
            revision,
            self.project.as_deref(),
            &self.overrides,
            &self.descriptor_name,
            &mut scratch.created,
        )?;
        let output = self.evaluate(revision, &location, scratch)?;

        let Some(xml) = extract_descriptor_xml(&output.stdout) else {
            return Err(StepError::Recorded {
                kind: ResolutionErrorKind::DescriptorParseFailure,
                detail_line: "no descriptor document in evaluator output".to_owned(),
                raw_output: output.combined_text(),
            });
        };

        let context = DescriptorContext {
            revision,
            base_dir: &location.dir,
            catalog: &self.catalog,
            overrides: &self.overrides,
            project: self.project.as_deref(),
        };
        parse_effective_descriptor(&xml, &context)
    }

    // One repair pass, one retry.
    fn evaluate(
        &self,
        revision: &str,
        location: &DescriptorLocation,
        scratch: &mut Scratch,
    ) -> Result<EvaluationOutput, StepError> {
        let first = self.evaluator.evaluate(&location.dir)?;
        if first.success {
            return Ok(first);
        }

        scratch.remember(&location.path)?;
        let replacements = repair_descriptor(&location.path)?;
        tracing::info!(
            revision,
            replacements = replacements.len(),
            "evaluation failed, retrying after descriptor repair"
        );

        let retry = self.evaluator.evaluate(&location.dir)?;
        if retry.success {
            return Ok(retry);
        }

        let raw_output = retry.combined_text();
        let classification = self.classifier.classify(&raw_output);
        Err(StepError::Recorded {
            kind: classification.kind,
            detail_line: classification.detail_line,
            raw_output,
        })
    }
}

/// Working-copy edits made while resolving one revision.
#[derive(Debug, Default)]
struct Scratch {
    created: Vec<PathBuf>,
    rewritten: Vec<(PathBuf, Vec<u8>)>,
}

impl Scratch {
    fn remember(&mut self, path: &Path) -> std::io::Result<()> {
        if self.rewritten.iter().any(|(known, _)| known == path) {
            return Ok(());
        }
        let original = fs::read(path)?;
        self.rewritten.push((path.to_path_buf(), original));
        Ok(())
    }

    /// Writes rewritten files back and removes created ones. Created paths
    /// stay listed so a checkout session can still clean them up.
    fn restore(&mut self) -> std::io::Result<()> {
        for (path, original) in self.rewritten.drain(..) {
            fs::write(&path, original)?;
        }
        for path in &self.created {
            if path.is_file() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}
