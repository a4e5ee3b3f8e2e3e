use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use asat_core::normalize_path;
use asat_rules::{HistoricalOverrides, RuleSetCatalog, category_name};
use walkdir::WalkDir;

use crate::error::{ResolutionErrorKind, ResolveError, StepError};
use crate::xml::Element;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleFileResolution {
    pub rules: BTreeSet<String>,
    /// Set when the rules came from category expansion or the file produced
    /// nothing, so the path is not a usable custom rule file.
    pub groups_expanded: bool,
}

pub(crate) struct RuleFileResolver<'a> {
    pub base_dir: &'a Path,
    pub catalog: &'a RuleSetCatalog,
    pub overrides: &'a HistoricalOverrides,
    pub project: Option<&'a str>,
    pub revision: &'a str,
}

impl RuleFileResolver<'_> {
    pub(crate) fn resolve(&self, relative: &str) -> Result<RuleFileResolution, StepError> {
        let literal = self.base_dir.join(relative.trim_start_matches('/'));
        let located = if literal.is_file() {
            Some(literal)
        } else {
            let found = self.find_by_suffix(relative);
            if let Some(found) = &found {
                tracing::info!(
                    revision = self.revision,
                    rule_file = relative,
                    found = %found.display(),
                    "rule file relocated"
                );
            }
            found
        };

        match located {
            Some(path) => self.read_rule_file(relative, &path),
            None => self.expand_missing(relative),
        }
    }

    // Historic layouts moved rule files around; accept any file whose path
    // ends with the configured one.
    fn find_by_suffix(&self, relative: &str) -> Option<PathBuf> {
        let needle = normalize_path(relative).replace("..", "");
        if needle.trim_matches('/').is_empty() {
            return None;
        }

        WalkDir::new(self.base_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.file_name() != ".git")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .find(|path| normalize_path(&path.to_string_lossy()).ends_with(&needle))
    }

    fn expand_missing(&self, relative: &str) -> Result<RuleFileResolution, StepError> {
        let category = category_name(relative);
        if let Some(rules) = self.catalog.expand_category(&category) {
            tracing::debug!(
                revision = self.revision,
                rule_file = relative,
                category = %category,
                "rule file missing, expanded as category"
            );
            return Ok(RuleFileResolution {
                rules,
                groups_expanded: true,
            });
        }

        if let Some(project) = self.project
            && self.overrides.is_known_broken(project, relative)
        {
            tracing::warn!(
                revision = self.revision,
                project,
                rule_file = relative,
                "known broken rule file contributes no rules"
            );
            return Ok(RuleFileResolution {
                rules: BTreeSet::new(),
                groups_expanded: true,
            });
        }

        Err(StepError::Fatal(ResolveError::UnmappedRuleCategory {
            revision: self.revision.to_owned(),
            file: relative.to_owned(),
            category,
        }))
    }

    fn read_rule_file(&self, relative: &str, path: &Path) -> Result<RuleFileResolution, StepError> {
        let bytes = fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        let root = Element::parse(&content).map_err(|err| {
            StepError::recorded(
                ResolutionErrorKind::DescriptorParseFailure,
                format!("rule file {relative}: {err}"),
            )
        })?;

        let mut rules = BTreeSet::new();
        for rule in root.descendants_named("rule") {
            // Fully custom rules have no reference and no canonical id.
            let Some(reference) = rule.attribute("ref") else {
                continue;
            };

            if !reference.ends_with(".xml") {
                let name = reference.rsplit('/').next().unwrap_or(reference);
                if let Some(id) = self.catalog.canonical_id(name) {
                    rules.insert(id.to_owned());
                }
                continue;
            }

            let category = category_name(reference);
            let expanded = self.catalog.expand_category(&category).ok_or_else(|| {
                StepError::Fatal(ResolveError::UnmappedRuleCategory {
                    revision: self.revision.to_owned(),
                    file: relative.to_owned(),
                    category: category.clone(),
                })
            })?;
            rules.extend(expanded);

            for exclude in rule.children_named("exclude") {
                if let Some(id) = exclude
                    .attribute("name")
                    .and_then(|name| self.catalog.canonical_id(name))
                {
                    rules.remove(id);
                }
            }
        }

        let groups_expanded = rules.is_empty();
        if groups_expanded {
            tracing::info!(revision = self.revision, rule_file = relative, "rule file yields no rules");
        }
        Ok(RuleFileResolution {
            rules,
            groups_expanded,
        })
    }
}
