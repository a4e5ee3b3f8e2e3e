use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::CatalogError;

const BUILTIN_CATALOG: &str = include_str!("../data/pmd_catalog.toml");

#[derive(Debug, Deserialize)]
struct CatalogFile {
    version: String,
    #[serde(default)]
    default_categories: Vec<String>,
    #[serde(default)]
    rules: BTreeMap<String, String>,
    #[serde(default)]
    categories: BTreeMap<String, Vec<String>>,
}

/// Legacy rule categories and the canonical ids of the rules they contain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSetCatalog {
    version: String,
    rules: BTreeMap<String, String>,
    categories: BTreeMap<String, Vec<String>>,
    default_rules: BTreeSet<String>,
}

impl RuleSetCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;

        let categories = file
            .categories
            .into_iter()
            .map(|(name, members)| (name.trim().to_ascii_lowercase(), members))
            .collect::<BTreeMap<_, _>>();

        let mut catalog = Self {
            version: file.version,
            rules: file.rules,
            categories,
            default_rules: BTreeSet::new(),
        };

        let mut default_rules = BTreeSet::new();
        for category in &file.default_categories {
            let expanded = catalog
                .expand_category(category)
                .ok_or_else(|| CatalogError::UnknownDefaultCategory(category.clone()))?;
            default_rules.extend(expanded);
        }
        catalog.default_rules = default_rules;

        tracing::debug!(
            version = %catalog.version,
            rules = catalog.rules.len(),
            categories = catalog.categories.len(),
            "loaded rule catalog"
        );
        Ok(catalog)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn canonical_id(&self, rule_name: &str) -> Option<&str> {
        self.rules.get(rule_name.trim()).map(String::as_str)
    }

    /// Canonical ids of every mappable rule in `category`, or `None` when the
    /// category is unknown. Members without a canonical id are skipped.
    pub fn expand_category(&self, category: &str) -> Option<BTreeSet<String>> {
        let members = self.categories.get(&category.trim().to_ascii_lowercase())?;
        Some(
            members
                .iter()
                .filter_map(|member| self.canonical_id(member))
                .map(str::to_owned)
                .collect(),
        )
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories
            .contains_key(&category.trim().to_ascii_lowercase())
    }

    pub fn default_rule_set(&self) -> BTreeSet<String> {
        self.default_rules.clone()
    }
}

/// Category named by a rule-set file reference: the lower-cased base name
/// without extension, so `rulesets/java/Basic.xml` names `basic`.
pub fn category_name(reference: &str) -> String {
    let normalized = reference.trim().replace('\\', "/");
    let base = normalized.rsplit('/').next().unwrap_or(normalized.as_str());
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => base,
    };
    stem.to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[test]
    fn builtin_catalog_loads_with_default_rules() {
        let catalog = RuleSetCatalog::builtin().expect("builtin catalog");
        assert!(!catalog.version().is_empty());

        let defaults = catalog.default_rule_set();
        assert!(defaults.contains("PMD_ECB"));
        assert!(defaults.contains("PMD_UPF"));
        assert!(defaults.contains("PMD_UI"));
        assert!(!defaults.contains("PMD_GC"));
    }

    #[test]
    fn builtin_catalog_has_unique_canonical_ids() {
        let catalog = RuleSetCatalog::builtin().expect("builtin catalog");
        let unique = catalog.rules.values().collect::<BTreeSet<_>>();
        assert_eq!(unique.len(), catalog.rules.len());
    }

    #[test]
    fn category_lookup_is_case_insensitive_and_drops_unmapped_members() {
        let catalog = RuleSetCatalog::builtin().expect("builtin catalog");
        let braces = catalog.expand_category("Braces").expect("braces category");
        assert_eq!(
            braces,
            BTreeSet::from([
                "PMD_FLMUB".to_owned(),
                "PMD_IESMUB".to_owned(),
                "PMD_ISMUB".to_owned(),
                "PMD_WLMUB".to_owned(),
            ])
        );

        // CommentRequired and friends have no canonical counterpart.
        let comments = catalog.expand_category("comments").expect("comments category");
        assert!(comments.is_empty());
        assert!(catalog.expand_category("no-such-category").is_none());
    }

    #[test]
    fn canonical_ids_map_known_rules_only() {
        let catalog = RuleSetCatalog::builtin().expect("builtin catalog");
        assert_eq!(catalog.canonical_id("EmptyCatchBlock"), Some("PMD_ECB"));
        assert_eq!(catalog.canonical_id("ShortVariable"), None);
    }

    #[test]
    fn unknown_default_category_is_rejected() {
        let raw = r#"
version = "test"
default_categories = ["missing"]

[rules]
A = "X_A"

[categories]
present = ["A"]
"#;
        let err = RuleSetCatalog::from_toml_str(raw).expect_err("unknown default category");
        assert!(matches!(err, CatalogError::UnknownDefaultCategory(name) if name == "missing"));
    }

    #[test]
    fn category_name_uses_lowercased_stem() {
        assert_eq!(category_name("rulesets/java/basic.xml"), "basic");
        assert_eq!(category_name("rulesets\\Braces.xml"), "braces");
        assert_eq!(category_name("/rulesets/unusedcode"), "unusedcode");
        assert_eq!(category_name("logging-java.xml"), "logging-java");
    }
}
