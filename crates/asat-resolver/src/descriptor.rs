//! Effective-descriptor interpretation: modules, auxiliary tool detection,
//! and the analysis plugin's configuration.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use asat_core::{ModuleConfiguration, ModuleIdentity, normalize_path};
use asat_rules::{HistoricalOverrides, RuleSetCatalog};

use crate::error::{ResolutionErrorKind, ResolveError, StepError};
use crate::rulefile::RuleFileResolver;
use crate::xml::Element;

const PMD_PLUGIN: &str = "maven-pmd-plugin";
const CHECKSTYLE_PLUGIN: &str = "maven-checkstyle-plugin";
const FINDBUGS_PLUGIN: &str = "findbugs-maven-plugin";
const SPOTBUGS_PLUGIN: &str = "spotbugs-maven-plugin";
const SONAR_PLUGIN_GROUP: &str = "org.codehaus.sonar-plugins";
const ERROR_PRONE_GROUP: &str = "com.google.errorprone";
const PATH_VARIABLES: [&str; 2] = ["${project.parent.basedir}", "${workspace.root.dir}"];

// Plugin sections read for analysis configuration, in precedence order.
const PLUGIN_SECTIONS: [&[&str]; 4] = [
    &["reporting", "plugins", "plugin"],
    &["build", "plugins", "plugin"],
    &["reporting", "pluginManagement", "plugins", "plugin"],
    &["build", "pluginManagement", "plugins", "plugin"],
];

pub(crate) struct DescriptorContext<'a> {
    pub revision: &'a str,
    pub base_dir: &'a Path,
    pub catalog: &'a RuleSetCatalog,
    pub overrides: &'a HistoricalOverrides,
    pub project: Option<&'a str>,
}

pub(crate) fn parse_effective_descriptor(
    xml: &str,
    context: &DescriptorContext<'_>,
) -> Result<BTreeMap<ModuleIdentity, ModuleConfiguration>, StepError> {
    let root = Element::parse(xml).map_err(|err| {
        StepError::recorded(ResolutionErrorKind::DescriptorParseFailure, err.to_string())
    })?;

    let modules = if root.name == "project" {
        vec![&root]
    } else {
        root.descendants_named("project")
    };

    let prefixes = base_prefixes(context.base_dir);
    let mut resolved = BTreeMap::new();
    for module in modules {
        let identity = ModuleIdentity::from_coordinates(
            module.child_text("groupId"),
            module.child_text("artifactId"),
            module.child_text("version"),
        );
        if resolved.contains_key(&identity) {
            return Err(StepError::Fatal(ResolveError::DuplicateModuleIdentity {
                revision: context.revision.to_owned(),
                identity,
            }));
        }

        let configuration = module_configuration(module, &identity, &prefixes, context)?;
        resolved.insert(identity, configuration);
    }

    Ok(resolved)
}

fn module_configuration(
    module: &Element,
    identity: &ModuleIdentity,
    prefixes: &[String],
    context: &DescriptorContext<'_>,
) -> Result<ModuleConfiguration, StepError> {
    let plugins = plugins_in(module);
    let mut configuration = ModuleConfiguration {
        uses_checkstyle: has_plugin_artifact(&plugins, CHECKSTYLE_PLUGIN),
        uses_findbugs: has_plugin_artifact(&plugins, FINDBUGS_PLUGIN),
        uses_spotbugs: has_plugin_artifact(&plugins, SPOTBUGS_PLUGIN),
        uses_sonar: plugins
            .iter()
            .any(|plugin| plugin.child_text("groupId") == Some(SONAR_PLUGIN_GROUP)),
        uses_error_prone: ["path", "dependency"].iter().any(|name| {
            module
                .descendants_named(name)
                .iter()
                .any(|element| element.child_text("groupId") == Some(ERROR_PRONE_GROUP))
        }),
        source_directory: module
            .find(&["build", "sourceDirectory"])
            .map(|element| relative_path(element.text(), prefixes)),
        test_source_directory: module
            .find(&["build", "testSourceDirectory"])
            .map(|element| relative_path(element.text(), prefixes)),
        ..ModuleConfiguration::default()
    };

    if !has_plugin_artifact(&plugins, PMD_PLUGIN) {
        return Ok(configuration);
    }

    configuration.uses_pmd = true;
    configuration.rule_set = context.catalog.default_rule_set();
    configuration.plugin_build_count = count_pmd(module, PLUGIN_SECTIONS[1]);
    configuration.plugin_reporting_count = count_pmd(module, PLUGIN_SECTIONS[0]);

    let mut plugin_source_root: Option<String> = None;
    let mut rule_files = BTreeSet::new();
    for section in PLUGIN_SECTIONS {
        for plugin in module.find_all(section) {
            if plugin.child_text("artifactId") != Some(PMD_PLUGIN) {
                continue;
            }
            if let Some(version) = non_empty(plugin.child_text("version")) {
                configuration.plugin_version = Some(version.to_owned());
            }
            let Some(settings) = plugin.child("configuration") else {
                continue;
            };

            if let Some(priority) = non_empty(settings.child_text("minimumPriority")) {
                match priority.parse::<u32>() {
                    Ok(priority) => configuration.minimum_priority = priority,
                    Err(_) => tracing::warn!(
                        revision = context.revision,
                        module = %identity,
                        value = priority,
                        "ignoring non-numeric minimum priority"
                    ),
                }
            }
            if let Some(language) = non_empty(settings.child_text("language")) {
                configuration.language = language.to_lowercase();
            }
            if let Some(root) = non_empty(
                settings
                    .find(&["compileSourceRoots", "compileSourceRoot"])
                    .map(Element::text),
            ) {
                let declared = relative_path(root, prefixes);
                if let Some(existing) = &plugin_source_root
                    && existing != &declared
                {
                    return Err(StepError::Fatal(ResolveError::SourceDirectoryConflict {
                        revision: context.revision.to_owned(),
                        module: identity.clone(),
                        existing: existing.clone(),
                        declared,
                    }));
                }
                configuration.source_directory = Some(declared.clone());
                plugin_source_root = Some(declared);
            }
            if let Some(root) = non_empty(
                settings
                    .find(&["testSourceRoots", "testSourceRoot"])
                    .map(Element::text),
            ) {
                configuration.test_source_directory = Some(relative_path(root, prefixes));
            }
            if settings
                .child_text("includeTests")
                .is_some_and(|value| value.eq_ignore_ascii_case("true"))
            {
                configuration.include_tests = true;
            }

            configuration.exclude_from_failure_files.extend(
                texts(settings.children_named("excludeFromFailureFile")).map(str::to_owned),
            );
            rule_files.extend(
                texts(settings.find_all(&["rulesets", "ruleset"]))
                    .map(|path| relative_path(path, prefixes)),
            );
            configuration.root_excludes.extend(
                texts(settings.find_all(&["excludeRoots", "excludeRoot"]))
                    .map(|path| relative_path(path, prefixes)),
            );
            configuration.file_excludes.extend(
                texts(settings.find_all(&["excludes", "exclude"]))
                    .flat_map(|entry| entry.split(','))
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(str::to_owned),
            );
            configuration
                .file_includes
                .extend(texts(settings.find_all(&["includes", "include"])).map(str::to_owned));
        }
    }

    // Declared rule files replace the plugin defaults entirely.
    if !rule_files.is_empty() {
        let resolver = RuleFileResolver {
            base_dir: context.base_dir,
            catalog: context.catalog,
            overrides: context.overrides,
            project: context.project,
            revision: context.revision,
        };
        configuration.rule_set.clear();
        for rule_file in rule_files {
            let resolution = resolver.resolve(&rule_file)?;
            configuration.rule_set.extend(resolution.rules);
            if !resolution.groups_expanded {
                configuration.custom_rule_files.insert(rule_file);
            }
        }
    }

    Ok(configuration)
}

fn plugins_in(module: &Element) -> Vec<&Element> {
    module
        .descendants_named("plugins")
        .into_iter()
        .flat_map(|plugins| plugins.children_named("plugin"))
        .collect()
}

fn has_plugin_artifact(plugins: &[&Element], artifact: &str) -> bool {
    plugins
        .iter()
        .any(|plugin| plugin.child_text("artifactId") == Some(artifact))
}

fn count_pmd(module: &Element, section: &[&str]) -> u32 {
    let count = module
        .find_all(section)
        .into_iter()
        .filter(|plugin| plugin.child_text("artifactId") == Some(PMD_PLUGIN))
        .count();
    u32::try_from(count).unwrap_or(u32::MAX)
}

fn texts<'a>(elements: impl IntoIterator<Item = &'a Element>) -> impl Iterator<Item = &'a str> {
    elements
        .into_iter()
        .map(Element::text)
        .filter(|text| !text.is_empty())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Absolute and canonical spellings of the module directory, used to turn
/// evaluator paths back into working-copy relative ones.
pub(crate) fn base_prefixes(base_dir: &Path) -> Vec<String> {
    let mut prefixes = vec![normalize_path(&base_dir.to_string_lossy())];
    if let Ok(canonical) = fs::canonicalize(base_dir) {
        let canonical = normalize_path(&canonical.to_string_lossy());
        if !prefixes.contains(&canonical) {
            prefixes.push(canonical);
        }
    }
    prefixes
        .into_iter()
        .map(|prefix| prefix.trim_end_matches('/').to_owned())
        .filter(|prefix| !prefix.is_empty())
        .collect()
}

pub(crate) fn relative_path(path: &str, prefixes: &[String]) -> String {
    let mut path = normalize_path(path.trim());
    for variable in PATH_VARIABLES {
        path = path.replace(variable, "");
    }
    for prefix in prefixes {
        if path == *prefix {
            return String::new();
        }
        path = path.replace(&format!("{prefix}/"), "");
    }
    path
}

/// Location of the primary descriptor for one revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DescriptorLocation {
    pub dir: PathBuf,
    pub path: PathBuf,
}

/// Applies the historical relocation and rename overrides and checks that a
/// descriptor exists. Files created here are pushed onto `created`.
pub(crate) fn preflight(
    root: &Path,
    revision: &str,
    project: Option<&str>,
    overrides: &HistoricalOverrides,
    descriptor_name: &str,
    created: &mut Vec<PathBuf>,
) -> Result<DescriptorLocation, StepError> {
    let mut dir = root.to_path_buf();
    if let Some(project) = project
        && let Some(subdir) = overrides.descriptor_directory(project, revision)
    {
        tracing::debug!(revision, subdir, "descriptor directory relocated");
        dir = dir.join(subdir);
    }
    let path = dir.join(descriptor_name);

    if let Some(project) = project
        && let Some(alternate) = overrides.descriptor_name(project, revision)
    {
        let source = dir.join(alternate);
        if source.is_file() {
            let existed = path.exists();
            fs::copy(&source, &path)?;
            if !existed {
                created.push(path.clone());
            }
            tracing::info!(revision, alternate, "using alternate descriptor name");
        } else {
            tracing::warn!(revision, alternate, "alternate descriptor missing");
        }
    }

    if !path.is_file() {
        return Err(StepError::recorded(
            ResolutionErrorKind::DescriptorNotFound,
            format!("{} not found", path.display()),
        ));
    }

    Ok(DescriptorLocation { dir, path })
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use asat_core::UNKNOWN_COORDINATE;
    use tempfile::tempdir;

    use super::*;

    fn parse(
        xml: &str,
        base_dir: &Path,
    ) -> Result<BTreeMap<ModuleIdentity, ModuleConfiguration>, StepError> {
        let catalog = RuleSetCatalog::builtin().expect("catalog");
        let overrides = HistoricalOverrides::builtin().expect("overrides");
        let context = DescriptorContext {
            revision: "r1",
            base_dir,
            catalog: &catalog,
            overrides: &overrides,
            project: None,
        };
        parse_effective_descriptor(xml, &context)
    }

    #[test]
    fn module_without_analysis_plugin_records_only_tool_presence() {
        let temp = tempdir().expect("tempdir");
        let base = normalize_path(&temp.path().to_string_lossy());
        let xml = format!(
            r#"<?xml version="1.0"?>
<project xmlns="http://maven.apache.org/POM/4.0.0">
  <groupId>org.example</groupId>
  <artifactId>demo</artifactId>
  <version>1.0</version>
  <dependencies>
    <dependency><groupId>com.google.errorprone</groupId><artifactId>error_prone_annotations</artifactId></dependency>
  </dependencies>
  <build>
    <sourceDirectory>{base}/src/main/java</sourceDirectory>
    <plugins>
      <plugin><artifactId>maven-checkstyle-plugin</artifactId></plugin>
      <plugin><groupId>org.codehaus.sonar-plugins</groupId><artifactId>sonar</artifactId></plugin>
    </plugins>
  </build>
</project>"#
        );

        let modules = parse(&xml, temp.path()).expect("parse");
        let (identity, configuration) = modules.iter().next().expect("one module");
        assert_eq!(identity.to_string(), "org.example:demo-1.0");
        assert!(configuration.uses_checkstyle);
        assert!(configuration.uses_sonar);
        assert!(configuration.uses_error_prone);
        assert!(!configuration.uses_findbugs);
        assert!(!configuration.uses_pmd);
        assert!(configuration.rule_set.is_empty());
        assert_eq!(configuration.source_directory.as_deref(), Some("src/main/java"));
    }

    #[test]
    fn analysis_plugin_configuration_is_collected() {
        let temp = tempdir().expect("tempdir");
        let xml = r#"<project>
  <artifactId>demo</artifactId>
  <build><plugins><plugin>
    <artifactId>maven-pmd-plugin</artifactId>
    <version>3.0.1</version>
    <configuration>
      <minimumPriority>3</minimumPriority>
      <language>JAVA</language>
      <includeTests>TRUE</includeTests>
      <excludes><exclude>**/Generated.java, gen/*,</exclude></excludes>
      <includes><include>**/*.java</include></includes>
      <excludeRoots><excludeRoot>${project.parent.basedir}/target/generated</excludeRoot></excludeRoots>
      <excludeFromFailureFile>exclude-pmd.properties</excludeFromFailureFile>
    </configuration>
  </plugin></plugins></build>
  <reporting><plugins><plugin><artifactId>maven-pmd-plugin</artifactId></plugin></plugins></reporting>
</project>"#;

        let modules = parse(xml, temp.path()).expect("parse");
        let (identity, configuration) = modules.iter().next().expect("one module");
        assert_eq!(identity.group, UNKNOWN_COORDINATE);
        assert_eq!(identity.version, UNKNOWN_COORDINATE);

        let catalog = RuleSetCatalog::builtin().expect("catalog");
        assert!(configuration.uses_pmd);
        assert_eq!(configuration.rule_set, catalog.default_rule_set());
        assert_eq!(configuration.minimum_priority, 3);
        assert_eq!(configuration.language, "java");
        assert!(configuration.include_tests);
        assert_eq!(configuration.plugin_version.as_deref(), Some("3.0.1"));
        assert_eq!(configuration.plugin_build_count, 1);
        assert_eq!(configuration.plugin_reporting_count, 1);
        assert_eq!(
            configuration.file_excludes,
            BTreeSet::from(["**/Generated.java".to_owned(), "gen/*".to_owned()])
        );
        assert_eq!(
            configuration.file_includes,
            BTreeSet::from(["**/*.java".to_owned()])
        );
        assert_eq!(
            configuration.root_excludes,
            BTreeSet::from(["/target/generated".to_owned()])
        );
        assert_eq!(
            configuration.exclude_from_failure_files,
            BTreeSet::from(["exclude-pmd.properties".to_owned()])
        );
    }

    #[test]
    fn declared_rule_files_replace_defaults() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("src/conf")).expect("mkdir");
        fs::write(
            temp.path().join("src/conf/pmd.xml"),
            r#"<ruleset><rule ref="rulesets/java/braces.xml"/></ruleset>"#,
        )
        .expect("write rules");

        let xml = r#"<project>
  <artifactId>demo</artifactId>
  <build><plugins><plugin>
    <artifactId>maven-pmd-plugin</artifactId>
    <configuration><rulesets>
      <ruleset>src/conf/pmd.xml</ruleset>
      <ruleset>/rulesets/imports.xml</ruleset>
    </rulesets></configuration>
  </plugin></plugins></build>
</project>"#;

        let modules = parse(xml, temp.path()).expect("parse");
        let configuration = modules.values().next().expect("one module");
        assert!(configuration.rule_set.contains("PMD_ISMUB"));
        assert!(configuration.rule_set.contains("PMD_UI"));
        assert!(!configuration.rule_set.contains("PMD_ECB"));
        assert_eq!(
            configuration.custom_rule_files,
            BTreeSet::from(["src/conf/pmd.xml".to_owned()])
        );
    }

    #[test]
    fn multi_module_output_yields_every_module() {
        let temp = tempdir().expect("tempdir");
        let xml = r#"<projects>
  <project><groupId>g</groupId><artifactId>a</artifactId><version>1</version></project>
  <project><groupId>g</groupId><artifactId>b</artifactId><version>1</version></project>
</projects>"#;
        let modules = parse(xml, temp.path()).expect("parse");
        let names = modules
            .keys()
            .map(|identity| identity.artifact.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn duplicate_module_identity_is_fatal() {
        let temp = tempdir().expect("tempdir");
        let xml = r#"<projects>
  <project><groupId>g</groupId><artifactId>a</artifactId><version>1</version></project>
  <project><groupId>g</groupId><artifactId>a</artifactId><version>1</version></project>
</projects>"#;
        let err = parse(xml, temp.path()).expect_err("duplicate");
        assert!(matches!(
            err,
            StepError::Fatal(ResolveError::DuplicateModuleIdentity { .. })
        ));
    }

    #[test]
    fn conflicting_plugin_source_roots_are_fatal() {
        let temp = tempdir().expect("tempdir");
        let xml = r#"<project>
  <artifactId>demo</artifactId>
  <reporting><plugins><plugin>
    <artifactId>maven-pmd-plugin</artifactId>
    <configuration><compileSourceRoots><compileSourceRoot>src/java</compileSourceRoot></compileSourceRoots></configuration>
  </plugin></plugins></reporting>
  <build><plugins><plugin>
    <artifactId>maven-pmd-plugin</artifactId>
    <configuration><compileSourceRoots><compileSourceRoot>src/main/java</compileSourceRoot></compileSourceRoots></configuration>
  </plugin></plugins></build>
</project>"#;
        let err = parse(xml, temp.path()).expect_err("conflict");
        assert!(matches!(
            err,
            StepError::Fatal(ResolveError::SourceDirectoryConflict { .. })
        ));
    }

    #[test]
    fn invalid_document_is_recorded_parse_failure() {
        let temp = tempdir().expect("tempdir");
        let err = parse("<project><build></project>", temp.path()).expect_err("invalid");
        assert!(matches!(
            err,
            StepError::Recorded {
                kind: ResolutionErrorKind::DescriptorParseFailure,
                ..
            }
        ));
    }

    #[test]
    fn relative_path_strips_variables_and_prefixes() {
        let prefixes = vec!["/work/repo".to_owned()];
        assert_eq!(relative_path("/work/repo/src/main/java", &prefixes), "src/main/java");
        assert_eq!(
            relative_path("${workspace.root.dir}/build-tools/pmd.xml", &prefixes),
            "/build-tools/pmd.xml"
        );
        assert_eq!(relative_path("/work/repo", &prefixes), "");
        assert_eq!(relative_path("/elsewhere/pmd.xml", &prefixes), "/elsewhere/pmd.xml");
    }

    #[test]
    fn preflight_applies_rename_override_and_tracks_copy() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("project.xml"), "<project/>").expect("write project.xml");
        let overrides = HistoricalOverrides::builtin().expect("overrides");
        let mut created = Vec::new();

        let location = preflight(
            temp.path(),
            "c801bc302edb61a937f58dafbfbc36e1c0f021cf",
            Some("commons-io"),
            &overrides,
            "pom.xml",
            &mut created,
        )
        .expect("preflight");

        assert_eq!(location.path, temp.path().join("pom.xml"));
        assert!(location.path.is_file());
        assert_eq!(created, vec![temp.path().join("pom.xml")]);
    }

    #[test]
    fn preflight_without_descriptor_is_recorded() {
        let temp = tempdir().expect("tempdir");
        let overrides = HistoricalOverrides::builtin().expect("overrides");
        let mut created = Vec::new();

        let err = preflight(temp.path(), "r1", None, &overrides, "pom.xml", &mut created)
            .expect_err("missing");
        assert!(matches!(
            err,
            StepError::Recorded {
                kind: ResolutionErrorKind::DescriptorNotFound,
                ..
            }
        ));
        assert!(created.is_empty());
    }
}
