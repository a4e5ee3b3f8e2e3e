use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ASAT_DIR_NAME: &str = ".asat";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_WINDOW_DAYS: u32 = 119;
pub const DEFAULT_EVALUATOR_PROGRAM: &str = "mvn";
pub const DEFAULT_EVALUATOR_ARGS: [&str; 3] = ["help:effective-pom", "-B", "-U"];
pub const DEFAULT_DESCRIPTOR_NAME: &str = "pom.xml";
pub const DEFAULT_SOURCE_EXTENSION: &str = ".java";
pub const DEFAULT_TEST_MARKER: &str = "/test/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AsatConfig {
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip: Option<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            tip: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default = "default_evaluator_program")]
    pub program: String,
    #[serde(default = "default_evaluator_args")]
    pub args: Vec<String>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            program: default_evaluator_program(),
            args: default_evaluator_args(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default = "default_descriptor_name")]
    pub descriptor_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides_path: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            project: None,
            descriptor_name: default_descriptor_name(),
            catalog_path: None,
            overrides_path: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_source_extension")]
    pub source_extension: String,
    #[serde(default = "default_test_marker")]
    pub test_marker: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            source_extension: default_source_extension(),
            test_marker: default_test_marker(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn asat_dir(workspace_root: impl AsRef<Path>) -> PathBuf {
    workspace_root.as_ref().join(ASAT_DIR_NAME)
}

pub fn config_path(workspace_root: impl AsRef<Path>) -> PathBuf {
    asat_dir(workspace_root).join(CONFIG_FILE_NAME)
}

pub fn load_workspace_config(workspace_root: impl AsRef<Path>) -> Result<AsatConfig, ConfigError> {
    let path = config_path(workspace_root);
    if !path.exists() {
        return Ok(AsatConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: AsatConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_workspace_config(
    workspace_root: impl AsRef<Path>,
) -> Result<AsatConfig, ConfigError> {
    let workspace_root = workspace_root.as_ref();
    fs::create_dir_all(asat_dir(workspace_root))?;

    let path = config_path(workspace_root);
    if path.exists() {
        return load_workspace_config(workspace_root);
    }

    let config = AsatConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &AsatConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.history.window_days == 0 {
        warnings.push(ConfigWarning {
            code: "history_window_zero",
            message: "history.window_days is 0; every revision will start its own window"
                .to_owned(),
        });
    }
    if config.resolver.project.is_none() {
        warnings.push(ConfigWarning {
            code: "resolver_project_unset",
            message: "resolver.project is not set; historical overrides will not apply".to_owned(),
        });
    }
    if !config.analysis.source_extension.starts_with('.') {
        warnings.push(ConfigWarning {
            code: "analysis_extension_without_dot",
            message: format!(
                "analysis.source_extension '{}' does not start with '.'",
                config.analysis.source_extension
            ),
        });
    }

    warnings
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

fn default_evaluator_program() -> String {
    DEFAULT_EVALUATOR_PROGRAM.to_owned()
}

fn default_evaluator_args() -> Vec<String> {
    DEFAULT_EVALUATOR_ARGS
        .iter()
        .map(|arg| (*arg).to_owned())
        .collect()
}

fn default_descriptor_name() -> String {
    DEFAULT_DESCRIPTOR_NAME.to_owned()
}

fn default_source_extension() -> String {
    DEFAULT_SOURCE_EXTENSION.to_owned()
}

fn default_test_marker() -> String {
    DEFAULT_TEST_MARKER.to_owned()
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_config(mut config: AsatConfig) -> AsatConfig {
    config.history.tip = normalize_optional(config.history.tip.take());
    config.resolver.project = normalize_optional(config.resolver.project.take());

    let program = config.evaluator.program.trim();
    if program.is_empty() {
        config.evaluator.program = default_evaluator_program();
    } else {
        config.evaluator.program = program.to_owned();
    }

    let descriptor_name = config.resolver.descriptor_name.trim();
    if descriptor_name.is_empty() {
        config.resolver.descriptor_name = default_descriptor_name();
    } else {
        config.resolver.descriptor_name = descriptor_name.to_owned();
    }

    if config.analysis.source_extension.trim().is_empty() {
        config.analysis.source_extension = default_source_extension();
    }
    if config.analysis.test_marker.trim().is_empty() {
        config.analysis.test_marker = default_test_marker();
    }

    config
}
