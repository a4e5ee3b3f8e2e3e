use std::path::Path;
use std::process::Command;

use asat_config::EvaluatorConfig;

use crate::error::ResolveError;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EvaluationOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl EvaluationOutput {
    /// Stdout followed by stderr, for classification and error records.
    pub fn combined_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stdout).into_owned();
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        text
    }
}

/// Produces the merged, fully inherited descriptor for the module rooted at
/// `descriptor_dir`.
pub trait BuildEvaluator {
    fn evaluate(&self, descriptor_dir: &Path) -> Result<EvaluationOutput, ResolveError>;
}

impl<T: BuildEvaluator + ?Sized> BuildEvaluator for &T {
    fn evaluate(&self, descriptor_dir: &Path) -> Result<EvaluationOutput, ResolveError> {
        (**self).evaluate(descriptor_dir)
    }
}

/// Runs an external program (by default `mvn help:effective-pom -B -U`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEvaluator {
    program: String,
    args: Vec<String>,
}

impl CommandEvaluator {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(config: &EvaluatorConfig) -> Self {
        Self::new(config.program.clone(), config.args.clone())
    }
}

impl BuildEvaluator for CommandEvaluator {
    fn evaluate(&self, descriptor_dir: &Path) -> Result<EvaluationOutput, ResolveError> {
        tracing::debug!(
            program = %self.program,
            dir = %descriptor_dir.display(),
            "running build evaluator"
        );
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(descriptor_dir)
            .output()
            .map_err(|source| ResolveError::EvaluatorLaunch {
                program: self.program.clone(),
                source,
            })?;

        Ok(EvaluationOutput {
            success: output.status.success(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
