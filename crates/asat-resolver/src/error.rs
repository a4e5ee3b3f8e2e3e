use std::fmt;

use asat_core::{GitError, ModuleIdentity};
use asat_rules::CatalogError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures recorded against a revision; history processing continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionErrorKind {
    DescriptorNotFound,
    DescriptorParseFailure,
    UnresolvableParent,
    MalformedDescriptor,
    UnresolvableBuildExtension,
    ChildModuleFailure,
    UnknownEvaluationFailure,
}

impl ResolutionErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DescriptorNotFound => "descriptor_not_found",
            Self::DescriptorParseFailure => "descriptor_parse_failure",
            Self::UnresolvableParent => "unresolvable_parent",
            Self::MalformedDescriptor => "malformed_descriptor",
            Self::UnresolvableBuildExtension => "unresolvable_build_extension",
            Self::ChildModuleFailure => "child_module_failure",
            Self::UnknownEvaluationFailure => "unknown_evaluation_failure",
        }
    }
}

impl fmt::Display for ResolutionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionError {
    pub revision: String,
    #[serde(rename = "error_type")]
    pub kind: ResolutionErrorKind,
    pub detail_line: String,
    pub raw_output: String,
}

/// Failures that abort resolution of the whole project.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("duplicate module identity {identity} at revision {revision}")]
    DuplicateModuleIdentity {
        revision: String,
        identity: ModuleIdentity,
    },
    #[error("rule file '{file}' at revision {revision} references unknown category '{category}'")]
    UnmappedRuleCategory {
        revision: String,
        file: String,
        category: String,
    },
    #[error(
        "module {module} at revision {revision} declares conflicting source directories '{existing}' and '{declared}'"
    )]
    SourceDirectoryConflict {
        revision: String,
        module: ModuleIdentity,
        existing: String,
        declared: String,
    },
    #[error("failed to launch build evaluator '{program}': {source}")]
    EvaluatorLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Git(#[from] GitError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// Internal step result: either a failure recorded for the revision or a fatal error.
#[derive(Debug)]
pub(crate) enum StepError {
    Recorded {
        kind: ResolutionErrorKind,
        detail_line: String,
        raw_output: String,
    },
    Fatal(ResolveError),
}

impl StepError {
    pub(crate) fn recorded(kind: ResolutionErrorKind, detail_line: impl Into<String>) -> Self {
        Self::Recorded {
            kind,
            detail_line: detail_line.into(),
            raw_output: String::new(),
        }
    }
}

impl From<ResolveError> for StepError {
    fn from(err: ResolveError) -> Self {
        Self::Fatal(err)
    }
}

impl From<std::io::Error> for StepError {
    fn from(err: std::io::Error) -> Self {
        Self::Fatal(ResolveError::Io(err))
    }
}
