mod changes;
mod classify;
mod descriptor;
mod error;
mod evaluator;
mod extract;
mod repair;
mod resolver;
mod rulefile;
mod xml;

pub use changes::{BuildChange, build_changes};
pub use classify::{Classification, FailureClassifier, FailureMarker};
pub use error::{ResolutionError, ResolutionErrorKind, ResolveError};
pub use evaluator::{BuildEvaluator, CommandEvaluator, EvaluationOutput};
pub use extract::extract_descriptor_xml;
pub use repair::{ParentCoordinates, ParentField, ParentReplacement, plan_parent_repairs, repair_descriptor};
pub use resolver::{ConfigurationResolver, HistoryResolution, ModuleConfigurations, RevisionOutcome};
pub use rulefile::RuleFileResolution;
pub use xml::{Element, XmlError};
