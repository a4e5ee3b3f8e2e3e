mod align;
mod delta;
mod path;
mod source;

use asat_core::GitError;
use thiserror::Error;

pub use align::{Alignment, EditOperation, align};
pub use delta::{
    ChangeLocation, DeltaHistory, FileDelta, MetricsDelta, RevisionChanges, RevisionDelta,
    RevisionSummary, WarningCounts, collect_revision_changes, delta_history, revision_summaries,
    warning_deltas,
};
pub use path::{CommitPath, CommitPathExtractor, chunk_by_window};
pub use source::{FileMetrics, FileReport, Finding, JsonWarningSource, RevisionReport, WarningSource};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("edit distance {distance} produced no operations")]
    EmptyEditScript { distance: usize },
    #[error("no origin revision has a path to {tip}")]
    NoPathFound { tip: String },
    #[error("unknown revision {0}")]
    UnknownRevision(String),
    #[error("git error: {0}")]
    Git(#[from] GitError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
