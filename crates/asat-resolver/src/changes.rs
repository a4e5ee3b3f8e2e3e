use asat_core::{ChangedPath, GitError, GitWorkingCopy};
use asat_rules::HistoricalOverrides;
use serde::Serialize;

/// A revision whose changes touch the build configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildChange {
    pub revision: String,
    /// Lower-cased paths that made the revision relevant.
    pub paths: Vec<String>,
}

/// Selects the revisions of `path` that touch a build descriptor or a tracked
/// rule file, comparing each revision with its predecessor on the path. The
/// first revision is always selected.
pub fn build_changes(
    working_copy: &GitWorkingCopy,
    path: &[String],
    overrides: &HistoricalOverrides,
    descriptor_name: &str,
) -> Result<Vec<BuildChange>, GitError> {
    let descriptor_name = descriptor_name.to_lowercase();
    let mut selected = Vec::new();
    let mut previous: Option<&str> = None;

    for revision in path {
        let changed = working_copy.changed_paths(previous, revision)?;
        let paths = changed
            .iter()
            .filter(|change| is_build_relevant(change, overrides, &descriptor_name))
            .map(|change| change.path.to_lowercase())
            .collect::<Vec<_>>();

        if previous.is_none() || !paths.is_empty() {
            tracing::debug!(revision = %revision, files = paths.len(), "build configuration changed");
            selected.push(BuildChange {
                revision: revision.clone(),
                paths,
            });
        }
        previous = Some(revision);
    }

    Ok(selected)
}

fn is_build_relevant(
    change: &ChangedPath,
    overrides: &HistoricalOverrides,
    descriptor_name: &str,
) -> bool {
    [Some(change.path.as_str()), change.old_path.as_deref()]
        .into_iter()
        .flatten()
        .map(str::to_lowercase)
        .any(|path| {
            is_descriptor(&path, descriptor_name)
                || overrides.is_legacy_descriptor_name(&path)
                || overrides.is_tracked_rule_file(&path)
        })
}

fn is_descriptor(path: &str, descriptor_name: &str) -> bool {
    path == descriptor_name || path.ends_with(&format!("/{descriptor_name}"))
}
