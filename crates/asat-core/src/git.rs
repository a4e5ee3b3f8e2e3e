use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;

use crate::{Revision, normalize_hash, normalize_path};

#[derive(Debug, Error)]
pub enum GitError {
    #[error("no git repository found at {0}")]
    NotARepository(PathBuf),
    #[error("failed to resolve revision '{spec}': {message}")]
    UnknownRevision { spec: String, message: String },
    #[error("working copy at {root} has uncommitted changes to tracked files: {paths}")]
    DirtyWorkingCopy { root: PathBuf, paths: String },
    #[error("git {command} failed: {stderr}")]
    CommandFailed { command: String, stderr: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("git error: {0}")]
    Message(String),
}

pub struct GitContext {
    repo: gix::Repository,
}

impl GitContext {
    pub fn open(workspace: &Path) -> Result<Self, GitError> {
        gix::discover(workspace)
            .map(|repo| Self { repo })
            .map_err(|_| GitError::NotARepository(workspace.to_path_buf()))
    }

    pub fn head_commit_hash(&self) -> Result<String, GitError> {
        let head_id = self
            .repo
            .head_id()
            .map_err(|err| GitError::Message(format!("failed to resolve HEAD: {err}")))?
            .detach();
        Ok(normalize_hash(&head_id.to_string()))
    }

    pub fn resolve_revision(&self, spec: &str) -> Result<String, GitError> {
        let id = self
            .repo
            .rev_parse_single(spec)
            .map_err(|err| GitError::UnknownRevision {
                spec: spec.to_owned(),
                message: err.to_string(),
            })?;
        Ok(normalize_hash(&id.detach().to_string()))
    }

    /// Every revision reachable from `tip`, with parents and committer time.
    pub fn revisions_reachable_from(&self, tip: &str) -> Result<Vec<Revision>, GitError> {
        let tip_id = self
            .repo
            .rev_parse_single(tip)
            .map_err(|err| GitError::UnknownRevision {
                spec: tip.to_owned(),
                message: err.to_string(),
            })?
            .detach();

        let walk = self
            .repo
            .rev_walk([tip_id])
            .all()
            .map_err(|err| GitError::Message(format!("failed to start revision walk: {err}")))?;

        let mut revisions = Vec::new();
        for entry in walk {
            let info = match entry {
                Ok(info) => info,
                Err(err) => {
                    return Err(GitError::Message(format!(
                        "revision walk entry failed: {err}"
                    )));
                }
            };
            let commit = self
                .repo
                .find_commit(info.id)
                .map_err(|err| GitError::Message(format!("failed to load commit: {err}")))?;
            let parents = commit
                .parent_ids()
                .map(|id| id.detach().to_string())
                .collect::<Vec<_>>();
            let timestamp = commit.time().map(|time| time.seconds).unwrap_or(0);
            revisions.push(Revision::new(info.id.to_string(), parents, timestamp));
        }

        Ok(revisions)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Other,
}

impl ChangeKind {
    fn parse(status: &str) -> Self {
        match status.chars().next() {
            Some('A') => Self::Added,
            Some('M') => Self::Modified,
            Some('D') => Self::Deleted,
            Some('R') => Self::Renamed,
            Some('C') => Self::Copied,
            Some('T') => Self::TypeChanged,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    pub kind: ChangeKind,
    pub path: String,
    pub old_path: Option<String>,
}

impl ChangedPath {
    pub fn previous_path(&self) -> &str {
        self.old_path.as_deref().unwrap_or(self.path.as_str())
    }
}

/// A git working tree that can be moved to arbitrary revisions.
#[derive(Debug, Clone)]
pub struct GitWorkingCopy {
    root: PathBuf,
}

impl GitWorkingCopy {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Paths changed between `from` and `to`; without `from` the whole tree of
    /// `to` is reported as added.
    pub fn changed_paths(&self, from: Option<&str>, to: &str) -> Result<Vec<ChangedPath>, GitError> {
        let mut args = vec!["diff-tree", "--name-status", "-r", "-M", "--no-commit-id"];
        match from {
            Some(from) => {
                args.push(from);
                args.push(to);
            }
            None => {
                args.push("--root");
                args.push(to);
            }
        }
        let stdout = self.run(&args)?;

        let mut changes = Vec::new();
        for line in stdout.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let mut parts = line.split('\t');
            let status = parts.next().unwrap_or_default().trim();
            let first = parts.next().unwrap_or_default().trim();
            let second = parts.next().map(str::trim);
            if first.is_empty() {
                continue;
            }

            let kind = ChangeKind::parse(status);
            let change = match (kind, second) {
                (ChangeKind::Renamed | ChangeKind::Copied, Some(new_path)) => ChangedPath {
                    kind,
                    path: normalize_path(new_path),
                    old_path: Some(normalize_path(first)),
                },
                _ => ChangedPath {
                    kind,
                    path: normalize_path(first),
                    old_path: None,
                },
            };
            changes.push(change);
        }

        Ok(changes)
    }

    /// Force-checks out `revision`; the returned session restores the
    /// previous checkout when finished or dropped. Refuses to start while
    /// tracked files carry uncommitted edits, since the forced checkout
    /// would discard them.
    pub fn checkout(&self, revision: &str) -> Result<CheckoutSession<'_>, GitError> {
        self.ensure_clean()?;
        let branch = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let original = if branch.trim() == "HEAD" {
            self.run(&["rev-parse", "HEAD"])?
        } else {
            branch
        };

        self.run(&["checkout", "-f", "-q", revision])?;
        tracing::debug!(revision, original = original.trim(), "checked out revision");

        Ok(CheckoutSession {
            working_copy: self,
            original: original.trim().to_owned(),
            revision: revision.to_owned(),
            created: Vec::new(),
            restored: false,
        })
    }

    /// Fails with [`GitError::DirtyWorkingCopy`] when tracked files differ
    /// from `HEAD`. Untracked files are ignored.
    pub fn ensure_clean(&self) -> Result<(), GitError> {
        let status = self.run(&["status", "--porcelain", "--untracked-files=no"])?;
        let paths = status
            .lines()
            .filter_map(|line| line.get(3..))
            .map(str::trim)
            .filter(|path| !path.is_empty())
            .collect::<Vec<_>>();
        if paths.is_empty() {
            return Ok(());
        }
        Err(GitError::DirtyWorkingCopy {
            root: self.root.clone(),
            paths: paths.join(", "),
        })
    }

    fn run(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.root)
            .args(args)
            .output()?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Scoped checkout of one revision. Files registered with
/// [`CheckoutSession::track_created`] are removed and the original checkout
/// is restored on every exit path.
pub struct CheckoutSession<'a> {
    working_copy: &'a GitWorkingCopy,
    original: String,
    revision: String,
    created: Vec<PathBuf>,
    restored: bool,
}

impl CheckoutSession<'_> {
    pub fn root(&self) -> &Path {
        self.working_copy.root()
    }

    pub fn revision(&self) -> &str {
        &self.revision
    }

    pub fn track_created(&mut self, path: impl Into<PathBuf>) {
        self.created.push(path.into());
    }

    pub fn finish(mut self) -> Result<(), GitError> {
        self.restore()
    }

    fn restore(&mut self) -> Result<(), GitError> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;

        for path in self.created.drain(..) {
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        self.working_copy
            .run(&["checkout", "-f", "-q", self.original.as_str()])?;
        Ok(())
    }
}

impl Drop for CheckoutSession<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.restore() {
            tracing::error!(
                revision = %self.revision,
                original = %self.original,
                error = %err,
                "failed to restore working copy"
            );
        }
    }
}
