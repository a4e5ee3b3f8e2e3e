use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use asat_analysis::{
    AnalysisError, CommitPath, CommitPathExtractor, DeltaHistory, JsonWarningSource,
    RevisionSummary, collect_revision_changes, delta_history, revision_summaries,
};
use asat_config::AsatConfig;
use asat_core::{ConfigurationRow, GitContext, GitWorkingCopy};
use asat_resolver::{ConfigurationResolver, HistoryResolution, build_changes};
use serde::{Deserialize, Serialize};

use crate::cli::{DeltasArgs, PathArgs, ResolveArgs, SummaryArgs};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathReport {
    pub tip: String,
    pub origin: Option<String>,
    pub path: Vec<String>,
    pub chunks: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ResolvedConfigurations {
    configurations: Vec<ConfigurationRow>,
}

/// Canonical path to `tip`, or `None` when no origin reaches it.
pub fn commit_path(
    workspace: &Path,
    config: &AsatConfig,
    tip: Option<&str>,
) -> Result<(String, Option<CommitPath>)> {
    let context = GitContext::open(workspace)
        .with_context(|| format!("failed to open git repository at {}", workspace.display()))?;
    let tip = match tip.or(config.history.tip.as_deref()) {
        Some(spec) => context.resolve_revision(spec)?,
        None => context
            .head_commit_hash()
            .context("failed to resolve HEAD")?,
    };

    let revisions = context
        .revisions_reachable_from(&tip)
        .with_context(|| format!("failed to list revisions reachable from {tip}"))?;
    match CommitPathExtractor::new(revisions).extract(&tip) {
        Ok(path) => Ok((tip, Some(path))),
        Err(AnalysisError::NoPathFound { .. }) => {
            tracing::warn!(tip = %tip, "no origin revision reaches the tip, skipping");
            Ok((tip, None))
        }
        Err(err) => Err(err).context("failed to extract commit path"),
    }
}

pub fn run_path(workspace: &Path, config: &AsatConfig, args: &PathArgs) -> Result<PathReport> {
    let (tip, path) = commit_path(workspace, config, args.tip.as_deref())?;
    let window_days = args.window_days.unwrap_or(config.history.window_days);

    let Some(path) = path else {
        return Ok(PathReport {
            tip,
            origin: None,
            path: Vec::new(),
            chunks: Vec::new(),
        });
    };
    let chunks = path
        .chunks(window_days)
        .into_iter()
        .map(|chunk| chunk.into_iter().map(|revision| revision.hash).collect())
        .collect();
    Ok(PathReport {
        tip,
        origin: Some(path.origin.clone()),
        path: path.hashes(),
        chunks,
    })
}

pub fn run_resolve(
    workspace: &Path,
    config: &AsatConfig,
    args: &ResolveArgs,
) -> Result<HistoryResolution> {
    let (_, path) = commit_path(workspace, config, args.tip.as_deref())?;
    let Some(path) = path else {
        return Ok(HistoryResolution::default());
    };

    let resolver = ConfigurationResolver::from_config(config, workspace)
        .context("failed to load rule catalog or override tables")?;
    let working_copy = GitWorkingCopy::new(workspace);

    let revisions = if args.all_revisions {
        path.hashes()
    } else {
        build_changes(
            &working_copy,
            &path.hashes(),
            resolver.overrides(),
            resolver.descriptor_name(),
        )
        .context("failed to select revisions touching build files")?
        .into_iter()
        .map(|change| change.revision)
        .collect()
    };
    tracing::info!(
        path = path.revisions.len(),
        selected = revisions.len(),
        "resolving configuration history"
    );

    resolver
        .resolve_history(&working_copy, &revisions)
        .context("configuration resolution aborted")
}

pub fn run_deltas(workspace: &Path, config: &AsatConfig, args: &DeltasArgs) -> Result<DeltaHistory> {
    let (_, path) = commit_path(workspace, config, args.tip.as_deref())?;
    let Some(path) = path else {
        return Ok(DeltaHistory::default());
    };

    let working_copy = GitWorkingCopy::new(workspace);
    let steps = collect_revision_changes(&working_copy, &path.hashes())
        .context("failed to collect changed files along the path")?;
    let source = JsonWarningSource::new(&args.warnings);
    delta_history(&source, &config.analysis, &steps).context("failed to compute warning deltas")
}

pub fn run_summary(
    workspace: &Path,
    config: &AsatConfig,
    args: &SummaryArgs,
) -> Result<Vec<RevisionSummary>> {
    let raw = fs::read_to_string(&args.configurations).with_context(|| {
        format!(
            "failed to read configurations from {}",
            args.configurations.display()
        )
    })?;
    let resolved: ResolvedConfigurations = serde_json::from_str(&raw).with_context(|| {
        format!(
            "failed to parse configurations in {}",
            args.configurations.display()
        )
    })?;

    let (_, path) = commit_path(workspace, config, args.tip.as_deref())?;
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let source = JsonWarningSource::new(&args.warnings);
    revision_summaries(
        &source,
        &config.analysis,
        &path.revisions,
        &resolved.configurations,
    )
    .context("failed to summarise warnings")
}

pub fn write_json<W: Write, T: Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value).context("failed to serialize output")?;
    writeln!(out).context("failed to write output")?;
    Ok(())
}
