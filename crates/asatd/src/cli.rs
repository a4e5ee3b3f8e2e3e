use std::ffi::OsStr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Human,
    Json,
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            other => Err(format!(
                "invalid log format '{other}', expected one of: human, json"
            )),
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Static-analysis configuration and warning history for a git repository"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        default_value = ".",
        help = "Repository working copy to analyse"
    )]
    pub workspace: PathBuf,

    #[arg(
        long,
        global = true,
        default_value = "human",
        value_parser = parse_log_format,
        help = "Log format on stderr: human or json"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// Print the canonical commit path and its time windows
    Path(PathArgs),
    /// Resolve the effective analysis configuration along the path
    Resolve(ResolveArgs),
    /// Per-file warning deltas between consecutive path revisions
    Deltas(DeltasArgs),
    /// Per-revision warning counts for code, test and effective files
    Summary(SummaryArgs),
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct PathArgs {
    #[arg(long, help = "Tip revision (defaults to the configured tip, then HEAD)")]
    pub tip: Option<String>,

    #[arg(long, help = "Window size in days (defaults to the configured window)")]
    pub window_days: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct ResolveArgs {
    #[arg(long, help = "Tip revision (defaults to the configured tip, then HEAD)")]
    pub tip: Option<String>,

    #[arg(
        long,
        help = "Resolve every path revision, not only those touching build files"
    )]
    pub all_revisions: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct DeltasArgs {
    #[arg(long, help = "Directory holding <revision>.json warning reports")]
    pub warnings: PathBuf,

    #[arg(long, help = "Tip revision (defaults to the configured tip, then HEAD)")]
    pub tip: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Args)]
pub struct SummaryArgs {
    #[arg(long, help = "Directory holding <revision>.json warning reports")]
    pub warnings: PathBuf,

    #[arg(long, help = "Output of the resolve command")]
    pub configurations: PathBuf,

    #[arg(long, help = "Tip revision (defaults to the configured tip, then HEAD)")]
    pub tip: Option<String>,
}

pub fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

fn parse_log_format(value: &str) -> Result<LogFormat, String> {
    value.parse()
}
