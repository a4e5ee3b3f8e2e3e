use anyhow::{Context, Result};
use asat_config::{ensure_workspace_config, validate_config};
use asatd::cli::{Cli, Commands, parse_cli};
use asatd::commands::{run_deltas, run_path, run_resolve, run_summary, write_json};
use asatd::logging::init_tracing;

fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format);
    run(cli)
}

fn run(cli: Cli) -> Result<()> {
    let workspace = cli.workspace.canonicalize().with_context(|| {
        format!(
            "failed to resolve workspace path {}",
            cli.workspace.display()
        )
    })?;

    let config = ensure_workspace_config(&workspace).with_context(|| {
        format!(
            "failed to load or create workspace config at {}",
            asat_config::config_path(&workspace).display()
        )
    })?;
    for warning in validate_config(&config) {
        tracing::warn!(code = warning.code, "{}", warning.message);
    }

    let mut out = std::io::stdout().lock();
    match &cli.command {
        Commands::Path(args) => write_json(&mut out, &run_path(&workspace, &config, args)?),
        Commands::Resolve(args) => write_json(&mut out, &run_resolve(&workspace, &config, args)?),
        Commands::Deltas(args) => write_json(&mut out, &run_deltas(&workspace, &config, args)?),
        Commands::Summary(args) => write_json(&mut out, &run_summary(&workspace, &config, args)?),
    }
}
