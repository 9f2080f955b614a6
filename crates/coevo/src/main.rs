use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use coevo::cli::{Cli, Commands, LogFormat};
use coevo::commands::{run_init_config, run_merge_pairs, run_mine, run_replay};
use tracing_subscriber::{EnvFilter, fmt};

const LOG_ENV: &str = "COEVO_LOG";

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Human => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("coevo: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    match cli.command {
        Commands::Mine(args) => {
            let report = run_mine(&args)?;
            if report.failed > 0 {
                tracing::warn!(failed = report.failed, "some repositories could not be mined");
            }
            if !report.is_success() {
                tracing::error!(
                    errors = report.write_errors.len(),
                    "some outputs could not be written"
                );
                return Ok(ExitCode::FAILURE);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Replay(args) => {
            let rows = run_replay(&args)?;
            tracing::info!(rows, out = %args.out.display(), "wrote replayed pair table");
            Ok(ExitCode::SUCCESS)
        }
        Commands::MergePairs(args) => {
            let tables = run_merge_pairs(&args)?;
            tracing::info!(tables, out = %args.out.display(), "merged pair tables");
            Ok(ExitCode::SUCCESS)
        }
        Commands::InitConfig(args) => {
            run_init_config(&args)?;
            tracing::info!(path = %args.path.display(), "wrote default config");
            Ok(ExitCode::SUCCESS)
        }
    }
}
