use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ar_cli::analysis::AnalysisError;
use ar_cli::commands::{analyze, schedule};
use ar_cli::{Cli, Commands, Config};

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load_from(cli.config.as_deref())
        .context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    match &cli.command {
        Some(Commands::Analyze(args)) => analyze::run(args, &config).await?,
        Some(Commands::Schedule(args)) => schedule::run(args, &config).await?,
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            // User-input failures exit distinctly from server-side ones.
            match err.downcast_ref::<AnalysisError>() {
                Some(analysis) => ExitCode::from(analysis.exit_code()),
                None => ExitCode::FAILURE,
            }
        }
    }
}
