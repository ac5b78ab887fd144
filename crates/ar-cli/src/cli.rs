//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Activity range analyzer.
///
/// Reads tracked activity events and git commits for a time range, builds
/// a statistics-annotated activity document, and asks a generation
/// provider for a summary and a calendar entry.
#[derive(Debug, Parser)]
#[command(name = "ar", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze one explicit time range and exit.
    Analyze(AnalyzeArgs),

    /// Run the 30-minute window scheduler until interrupted.
    Schedule(ScheduleArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Range start: unix seconds/millis or an ISO 8601 timestamp.
    /// Defaults to end minus the lookback.
    #[arg(long)]
    pub start: Option<String>,

    /// Range end, same formats as --start. Defaults to now.
    #[arg(long)]
    pub end: Option<String>,

    /// Generation provider (openai or gemini). Defaults from config.
    #[arg(long)]
    pub provider: Option<String>,

    /// Skip calendar insertion (on by default).
    #[arg(long)]
    pub no_calendar: bool,

    /// Persist the serialized activity document.
    #[arg(long)]
    pub save_xml: bool,

    /// Lookback in minutes when --start is absent.
    #[arg(long)]
    pub minutes: Option<i64>,

    /// Lookback in hours when --start is absent.
    #[arg(long)]
    pub hours: Option<i64>,

    /// Print the full result as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    /// Generation provider (openai or gemini). Defaults from config.
    #[arg(long)]
    pub provider: Option<String>,

    /// Force calendar insertion on for every window.
    #[arg(long, conflicts_with = "no_create")]
    pub create: bool,

    /// Force calendar insertion off for every window.
    #[arg(long)]
    pub no_create: bool,

    /// Ignored: the window size is fixed at 30 minutes.
    #[arg(long)]
    pub minutes: Option<i64>,

    /// Ignored: the window size is fixed at 30 minutes.
    #[arg(long)]
    pub hours: Option<i64>,

    /// Ignored: the scheduling interval is fixed at 30 minutes.
    #[arg(long)]
    pub interval: Option<i64>,

    /// Seed for the first window's start; floored to a 30-minute boundary.
    #[arg(long)]
    pub start: Option<String>,

    /// Persist the serialized activity document for every window.
    #[arg(long)]
    pub save_xml: bool,

    /// Print each window's result as JSON.
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn analyze_parses_range_flags() {
        let cli = Cli::parse_from([
            "ar",
            "analyze",
            "--start",
            "2025-06-01T09:00:00Z",
            "--end",
            "2025-06-01T09:30:00Z",
            "--provider",
            "openai",
            "--save-xml",
            "--json",
        ]);
        let Some(Commands::Analyze(args)) = cli.command else {
            panic!("expected analyze subcommand");
        };
        assert_eq!(args.start.as_deref(), Some("2025-06-01T09:00:00Z"));
        assert_eq!(args.provider.as_deref(), Some("openai"));
        assert!(args.save_xml);
        assert!(args.json);
    }

    #[test]
    fn analyze_calendar_is_on_unless_disabled() {
        let cli = Cli::parse_from(["ar", "analyze"]);
        let Some(Commands::Analyze(args)) = cli.command else {
            panic!("expected analyze subcommand");
        };
        assert!(!args.no_calendar);

        let cli = Cli::parse_from(["ar", "analyze", "--no-calendar"]);
        let Some(Commands::Analyze(args)) = cli.command else {
            panic!("expected analyze subcommand");
        };
        assert!(args.no_calendar);
    }

    #[test]
    fn analyze_has_no_create_flag() {
        // Calendar insertion is the default; only schedule carries the
        // explicit --create/--no-create pair.
        assert!(Cli::try_parse_from(["ar", "analyze", "--create"]).is_err());
    }
}
