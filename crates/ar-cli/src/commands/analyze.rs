//! The one-shot `analyze` command.

use chrono::{DateTime, Duration, Utc};

use ar_core::range::parse_date_input;
use ar_llm::LlmError;

use crate::analysis::{AnalysisError, AnalysisInput, run_range_analysis};
use crate::cli::AnalyzeArgs;
use crate::config::Config;

const DEFAULT_LOOKBACK_MINUTES: i64 = 30;

fn parse_required(label: &str, value: &str) -> Result<DateTime<Utc>, AnalysisError> {
    parse_date_input(value)
        .ok_or_else(|| AnalysisError::InvalidInput(format!("invalid {label} date: {value}")))
}

/// Resolves the `[start, end)` range from the flags. An explicit date that
/// fails to parse is an input error; an absent one falls back (end to now,
/// start to end minus the lookback).
fn resolve_range(args: &AnalyzeArgs, now: DateTime<Utc>) -> Result<(DateTime<Utc>, DateTime<Utc>), AnalysisError> {
    let end = match args.end.as_deref() {
        Some(value) => parse_required("end", value)?,
        None => now,
    };
    let lookback_minutes = args
        .minutes
        .or_else(|| args.hours.map(|h| h * 60))
        .unwrap_or(DEFAULT_LOOKBACK_MINUTES);
    let start = match args.start.as_deref() {
        Some(value) => parse_required("start", value)?,
        None => end - Duration::minutes(lookback_minutes),
    };
    Ok((start, end))
}

pub async fn run(args: &AnalyzeArgs, config: &Config) -> Result<(), AnalysisError> {
    let (start, end) = resolve_range(args, Utc::now())?;
    let provider = args
        .provider
        .clone()
        .unwrap_or_else(|| config.llm.provider.clone());

    let input = AnalysisInput {
        start,
        end,
        provider,
        create_calendar: !args.no_calendar,
        save_xml: args.save_xml,
    };

    let http = reqwest::Client::new();
    let llm_config = config.llm.to_llm_config();
    let report = run_range_analysis(&input, config, &http, |provider| {
        ar_llm::Client::new(provider, &llm_config).map_err(|err| match err {
            LlmError::InvalidApiKey { .. } => AnalysisError::Configuration(err.to_string()),
            other => AnalysisError::Llm(other),
        })
    })
    .await?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&report)
            .map_err(|err| AnalysisError::Unexpected(format!("failed to render JSON: {err}")))?;
        println!("{rendered}");
    } else {
        println!("{}", report.result_text);
        println!();
        println!(
            "range {} → {} ({}), {} events, {} commits",
            report.range.start,
            report.range.end,
            report.range.label,
            report.counts.activity_events,
            report.counts.git_commits
        );
        if let Some(path) = &report.xml_path {
            println!("xml saved to {}", path.display());
        }
        if let Some(calendar) = &report.calendar_result {
            if calendar.inserted {
                println!(
                    "calendar event created{}",
                    calendar
                        .html_link
                        .as_deref()
                        .map(|link| format!(": {link}"))
                        .unwrap_or_default()
                );
            } else if let Some(reason) = &calendar.reason {
                println!("calendar event skipped: {reason}");
            }
        }
    }

    Ok(())
}
