//! The range analysis orchestrator.
//!
//! One run fetches tracked events and commits for `[start, end)`,
//! aggregates statistics, serializes the activity document, asks the
//! generation provider for a summary and a calendar entry, and optionally
//! inserts a calendar event. Collaborator failures (persistence,
//! calendar, individual repos) degrade the result; they never abort it.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use ar_core::event::{CategoryRules, NormalizedEvent, RawEvent, normalize_event};
use ar_core::commit::build_commit_events;
use ar_core::format::ReportClock;
use ar_core::prompt::{PromptInput, build_analysis_prompt, build_calendar_prompt, build_human_summary};
use ar_core::range::format_range_label;
use ar_core::stats::{LocalDevRules, compute_stats};
use ar_core::xml::build_activity_document;
use ar_llm::{CalendarObject, Generator, LlmError, Provider};

use crate::calendar::{CalendarEventParams, CalendarOutcome, create_event_if_configured};
use crate::config::Config;
use crate::{git, persist};

/// Typed orchestrator failure carrying an HTTP-style status.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Bad range or unrecognized provider name.
    #[error("{0}")]
    InvalidInput(String),
    /// No activity or commit data in the range.
    #[error("{0}")]
    NotFound(String),
    /// Missing credentials or an unusable event store.
    #[error("{0}")]
    Configuration(String),
    /// Generation-service failure.
    #[error("generation failed: {0}")]
    Llm(#[from] LlmError),
    /// Anything else.
    #[error("{0}")]
    Unexpected(String),
}

impl AnalysisError {
    /// HTTP-style status class for this failure.
    pub const fn status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::NotFound(_) => 404,
            Self::Configuration(_) | Self::Llm(_) | Self::Unexpected(_) => 500,
        }
    }

    /// Process exit code: user-input errors are distinct from server-side
    /// ones.
    pub const fn exit_code(&self) -> u8 {
        if self.status() < 500 { 2 } else { 1 }
    }
}

/// Inputs for one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisInput {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Provider name, resolved after the data is known to exist.
    pub provider: String,
    pub create_calendar: bool,
    pub save_xml: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RangeInfo {
    pub start: String,
    pub end: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCounts {
    pub activity_events: usize,
    pub git_commits: usize,
}

/// The orchestrator's single return value.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeAnalysisReport {
    pub range: RangeInfo,
    pub provider: String,
    pub counts: EventCounts,
    pub human_summary: String,
    pub prompt: String,
    #[serde(rename = "result")]
    pub result_text: String,
    pub xml_path: Option<PathBuf>,
    pub calendar_object: CalendarObject,
    pub calendar_result: Option<CalendarOutcome>,
}

fn local_dev_rules(config: &Config) -> LocalDevRules {
    let project_pattern = config
        .report
        .local_dev_project_pattern
        .as_deref()
        .and_then(|pattern| match Regex::new(pattern) {
            Ok(re) => Some(re),
            Err(err) => {
                tracing::warn!(%pattern, error = %err, "ignoring invalid local-dev pattern");
                None
            }
        });
    LocalDevRules { project_pattern }
}

fn machine_name() -> Option<String> {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn calendar_summary(object: &CalendarObject, label: &str) -> String {
    let title = object.title.trim();
    let base = if title.is_empty() {
        format!("Work session ({label})")
    } else {
        title.to_string()
    };
    let prefixed = match machine_name() {
        Some(name) => format!("[{name}] {base}"),
        None => base,
    };
    truncate_chars(&prefixed, 50)
}

fn calendar_description(object: &CalendarObject, fallback: &str) -> String {
    let mut lines = Vec::new();
    if !object.summary.is_empty() {
        lines.push(object.summary.clone());
    }
    if !object.bullets.is_empty() {
        lines.push(format!("\n・{}", object.bullets.join("\n・")));
    }
    let description = lines.join("\n").trim().to_string();
    if description.is_empty() {
        fallback.to_string()
    } else {
        description
    }
}

/// Runs one range analysis.
///
/// `resolve_generator` is called once the range is validated and known to
/// contain data; its failure aborts the run with the propagated error.
pub async fn run_range_analysis<G, F>(
    input: &AnalysisInput,
    config: &Config,
    http: &reqwest::Client,
    resolve_generator: F,
) -> Result<RangeAnalysisReport, AnalysisError>
where
    G: Generator,
    F: FnOnce(Provider) -> Result<G, AnalysisError>,
{
    if input.end <= input.start {
        return Err(AnalysisError::InvalidInput(
            "'end' must be after 'start'".to_string(),
        ));
    }

    let start = input.start;
    let end = input.end;
    tracing::info!(start = %start.to_rfc3339(), end = %end.to_rfc3339(), "range");

    // The two sources are independent reads; fetch them concurrently. The
    // store is synchronous rusqlite, so it runs on a blocking thread with
    // a handle opened for just this run.
    let db_path = config.database_path.clone();
    let events_task = tokio::task::spawn_blocking(move || {
        let db = ar_db::Database::open_readonly(&db_path)?;
        db.events_by_time_range(start, end, None)
    });
    let (events, commits) = tokio::join!(
        events_task,
        git::collect_commits_in_range(&config.git, start, end)
    );
    let mut events = events
        .map_err(|err| AnalysisError::Unexpected(format!("event fetch panicked: {err}")))?
        .map_err(|err| AnalysisError::Unexpected(format!("event store read failed: {err}")))?;
    let commit_events = build_commit_events(&commits);
    tracing::info!(
        activity_events = events.len(),
        git_commits = commits.len(),
        "fetched"
    );

    events.sort_by_key(|event| event.timestamp);
    if events.is_empty() && commit_events.is_empty() {
        return Err(AnalysisError::NotFound(
            "no activity or commit data found for the given range".to_string(),
        ));
    }

    let tracked: Vec<RawEvent> = events
        .into_iter()
        .filter(|event| event.duration.is_finite() && event.duration > 0.0)
        .collect();

    let rules = CategoryRules::default();
    let normalized: Vec<NormalizedEvent> = tracked
        .iter()
        .filter_map(|event| normalize_event(event, &rules))
        .collect();

    // Commits carry a placeholder duration; keeping them out of the stats
    // keeps every duration-based metric honest.
    let range_ms = (end - start).num_milliseconds();
    let stats = compute_stats(&normalized, range_ms, &local_dev_rules(config));
    tracing::info!(
        total_seconds = stats.total_seconds,
        category_switches = stats.switches.category,
        local_dev_seconds = stats.local_dev_seconds,
        "stats"
    );

    let mut merged: Vec<RawEvent> = tracked.iter().cloned().chain(commit_events).collect();
    merged.sort_by_key(|event| event.timestamp);

    let snapshots = git::build_file_snapshots(&config.git, &commits).await;
    tracing::info!(files = snapshots.len(), "snapshots");

    let clock = ReportClock {
        utc_offset_hours: config.report.utc_offset_hours,
    };
    let document = build_activity_document(&stats, &merged, &snapshots, clock);

    let xml_path = if input.save_xml {
        let path = persist::persist_xml(&config.xml_output_dir, &document).await;
        tracing::info!(path = ?path, chars = document.len(), "xml");
        path
    } else {
        tracing::debug!(chars = document.len(), "xml persistence disabled");
        None
    };

    let human_summary = build_human_summary(&stats);
    let prompt_input = PromptInput {
        start,
        end,
        human_summary: human_summary.clone(),
        activity_xml: document,
        clock,
    };
    let prompt = build_analysis_prompt(&prompt_input);

    let provider: Provider = input
        .provider
        .parse()
        .map_err(|err: LlmError| AnalysisError::InvalidInput(err.to_string()))?;
    let generator = resolve_generator(provider)?;

    let result_text = generator.generate_text(&prompt).await?;
    tracing::info!(chars = result_text.len(), "analysis generated");

    let calendar_prompt = build_calendar_prompt(&prompt_input);
    let calendar_object = generator.generate_calendar_object(&calendar_prompt).await?;
    tracing::info!(
        title = %calendar_object.title,
        bullets = calendar_object.bullets.len(),
        "calendar object generated"
    );

    let label = format_range_label(start, end);
    let calendar_result = if input.create_calendar {
        let params = CalendarEventParams {
            start,
            end,
            summary: calendar_summary(&calendar_object, &label),
            description: calendar_description(&calendar_object, &result_text),
        };
        let outcome = create_event_if_configured(&config.calendar, http, &params).await;
        tracing::info!(
            inserted = outcome.inserted,
            reason = ?outcome.reason,
            "calendar insert"
        );
        Some(outcome)
    } else {
        tracing::debug!("calendar creation not requested");
        None
    };

    Ok(RangeAnalysisReport {
        range: RangeInfo {
            start: start.to_rfc3339(),
            end: end.to_rfc3339(),
            label,
        },
        provider: provider.to_string(),
        counts: EventCounts {
            activity_events: tracked.len(),
            git_commits: commits.len(),
        },
        human_summary,
        prompt,
        result_text,
        xml_path,
        calendar_object,
        calendar_result,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::path::Path;

    struct FakeGenerator;

    impl Generator for FakeGenerator {
        async fn generate_text(&self, _prompt: &str) -> Result<String, LlmError> {
            Ok("analysis text".to_string())
        }

        async fn generate_calendar_object(
            &self,
            _prompt: &str,
        ) -> Result<CalendarObject, LlmError> {
            Ok(CalendarObject {
                title: "Worked on the analyzer".to_string(),
                summary: "Implemented the orchestrator.".to_string(),
                bullets: vec!["wired stats".to_string(), "added tests".to_string()],
            })
        }
    }

    fn test_config(dir: &Path) -> Config {
        Config {
            database_path: dir.join("store.db"),
            xml_output_dir: dir.join("xml"),
            git: crate::config::GitConfig {
                scan_root: dir.join("no-repos"),
                author_pattern: Some("nobody".to_string()),
                ..crate::config::GitConfig::default()
            },
            ..Config::default()
        }
    }

    fn seed_store(config: &Config) {
        let db = ar_db::Database::open(&config.database_path).unwrap();
        db.init_schema().unwrap();
        db.insert_bucket(1, "window-bucket", "currentwindow").unwrap();
        let t0 = Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap();
        db.insert_event(
            1,
            t0,
            600.0,
            r#"{"app":"Cursor","title":"main.rs — myproj"}"#,
        )
        .unwrap();
        db.insert_event(
            1,
            t0 + chrono::Duration::seconds(600),
            300.0,
            r##"{"app":"Slack","title":"#general - acme - Slack"}"##,
        )
        .unwrap();
    }

    fn input(start_h: u32, end_h: u32) -> AnalysisInput {
        AnalysisInput {
            start: Utc.with_ymd_and_hms(2025, 6, 1, start_h, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 1, end_h, 0, 0).unwrap(),
            provider: "gemini".to_string(),
            create_calendar: false,
            save_xml: false,
        }
    }

    #[tokio::test]
    async fn inverted_range_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        let err = run_range_analysis(&input(10, 9), &config, &reqwest::Client::new(), |_| {
            Ok(FakeGenerator)
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), 400);
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn empty_range_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_store(&config);
        // Query a window with no rows.
        let empty = AnalysisInput {
            start: Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 2, 1, 0, 0).unwrap(),
            ..input(9, 10)
        };
        let err = run_range_analysis(&empty, &config, &reqwest::Client::new(), |_| {
            Ok(FakeGenerator)
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), 404);
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn unknown_provider_is_invalid_input_after_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_store(&config);
        let bad = AnalysisInput {
            provider: "claude".to_string(),
            ..input(9, 10)
        };
        let err = run_range_analysis(&bad, &config, &reqwest::Client::new(), |_| {
            Ok(FakeGenerator)
        })
        .await
        .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn report_covers_counts_text_and_object() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_store(&config);
        let report = run_range_analysis(&input(9, 10), &config, &reqwest::Client::new(), |_| {
            Ok(FakeGenerator)
        })
        .await
        .unwrap();

        assert_eq!(report.counts.activity_events, 2);
        assert_eq!(report.counts.git_commits, 0);
        assert_eq!(report.result_text, "analysis text");
        assert_eq!(report.range.label, "1h");
        assert!(report.human_summary.contains("coding 10m"));
        assert!(report.xml_path.is_none());
        assert!(report.calendar_result.is_none());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["counts"]["activityEvents"], 2);
        assert_eq!(json["result"], "analysis text");
        assert_eq!(json["calendarObject"]["bullets"][0], "wired stats");
        assert!(json["xmlPath"].is_null());
    }

    #[tokio::test]
    async fn save_xml_persists_the_document() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_store(&config);
        let saving = AnalysisInput {
            save_xml: true,
            ..input(9, 10)
        };
        let report = run_range_analysis(&saving, &config, &reqwest::Client::new(), |_| {
            Ok(FakeGenerator)
        })
        .await
        .unwrap();
        let path = report.xml_path.expect("xml should be persisted");
        let document = std::fs::read_to_string(path).unwrap();
        assert!(document.starts_with("<stats>"));
        assert!(document.contains("<events>"));
    }

    #[tokio::test]
    async fn unconfigured_calendar_reports_skip_without_failing() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());
        seed_store(&config);
        let with_calendar = AnalysisInput {
            create_calendar: true,
            ..input(9, 10)
        };
        let report =
            run_range_analysis(&with_calendar, &config, &reqwest::Client::new(), |_| {
                Ok(FakeGenerator)
            })
            .await
            .unwrap();
        let outcome = report.calendar_result.expect("calendar outcome recorded");
        assert!(!outcome.inserted);
        assert!(outcome.reason.is_some_and(|reason| !reason.is_empty()));
    }

    #[test]
    fn calendar_summary_truncates_and_falls_back() {
        let object = CalendarObject {
            title: "x".repeat(80),
            summary: String::new(),
            bullets: vec![],
        };
        assert!(calendar_summary(&object, "30m").chars().count() <= 50);

        let blank = CalendarObject {
            title: "  ".to_string(),
            summary: String::new(),
            bullets: vec![],
        };
        assert!(calendar_summary(&blank, "30m").contains("Work session (30m)"));
    }

    #[test]
    fn calendar_description_falls_back_to_free_text() {
        let empty = CalendarObject {
            title: "t".to_string(),
            summary: String::new(),
            bullets: vec![],
        };
        assert_eq!(calendar_description(&empty, "fallback"), "fallback");

        let full = CalendarObject {
            title: "t".to_string(),
            summary: "Did things.".to_string(),
            bullets: vec!["one".to_string(), "two".to_string()],
        };
        let description = calendar_description(&full, "fallback");
        assert!(description.starts_with("Did things."));
        assert!(description.contains("・one\n・two"));
    }
}
