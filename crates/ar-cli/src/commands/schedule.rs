//! The `schedule` command: the window scheduler's async loop.

use anyhow::Result;
use chrono::Utc;

use ar_core::range::parse_date_input;
use ar_llm::{LlmConfig, LlmError};

use crate::analysis::{AnalysisError, AnalysisInput, run_range_analysis};
use crate::cli::ScheduleArgs;
use crate::config::Config;
use crate::scheduler::{
    SchedulerState, WINDOW_MINUTES, floor_to_boundary, is_exact_boundary, next_boundary_after,
};

struct ScheduleRuntime<'a> {
    config: &'a Config,
    http: reqwest::Client,
    llm_config: LlmConfig,
    provider: String,
    create_calendar: bool,
    save_xml: bool,
    json: bool,
}

impl ScheduleRuntime<'_> {
    /// Runs the window ending at `end`, honoring the reentrancy guard and
    /// the back-fill rules in [`SchedulerState`].
    async fn run_window(&self, state: &mut SchedulerState, end: chrono::DateTime<Utc>, trigger: &str) {
        if !state.begin() {
            tracing::warn!(%trigger, "skipping trigger; previous run still in progress");
            return;
        }
        let (start, end) = state.window_for(end);
        tracing::info!(
            %trigger,
            start = %start.to_rfc3339(),
            end = %end.to_rfc3339(),
            "window start"
        );

        let input = AnalysisInput {
            start,
            end,
            provider: self.provider.clone(),
            create_calendar: self.create_calendar,
            save_xml: self.save_xml,
        };
        let result = run_range_analysis(&input, self.config, &self.http, |provider| {
            ar_llm::Client::new(provider, &self.llm_config).map_err(|err| match err {
                LlmError::InvalidApiKey { .. } => AnalysisError::Configuration(err.to_string()),
                other => AnalysisError::Llm(other),
            })
        })
        .await;

        match result {
            Ok(report) => {
                state.finish(end, true);
                if self.json {
                    match serde_json::to_string_pretty(&report) {
                        Ok(rendered) => println!("{rendered}"),
                        Err(err) => tracing::error!(error = %err, "failed to render JSON"),
                    }
                } else {
                    tracing::info!(
                        range = %report.range.label,
                        activity_events = report.counts.activity_events,
                        git_commits = report.counts.git_commits,
                        calendar = ?report.calendar_result.as_ref().map(|c| c.inserted),
                        "window succeeded"
                    );
                }
            }
            Err(err) => {
                // The unprocessed span is covered by the next success.
                state.finish(end, false);
                tracing::error!(status = err.status(), error = %err, "window failed");
            }
        }
    }
}

fn warn_ignored_overrides(args: &ScheduleArgs) {
    if let Some(interval) = args.interval {
        if interval != WINDOW_MINUTES {
            tracing::warn!(
                interval,
                "interval option is ignored; forcing {WINDOW_MINUTES}m interval"
            );
        }
    }
    let minutes_conflicts = args.minutes.is_some_and(|m| m != WINDOW_MINUTES);
    let hours_conflicts = args.hours.is_some_and(|h| h * 60 != WINDOW_MINUTES);
    if minutes_conflicts || hours_conflicts {
        tracing::warn!("custom lookback is ignored; forcing {WINDOW_MINUTES}m window");
    }
}

fn resolve_create_calendar(args: &ScheduleArgs, config: &Config) -> bool {
    if args.create {
        return true;
    }
    if args.no_create {
        return false;
    }
    match config.calendar.create {
        Some(configured) => {
            tracing::info!(enabled = configured, "calendar default from config");
            configured
        }
        None => {
            let configured = config.calendar.is_configured();
            tracing::info!(
                enabled = configured,
                "calendar default from configured credentials"
            );
            configured
        }
    }
}

pub async fn run(args: &ScheduleArgs, config: &Config) -> Result<()> {
    warn_ignored_overrides(args);

    let seed = args.start.as_deref().and_then(|value| {
        let Some(parsed) = parse_date_input(value) else {
            tracing::warn!(start = %value, "ignoring unparseable start option");
            return None;
        };
        let aligned = floor_to_boundary(parsed);
        if aligned != parsed {
            tracing::warn!(
                aligned = %aligned.to_rfc3339(),
                "start option rounded down to maintain {WINDOW_MINUTES}m window alignment"
            );
        }
        Some(aligned)
    });

    let runtime = ScheduleRuntime {
        config,
        http: reqwest::Client::new(),
        llm_config: config.llm.to_llm_config(),
        provider: args
            .provider
            .clone()
            .unwrap_or_else(|| config.llm.provider.clone()),
        create_calendar: resolve_create_calendar(args, config),
        save_xml: args.save_xml,
        json: args.json,
    };

    let mut state = SchedulerState::new(seed);
    let mut reference = Utc::now();
    if is_exact_boundary(reference) {
        runtime
            .run_window(&mut state, reference, "startup-boundary")
            .await;
    } else {
        let first = next_boundary_after(reference);
        tracing::info!(
            first = %first.to_rfc3339(),
            wait_secs = (first - reference).num_seconds(),
            "waiting for first boundary"
        );
    }

    loop {
        let next = next_boundary_after(reference);
        let delay = (next - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tracing::info!(
            next = %next.to_rfc3339(),
            delay_secs = delay.as_secs(),
            "scheduling next run"
        );
        tokio::select! {
            () = tokio::time::sleep(delay) => {
                runtime.run_window(&mut state, next, "scheduled").await;
                reference = next;
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("received shutdown signal, stopping scheduler");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::{Cli, Commands};
    use crate::config::CalendarConfig;

    fn schedule_args(argv: &[&str]) -> ScheduleArgs {
        let mut full = vec!["ar", "schedule"];
        full.extend_from_slice(argv);
        let cli = Cli::parse_from(full);
        match cli.command {
            Some(Commands::Schedule(args)) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn create_flag_wins_over_config() {
        let config = Config {
            calendar: CalendarConfig {
                create: Some(false),
                ..CalendarConfig::default()
            },
            ..Config::default()
        };
        assert!(resolve_create_calendar(&schedule_args(&["--create"]), &config));
        assert!(!resolve_create_calendar(&schedule_args(&["--no-create"]), &config));
    }

    #[test]
    fn config_create_wins_over_heuristic() {
        let config = Config {
            calendar: CalendarConfig {
                create: Some(true),
                ..CalendarConfig::default()
            },
            ..Config::default()
        };
        assert!(resolve_create_calendar(&schedule_args(&[]), &config));
    }

    #[test]
    fn heuristic_requires_full_calendar_config() {
        let mut config = Config::default();
        assert!(!resolve_create_calendar(&schedule_args(&[]), &config));

        config.calendar.calendar_id = Some("primary".to_string());
        config.calendar.access_token = Some("token".to_string());
        assert!(resolve_create_calendar(&schedule_args(&[]), &config));
    }
}
