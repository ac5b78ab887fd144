//! Prompt construction for the generation service.
//!
//! Pure templating over the time range, a human-readable statistics
//! digest, and the serialized activity document. Given identical inputs
//! the prompts are byte-identical; nothing here reads the clock.

use chrono::{DateTime, Utc};

use crate::format::{ReportClock, format_duration};
use crate::range::format_range_label;
use crate::stats::{Stats, format_kv_list, top_n};

/// Inputs shared by both prompt variants.
#[derive(Debug, Clone)]
pub struct PromptInput {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub human_summary: String,
    pub activity_xml: String,
    pub clock: ReportClock,
}

impl PromptInput {
    fn range_label(&self) -> String {
        format_range_label(self.start, self.end)
    }

    fn period_line(&self) -> String {
        format!(
            "Data period: {} to {} (UTC{:+03})",
            self.clock.date_time(self.start),
            self.clock.date_time(self.end),
            self.clock.utc_offset_hours
        )
    }
}

/// Builds the human-language statistics digest embedded in both prompts.
pub fn build_human_summary(stats: &Stats) -> String {
    let top_categories = format_kv_list(&top_n(&stats.by_category, 3));
    let top_apps = format_kv_list(&top_n(&stats.by_app, 3));
    let top_domains = format_kv_list(&top_n(&stats.by_domain, 3));
    let top_projects = format_kv_list(&top_n(&stats.by_project, 3));
    let focus = stats.longest_category.as_ref().map_or_else(
        || "-".to_string(),
        |streak| format!("{} {}", streak.label, format_duration(streak.seconds)),
    );

    let mut lines = vec![
        format!(
            "Total active {} (top categories: {})",
            format_duration(stats.total_seconds),
            top_categories
        ),
        format!("Top apps: {top_apps}"),
        format!("Projects: {top_projects}"),
        format!("Domains: {top_domains}"),
        format!("Longest focus: {focus}"),
        format!(
            "Switches: category {} / app {} ({:.1} per 10m)",
            stats.switches.category, stats.switches.app, stats.switch_density_per_10m
        ),
    ];
    if stats.local_dev_seconds > 0 {
        lines.push(format!(
            "Local development: {}",
            format_duration(stats.local_dev_seconds)
        ));
    }
    lines.join("\n")
}

/// Prompt for the free-text analysis (~300 characters of output).
pub fn build_analysis_prompt(input: &PromptInput) -> String {
    let label = input.range_label();
    format!(
        "You are a productivity advisor. Analyze the XML activity data and \
statistics summary below and provide a concise summary with advice.

{period}
Range length: {label}

Statistics summary:
{summary}

Activity data (XML):
{xml}

Write roughly 300 characters covering:
1. The pattern of activity across this {label} (the chronological flow of work)
2. A productivity insight (focus, efficiency)
3. One improvement suggestion (specific and actionable)

Timestamps are already in local time and durations are human readable \
(e.g. 10m12s). Keep the tone friendly and constructive.",
        period = input.period_line(),
        summary = input.human_summary,
        xml = input.activity_xml,
    )
}

/// Prompt for the structured calendar object.
///
/// The generation call constrains the response to exactly
/// `{title, summary, bullets[]}`; the prompt restates the shape so weaker
/// providers comply too.
pub fn build_calendar_prompt(input: &PromptInput) -> String {
    let label = input.range_label();
    format!(
        "You are a work-log assistant. From the XML activity data and \
statistics summary below, produce a calendar entry for this {label} work \
session.

{period}

Statistics summary:
{summary}

Activity data (XML):
{xml}

Respond with strict JSON: {{\"title\":\"...\",\"summary\":\"...\",\
\"bullets\":[\"...\"]}}.
- title: at most 50 characters, names the dominant work
- summary: one or two sentences
- bullets: 2-5 concrete activities, most significant first",
        period = input.period_line(),
        summary = input.human_summary,
        xml = input.activity_xml,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CategoryRules, RawEvent, normalize_event};
    use crate::stats::{LocalDevRules, compute_stats};
    use chrono::TimeZone;

    fn sample_input() -> PromptInput {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let raws = vec![RawEvent {
            id: 1,
            bucket_id: 1,
            timestamp: start,
            duration: 600.0,
            payload: r#"{"app":"Cursor","title":"main.rs — proj"}"#.to_string(),
            bucket_type: "currentwindow".to_string(),
        }];
        let normalized: Vec<_> = raws
            .iter()
            .filter_map(|e| normalize_event(e, &CategoryRules::default()))
            .collect();
        let stats = compute_stats(&normalized, 1_800_000, &LocalDevRules::default());
        PromptInput {
            start,
            end: start + chrono::Duration::minutes(30),
            human_summary: build_human_summary(&stats),
            activity_xml: "<stats></stats>".to_string(),
            clock: ReportClock::default(),
        }
    }

    #[test]
    fn human_summary_lists_digest_lines() {
        let input = sample_input();
        assert!(input.human_summary.contains("Total active 10m"));
        assert!(input.human_summary.contains("coding 10m"));
        assert!(input.human_summary.contains("Longest focus: coding 10m"));
        assert!(input.human_summary.contains("Switches: category 0 / app 0"));
        // No local-dev time, so the line is omitted.
        assert!(!input.human_summary.contains("Local development"));
    }

    #[test]
    fn prompts_are_deterministic() {
        let input = sample_input();
        assert_eq!(build_analysis_prompt(&input), build_analysis_prompt(&input));
        assert_eq!(build_calendar_prompt(&input), build_calendar_prompt(&input));
    }

    #[test]
    fn analysis_prompt_embeds_range_and_document() {
        let input = sample_input();
        let prompt = build_analysis_prompt(&input);
        assert!(prompt.contains("Range length: 30m"));
        assert!(prompt.contains("2025-06-01 09:00:00"));
        assert!(prompt.contains("<stats></stats>"));
        assert!(prompt.contains("roughly 300 characters"));
    }

    #[test]
    fn calendar_prompt_requests_strict_shape() {
        let input = sample_input();
        let prompt = build_calendar_prompt(&input);
        assert!(prompt.contains(r#"{"title":"...","summary":"...","bullets":["..."]}"#));
        assert!(prompt.contains("at most 50 characters"));
    }
}
