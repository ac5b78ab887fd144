//! Statistical aggregation over normalized events.
//!
//! One pass accumulates per-dimension second totals; a chronological walk
//! derives switch counts and focus streaks; calendar-aligned bucketing
//! finds the peak 10-minute and 5-minute sub-windows.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use serde::Serialize;

use crate::event::{NormalizedEvent, SourceType};
use crate::format::format_duration;

const TEN_MINUTES_MS: i64 = 10 * 60 * 1000;

/// Seconds per label for one grouping dimension.
pub type LabelSeconds = BTreeMap<String, i64>;

/// A maximal run of chronologically adjacent events sharing one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Streak {
    pub label: String,
    pub seconds: i64,
}

/// The busiest calendar-aligned sub-window of the range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeakWindow {
    pub start: DateTime<Utc>,
    pub seconds: i64,
}

/// Label-transition counts from the chronological walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwitchCounts {
    pub category: u32,
    pub app: u32,
}

/// Aggregated statistics for one analysis window.
#[derive(Debug, Clone, Serialize)]
pub struct Stats {
    pub total_seconds: i64,
    pub by_bucket: LabelSeconds,
    pub by_category: LabelSeconds,
    pub by_app: LabelSeconds,
    pub by_project: LabelSeconds,
    pub by_file: LabelSeconds,
    pub by_language: LabelSeconds,
    pub by_domain: LabelSeconds,
    pub by_slack_channel: LabelSeconds,
    pub switches: SwitchCounts,
    pub longest_category: Option<Streak>,
    pub longest_app: Option<Streak>,
    pub peak_10m: Option<PeakWindow>,
    pub peak_5m: Option<PeakWindow>,
    pub local_dev_seconds: i64,
    pub switch_density_per_10m: f64,
}

/// Heuristic rules for counting time as local development.
///
/// This is a convenience metric, not authoritative: `localhost` traffic
/// always counts, and a configured pattern can match the window title or
/// project name.
#[derive(Debug, Clone, Default)]
pub struct LocalDevRules {
    pub project_pattern: Option<Regex>,
}

impl LocalDevRules {
    fn matches(&self, event: &NormalizedEvent) -> bool {
        if event.domain.as_deref() == Some("localhost") {
            return true;
        }
        let Some(pattern) = &self.project_pattern else {
            return false;
        };
        event.title.as_deref().is_some_and(|t| pattern.is_match(t))
            || event.project.as_deref().is_some_and(|p| pattern.is_match(p))
    }
}

fn add_to(map: &mut LabelSeconds, key: Option<&str>, seconds: i64) {
    if let Some(key) = key {
        if key.is_empty() {
            return;
        }
        *map.entry(key.to_string()).or_insert(0) += seconds;
    }
}

/// Grouping key for the app dimension.
///
/// Editor-activity events fold into a single `"Editor"` key so they do not
/// double-count against the editor's own window-focus events.
fn app_key(event: &NormalizedEvent) -> String {
    if event.kind == SourceType::EditorActivity {
        "Editor".to_string()
    } else {
        event.app.clone().unwrap_or_else(|| "unknown".to_string())
    }
}

/// Top `n` labels by seconds, descending; ties break on label order.
pub fn top_n(map: &LabelSeconds, n: usize) -> Vec<(String, i64)> {
    let mut pairs: Vec<(String, i64)> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    pairs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    pairs.truncate(n);
    pairs
}

/// Renders `label duration` pairs as a comma-separated list.
pub fn format_kv_list(pairs: &[(String, i64)]) -> String {
    pairs
        .iter()
        .map(|(key, seconds)| format!("{key} {}", format_duration(*seconds)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Peak calendar-aligned bucket of `minutes` length by total seconds.
///
/// Buckets are anchored to epoch multiples, not sliding. The comparison is
/// strictly-greater over ascending bucket starts, so ties resolve to the
/// earliest bucket deterministically.
fn peak_bucket(events: &[NormalizedEvent], minutes: i64) -> Option<PeakWindow> {
    if events.is_empty() {
        return None;
    }
    let bucket_ms = minutes * 60 * 1000;
    let mut buckets: BTreeMap<i64, i64> = BTreeMap::new();
    for event in events {
        let t = event.start.timestamp_millis().div_euclid(bucket_ms) * bucket_ms;
        *buckets.entry(t).or_insert(0) += event.duration_secs;
    }
    let mut best: Option<(i64, i64)> = None;
    for (t, seconds) in buckets {
        if best.is_none_or(|(_, best_seconds)| seconds > best_seconds) {
            best = Some((t, seconds));
        }
    }
    best.map(|(t, seconds)| PeakWindow {
        start: Utc.timestamp_millis_opt(t).single().unwrap_or_default(),
        seconds,
    })
}

/// Walks events in chronological order counting label transitions and
/// tracking the longest streak (first-wins on ties).
struct StreakWalk {
    switches: u32,
    longest: Option<Streak>,
    current_label: Option<String>,
    current_seconds: i64,
}

impl StreakWalk {
    const fn new() -> Self {
        Self {
            switches: 0,
            longest: None,
            current_label: None,
            current_seconds: 0,
        }
    }

    fn push(&mut self, label: &str, seconds: i64) {
        match &self.current_label {
            None => {
                self.current_label = Some(label.to_string());
                self.current_seconds = seconds;
            }
            Some(current) if current == label => {
                self.current_seconds += seconds;
            }
            Some(_) => {
                self.switches += 1;
                self.flush_current();
                self.current_label = Some(label.to_string());
                self.current_seconds = seconds;
            }
        }
    }

    fn flush_current(&mut self) {
        let Some(label) = self.current_label.take() else {
            return;
        };
        let beats_best = self
            .longest
            .as_ref()
            .is_none_or(|best| self.current_seconds > best.seconds);
        if beats_best && self.current_seconds > 0 {
            self.longest = Some(Streak {
                label,
                seconds: self.current_seconds,
            });
        }
    }

    // The final in-progress streak must be compared once more, otherwise
    // the last streak would be lost.
    fn finish(mut self) -> (u32, Option<Streak>) {
        self.flush_current();
        (self.switches, self.longest)
    }
}

/// Computes [`Stats`] over normalized events and the window length.
///
/// Events may arrive in any order; the streak walk sorts a working copy by
/// start time. Invariant: the category totals, bucket totals, and
/// `total_seconds` all sum the same event set exactly once.
pub fn compute_stats(events: &[NormalizedEvent], range_ms: i64, local_dev: &LocalDevRules) -> Stats {
    let mut by_bucket = LabelSeconds::new();
    let mut by_category = LabelSeconds::new();
    let mut by_app = LabelSeconds::new();
    let mut by_project = LabelSeconds::new();
    let mut by_file = LabelSeconds::new();
    let mut by_language = LabelSeconds::new();
    let mut by_domain = LabelSeconds::new();
    let mut by_slack_channel = LabelSeconds::new();

    let mut total_seconds = 0;
    let mut local_dev_seconds = 0;

    for event in events {
        let seconds = event.duration_secs;
        total_seconds += seconds;
        add_to(&mut by_bucket, Some(&event.bucket_type), seconds);
        add_to(&mut by_category, Some(event.category.as_str()), seconds);
        add_to(&mut by_app, Some(&app_key(event)), seconds);
        add_to(&mut by_project, event.project.as_deref(), seconds);
        add_to(&mut by_file, event.file.as_deref(), seconds);
        add_to(&mut by_language, event.language.as_deref(), seconds);
        add_to(&mut by_domain, event.domain.as_deref(), seconds);
        add_to(&mut by_slack_channel, event.slack_channel.as_deref(), seconds);

        if local_dev.matches(event) {
            local_dev_seconds += seconds;
        }
    }

    let mut ordered: Vec<&NormalizedEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.start);

    let mut category_walk = StreakWalk::new();
    let mut app_walk = StreakWalk::new();
    for event in &ordered {
        category_walk.push(event.category.as_str(), event.duration_secs);
        app_walk.push(&app_key(event), event.duration_secs);
    }
    let (category_switches, longest_category) = category_walk.finish();
    let (app_switches, longest_app) = app_walk.finish();

    let peak_10m = peak_bucket(events, 10);
    let peak_5m = peak_bucket(events, 5);

    #[expect(
        clippy::cast_precision_loss,
        reason = "switch density is a display-only ratio"
    )]
    let switch_density_per_10m = if range_ms > 0 {
        f64::from(category_switches) / (range_ms as f64 / TEN_MINUTES_MS as f64)
    } else {
        0.0
    };

    Stats {
        total_seconds,
        by_bucket,
        by_category,
        by_app,
        by_project,
        by_file,
        by_language,
        by_domain,
        by_slack_channel,
        switches: SwitchCounts {
            category: category_switches,
            app: app_switches,
        },
        longest_category,
        longest_app,
        peak_10m,
        peak_5m,
        local_dev_seconds,
        switch_density_per_10m,
    }
}
