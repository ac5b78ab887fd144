//! XML document builder for the generation prompt.
//!
//! The serialized document has four ordered sections: statistics summary,
//! before-file snapshots, the merged event list, and after-file snapshots.
//! The only encoding guarantee is escaping of the five XML-significant
//! characters; no schema validation is performed.

use crate::commit::FileSnapshot;
use crate::event::{RawEvent, SourceType, parse_payload};
use crate::format::{ReportClock, basename_maybe, file_relative_to_project, format_duration};
use crate::stats::{Stats, format_kv_list, top_n};

/// Escapes `& < > " '` for embedding in the document.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Which side of a snapshot pair to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSide {
    Before,
    After,
}

impl SnapshotSide {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Before => "before",
            Self::After => "after",
        }
    }
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "durations are bounded by the analysis window"
)]
fn whole_seconds(duration: f64) -> i64 {
    if duration.is_finite() && duration > 0.0 {
        duration.floor() as i64
    } else {
        0
    }
}

fn push_field(out: &mut String, tag: &str, value: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
    out.push_str(&escape_xml(value));
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

/// Type-specific inner payload for one event.
///
/// Missing fields are omitted entirely, never rendered as empty tags.
fn event_data_inner(event: &RawEvent) -> String {
    let payload = parse_payload(&event.payload);
    let get = |key: &str| payload.get(key).and_then(|v| v.as_str());

    let mut inner = String::new();
    match SourceType::parse(&event.bucket_type) {
        SourceType::WindowFocus => {
            if let Some(app) = get("app") {
                push_field(&mut inner, "app", app);
            }
            if let Some(title) = get("title") {
                push_field(&mut inner, "title", title);
            }
        }
        SourceType::BrowserTab => {
            if let Some(url) = get("url") {
                push_field(&mut inner, "url", url);
            }
            if let Some(title) = get("title") {
                push_field(&mut inner, "title", title);
            }
        }
        SourceType::AfkStatus => {
            if let Some(status) = get("status") {
                push_field(&mut inner, "status", status);
            }
        }
        SourceType::EditorActivity => {
            let project = get("project");
            if let Some(file) = get("file") {
                let rendered = project
                    .and_then(|p| file_relative_to_project(file, p))
                    .or_else(|| basename_maybe(file))
                    .unwrap_or_else(|| file.to_string());
                push_field(&mut inner, "file", &rendered);
            }
            if let Some(language) = get("language") {
                push_field(&mut inner, "language", language);
            }
            if let Some(project) = project {
                let name = basename_maybe(project).unwrap_or_else(|| project.to_string());
                push_field(&mut inner, "project", &name);
            }
            if let Some(branch) = get("branch") {
                push_field(&mut inner, "branch", branch);
            }
        }
        SourceType::GitCommit => {
            if let Some(repo) = get("repo") {
                push_field(&mut inner, "repo", repo);
            }
            if let Some(subject) = get("subject") {
                push_field(&mut inner, "subject", subject);
            }
            if let Some(path) = get("path") {
                push_field(&mut inner, "path", path);
            }
            if let Some(diff) = get("diff") {
                push_field(&mut inner, "diff", diff);
            }
        }
        SourceType::Unknown => {}
    }
    inner
}

/// Renders the merged, chronologically sorted event list, one `<event>`
/// per line.
pub fn format_events_xml(events: &[RawEvent], clock: ReportClock) -> String {
    let mut lines = vec![
        r#"<?xml version="1.0" encoding="UTF-8"?>"#.to_string(),
        "<events>".to_string(),
    ];

    for event in events {
        let mut parts = String::new();
        push_field(&mut parts, "timestamp", &clock.time_of_day(event.timestamp));
        push_field(
            &mut parts,
            "duration",
            &format_duration(whole_seconds(event.duration)),
        );
        push_field(&mut parts, "type", &event.bucket_type);
        parts.push_str("<data>");
        parts.push_str(&event_data_inner(event));
        parts.push_str("</data>");
        lines.push(format!("<event>{parts}</event>"));
    }

    lines.push("</events>".to_string());
    lines.join("\n")
}

/// Renders the statistics-summary section.
pub fn build_stats_summary_xml(stats: &Stats, clock: ReportClock) -> String {
    let mut lines = vec!["<stats>".to_string()];
    lines.push(format!(
        r#"<total seconds="{}">{}</total>"#,
        stats.total_seconds,
        escape_xml(&format_duration(stats.total_seconds))
    ));
    lines.push(format!(
        "<byBucket>{}</byBucket>",
        escape_xml(&format_kv_list(&top_n(&stats.by_bucket, 10)))
    ));
    lines.push(format!(
        "<byCategory>{}</byCategory>",
        escape_xml(&format_kv_list(&top_n(&stats.by_category, 10)))
    ));
    lines.push(format!(
        "<apps>{}</apps>",
        escape_xml(&format_kv_list(&top_n(&stats.by_app, 5)))
    ));
    lines.push(format!(
        "<projects>{}</projects>",
        escape_xml(&format_kv_list(&top_n(&stats.by_project, 5)))
    ));
    lines.push(format!(
        "<languages>{}</languages>",
        escape_xml(&format_kv_list(&top_n(&stats.by_language, 5)))
    ));
    lines.push(format!(
        "<domains>{}</domains>",
        escape_xml(&format_kv_list(&top_n(&stats.by_domain, 5)))
    ));
    lines.push(format!(
        "<slack>{}</slack>",
        escape_xml(&format_kv_list(&top_n(&stats.by_slack_channel, 5)))
    ));
    lines.push(format!(
        r#"<switches category="{}" app="{}" densityPer10m="{:.1}"/>"#,
        stats.switches.category, stats.switches.app, stats.switch_density_per_10m
    ));
    if let Some(streak) = &stats.longest_category {
        lines.push(format!(
            r#"<longestFocusCategory label="{}">{}</longestFocusCategory>"#,
            escape_xml(&streak.label),
            escape_xml(&format_duration(streak.seconds))
        ));
    }
    if let Some(streak) = &stats.longest_app {
        lines.push(format!(
            r#"<longestFocusApp label="{}">{}</longestFocusApp>"#,
            escape_xml(&streak.label),
            escape_xml(&format_duration(streak.seconds))
        ));
    }
    if let Some(peak) = stats.peak_10m {
        lines.push(format!(
            r#"<peak10m start="{}">{}</peak10m>"#,
            escape_xml(&clock.time_of_day(peak.start)),
            escape_xml(&format_duration(peak.seconds))
        ));
    }
    if let Some(peak) = stats.peak_5m {
        lines.push(format!(
            r#"<peak5m start="{}">{}</peak5m>"#,
            escape_xml(&clock.time_of_day(peak.start)),
            escape_xml(&format_duration(peak.seconds))
        ));
    }
    if stats.local_dev_seconds > 0 {
        lines.push(format!(
            "<localDev>{}</localDev>",
            escape_xml(&format_duration(stats.local_dev_seconds))
        ));
    }
    lines.push("</stats>".to_string());
    lines.join("\n")
}

/// Renders one side of the snapshot pairs.
pub fn format_file_snapshots_xml(snapshots: &[FileSnapshot], side: SnapshotSide) -> String {
    let mut lines = vec![format!(r#"<fileSnapshots kind="{}">"#, side.as_str())];
    for snapshot in snapshots {
        let content = match side {
            SnapshotSide::Before => &snapshot.before,
            SnapshotSide::After => &snapshot.after,
        };
        lines.push(format!(
            r#"<file repo="{}" path="{}"><content>{}</content></file>"#,
            escape_xml(&snapshot.repo_name),
            escape_xml(&snapshot.path),
            escape_xml(content)
        ));
    }
    lines.push("</fileSnapshots>".to_string());
    lines.join("\n")
}

/// Assembles the full four-section document.
pub fn build_activity_document(
    stats: &Stats,
    merged_events: &[RawEvent],
    snapshots: &[FileSnapshot],
    clock: ReportClock,
) -> String {
    let stats_xml = build_stats_summary_xml(stats, clock);
    let before_xml = format_file_snapshots_xml(snapshots, SnapshotSide::Before);
    let events_xml = format_events_xml(merged_events, clock);
    let after_xml = format_file_snapshots_xml(snapshots, SnapshotSide::After);
    format!("{stats_xml}\n{before_xml}\n{events_xml}\n{after_xml}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{LocalDevRules, compute_stats};
    use chrono::{TimeZone, Utc};

    fn raw(bucket_type: &str, payload: &str) -> RawEvent {
        RawEvent {
            id: 1,
            bucket_id: 1,
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 0, 30, 0).unwrap(),
            duration: 612.0,
            payload: payload.to_string(),
            bucket_type: bucket_type.to_string(),
        }
    }

    #[test]
    fn escaping_covers_all_five_characters() {
        let input = r#"a&b<c>d"e'f"#;
        let escaped = escape_xml(input);
        assert_eq!(escaped, "a&amp;b&lt;c&gt;d&quot;e&#39;f");
        // Injective over the escaped set: each source character maps to a
        // distinct entity and no raw specials remain.
        for forbidden in ['<', '>', '"', '\''] {
            assert!(!escaped.contains(forbidden));
        }
        assert_eq!(escaped.matches('&').count(), 5);
    }

    #[test]
    fn window_event_renders_app_and_title() {
        let events = vec![raw("currentwindow", r#"{"app":"Cursor","title":"a & b"}"#)];
        let xml = format_events_xml(&events, ReportClock::default());
        assert!(xml.contains("<type>currentwindow</type>"));
        assert!(xml.contains("<app>Cursor</app>"));
        assert!(xml.contains("<title>a &amp; b</title>"));
        assert!(xml.contains("<duration>10m12s</duration>"));
        // +9 offset over 00:30 UTC.
        assert!(xml.contains("<timestamp>09:30:00</timestamp>"));
    }

    #[test]
    fn missing_fields_are_omitted() {
        let events = vec![raw("currentwindow", r#"{"app":"Cursor"}"#)];
        let xml = format_events_xml(&events, ReportClock::default());
        assert!(xml.contains("<app>Cursor</app>"));
        assert!(!xml.contains("<title>"));
    }

    #[test]
    fn editor_event_relativizes_file_path() {
        let payload = r#"{"file":"/home/me/proj/src/main.rs","project":"/home/me/proj","language":"rust","branch":"main"}"#;
        let events = vec![raw("app.editor.activity", payload)];
        let xml = format_events_xml(&events, ReportClock::default());
        assert!(xml.contains("<file>src/main.rs</file>"));
        assert!(xml.contains("<project>proj</project>"));
        assert!(xml.contains("<language>rust</language>"));
        assert!(xml.contains("<branch>main</branch>"));
    }

    #[test]
    fn commit_event_renders_repo_and_diff() {
        let payload = r#"{"repo":"proj","path":"/src/org/proj","subject":"fix <thing>","diff":"-a\n+b"}"#;
        let events = vec![raw("git.commit", payload)];
        let xml = format_events_xml(&events, ReportClock::default());
        assert!(xml.contains("<repo>proj</repo>"));
        assert!(xml.contains("<subject>fix &lt;thing&gt;</subject>"));
        assert!(xml.contains("<diff>-a\n+b</diff>"));
    }

    #[test]
    fn malformed_payload_renders_empty_data() {
        let events = vec![raw("currentwindow", "not json")];
        let xml = format_events_xml(&events, ReportClock::default());
        assert!(xml.contains("<data></data>"));
    }

    #[test]
    fn snapshot_sections_render_each_side() {
        let snapshots = vec![FileSnapshot {
            repo_name: "proj".into(),
            repo_path: "/src/org/proj".into(),
            path: "a.rs".into(),
            before: "old".into(),
            after: "new".into(),
        }];
        let before = format_file_snapshots_xml(&snapshots, SnapshotSide::Before);
        assert!(before.starts_with(r#"<fileSnapshots kind="before">"#));
        assert!(before.contains("<content>old</content>"));
        let after = format_file_snapshots_xml(&snapshots, SnapshotSide::After);
        assert!(after.contains("<content>new</content>"));
    }

    #[test]
    fn full_document_sections_are_ordered() {
        use crate::event::{CategoryRules, normalize_event};

        let events = vec![raw("currentwindow", r#"{"app":"Cursor","title":"a.rs — p"}"#)];
        let normalized: Vec<_> = events
            .iter()
            .filter_map(|e| normalize_event(e, &CategoryRules::default()))
            .collect();
        let stats = compute_stats(&normalized, 1_800_000, &LocalDevRules::default());
        let document = build_activity_document(&stats, &events, &[], ReportClock::default());

        let stats_at = document.find("<stats>").unwrap();
        let before_at = document.find(r#"<fileSnapshots kind="before">"#).unwrap();
        let events_at = document.find("<events>").unwrap();
        let after_at = document.find(r#"<fileSnapshots kind="after">"#).unwrap();
        assert!(stats_at < before_at && before_at < events_at && events_at < after_at);
    }

    #[test]
    fn stats_summary_snapshot() {
        use crate::event::{CategoryRules, normalize_event};

        let raws = vec![
            raw("currentwindow", r#"{"app":"Cursor","title":"main.rs — proj"}"#),
            raw("web.tab.current", r#"{"url":"https://docs.rs/x","title":"docs"}"#),
        ];
        let normalized: Vec<_> = raws
            .iter()
            .filter_map(|e| normalize_event(e, &CategoryRules::default()))
            .collect();
        let stats = compute_stats(&normalized, 1_800_000, &LocalDevRules::default());
        insta::assert_snapshot!(build_stats_summary_xml(&stats, ReportClock::default()));
    }
}
