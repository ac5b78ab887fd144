//! Rendering helpers shared by the serializer and prompt builder.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Formats whole seconds as `"{m}m{s}s"`, dropping zero components.
///
/// Negative inputs render as `"0s"`.
pub fn format_duration(seconds: i64) -> String {
    if seconds <= 0 {
        return "0s".to_string();
    }
    let minutes = seconds / 60;
    let secs = seconds % 60;
    if minutes > 0 {
        if secs > 0 {
            format!("{minutes}m{secs}s")
        } else {
            format!("{minutes}m")
        }
    } else {
        format!("{secs}s")
    }
}

/// Renders timestamps in the report-local time zone.
///
/// The offset is a plain UTC offset rather than a named zone; the canonical
/// deployment uses +09:00.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReportClock {
    /// Offset from UTC in whole hours.
    pub utc_offset_hours: i32,
}

impl Default for ReportClock {
    fn default() -> Self {
        Self { utc_offset_hours: 9 }
    }
}

impl ReportClock {
    fn offset(self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours.clamp(-23, 23) * 3600)
            .unwrap_or_else(|| FixedOffset::east_opt(0).unwrap())
    }

    /// Local `HH:MM:SS` for the event list.
    pub fn time_of_day(self, instant: DateTime<Utc>) -> String {
        instant.with_timezone(&self.offset()).format("%H:%M:%S").to_string()
    }

    /// Local date and time for prompt headers.
    pub fn date_time(self, instant: DateTime<Utc>) -> String {
        instant
            .with_timezone(&self.offset())
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
    }
}

/// Converts backslash separators to slashes and strips trailing separators.
pub fn normalize_path_like(value: &str) -> String {
    let slashed = value.replace('\\', "/");
    slashed.trim_end_matches('/').to_string()
}

/// Final path component after separator normalization, or `None` for empty
/// input.
pub fn basename_maybe(value: &str) -> Option<String> {
    let normalized = normalize_path_like(value);
    if normalized.is_empty() {
        return None;
    }
    let name = normalized.rsplit('/').next().unwrap_or(&normalized);
    if name.is_empty() {
        Some(normalized)
    } else {
        Some(name.to_string())
    }
}

/// Path of `file` relative to `project` when the file is textually under
/// the project root; otherwise the file's base name.
pub fn file_relative_to_project(file: &str, project: &str) -> Option<String> {
    let file = normalize_path_like(file);
    let project = normalize_path_like(project);
    if file.is_empty() || project.is_empty() {
        return None;
    }
    if let Some(rel) = file.strip_prefix(&format!("{project}/")) {
        return Some(rel.to_string());
    }
    basename_maybe(&file)
}
