//! Analysis-range parsing and labeling.

use chrono::{DateTime, TimeZone, Utc};

/// Parses a user-supplied instant.
///
/// Accepts unix seconds or milliseconds (all digits; ten or fewer digits
/// means seconds) and ISO 8601 with either `T` or a space separating date
/// and time. Returns `None` for anything unparseable.
pub fn parse_date_input(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        let numeric: i64 = trimmed.parse().ok()?;
        let millis = if trimmed.len() <= 10 { numeric.checked_mul(1000)? } else { numeric };
        return Utc.timestamp_millis_opt(millis).single();
    }

    let normalized = trimmed.replacen(' ', "T", 1);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    // Naive date-times are interpreted as UTC.
    normalized
        .parse::<chrono::NaiveDateTime>()
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Human label for a range length, e.g. `"30m"`, `"2h"`, `"1h30m"`.
pub fn format_range_label(start: DateTime<Utc>, end: DateTime<Utc>) -> String {
    let diff_ms = (end - start).num_milliseconds().max(0);
    #[expect(
        clippy::cast_possible_truncation,
        reason = "minute counts fit i64 after division"
    )]
    let total_minutes = ((diff_ms as f64) / 60_000.0).round() as i64;
    let hours = total_minutes / 60;
    let minutes = total_minutes % 60;
    if hours > 0 {
        if minutes > 0 {
            format!("{hours}h{minutes}m")
        } else {
            format!("{hours}h")
        }
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_seconds_and_millis() {
        let seconds = parse_date_input("1748736000").unwrap();
        assert_eq!(seconds.timestamp(), 1_748_736_000);

        let millis = parse_date_input("1748736000500").unwrap();
        assert_eq!(millis.timestamp_millis(), 1_748_736_000_500);
    }

    #[test]
    fn parses_iso_with_t_or_space() {
        let with_t = parse_date_input("2025-06-01T09:00:00Z").unwrap();
        let with_space = parse_date_input("2025-06-01 09:00:00Z").unwrap();
        assert_eq!(with_t, with_space);
    }

    #[test]
    fn parses_naive_datetime_as_utc() {
        let parsed = parse_date_input("2025-06-01T09:30:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-06-01T09:30:00+00:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_date_input("").is_none());
        assert!(parse_date_input("   ").is_none());
        assert!(parse_date_input("not a date").is_none());
    }

    #[test]
    fn range_labels() {
        let start = parse_date_input("2025-06-01T09:00:00Z").unwrap();
        assert_eq!(format_range_label(start, start + chrono::Duration::minutes(30)), "30m");
        assert_eq!(format_range_label(start, start + chrono::Duration::hours(2)), "2h");
        assert_eq!(format_range_label(start, start + chrono::Duration::minutes(90)), "1h30m");
        // Negative ranges clamp to zero.
        assert_eq!(format_range_label(start, start - chrono::Duration::hours(1)), "0m");
    }
}
