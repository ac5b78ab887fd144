//! Best-effort calendar insertion.
//!
//! Inserts one event into the Google Calendar v3 API when a calendar id
//! and an OAuth bearer token are configured. Missing configuration and
//! API failures are both reported through [`CalendarOutcome`]; this
//! module never returns an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CalendarConfig;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/calendars";

/// Inputs for one insertion attempt.
#[derive(Debug, Clone)]
pub struct CalendarEventParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub summary: String,
    pub description: String,
}

/// What happened to the insertion attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarOutcome {
    pub inserted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calendar_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CalendarOutcome {
    fn skipped(reason: impl Into<String>) -> Self {
        Self {
            inserted: false,
            calendar_id: None,
            event_id: None,
            html_link: None,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug, Serialize)]
struct EventTime<'a> {
    #[serde(rename = "dateTime")]
    date_time: String,
    #[serde(rename = "timeZone")]
    time_zone: &'a str,
}

#[derive(Debug, Serialize)]
struct InsertRequest<'a> {
    summary: &'a str,
    description: &'a str,
    start: EventTime<'a>,
    end: EventTime<'a>,
}

#[derive(Debug, Deserialize)]
struct InsertResponse {
    id: Option<String>,
    #[serde(rename = "htmlLink")]
    html_link: Option<String>,
}

/// Inserts a calendar event when configured; otherwise reports why not.
pub async fn create_event_if_configured(
    config: &CalendarConfig,
    http: &reqwest::Client,
    params: &CalendarEventParams,
) -> CalendarOutcome {
    let calendar_id = config
        .calendar_id
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let token = config
        .access_token
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let (Some(calendar_id), Some(token)) = (calendar_id, token) else {
        return CalendarOutcome::skipped(if calendar_id.is_none() {
            "missing calendar id"
        } else {
            "missing calendar access token"
        });
    };

    let request = InsertRequest {
        summary: &params.summary,
        description: &params.description,
        start: EventTime {
            date_time: params.start.to_rfc3339(),
            time_zone: &config.time_zone,
        },
        end: EventTime {
            date_time: params.end.to_rfc3339(),
            time_zone: &config.time_zone,
        },
    };

    let url = format!("{CALENDAR_API_BASE}/{calendar_id}/events");
    let result = async {
        let response = http
            .post(&url)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await?;
        response.error_for_status_ref()?;
        response.json::<InsertResponse>().await
    }
    .await;

    match result {
        Ok(event) => CalendarOutcome {
            inserted: true,
            calendar_id: Some(calendar_id.to_string()),
            event_id: event.id,
            html_link: event.html_link,
            reason: None,
        },
        Err(err) => {
            tracing::error!(error = %err, "failed to create calendar event");
            CalendarOutcome::skipped(err.to_string())
        }
    }
}
