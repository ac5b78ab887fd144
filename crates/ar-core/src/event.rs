//! Raw activity events and their normalized form.
//!
//! Raw events arrive from the event store as loosely typed rows: a JSON
//! payload string, a bucket type string, and a duration that may have been
//! stored as a number or a numeric string. Normalization reduces each row
//! to a canonical [`NormalizedEvent`] with a derived [`Category`], or drops
//! it when the duration is unusable.

use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// A raw event row from the event store.
///
/// `duration` has already been coerced to a float by the storage layer;
/// non-finite values survive until [`normalize_event`] discards them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    pub id: i64,
    pub bucket_id: i64,
    pub timestamp: DateTime<Utc>,
    pub duration: f64,
    /// JSON payload text. Shape varies by source type and may be malformed.
    pub payload: String,
    /// Bucket type string (e.g. `currentwindow`, `web.tab.current`).
    pub bucket_type: String,
}

/// Known event source types.
///
/// Unknown bucket types are carried through rather than rejected; they
/// categorize as [`Category::Other`] and still count toward totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    EditorActivity,
    WindowFocus,
    BrowserTab,
    AfkStatus,
    GitCommit,
    Unknown,
}

impl SourceType {
    pub fn parse(s: &str) -> Self {
        match s {
            "app.editor.activity" => Self::EditorActivity,
            "currentwindow" => Self::WindowFocus,
            "web.tab.current" => Self::BrowserTab,
            "afkstatus" => Self::AfkStatus,
            "git.commit" => Self::GitCommit,
            _ => Self::Unknown,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EditorActivity => "app.editor.activity",
            Self::WindowFocus => "currentwindow",
            Self::BrowserTab => "web.tab.current",
            Self::AfkStatus => "afkstatus",
            Self::GitCommit => "git.commit",
            Self::Unknown => "unknown",
        }
    }
}

impl Serialize for SourceType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Activity category derived during normalization. Exactly one per event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Coding,
    Browsing,
    Communication,
    Terminal,
    Media,
    Settings,
    Afk,
    Other,
}

impl Category {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coding => "coding",
            Self::Browsing => "browsing",
            Self::Communication => "communication",
            Self::Terminal => "terminal",
            Self::Media => "media",
            Self::Settings => "settings",
            Self::Afk => "afk",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Configurable vocabulary for app/domain classification.
///
/// App entries are matched as lowercase substrings of the window's app
/// name; media domains are suffix matches against the tab's host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryRules {
    pub messaging_apps: Vec<String>,
    pub terminal_apps: Vec<String>,
    pub browser_apps: Vec<String>,
    pub editor_apps: Vec<String>,
    pub media_domains: Vec<String>,
    pub media_title_suffixes: Vec<String>,
}

impl Default for CategoryRules {
    fn default() -> Self {
        Self {
            messaging_apps: vec!["slack".into()],
            terminal_apps: vec!["iterm".into(), "terminal".into()],
            browser_apps: vec!["arc".into(), "chrome".into(), "safari".into()],
            editor_apps: vec!["cursor".into(), "code".into()],
            media_domains: vec!["youtube.com".into()],
            media_title_suffixes: vec!["- youtube".into()],
        }
    }
}

impl CategoryRules {
    fn matches_any(list: &[String], value: &str) -> bool {
        list.iter().any(|entry| value.contains(entry.as_str()))
    }

    fn is_media(&self, domain: &str, title: &str) -> bool {
        self.media_domains.iter().any(|d| domain.ends_with(d.as_str()))
            || self.media_title_suffixes.iter().any(|s| title.ends_with(s.as_str()))
    }
}

/// A canonical event with derived enrichment fields.
///
/// Invariant: `end >= start` and `duration_secs >= 0`.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedEvent {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_secs: i64,
    pub kind: SourceType,
    pub bucket_type: String,
    pub app: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub domain: Option<String>,
    pub project: Option<String>,
    pub file: Option<String>,
    pub language: Option<String>,
    pub slack_channel: Option<String>,
    pub slack_workspace: Option<String>,
    pub category: Category,
}

/// Fields recovered from an editor window title.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EditorTitle {
    pub file: Option<String>,
    pub project: Option<String>,
    pub is_settings: bool,
    pub is_extension: bool,
}

/// Fields recovered from a Slack window title.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SlackTitle {
    pub channel: Option<String>,
    pub workspace: Option<String>,
}

static SETTINGS_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Settings\s+—\s+(.+)$").unwrap());
static EXTENSION_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Extension:\s*([^\n]+?)\s+—\s+(.+)$").unwrap());
static FILE_TITLE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(.+?)\s+—\s+(.+)$").unwrap());

// Localized Slack UI, e.g. "general（チャンネル） - Acme - Slack"
static SLACK_LOCALIZED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)（(?:チャンネル|スレッド|ダイレクトメッセージ)）\s+-\s+(.+?)\s+-\s+Slack$")
        .unwrap()
});
// English Slack UI: "#general - Acme - Slack"
static SLACK_PLAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)\s+-\s+(.+?)\s+-\s+Slack$").unwrap());

static URL_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^[a-z][a-z0-9+.-]*://(?:[^/@]*@)?([^/:?#]+)").unwrap());

/// Parses payload text as a JSON object, treating anything else as empty.
///
/// Malformed payloads never fail normalization; they simply yield no
/// enrichment.
pub fn parse_payload(payload: &str) -> serde_json::Map<String, serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(payload) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    }
}

/// Extracts a lowercased host from a URL, or `None` when no host is found.
pub fn extract_domain(url: &str) -> Option<String> {
    URL_HOST_RE
        .captures(url)
        .map(|caps| caps[1].to_lowercase())
}

/// Parses the editor window title grammar.
///
/// Recognized shapes, first match wins:
/// - `Settings — {project}`
/// - `Extension: {name} — {project}`
/// - `{file} — {project}`
pub fn parse_editor_title(title: &str) -> EditorTitle {
    if let Some(caps) = SETTINGS_TITLE_RE.captures(title) {
        return EditorTitle {
            project: Some(caps[1].to_string()),
            is_settings: true,
            ..EditorTitle::default()
        };
    }
    if let Some(caps) = EXTENSION_TITLE_RE.captures(title) {
        return EditorTitle {
            file: Some(caps[1].to_string()),
            project: Some(caps[2].to_string()),
            is_extension: true,
            ..EditorTitle::default()
        };
    }
    if let Some(caps) = FILE_TITLE_RE.captures(title) {
        return EditorTitle {
            file: Some(caps[1].to_string()),
            project: Some(caps[2].to_string()),
            ..EditorTitle::default()
        };
    }
    EditorTitle::default()
}

/// Parses the Slack window title grammars (localized form first).
pub fn parse_slack_title(title: &str) -> SlackTitle {
    if let Some(caps) = SLACK_LOCALIZED_RE.captures(title) {
        return SlackTitle {
            channel: Some(caps[1].to_string()),
            workspace: Some(caps[2].to_string()),
        };
    }
    if let Some(caps) = SLACK_PLAIN_RE.captures(title) {
        return SlackTitle {
            channel: Some(caps[1].to_string()),
            workspace: Some(caps[2].to_string()),
        };
    }
    SlackTitle::default()
}

/// Assigns a category from source type, app, domain, and title.
///
/// First match wins, in the priority order of the pipeline contract:
/// editor activity and commits are coding, browser tabs split into media
/// vs browsing, AFK is its own category, window focus inspects the app
/// vocabulary, and everything unmatched is other.
pub fn categorize(
    kind: SourceType,
    app: Option<&str>,
    domain: Option<&str>,
    title: Option<&str>,
    rules: &CategoryRules,
) -> Category {
    let app_l = app.unwrap_or("").to_lowercase();
    let domain_l = domain.unwrap_or("").to_lowercase();
    let title_l = title.unwrap_or("").to_lowercase();

    match kind {
        SourceType::EditorActivity | SourceType::GitCommit => Category::Coding,
        SourceType::BrowserTab => {
            if rules.is_media(&domain_l, &title_l) {
                Category::Media
            } else {
                Category::Browsing
            }
        }
        SourceType::AfkStatus => Category::Afk,
        SourceType::WindowFocus => {
            if CategoryRules::matches_any(&rules.messaging_apps, &app_l) {
                Category::Communication
            } else if CategoryRules::matches_any(&rules.terminal_apps, &app_l) {
                Category::Terminal
            } else if CategoryRules::matches_any(&rules.browser_apps, &app_l) {
                Category::Browsing
            } else if CategoryRules::matches_any(&rules.editor_apps, &app_l) {
                let parsed = parse_editor_title(title.unwrap_or(""));
                if parsed.is_settings || parsed.is_extension {
                    Category::Settings
                } else {
                    Category::Coding
                }
            } else {
                Category::Other
            }
        }
        SourceType::Unknown => Category::Other,
    }
}

fn payload_str(map: &serde_json::Map<String, serde_json::Value>, key: &str) -> Option<String> {
    map.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

/// Normalizes one raw event, or returns `None` when the duration is
/// non-finite or non-positive.
pub fn normalize_event(raw: &RawEvent, rules: &CategoryRules) -> Option<NormalizedEvent> {
    if !raw.duration.is_finite() || raw.duration <= 0.0 {
        return None;
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "duration is finite and positive; flooring to whole seconds is intended"
    )]
    let duration_secs = raw.duration.floor() as i64;
    let start = raw.timestamp;
    let end = start + Duration::seconds(duration_secs);

    let kind = SourceType::parse(&raw.bucket_type);
    let payload = parse_payload(&raw.payload);

    let app = payload_str(&payload, "app");
    let title = payload_str(&payload, "title");
    let url = payload_str(&payload, "url");
    let domain = url.as_deref().and_then(extract_domain);

    let mut project = None;
    let mut file = None;
    let mut language = None;
    let mut slack_channel = None;
    let mut slack_workspace = None;

    match kind {
        SourceType::EditorActivity => {
            project = payload_str(&payload, "project");
            file = payload_str(&payload, "file");
            language = payload_str(&payload, "language");
        }
        SourceType::WindowFocus => {
            if let (Some(app_name), Some(window_title)) = (app.as_deref(), title.as_deref()) {
                let app_l = app_name.to_lowercase();
                if CategoryRules::matches_any(&rules.editor_apps, &app_l) {
                    let parsed = parse_editor_title(window_title);
                    project = parsed.project;
                    file = parsed.file;
                }
                if CategoryRules::matches_any(&rules.messaging_apps, &app_l) {
                    let parsed = parse_slack_title(window_title);
                    slack_channel = parsed.channel;
                    slack_workspace = parsed.workspace;
                }
            }
        }
        _ => {}
    }

    let category = categorize(kind, app.as_deref(), domain.as_deref(), title.as_deref(), rules);

    Some(NormalizedEvent {
        start,
        end,
        duration_secs,
        kind,
        bucket_type: raw.bucket_type.clone(),
        app,
        title,
        url,
        domain,
        project,
        file,
        language,
        slack_channel,
        slack_workspace,
        category,
    })
}
