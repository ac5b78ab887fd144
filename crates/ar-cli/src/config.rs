//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the event store database file.
    pub database_path: PathBuf,
    /// Directory the serialized activity documents are written to.
    pub xml_output_dir: PathBuf,
    pub git: GitConfig,
    pub llm: LlmSettings,
    pub calendar: CalendarConfig,
    pub report: ReportConfig,
}

/// Commit-collection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Root scanned two directory levels deep for repositories.
    pub scan_root: PathBuf,
    /// Author filter precedence: pattern, then email, then name. When all
    /// three are unset the global git identity is used.
    pub author_pattern: Option<String>,
    pub author_email: Option<String>,
    pub author_name: Option<String>,
    pub max_commits: usize,
    pub max_diff_chars: usize,
    pub diff_context: u32,
    pub max_snapshot_files: usize,
    pub max_file_chars: usize,
}

impl Default for GitConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            scan_root: home.join("src"),
            author_pattern: None,
            author_email: None,
            author_name: None,
            max_commits: 1000,
            max_diff_chars: 20_000,
            diff_context: 0,
            max_snapshot_files: 50,
            max_file_chars: 20_000,
        }
    }
}

/// Generation-provider settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Default provider when the CLI flag is absent.
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            openai_api_key: None,
            openai_model: "gpt-4o-mini".to_string(),
            gemini_api_key: None,
            gemini_model: "gemini-2.0-flash".to_string(),
        }
    }
}

impl LlmSettings {
    pub fn to_llm_config(&self) -> ar_llm::LlmConfig {
        ar_llm::LlmConfig {
            openai_api_key: self.openai_api_key.clone(),
            openai_model: self.openai_model.clone(),
            gemini_api_key: self.gemini_api_key.clone(),
            gemini_model: self.gemini_model.clone(),
        }
    }
}

/// Calendar insertion settings. Absence of id or token makes insertion a
/// reported no-op, never an error.
#[derive(Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    pub calendar_id: Option<String>,
    pub access_token: Option<String>,
    pub time_zone: String,
    /// Scheduler default for calendar creation; `None` falls back to the
    /// configured-credentials heuristic.
    pub create: Option<bool>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            calendar_id: None,
            access_token: None,
            time_zone: "Asia/Tokyo".to_string(),
            create: None,
        }
    }
}

impl CalendarConfig {
    /// Both the calendar id and a token are present.
    pub fn is_configured(&self) -> bool {
        let has = |value: &Option<String>| {
            value.as_deref().is_some_and(|v| !v.trim().is_empty())
        };
        has(&self.calendar_id) && has(&self.access_token)
    }
}

/// Report rendering settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Fixed UTC offset applied to timestamps in the serialized document.
    pub utc_offset_hours: i32,
    /// Regex matched against titles/projects for the local-dev heuristic.
    pub local_dev_project_pattern: Option<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 9,
            local_dev_project_pattern: None,
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("xml_output_dir", &self.xml_output_dir)
            .field("git", &self.git)
            .field("llm", &self.llm)
            .field("calendar", &self.calendar)
            .field("report", &self.report)
            .finish()
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("provider", &self.provider)
            .field("openai_api_key", &self.openai_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("openai_model", &self.openai_model)
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("gemini_model", &self.gemini_model)
            .finish()
    }
}

impl fmt::Debug for CalendarConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalendarConfig")
            .field("calendar_id", &self.calendar_id)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("time_zone", &self.time_zone)
            .field("create", &self.create)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("activity.db"),
            xml_output_dir: data_dir.join("xml"),
            git: GitConfig::default(),
            llm: LlmSettings::default(),
            calendar: CalendarConfig::default(),
            report: ReportConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    ///
    /// Precedence, lowest to highest: built-in defaults, the default
    /// config file, the explicit file, then `AR_*` environment variables
    /// (nested keys split on `__`, e.g. `AR_LLM__GEMINI_API_KEY`).
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("AR_").split("__"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for ar.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ar"))
}

/// Returns the platform-specific data directory for ar.
///
/// On Linux: `~/.local/share/ar`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ar"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("activity.db"));
    }

    #[test]
    fn default_caps_match_documented_values() {
        let git = GitConfig::default();
        assert_eq!(git.max_diff_chars, 20_000);
        assert_eq!(git.diff_context, 0);
        assert_eq!(git.max_snapshot_files, 50);
        assert_eq!(git.max_file_chars, 20_000);
    }

    #[test]
    fn calendar_configured_requires_id_and_token() {
        let mut calendar = CalendarConfig::default();
        assert!(!calendar.is_configured());
        calendar.calendar_id = Some("primary".to_string());
        assert!(!calendar.is_configured());
        calendar.access_token = Some("  ".to_string());
        assert!(!calendar.is_configured());
        calendar.access_token = Some("token".to_string());
        assert!(calendar.is_configured());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = Config {
            llm: LlmSettings {
                gemini_api_key: Some("gm-secret".to_string()),
                ..LlmSettings::default()
            },
            calendar: CalendarConfig {
                access_token: Some("tok-secret".to_string()),
                ..CalendarConfig::default()
            },
            ..Config::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("gm-secret"));
        assert!(!debug.contains("tok-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
database_path = "/tmp/store.db"

[llm]
provider = "openai"

[report]
utc_offset_hours = 0
"#,
        )
        .unwrap();
        let config = Config::load_from(Some(&path)).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/store.db"));
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.report.utc_offset_hours, 0);
    }
}
