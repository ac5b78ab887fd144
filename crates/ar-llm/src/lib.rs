//! Generation-service client for the activity range analyzer.
//!
//! Talks to either the OpenAI chat-completions API or the Gemini
//! generateContent API and exposes two operations:
//! - free-text generation for the analysis report
//! - structured generation of the calendar entry object

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
const TEXT_TEMPERATURE: f32 = 0.7;
const OBJECT_TEMPERATURE: f32 = 0.3;

/// Generation-service client errors.
#[derive(Debug, Error)]
pub enum LlmError {
    /// The requested provider name is not recognized.
    #[error("unknown provider: {value}")]
    UnknownProvider { value: String },
    /// The API key for the selected provider is missing or unusable.
    #[error("invalid API key for {provider}: {reason}")]
    InvalidApiKey {
        provider: Provider,
        reason: &'static str,
    },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// API returned an error response.
    #[error("API error: {message}")]
    Api { message: String },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Supported generation providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    Gemini,
}

impl Provider {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            other => Err(LlmError::UnknownProvider {
                value: other.to_string(),
            }),
        }
    }
}

/// Provider credentials and model names, usually read from config.
#[derive(Debug, Clone, Default)]
pub struct LlmConfig {
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
}

/// Structured calendar entry produced by the object-generation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarObject {
    pub title: String,
    pub summary: String,
    pub bullets: Vec<String>,
}

/// Seam between the analysis pipeline and the generation service.
///
/// The pipeline is generic over this trait so tests can substitute a
/// canned generator and never touch the network.
pub trait Generator {
    fn generate_text(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<String, LlmError>> + Send;

    fn generate_calendar_object(
        &self,
        prompt: &str,
    ) -> impl Future<Output = Result<CalendarObject, LlmError>> + Send;
}

/// Generation API client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    provider: Provider,
    api_key: String,
    model: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for the given provider using its configured key
    /// and model.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider's API key is absent, empty, or
    /// whitespace-only, or if the HTTP client fails to build.
    pub fn new(provider: Provider, config: &LlmConfig) -> Result<Self, LlmError> {
        let (key, model) = match provider {
            Provider::OpenAi => (config.openai_api_key.as_deref(), &config.openai_model),
            Provider::Gemini => (config.gemini_api_key.as_deref(), &config.gemini_model),
        };
        let api_key = key
            .ok_or(LlmError::InvalidApiKey {
                provider,
                reason: "API key is not configured",
            })?
            .to_string();
        if api_key.trim().is_empty() {
            return Err(LlmError::InvalidApiKey {
                provider,
                reason: "API key cannot be empty",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(LlmError::ClientBuild)?;

        Ok(Self {
            http,
            provider,
            api_key,
            model: model.clone(),
        })
    }

    async fn complete(
        &self,
        prompt: &str,
        temperature: f32,
        structured: bool,
    ) -> Result<String, LlmError> {
        match self.provider {
            Provider::OpenAi => self.complete_openai(prompt, temperature, structured).await,
            Provider::Gemini => self.complete_gemini(prompt, temperature, structured).await,
        }
    }

    async fn complete_openai(
        &self,
        prompt: &str,
        temperature: f32,
        structured: bool,
    ) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: self.model.clone(),
            temperature,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt.to_string(),
            }],
            response_format: structured.then(calendar_response_format),
        };

        let response = self
            .http
            .post(OPENAI_API_URL)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| LlmError::Api {
                message: format!("status {status}: {body}"),
            }));
        }

        let payload: ChatResponse = serde_json::from_str(&body)
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        payload
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))
    }

    async fn complete_gemini(
        &self,
        prompt: &str,
        temperature: f32,
        structured: bool,
    ) -> Result<String, LlmError> {
        let mut generation_config = serde_json::json!({ "temperature": temperature });
        if structured {
            generation_config["responseMimeType"] = "application/json".into();
            generation_config["responseSchema"] = calendar_schema();
        }
        let request = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": generation_config,
        });

        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.model);
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(parse_api_error(&body).unwrap_or_else(|| LlmError::Api {
                message: format!("status {status}: {body}"),
            }));
        }

        let payload: GenerateContentResponse = serde_json::from_str(&body)
            .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
        extract_gemini_text(payload)
    }
}

impl Generator for Client {
    async fn generate_text(&self, prompt: &str) -> Result<String, LlmError> {
        let text = self.complete(prompt, TEXT_TEMPERATURE, false).await?;
        Ok(text.trim().to_string())
    }

    async fn generate_calendar_object(&self, prompt: &str) -> Result<CalendarObject, LlmError> {
        let text = self.complete(prompt, OBJECT_TEMPERATURE, true).await?;
        parse_calendar_object(&text)
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    temperature: f32,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

fn extract_gemini_text(payload: GenerateContentResponse) -> Result<String, LlmError> {
    let candidate = payload
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidResponse("response has no candidates".to_string()))?;
    let pieces: Vec<String> = candidate
        .content
        .parts
        .into_iter()
        .map(|part| part.text)
        .filter(|text| !text.is_empty())
        .collect();
    if pieces.is_empty() {
        return Err(LlmError::InvalidResponse(
            "missing text content".to_string(),
        ));
    }
    Ok(pieces.join("\n"))
}

fn calendar_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "summary": { "type": "string" },
            "bullets": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["title", "summary", "bullets"]
    })
}

fn calendar_response_format() -> serde_json::Value {
    let mut schema = calendar_schema();
    schema["additionalProperties"] = false.into();
    serde_json::json!({
        "type": "json_schema",
        "json_schema": {
            "name": "calendar_entry",
            "strict": true,
            "schema": schema
        }
    })
}

fn parse_api_error(body: &str) -> Option<LlmError> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: ErrorDetails,
    }

    #[derive(Deserialize)]
    struct ErrorDetails {
        message: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| LlmError::Api {
            message: payload.error.message,
        })
}

/// Strips a leading/trailing markdown code fence if the model wrapped its
/// JSON in one.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    match inner.split_once('\n') {
        Some((first, body)) if !first.contains('{') => body.trim(),
        _ => inner.trim(),
    }
}

fn parse_calendar_object(text: &str) -> Result<CalendarObject, LlmError> {
    let object: CalendarObject = serde_json::from_str(strip_code_fence(text))
        .map_err(|err| LlmError::InvalidResponse(err.to_string()))?;
    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_keys() -> LlmConfig {
        LlmConfig {
            openai_api_key: Some("sk-test-key".to_string()),
            openai_model: "gpt-4o-mini".to_string(),
            gemini_api_key: Some("gm-test-key".to_string()),
            gemini_model: "gemini-2.0-flash".to_string(),
        }
    }

    #[test]
    fn provider_parses_known_names() {
        assert_eq!("openai".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" Gemini ".parse::<Provider>().unwrap(), Provider::Gemini);
    }

    #[test]
    fn provider_rejects_unknown_name() {
        let err = "claude".parse::<Provider>().unwrap_err();
        assert!(matches!(err, LlmError::UnknownProvider { value } if value == "claude"));
    }

    #[test]
    fn client_requires_configured_key() {
        let config = LlmConfig {
            openai_api_key: None,
            ..config_with_keys()
        };
        assert!(matches!(
            Client::new(Provider::OpenAi, &config),
            Err(LlmError::InvalidApiKey { .. })
        ));
    }

    #[test]
    fn client_rejects_whitespace_key() {
        let config = LlmConfig {
            gemini_api_key: Some("   ".to_string()),
            ..config_with_keys()
        };
        assert!(matches!(
            Client::new(Provider::Gemini, &config),
            Err(LlmError::InvalidApiKey { .. })
        ));
    }

    #[test]
    fn client_accepts_valid_key() {
        assert!(Client::new(Provider::OpenAi, &config_with_keys()).is_ok());
    }

    #[test]
    fn client_debug_redacts_api_key() {
        let client = Client::new(Provider::Gemini, &config_with_keys()).unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("gm-test-key"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn parse_calendar_object_accepts_json() {
        let input = r#"{"title":"Auth work","summary":"Login flow.","bullets":["wired OAuth","fixed tests"]}"#;
        let parsed = parse_calendar_object(input).unwrap();
        assert_eq!(parsed.title, "Auth work");
        assert_eq!(parsed.bullets.len(), 2);
    }

    #[test]
    fn parse_calendar_object_strips_code_fence() {
        let input = "```json\n{\"title\":\"t\",\"summary\":\"s\",\"bullets\":[]}\n```";
        let parsed = parse_calendar_object(input).unwrap();
        assert_eq!(parsed.title, "t");
    }

    #[test]
    fn parse_calendar_object_rejects_invalid_json() {
        let err = parse_calendar_object("not-json").unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[test]
    fn api_error_body_is_parsed() {
        let body = r#"{"error":{"message":"quota exceeded"}}"#;
        let err = parse_api_error(body).unwrap();
        assert!(matches!(err, LlmError::Api { message } if message == "quota exceeded"));
    }

    #[test]
    fn openai_structured_request_carries_schema() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            temperature: OBJECT_TEMPERATURE,
            messages: vec![ChatMessage {
                role: "user",
                content: "prompt".to_string(),
            }],
            response_format: Some(calendar_response_format()),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["response_format"]["type"], "json_schema");
        assert_eq!(
            value["response_format"]["json_schema"]["schema"]["required"][0],
            "title"
        );
    }
}
