//! Google Generative Language (Gemini) REST backend.
//!
//! - `GET  /v1beta/models`: paginated model listing, filtered to models that
//!   support `generateContent`.
//! - `POST /v1beta/models/{model}:generateContent`: one system instruction
//!   plus one user turn, JSON response mode.
//!
//! The suspending path uses `reqwest`, the blocking path uses `ureq`. Both
//! share the request builders and response/error mapping below, so they
//! classify failures identically.
//!
//! # Examples
//!
//! ```rust,no_run
//! use murmur::backend::{GeminiBackend, GeminiConfig, GenerationBackend};
//!
//! # async fn example() -> murmur::Result<()> {
//! let backend = GeminiBackend::new(GeminiConfig::new("AIza..."));
//! let models = backend.list_models().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::GenerationBackend;
use crate::error::{Result, SuggestError};
use crate::observability::redact::{RedactedString, redact_all};
use crate::prompt::RenderedPrompt;

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

/// Generation method a model must support to be a candidate.
const GENERATE_METHOD: &str = "generateContent";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

const MODELS_PAGE_SIZE: &str = "1000";

/// Upper bound on listing pages followed per discovery.
const MAX_MODEL_PAGES: usize = 20;

// ── Configuration ─────────────────────────────────────────────

/// Configuration for the Gemini backend.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key for authentication.
    pub api_key: RedactedString,
    /// Base URL (defaults to [`DEFAULT_BASE_URL`]).
    pub base_url: String,
    /// Sampling temperature.
    pub temperature: f64,
}

impl GeminiConfig {
    /// Create a config with the given API key and default host/temperature.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: RedactedString::new(api_key),
            base_url: DEFAULT_BASE_URL.into(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    /// Set a custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    fn base(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    fn models_url(&self) -> String {
        format!("{}/v1beta/models", self.base())
    }

    fn generate_url(&self, model: &str) -> String {
        format!("{}/v1beta/models/{model}:{GENERATE_METHOD}", self.base())
    }
}

// ── Wire types ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListModelsResponse {
    #[serde(default)]
    models: Vec<ModelInfo>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    #[serde(default)]
    supported_generation_methods: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

/// One page of the model listing, already filtered and stripped.
#[derive(Debug, Default, PartialEq, Eq)]
struct ModelPage {
    models: Vec<String>,
    next_page_token: Option<String>,
}

// ── Request / response mapping ────────────────────────────────

/// Build the JSON body for `generateContent`.
pub fn build_generate_body(prompt: &RenderedPrompt, temperature: f64) -> serde_json::Value {
    serde_json::json!({
        "systemInstruction": {
            "parts": [{ "text": prompt.system }]
        },
        "contents": [{
            "role": "user",
            "parts": [{ "text": prompt.user }]
        }],
        "generationConfig": {
            "temperature": temperature,
            "responseMimeType": "application/json"
        }
    })
}

fn parse_model_page(body: &str) -> Result<ModelPage> {
    let parsed: ListModelsResponse = serde_json::from_str(body)
        .map_err(|e| SuggestError::ProviderError(format!("invalid model listing: {e}")))?;

    let models = parsed
        .models
        .into_iter()
        .filter(|m| {
            m.supported_generation_methods
                .iter()
                .any(|method| method == GENERATE_METHOD)
        })
        .map(|m| short_model_name(&m.name).to_owned())
        .collect();

    Ok(ModelPage {
        models,
        next_page_token: parsed.next_page_token.filter(|t| !t.is_empty()),
    })
}

/// `models/gemini-2.0-flash` → `gemini-2.0-flash`.
fn short_model_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn extract_text(body: &str) -> Result<String> {
    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| SuggestError::ProviderError(format!("invalid generateContent response: {e}")))?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        let reason = parsed
            .prompt_feedback
            .and_then(|f| f.block_reason)
            .unwrap_or_else(|| "no candidates returned".to_owned());
        return Err(SuggestError::ProviderError(format!(
            "Gemini returned no content: {reason}"
        )));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".to_owned());
        return Err(SuggestError::ProviderError(format!(
            "Gemini returned an empty candidate (finish reason: {reason})"
        )));
    }

    Ok(text)
}

/// Map an HTTP error status to the appropriate [`SuggestError`].
pub fn map_http_error(status: u16, body: &str, context: &str) -> SuggestError {
    let message = redact_all(&extract_error_message(body));
    let lower = body.to_lowercase();
    match status {
        404 => SuggestError::ModelNotFound(format!("{context}: {message}")),
        429 => SuggestError::RateLimited {
            message: format!("Gemini rate limited: {message}"),
            retry_after: parse_retry_delay(body),
            quota_exhausted: lower.contains("limit: 0"),
        },
        401 | 403 => SuggestError::AuthError(format!("Gemini authentication failed: {message}")),
        400 if lower.contains("api key not valid") => {
            SuggestError::AuthError(format!("Gemini authentication failed: {message}"))
        }
        _ => SuggestError::ProviderError(format!("Gemini HTTP {status} ({context}): {message}")),
    }
}

/// Extract `error.message` from a Google API error body.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Retry hint from a 429 body.
///
/// Prefers the structured `RetryInfo.retryDelay` detail (`"23s"`), then a
/// "retry in 12.5s" phrase in the message.
pub fn parse_retry_delay(body: &str) -> Option<Duration> {
    let structured = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")?
                .get("details")?
                .as_array()?
                .iter()
                .find_map(|d| d.get("retryDelay").and_then(|r| r.as_str()).map(String::from))
        })
        .and_then(|delay| parse_seconds(delay.trim_end_matches('s')));

    structured.or_else(|| {
        let lower = body.to_lowercase();
        let pos = lower.find("retry in ")?;
        let after = &lower[pos + "retry in ".len()..];
        let end = after
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(after.len());
        if !after[end..].starts_with('s') {
            return None;
        }
        parse_seconds(&after[..end])
    })
}

fn parse_seconds(text: &str) -> Option<Duration> {
    let secs: f64 = text.parse().ok()?;
    Duration::try_from_secs_f64(secs).ok()
}

// ── Adapter ───────────────────────────────────────────────────

/// Gemini REST backend.
pub struct GeminiBackend {
    config: GeminiConfig,
    client: reqwest::Client,
    agent: ureq::Agent,
}

impl std::fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("base_url", &self.config.base_url)
            .field("temperature", &self.config.temperature)
            .finish()
    }
}

impl GeminiBackend {
    /// Create a new Gemini backend with the given configuration.
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            agent: ureq::agent(),
        }
    }

    async fn fetch_model_page(&self, page_token: Option<&str>) -> Result<ModelPage> {
        let mut request = self
            .client
            .get(self.config.models_url())
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .query(&[("pageSize", MODELS_PAGE_SIZE)]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SuggestError::RequestError(format!("Gemini model listing failed: {e}")))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SuggestError::RequestError(format!("Gemini model listing failed: {e}")))?;
        if !status.is_success() {
            return Err(map_http_error(status.as_u16(), &body, "list models"));
        }
        parse_model_page(&body)
    }

    fn fetch_model_page_blocking(&self, page_token: Option<&str>) -> Result<ModelPage> {
        let mut request = self
            .agent
            .get(&self.config.models_url())
            .set(API_KEY_HEADER, self.config.api_key.as_str())
            .query("pageSize", MODELS_PAGE_SIZE);
        if let Some(token) = page_token {
            request = request.query("pageToken", token);
        }

        let body = read_ureq(request.call(), "list models")?;
        parse_model_page(&body)
    }
}

/// Collapse a ureq result into the body text or a classified error.
fn read_ureq(
    result: std::result::Result<ureq::Response, ureq::Error>,
    context: &str,
) -> Result<String> {
    match result {
        Ok(response) => response
            .into_string()
            .map_err(|e| SuggestError::RequestError(format!("Gemini {context} failed: {e}"))),
        Err(ureq::Error::Status(code, response)) => {
            let body = response.into_string().unwrap_or_default();
            Err(map_http_error(code, &body, context))
        }
        Err(ureq::Error::Transport(transport)) => Err(SuggestError::RequestError(format!(
            "Gemini {context} failed: {}",
            redact_all(&transport.to_string())
        ))),
    }
}

#[async_trait]
impl GenerationBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    fn credential_id(&self) -> String {
        format!("gemini:{}", self.config.api_key.fingerprint())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let mut models = Vec::new();
        let mut token: Option<String> = None;
        for _ in 0..MAX_MODEL_PAGES {
            let page = self.fetch_model_page(token.as_deref()).await?;
            models.extend(page.models);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        debug!(count = models.len(), "Gemini model listing complete");
        Ok(models)
    }

    fn list_models_blocking(&self) -> Result<Vec<String>> {
        let mut models = Vec::new();
        let mut token: Option<String> = None;
        for _ in 0..MAX_MODEL_PAGES {
            let page = self.fetch_model_page_blocking(token.as_deref())?;
            models.extend(page.models);
            match page.next_page_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        debug!(count = models.len(), "Gemini model listing complete");
        Ok(models)
    }

    async fn generate(&self, model: &str, prompt: &RenderedPrompt) -> Result<String> {
        let context = format!("generateContent {model}");
        let body = build_generate_body(prompt, self.config.temperature);

        let response = self
            .client
            .post(self.config.generate_url(model))
            .header(API_KEY_HEADER, self.config.api_key.as_str())
            .json(&body)
            .send()
            .await
            .map_err(|e| SuggestError::RequestError(format!("Gemini {context} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SuggestError::RequestError(format!("Gemini {context} failed: {e}")))?;
        if !status.is_success() {
            return Err(map_http_error(status.as_u16(), &text, &context));
        }
        extract_text(&text)
    }

    fn generate_blocking(&self, model: &str, prompt: &RenderedPrompt) -> Result<String> {
        let context = format!("generateContent {model}");
        let body = build_generate_body(prompt, self.config.temperature);
        let body_str = serde_json::to_string(&body)
            .map_err(|e| SuggestError::RequestError(format!("JSON serialization failed: {e}")))?;

        let result = self
            .agent
            .post(&self.config.generate_url(model))
            .set(API_KEY_HEADER, self.config.api_key.as_str())
            .set("Content-Type", "application/json")
            .send_string(&body_str);
        let text = read_ureq(result, &context)?;
        extract_text(&text)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    fn prompt() -> RenderedPrompt {
        RenderedPrompt {
            system: "sys".into(),
            user: "usr".into(),
        }
    }

    #[test]
    fn config_defaults() {
        let config = GeminiConfig::new("k");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.api_key.as_str(), "k");
    }

    #[test]
    fn urls_tolerate_trailing_slash() {
        let config = GeminiConfig::new("k").with_base_url("http://localhost:9/");
        assert_eq!(config.models_url(), "http://localhost:9/v1beta/models");
        assert_eq!(
            config.generate_url("gemini-2.0-flash"),
            "http://localhost:9/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn generate_body_shape() {
        let body = build_generate_body(&prompt(), 0.3);
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "usr");
        assert_eq!(body["generationConfig"]["temperature"], 0.3);
        assert_eq!(
            body["generationConfig"]["responseMimeType"],
            "application/json"
        );
    }

    #[test]
    fn model_page_filters_and_strips_names() {
        let body = r#"{
            "models": [
                {"name": "models/gemini-2.0-flash", "supportedGenerationMethods": ["generateContent", "countTokens"]},
                {"name": "models/embedding-001", "supportedGenerationMethods": ["embedContent"]},
                {"name": "models/gemini-2.5-pro", "supportedGenerationMethods": ["generateContent"]},
                {"name": "models/aqa"}
            ],
            "nextPageToken": "abc"
        }"#;
        let page = parse_model_page(body).unwrap();
        assert_eq!(page.models, vec!["gemini-2.0-flash", "gemini-2.5-pro"]);
        assert_eq!(page.next_page_token.as_deref(), Some("abc"));
    }

    #[test]
    fn empty_page_token_ends_listing() {
        let page = parse_model_page(r#"{"models": [], "nextPageToken": ""}"#).unwrap();
        assert_eq!(page, ModelPage::default());
    }

    #[test]
    fn extract_text_joins_parts() {
        let body = r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}, "finishReason": "STOP"}]}"#;
        assert_eq!(extract_text(body).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn blocked_prompt_is_provider_error() {
        let body = r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#;
        let err = extract_text(body).unwrap_err();
        assert!(matches!(err, SuggestError::ProviderError(_)));
        assert!(err.message().contains("SAFETY"));
    }

    #[test]
    fn empty_candidate_names_finish_reason() {
        let body = r#"{"candidates": [{"finishReason": "MAX_TOKENS"}]}"#;
        let err = extract_text(body).unwrap_err();
        assert!(err.message().contains("MAX_TOKENS"));
    }

    #[test]
    fn http_404_maps_to_model_not_found() {
        let err = map_http_error(
            404,
            r#"{"error": {"code": 404, "message": "models/gemini-x is not found", "status": "NOT_FOUND"}}"#,
            "generateContent gemini-x",
        );
        assert!(err.falls_through());
        assert!(err.message().contains("gemini-x is not found"));
    }

    #[test]
    fn http_429_maps_to_rate_limited_with_delay() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED",
            "details": [{"@type": "type.googleapis.com/google.rpc.RetryInfo", "retryDelay": "23s"}]}}"#;
        let err = map_http_error(429, body, "generateContent m");
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(23)));
    }

    #[test]
    fn http_429_with_zero_limit_is_quota_exhausted() {
        let body = r#"{"error": {"code": 429, "message": "Quota exceeded for metric: x, limit: 0. Please retry in 4.5s."}}"#;
        let err = map_http_error(429, body, "generateContent m");
        assert!(matches!(
            err,
            SuggestError::RateLimited {
                quota_exhausted: true,
                ..
            }
        ));
        assert!(!err.is_retryable());
        assert_eq!(err.retry_after(), Some(Duration::from_millis(4_500)));
    }

    #[test]
    fn auth_statuses_map_to_auth_error() {
        assert!(matches!(
            map_http_error(403, "forbidden", "list models"),
            SuggestError::AuthError(_)
        ));
        let bad_key = r#"{"error": {"code": 400, "message": "API key not valid. Please pass a valid API key."}}"#;
        assert!(matches!(
            map_http_error(400, bad_key, "list models"),
            SuggestError::AuthError(_)
        ));
    }

    #[test]
    fn other_statuses_map_to_provider_error() {
        let err = map_http_error(500, "Internal Server Error", "generateContent m");
        assert!(matches!(err, SuggestError::ProviderError(_)));
        assert!(err.message().contains("500"));
    }

    #[test]
    fn retry_delay_from_message_requires_seconds_unit() {
        assert_eq!(
            parse_retry_delay("please retry in 12s"),
            Some(Duration::from_secs(12))
        );
        assert_eq!(parse_retry_delay("please retry in 12 minutes"), None);
        assert_eq!(parse_retry_delay("no hint here"), None);
    }

    #[test]
    fn unrepresentable_retry_delay_is_dropped() {
        let structured = r#"{"error": {"details": [{"retryDelay": "1e30s"}]}}"#;
        assert_eq!(parse_retry_delay(structured), None);
        assert_eq!(parse_retry_delay("Please retry in 99999999999999999999s."), None);
        assert_eq!(parse_retry_delay(r#"{"error": {"details": [{"retryDelay": "-3s"}]}}"#), None);

        let err = map_http_error(429, structured, "generate");
        assert!(err.is_retryable());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn error_messages_do_not_echo_keys() {
        let body = r#"{"error": {"message": "API key not valid: AIzaSyLeakedKey123"}}"#;
        let err = map_http_error(400, body, "list models");
        assert!(!err.message().contains("LeakedKey"));
    }

    #[test]
    fn credential_id_is_a_fingerprint() {
        let backend = GeminiBackend::new(GeminiConfig::new("AIza-secret"));
        let id = backend.credential_id();
        assert!(id.starts_with("gemini:"));
        assert!(!id.contains("secret"));
        assert_eq!(id, GeminiBackend::new(GeminiConfig::new("AIza-secret")).credential_id());
    }

    #[test]
    fn debug_hides_api_key() {
        let backend = GeminiBackend::new(GeminiConfig::new("AIza-secret"));
        assert!(!format!("{backend:?}").contains("secret"));
    }
}
