//! Configuration for the murmur service.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file,
//! and environment variables.
//!
//! ```toml
//! [provider]
//! api_key = "AIza..."
//! model = "gemini-2.0-flash"
//!
//! [suggestions]
//! default_count = 5
//!
//! [server]
//! port = 8000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::backend::GeminiConfig;
use crate::backend::gemini::{DEFAULT_BASE_URL, DEFAULT_TEMPERATURE};
use crate::error::{Result, SuggestError};
use crate::observability::redact::RedactedString;
use crate::service::{DEFAULT_SUGGESTIONS, MAX_SUGGESTIONS, MIN_SUGGESTIONS};

/// Explicit config file path.
pub const ENV_CONFIG_PATH: &str = "MURMUR_CONFIG";
/// API key for the generation provider.
pub const ENV_API_KEY: &str = "GOOGLE_API_KEY";
/// Preferred model name.
pub const ENV_MODEL: &str = "GEMINI_MODEL";
/// Provider base URL.
pub const ENV_BASE_URL: &str = "GEMINI_BASE_URL";
/// Default root suggestion count.
pub const ENV_SUGGESTIONS_COUNT: &str = "SUGGESTIONS_COUNT";
/// Listen host.
pub const ENV_HOST: &str = "MURMUR_HOST";
/// Listen port.
pub const ENV_PORT: &str = "MURMUR_PORT";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MurmurConfig {
    /// Generation provider settings.
    pub provider: ProviderConfig,
    /// Suggestion defaults.
    pub suggestions: SuggestionsConfig,
    /// HTTP server settings.
    pub server: ServerConfig,
}

/// Generation provider settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key. Never logged.
    pub api_key: RedactedString,
    /// REST API base URL.
    pub base_url: String,
    /// Preferred model. `None` tries the built-in preference order.
    pub model: Option<String>,
    /// Sampling temperature.
    pub temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: RedactedString::default(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: None,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl ProviderConfig {
    /// Backend configuration derived from these settings.
    pub fn gemini(&self) -> GeminiConfig {
        GeminiConfig::new(self.api_key.as_str())
            .with_base_url(self.base_url.clone())
            .with_temperature(self.temperature)
    }

    /// Preferred model, ignoring blank values.
    pub fn requested_model(&self) -> Option<&str> {
        self.model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
    }
}

/// Suggestion defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionsConfig {
    /// Root suggestions when a request does not specify a count.
    pub default_count: usize,
}

impl Default for SuggestionsConfig {
    fn default() -> Self {
        Self {
            default_count: DEFAULT_SUGGESTIONS,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen host.
    pub host: String,
    /// Listen port (0 picks a free port).
    pub port: u16,
    /// Retries after a retryable rate limit before giving up.
    pub max_rate_limit_retries: u32,
    /// Backoff before the first retry; doubles on each further retry.
    pub initial_backoff_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8000,
            max_rate_limit_retries: 2,
            initial_backoff_ms: 1000,
        }
    }
}

impl MurmurConfig {
    /// Load configuration from the default file location and the process
    /// environment.
    ///
    /// # Errors
    ///
    /// Returns [`SuggestError::ConfigError`] if a file or variable cannot be
    /// parsed. Does not call [`validate`](Self::validate).
    pub fn load() -> Result<Self> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Like [`load`](Self::load) with a custom environment lookup.
    pub fn load_with<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match config_path(&lookup)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(&lookup)?;
        Ok(config)
    }

    /// Overlay environment variables onto this config.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_owned()).filter(|v| !v.is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.provider.api_key = RedactedString::new(key);
        }
        if let Some(model) = get(ENV_MODEL) {
            self.provider.model = Some(model);
        }
        if let Some(url) = get(ENV_BASE_URL) {
            self.provider.base_url = url;
        }
        if let Some(count) = get(ENV_SUGGESTIONS_COUNT) {
            self.suggestions.default_count = parse_env(ENV_SUGGESTIONS_COUNT, &count)?;
        }
        if let Some(host) = get(ENV_HOST) {
            self.server.host = host;
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = parse_env(ENV_PORT, &port)?;
        }
        Ok(())
    }

    /// Check that the configuration can serve requests.
    pub fn validate(&self) -> Result<()> {
        if self.provider.api_key.is_blank() {
            return Err(SuggestError::ConfigError(format!(
                "no API key configured; set {ENV_API_KEY} or provider.api_key"
            )));
        }
        if self.provider.base_url.trim().is_empty() {
            return Err(SuggestError::ConfigError("provider.base_url is empty".into()));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(SuggestError::ConfigError(format!(
                "provider.temperature must be between 0 and 2, got {}",
                self.provider.temperature
            )));
        }
        let count = self.suggestions.default_count;
        if !(MIN_SUGGESTIONS..=MAX_SUGGESTIONS).contains(&count) {
            return Err(SuggestError::ConfigError(format!(
                "suggestions.default_count must be between {MIN_SUGGESTIONS} and {MAX_SUGGESTIONS}, got {count}"
            )));
        }
        if self.server.host.trim().is_empty() {
            return Err(SuggestError::ConfigError("server.host is empty".into()));
        }
        Ok(())
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SuggestError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| SuggestError::ConfigError(format!("invalid {}: {e}", path.display())))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SuggestError::ConfigError(format!("cannot create {}: {e}", parent.display()))
            })?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SuggestError::ConfigError(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| {
            SuggestError::ConfigError(format!("cannot write {}: {e}", path.display()))
        })
    }

    /// Returns the default config file path: `<config dir>/murmur/config.toml`.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("murmur").join("config.toml"))
    }
}

/// The file to load: `MURMUR_CONFIG` when set, else the default path if present.
fn config_path<F>(lookup: &F) -> Result<Option<PathBuf>>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(explicit) = lookup(ENV_CONFIG_PATH).filter(|p| !p.trim().is_empty()) {
        let path = PathBuf::from(explicit);
        if !path.is_file() {
            return Err(SuggestError::ConfigError(format!(
                "{ENV_CONFIG_PATH} points to {}, which does not exist",
                path.display()
            )));
        }
        return Ok(Some(path));
    }
    Ok(MurmurConfig::default_config_path().filter(|p| p.is_file()))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| SuggestError::ConfigError(format!("{key} has an invalid value: {value:?}")))
}
