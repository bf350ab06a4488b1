//! Error types for the suggestion pipeline.
//!
//! Each error variant carries a stable error code (SCREAMING_SNAKE_CASE)
//! that is included in the Display output and accessible via [`SuggestError::code()`].
//! The HTTP boundary maps codes to status codes, so they must not change.

use std::time::Duration;

/// Stable error codes for programmatic error handling.
pub mod error_codes {
    /// Invalid configuration, unknown requested model, or no usable models.
    pub const CONFIG_INVALID: &str = "CONFIG_INVALID";

    /// The caller supplied input outside the accepted range.
    pub const INVALID_REQUEST: &str = "INVALID_REQUEST";

    /// The backend does not know (or no longer serves) the requested model.
    pub const MODEL_NOT_FOUND: &str = "MODEL_NOT_FOUND";

    /// The backend throttled the call.
    pub const RATE_LIMITED: &str = "RATE_LIMITED";

    /// The credential was rejected.
    pub const AUTH_FAILED: &str = "AUTH_FAILED";

    /// The request never produced an HTTP response.
    pub const REQUEST_FAILED: &str = "REQUEST_FAILED";

    /// Upstream error not covered by other variants.
    pub const PROVIDER_ERROR: &str = "PROVIDER_ERROR";

    /// Model output could not be parsed into a suggestion payload.
    pub const UPSTREAM_PARSE: &str = "UPSTREAM_PARSE";

    /// Parsing succeeded but nothing survived sanitization.
    pub const NO_SUGGESTIONS: &str = "NO_SUGGESTIONS";

    /// Every candidate model reported "not found".
    pub const FALLBACK_EXHAUSTED: &str = "FALLBACK_EXHAUSTED";
}

/// Errors produced by murmur.
///
/// The Display impl formats as `[CODE] message`.
#[derive(Debug, thiserror::Error)]
pub enum SuggestError {
    /// Invalid configuration, unknown requested model, or no usable models.
    #[error("[{}] {}", error_codes::CONFIG_INVALID, .0)]
    ConfigError(String),

    /// The caller supplied input outside the accepted range.
    #[error("[{}] {}", error_codes::INVALID_REQUEST, .0)]
    InvalidRequest(String),

    /// The backend does not know the requested model.
    #[error("[{}] {}", error_codes::MODEL_NOT_FOUND, .0)]
    ModelNotFound(String),

    /// The backend throttled the call.
    #[error("[{}] {message}", error_codes::RATE_LIMITED)]
    RateLimited {
        /// Upstream message.
        message: String,
        /// Delay the upstream asked us to wait, when it said so.
        retry_after: Option<Duration>,
        /// The quota for this model is zero; retrying cannot help.
        quota_exhausted: bool,
    },

    /// The credential was rejected.
    #[error("[{}] {}", error_codes::AUTH_FAILED, .0)]
    AuthError(String),

    /// Transport failure before an HTTP response arrived.
    #[error("[{}] {}", error_codes::REQUEST_FAILED, .0)]
    RequestError(String),

    /// Upstream error not covered by other variants.
    #[error("[{}] {}", error_codes::PROVIDER_ERROR, .0)]
    ProviderError(String),

    /// Model output could not be parsed into a suggestion payload.
    #[error("[{}] {}", error_codes::UPSTREAM_PARSE, .0)]
    UpstreamParse(String),

    /// Parsing succeeded but the sanitized tree was empty.
    #[error("[{}] {}", error_codes::NO_SUGGESTIONS, .0)]
    NoValidSuggestions(String),

    /// Every candidate model reported "not found".
    #[error(
        "[{}] no model succeeded; tried: {}. Check that the API key has access to these models or adjust the model name.",
        error_codes::FALLBACK_EXHAUSTED,
        .tried.join(", ")
    )]
    FallbackExhausted {
        /// Every model name attempted, in order.
        tried: Vec<String>,
    },
}

impl SuggestError {
    /// Returns the stable error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => error_codes::CONFIG_INVALID,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::ModelNotFound(_) => error_codes::MODEL_NOT_FOUND,
            Self::RateLimited { .. } => error_codes::RATE_LIMITED,
            Self::AuthError(_) => error_codes::AUTH_FAILED,
            Self::RequestError(_) => error_codes::REQUEST_FAILED,
            Self::ProviderError(_) => error_codes::PROVIDER_ERROR,
            Self::UpstreamParse(_) => error_codes::UPSTREAM_PARSE,
            Self::NoValidSuggestions(_) => error_codes::NO_SUGGESTIONS,
            Self::FallbackExhausted { .. } => error_codes::FALLBACK_EXHAUSTED,
        }
    }

    /// Returns the inner message without the code prefix.
    pub fn message(&self) -> String {
        match self {
            Self::ConfigError(m)
            | Self::InvalidRequest(m)
            | Self::ModelNotFound(m)
            | Self::AuthError(m)
            | Self::RequestError(m)
            | Self::ProviderError(m)
            | Self::UpstreamParse(m)
            | Self::NoValidSuggestions(m) => m.clone(),
            Self::RateLimited { message, .. } => message.clone(),
            Self::FallbackExhausted { tried } => {
                format!("no model succeeded; tried: {}", tried.join(", "))
            }
        }
    }

    /// Returns true when the fallback chain should move on to the next candidate.
    ///
    /// Only "model not found" qualifies. Everything else aborts the chain.
    pub fn falls_through(&self) -> bool {
        matches!(self, Self::ModelNotFound(_))
    }

    /// Returns true if the boundary layer may retry this error after a backoff.
    ///
    /// Only rate limits with remaining quota are retryable. The core itself
    /// never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited {
                quota_exhausted: false,
                ..
            }
        )
    }

    /// Upstream retry hint, when the error carries one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Convenience alias for murmur results.
pub type Result<T> = std::result::Result<T, SuggestError>;
