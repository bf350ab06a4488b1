//! Generation backend contract.
//!
//! The pipeline talks to a text-generation service only through
//! [`GenerationBackend`]: list the models this credential may call, and turn
//! a rendered prompt into raw model text. Every operation comes in a
//! suspending and a blocking flavour with identical semantics so the service
//! can expose both entry points without a runtime inside the blocking path.
//!
//! # Available backends
//!
//! - [`gemini`]: Google Generative Language REST API
//! - [`scripted`]: deterministic in-memory backend for tests and offline runs

pub mod gemini;
pub mod scripted;

use async_trait::async_trait;

use crate::error::Result;
use crate::prompt::RenderedPrompt;

pub use gemini::{GeminiBackend, GeminiConfig};
pub use scripted::{ScriptedBackend, ScriptedReply};

/// Trait for text-generation backends.
///
/// Errors must be classified: an unknown or unavailable model is
/// [`SuggestError::ModelNotFound`](crate::error::SuggestError::ModelNotFound),
/// throttling is [`SuggestError::RateLimited`](crate::error::SuggestError::RateLimited).
/// The fallback chain and the HTTP boundary rely on that classification.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Returns the backend name (e.g. `"gemini"`).
    fn name(&self) -> &str;

    /// Stable identifier of the credential in use, safe to log and to use
    /// as a cache key.
    fn credential_id(&self) -> String;

    /// Model short names this credential can use for content generation.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Blocking variant of [`list_models`](Self::list_models).
    fn list_models_blocking(&self) -> Result<Vec<String>>;

    /// Run `prompt` against `model` and return the raw text output.
    async fn generate(&self, model: &str, prompt: &RenderedPrompt) -> Result<String>;

    /// Blocking variant of [`generate`](Self::generate).
    fn generate_blocking(&self, model: &str, prompt: &RenderedPrompt) -> Result<String>;
}
