//! Deterministic in-memory backend.
//!
//! Replies are scripted per model and consumed in order; the last reply for
//! a model repeats once the queue is down to one entry. Calls to unknown
//! models fail with [`SuggestError::ModelNotFound`], so fallback behaviour
//! can be exercised without a network.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::GenerationBackend;
use crate::error::{Result, SuggestError};
use crate::prompt::RenderedPrompt;

/// One scripted outcome for a `generate` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedReply {
    /// Return this raw text.
    Text(String),
    /// Fail with `ModelNotFound`.
    NotFound,
    /// Fail with `RateLimited`.
    RateLimited {
        /// Upstream retry hint.
        retry_after: Option<Duration>,
        /// Zero quota; not retryable.
        quota_exhausted: bool,
    },
    /// Fail with `ProviderError`.
    Provider(String),
}

impl ScriptedReply {
    /// Shorthand for [`ScriptedReply::Text`].
    pub fn text(raw: impl Into<String>) -> Self {
        Self::Text(raw.into())
    }

    fn into_result(self, model: &str) -> Result<String> {
        match self {
            Self::Text(raw) => Ok(raw),
            Self::NotFound => Err(SuggestError::ModelNotFound(format!(
                "model `{model}` is not found"
            ))),
            Self::RateLimited {
                retry_after,
                quota_exhausted,
            } => Err(SuggestError::RateLimited {
                message: format!("model `{model}` is rate limited"),
                retry_after,
                quota_exhausted,
            }),
            Self::Provider(message) => Err(SuggestError::ProviderError(message)),
        }
    }
}

/// In-memory [`GenerationBackend`] with scripted replies.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    credential: String,
    models: Vec<String>,
    list_failure: Option<String>,
    replies: Mutex<HashMap<String, VecDeque<ScriptedReply>>>,
    list_calls: AtomicUsize,
    attempts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// A backend that advertises `models` and has no scripted replies yet.
    pub fn new<I, S>(models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            credential: "scripted".into(),
            models: models.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Use a distinct credential id (separate discovery cache entry).
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    /// Make model listing fail with a `ProviderError`.
    pub fn with_list_failure(mut self, message: impl Into<String>) -> Self {
        self.list_failure = Some(message.into());
        self
    }

    /// Append a reply for `model`.
    pub fn with_reply(self, model: impl Into<String>, reply: ScriptedReply) -> Self {
        self.push_reply(model, reply);
        self
    }

    /// Append a reply for `model` on a shared backend.
    pub fn push_reply(&self, model: impl Into<String>, reply: ScriptedReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.entry(model.into()).or_default().push_back(reply);
        }
    }

    /// Number of `list_models` calls (both flavours).
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Models passed to `generate`, in call order.
    pub fn attempted_models(&self) -> Vec<String> {
        self.attempts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    fn list(&self) -> Result<Vec<String>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        match &self.list_failure {
            Some(message) => Err(SuggestError::ProviderError(message.clone())),
            None => Ok(self.models.clone()),
        }
    }

    fn next_reply(&self, model: &str) -> Result<String> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(model.to_owned());
        }

        let reply = {
            let mut replies = self
                .replies
                .lock()
                .map_err(|_| SuggestError::ProviderError("scripted replies poisoned".into()))?;
            match replies.get_mut(model) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        reply
            .unwrap_or(ScriptedReply::NotFound)
            .into_result(model)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn credential_id(&self) -> String {
        format!("scripted:{}", self.credential)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        self.list()
    }

    fn list_models_blocking(&self) -> Result<Vec<String>> {
        self.list()
    }

    async fn generate(&self, model: &str, _prompt: &RenderedPrompt) -> Result<String> {
        self.next_reply(model)
    }

    fn generate_blocking(&self, model: &str, _prompt: &RenderedPrompt) -> Result<String> {
        self.next_reply(model)
    }
}
