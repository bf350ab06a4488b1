//! Suggestion service: request normalization, fallback invocation, and
//! sanitization, with matching blocking and suspending entry points.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::backend::GenerationBackend;
use crate::catalog::ModelCatalog;
use crate::chain::SuggestionChain;
use crate::error::{Result, SuggestError};
use crate::payload::{StyledSentence, SuggestionPayload, WordBranch};
use crate::prompt::PromptVars;
use crate::sanitize::{MAX_DEPTH, sanitize_sentences, sanitize_tree};

/// Smallest accepted root suggestion count.
pub const MIN_SUGGESTIONS: usize = 1;

/// Largest accepted root suggestion count.
pub const MAX_SUGGESTIONS: usize = 10;

/// Root suggestion count used when neither request nor config sets one.
pub const DEFAULT_SUGGESTIONS: usize = 5;

/// Inputs for one prediction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SuggestionRequest {
    /// What the other person just said.
    pub question: String,
    /// What the user has spoken of their reply so far.
    pub partial_answer: String,
    /// Running transcript; blank means no prior context.
    pub conversation: String,
    /// Root suggestion count; `None` uses the service default.
    pub suggestions_count: Option<usize>,
}

impl SuggestionRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Self::default()
        }
    }

    pub fn with_partial_answer(mut self, partial_answer: impl Into<String>) -> Self {
        self.partial_answer = partial_answer.into();
        self
    }

    pub fn with_conversation(mut self, conversation: impl Into<String>) -> Self {
        self.conversation = conversation.into();
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.suggestions_count = Some(count);
        self
    }
}

/// Sanitized prediction result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionSet {
    /// Next-word tree, at most `count` roots and [`MAX_DEPTH`] levels.
    pub suggestions: Vec<WordBranch>,
    /// Up to three styled sentences, smart/funny/casual first.
    pub sentences: Vec<StyledSentence>,
}

/// Produces sanitized suggestions through a [`SuggestionChain`].
#[derive(Debug, Clone)]
pub struct SuggestionService {
    chain: SuggestionChain,
    default_count: usize,
}

impl SuggestionService {
    /// Create a service over an existing chain.
    ///
    /// # Errors
    ///
    /// [`SuggestError::ConfigError`] when `default_count` is out of range.
    pub fn new(chain: SuggestionChain, default_count: usize) -> Result<Self> {
        if !(MIN_SUGGESTIONS..=MAX_SUGGESTIONS).contains(&default_count) {
            return Err(SuggestError::ConfigError(format!(
                "default suggestion count must be between {MIN_SUGGESTIONS} and {MAX_SUGGESTIONS}, got {default_count}"
            )));
        }
        Ok(Self {
            chain,
            default_count,
        })
    }

    /// Resolve candidate models and build the service.
    pub async fn connect(
        backend: Arc<dyn GenerationBackend>,
        catalog: &ModelCatalog,
        requested_model: Option<&str>,
        default_count: usize,
    ) -> Result<Self> {
        let chain = SuggestionChain::connect(backend, catalog, requested_model).await?;
        Self::new(chain, default_count)
    }

    /// Blocking variant of [`connect`](Self::connect).
    pub fn connect_blocking(
        backend: Arc<dyn GenerationBackend>,
        catalog: &ModelCatalog,
        requested_model: Option<&str>,
        default_count: usize,
    ) -> Result<Self> {
        let chain = SuggestionChain::connect_blocking(backend, catalog, requested_model)?;
        Self::new(chain, default_count)
    }

    pub fn chain(&self) -> &SuggestionChain {
        &self.chain
    }

    pub fn default_count(&self) -> usize {
        self.default_count
    }

    /// Predict suggestions for `request`.
    ///
    /// # Errors
    ///
    /// - [`SuggestError::InvalidRequest`] for a count outside `1..=10`
    /// - [`SuggestError::UpstreamParse`] when the model reply cannot be parsed
    /// - [`SuggestError::NoValidSuggestions`] when nothing survives sanitization
    /// - chain and backend errors unchanged otherwise
    pub async fn predict(&self, request: &SuggestionRequest) -> Result<SuggestionSet> {
        let (vars, count) = self.prepare(request)?;
        let outcome = self.chain.invoke(&vars).await;
        finish(outcome, count)
    }

    /// Blocking variant of [`predict`](Self::predict).
    pub fn predict_blocking(&self, request: &SuggestionRequest) -> Result<SuggestionSet> {
        let (vars, count) = self.prepare(request)?;
        let outcome = self.chain.invoke_blocking(&vars);
        finish(outcome, count)
    }

    fn prepare(&self, request: &SuggestionRequest) -> Result<(PromptVars, usize)> {
        let count = request.suggestions_count.unwrap_or(self.default_count);
        let prompt_count = u8::try_from(count)
            .ok()
            .filter(|c| (MIN_SUGGESTIONS..=MAX_SUGGESTIONS).contains(&usize::from(*c)))
            .ok_or_else(|| {
                SuggestError::InvalidRequest(format!(
                    "suggestions_count must be between {MIN_SUGGESTIONS} and {MAX_SUGGESTIONS}, got {count}"
                ))
            })?;

        let vars = PromptVars::new(
            request.question.trim(),
            request.partial_answer.trim(),
            &request.conversation,
            prompt_count,
        );
        debug!(count, models = ?self.chain.models(), "predicting suggestions");
        Ok((vars, count))
    }
}

fn finish(outcome: Result<SuggestionPayload>, count: usize) -> Result<SuggestionSet> {
    let payload = match outcome {
        Ok(payload) => payload,
        Err(SuggestError::UpstreamParse(detail)) => {
            warn!(%detail, "model reply did not match the suggestion schema");
            return Err(SuggestError::UpstreamParse(
                "unable to parse suggestions from model".into(),
            ));
        }
        Err(e) => return Err(e),
    };

    let suggestions = sanitize_tree(&payload.suggestions, count, MAX_DEPTH);
    if suggestions.is_empty() {
        return Err(SuggestError::NoValidSuggestions(
            "model returned no valid suggestions".into(),
        ));
    }

    Ok(SuggestionSet {
        suggestions,
        sentences: sanitize_sentences(&payload.sentences),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::backend::{ScriptedBackend, ScriptedReply};

    fn service_replying(raw: &str, default_count: usize) -> (Arc<ScriptedBackend>, SuggestionService) {
        let backend = Arc::new(ScriptedBackend::new(["m"]).with_reply("m", ScriptedReply::text(raw)));
        let shared: Arc<dyn GenerationBackend> = backend.clone();
        let service =
            SuggestionService::new(SuggestionChain::from_models(shared, ["m"]), default_count).unwrap();
        (backend, service)
    }

    fn words(branches: &[WordBranch]) -> Vec<&str> {
        branches.iter().map(|b| b.word.as_str()).collect()
    }

    #[tokio::test]
    async fn async_prediction_deduplicates_and_limits() {
        let raw = r#"{
            "suggestions": [
                {"word": "Yes", "next": [{"word": " maybe "}, {"word": "maybe"}]},
                {"word": " yes "},
                {"word": "possibly"}
            ],
            "sentences": []
        }"#;
        let (_, service) = service_replying(raw, 5);
        let request = SuggestionRequest::new("Would you like some water?")
            .with_partial_answer("Yes")
            .with_count(3);

        let set = service.predict(&request).await.unwrap();
        assert_eq!(words(&set.suggestions), ["Yes", "possibly"]);
        assert_eq!(words(&set.suggestions[0].children), ["maybe"]);
    }

    #[test]
    fn sync_prediction_respects_limit_and_trims() {
        let raw = r#"{
            "suggestions": [
                {"word": "  hello  "},
                {"word": "world", "next": [{"word": "friend"}]}
            ],
            "sentences": [{"style": "casual", "text": " I'm good "}]
        }"#;
        let (_, service) = service_replying(raw, 5);
        let request = SuggestionRequest::new("How are you?")
            .with_partial_answer("I'm")
            .with_count(1);

        let set = service.predict_blocking(&request).unwrap();
        assert_eq!(words(&set.suggestions), ["hello"]);
        assert!(set.suggestions[0].children.is_empty());
        assert_eq!(set.sentences, vec![StyledSentence::new("casual", "I'm good")]);
    }

    #[tokio::test]
    async fn error_when_no_valid_suggestions() {
        let raw = r#"{"suggestions": [{"word": " "}, {"word": ""}, {"word": "   "}], "sentences": []}"#;
        let (_, service) = service_replying(raw, 5);
        let err = service
            .predict(&SuggestionRequest::new("Do you need help?"))
            .await
            .unwrap_err();
        assert!(matches!(err, SuggestError::NoValidSuggestions(_)));
    }

    #[test]
    fn parse_failure_becomes_domain_error() {
        let (_, service) = service_replying("```\nnope\n```", 5);
        let err = service
            .predict_blocking(&SuggestionRequest::new("Hi"))
            .unwrap_err();
        assert!(matches!(err, SuggestError::UpstreamParse(_)));
        assert_eq!(err.message(), "unable to parse suggestions from model");
    }

    #[test]
    fn default_count_applies_when_request_has_none() {
        let raw = r#"{"suggestions": [{"word": "a"}, {"word": "b"}, {"word": "c"}], "sentences": []}"#;
        let (_, service) = service_replying(raw, 2);
        let set = service.predict_blocking(&SuggestionRequest::new("q")).unwrap();
        assert_eq!(words(&set.suggestions), ["a", "b"]);
    }

    #[test]
    fn out_of_range_count_is_rejected_before_any_call() {
        let (backend, service) = service_replying("{}", 5);
        for count in [0, 11, 300] {
            let err = service
                .predict_blocking(&SuggestionRequest::new("q").with_count(count))
                .unwrap_err();
            assert!(matches!(err, SuggestError::InvalidRequest(_)));
        }
        assert!(backend.attempted_models().is_empty());
    }

    #[test]
    fn invalid_default_count_is_a_config_error() {
        let chain = SuggestionChain::new(Vec::new());
        assert!(matches!(
            SuggestionService::new(chain, 0),
            Err(SuggestError::ConfigError(_))
        ));
    }

    #[test]
    fn backend_errors_pass_through() {
        let backend = Arc::new(ScriptedBackend::new(["m"]).with_reply(
            "m",
            ScriptedReply::RateLimited {
                retry_after: None,
                quota_exhausted: true,
            },
        ));
        let shared: Arc<dyn GenerationBackend> = backend;
        let service = SuggestionService::new(SuggestionChain::from_models(shared, ["m"]), 5).unwrap();
        let err = service.predict_blocking(&SuggestionRequest::new("q")).unwrap_err();
        assert!(matches!(err, SuggestError::RateLimited { quota_exhausted: true, .. }));
    }

    #[test]
    fn serializes_with_wire_names() {
        let set = SuggestionSet {
            suggestions: vec![WordBranch::new("hi", vec![WordBranch::leaf("there")])],
            sentences: vec![StyledSentence::new("smart", "Hello.")],
        };
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["suggestions"][0]["next"][0]["word"], "there");
        assert_eq!(json["sentences"][0]["style"], "smart");
    }
}
