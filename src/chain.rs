//! Ordered candidate pipelines with first-success fallback.
//!
//! A [`CandidatePipeline`] renders the prompt, calls one model, and parses
//! the reply. [`SuggestionChain`] tries pipelines in order: a
//! `ModelNotFound` moves on to the next candidate, any other failure is
//! returned as is. When every candidate is missing the chain fails with
//! [`SuggestError::FallbackExhausted`] listing what was tried.

use std::sync::Arc;

use tracing::{Instrument, info, warn};

use crate::backend::GenerationBackend;
use crate::catalog::ModelCatalog;
use crate::error::{Result, SuggestError};
use crate::payload::{SuggestionPayload, parse_payload};
use crate::prompt::{PromptVars, render};

/// Prompt → model call → payload parse, for one model.
#[derive(Clone)]
pub struct CandidatePipeline {
    model: String,
    backend: Arc<dyn GenerationBackend>,
}

impl std::fmt::Debug for CandidatePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CandidatePipeline")
            .field("backend", &self.backend.name())
            .field("model", &self.model)
            .finish()
    }
}

impl CandidatePipeline {
    /// Pair `backend` with one model.
    pub fn new(backend: Arc<dyn GenerationBackend>, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            backend,
        }
    }

    /// The model this pipeline calls.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Run the pipeline.
    pub async fn run(&self, vars: &PromptVars) -> Result<SuggestionPayload> {
        let prompt = render(vars);
        let raw = self.backend.generate(&self.model, &prompt).await?;
        parse_payload(&raw)
    }

    /// Blocking variant of [`run`](Self::run).
    pub fn run_blocking(&self, vars: &PromptVars) -> Result<SuggestionPayload> {
        let prompt = render(vars);
        let raw = self.backend.generate_blocking(&self.model, &prompt)?;
        parse_payload(&raw)
    }
}

/// Candidate pipelines tried in order until one succeeds.
#[derive(Debug, Clone)]
pub struct SuggestionChain {
    pipelines: Vec<CandidatePipeline>,
}

impl SuggestionChain {
    /// Chain over explicit pipelines.
    pub fn new(pipelines: Vec<CandidatePipeline>) -> Self {
        Self { pipelines }
    }

    /// One pipeline per model, in the given order.
    pub fn from_models<I, S>(backend: Arc<dyn GenerationBackend>, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            models
                .into_iter()
                .map(|model| CandidatePipeline::new(backend.clone(), model))
                .collect(),
        )
    }

    /// Resolve candidates through `catalog` and build the chain.
    pub async fn connect(
        backend: Arc<dyn GenerationBackend>,
        catalog: &ModelCatalog,
        requested: Option<&str>,
    ) -> Result<Self> {
        let models = catalog.resolve(backend.as_ref(), requested).await?;
        Ok(Self::from_models(backend, models))
    }

    /// Blocking variant of [`connect`](Self::connect).
    pub fn connect_blocking(
        backend: Arc<dyn GenerationBackend>,
        catalog: &ModelCatalog,
        requested: Option<&str>,
    ) -> Result<Self> {
        let models = catalog.resolve_blocking(backend.as_ref(), requested)?;
        Ok(Self::from_models(backend, models))
    }

    /// Candidate models in try order.
    pub fn models(&self) -> Vec<&str> {
        self.pipelines.iter().map(CandidatePipeline::model).collect()
    }

    /// Run candidates until one produces a payload.
    pub async fn invoke(&self, vars: &PromptVars) -> Result<SuggestionPayload> {
        let mut tried = Vec::new();
        for (index, pipeline) in self.pipelines.iter().enumerate() {
            let span =
                crate::chain_candidate_span!(pipeline.backend.name(), pipeline.model(), index + 1);
            let outcome = pipeline.run(vars).instrument(span).await;
            if let Some(done) = settle(pipeline, outcome, &mut tried) {
                return done;
            }
        }
        Err(SuggestError::FallbackExhausted { tried })
    }

    /// Blocking variant of [`invoke`](Self::invoke).
    pub fn invoke_blocking(&self, vars: &PromptVars) -> Result<SuggestionPayload> {
        let mut tried = Vec::new();
        for (index, pipeline) in self.pipelines.iter().enumerate() {
            let span =
                crate::chain_candidate_span!(pipeline.backend.name(), pipeline.model(), index + 1);
            let outcome = span.in_scope(|| pipeline.run_blocking(vars));
            if let Some(done) = settle(pipeline, outcome, &mut tried) {
                return done;
            }
        }
        Err(SuggestError::FallbackExhausted { tried })
    }
}

/// `None` means "try the next candidate".
fn settle(
    pipeline: &CandidatePipeline,
    outcome: Result<SuggestionPayload>,
    tried: &mut Vec<String>,
) -> Option<Result<SuggestionPayload>> {
    tried.push(pipeline.model.clone());
    match outcome {
        Ok(payload) => {
            info!(model = pipeline.model(), "candidate model succeeded");
            Some(Ok(payload))
        }
        Err(e) if e.falls_through() => {
            warn!(model = pipeline.model(), error = %e, "candidate model unavailable, trying next");
            None
        }
        Err(e) => Some(Err(e)),
    }
}
