//! Model discovery and candidate ordering.
//!
//! Discovery results are cached for the life of the process, keyed by the
//! backend's credential fingerprint. Each credential has its own slot whose
//! lock is held across the discovery call, so concurrent first requests for
//! one credential share a single round-trip while other credentials proceed.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::{Instrument, info, warn};

use crate::backend::GenerationBackend;
use crate::error::{Result, SuggestError};

/// Known-good models, most preferred first.
pub const PREFERRED_MODELS: [&str; 4] = [
    "gemini-2.0-flash-exp",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.5-pro",
];

static GLOBAL: OnceLock<ModelCatalog> = OnceLock::new();

/// Discovered models for one credential. `None` until a listing succeeds.
type Slot = Arc<Mutex<Option<Vec<String>>>>;

/// Per-credential cache of discovered models.
///
/// Clones share one cache.
#[derive(Debug, Clone, Default)]
pub struct ModelCatalog {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

impl ModelCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide catalog.
    pub fn global() -> &'static ModelCatalog {
        GLOBAL.get_or_init(ModelCatalog::new)
    }

    /// Models the backend's credential can use, discovering on first use.
    ///
    /// Discovery failures are logged and yield an empty list. Only non-empty
    /// results are cached, so a transient failure is retried next time. While
    /// listing keeps failing, every request for that credential pays for its
    /// own listing call, serialized on the credential's slot.
    pub async fn discover(&self, backend: &dyn GenerationBackend) -> Vec<String> {
        let slot = self.slot(backend.credential_id()).await;
        let mut entry = slot.lock().await;
        if let Some(models) = entry.as_ref() {
            return models.clone();
        }

        let span = crate::model_discovery_span!(backend.name());
        let outcome = backend.list_models().instrument(span).await;
        let models = settle(backend.name(), outcome);
        if !models.is_empty() {
            *entry = Some(models.clone());
        }
        models
    }

    /// Blocking variant of [`discover`](Self::discover).
    ///
    /// Must not be called from inside an async runtime.
    pub fn discover_blocking(&self, backend: &dyn GenerationBackend) -> Vec<String> {
        let slot = self.slot_blocking(backend.credential_id());
        let mut entry = slot.blocking_lock();
        if let Some(models) = entry.as_ref() {
            return models.clone();
        }

        let span = crate::model_discovery_span!(backend.name());
        let outcome = span.in_scope(|| backend.list_models_blocking());
        let models = settle(backend.name(), outcome);
        if !models.is_empty() {
            *entry = Some(models.clone());
        }
        models
    }

    async fn slot(&self, key: String) -> Slot {
        self.slots.lock().await.entry(key).or_default().clone()
    }

    fn slot_blocking(&self, key: String) -> Slot {
        self.slots.blocking_lock().entry(key).or_default().clone()
    }

    /// Ordered candidate models for this backend.
    pub async fn resolve(
        &self,
        backend: &dyn GenerationBackend,
        requested: Option<&str>,
    ) -> Result<Vec<String>> {
        let available = self.discover(backend).await;
        select_candidates(&available, requested)
    }

    /// Blocking variant of [`resolve`](Self::resolve).
    pub fn resolve_blocking(
        &self,
        backend: &dyn GenerationBackend,
        requested: Option<&str>,
    ) -> Result<Vec<String>> {
        let available = self.discover_blocking(backend);
        select_candidates(&available, requested)
    }
}

fn settle(backend: &str, outcome: Result<Vec<String>>) -> Vec<String> {
    match outcome {
        Ok(models) => {
            info!(backend, models = ?models, "discovered generation models");
            models
        }
        Err(e) => {
            warn!(backend, error = %e, "model discovery failed; treating as no models");
            Vec::new()
        }
    }
}

/// Order candidate models.
///
/// A requested model must be in `available`. Without one, the
/// [`PREFERRED_MODELS`] that are available are used in preference order,
/// then every available model in discovery order.
///
/// # Errors
///
/// [`SuggestError::ConfigError`] when the requested model is unavailable or
/// nothing is available at all.
pub fn select_candidates(available: &[String], requested: Option<&str>) -> Result<Vec<String>> {
    if let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) {
        if available.iter().any(|m| m == requested) {
            return Ok(vec![requested.to_owned()]);
        }
        let listed = if available.is_empty() {
            "none".to_owned()
        } else {
            available.join(", ")
        };
        return Err(SuggestError::ConfigError(format!(
            "model `{requested}` is not available for this API key; available models: {listed}"
        )));
    }

    let preferred: Vec<String> = PREFERRED_MODELS
        .iter()
        .filter(|p| available.iter().any(|m| m == *p))
        .map(|p| (*p).to_owned())
        .collect();

    let candidates = if preferred.is_empty() {
        available.to_vec()
    } else {
        preferred
    };

    if candidates.is_empty() {
        return Err(SuggestError::ConfigError(
            "no usable models for this API key".into(),
        ));
    }

    info!(candidates = ?candidates, "resolved candidate models");
    Ok(candidates)
}
