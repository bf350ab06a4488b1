//! HTTP boundary for the suggestion service.
//!
//! ## Endpoints
//!
//! - `GET /health`: liveness probe
//! - `POST /suggest`: next-word tree plus styled sentences
//!
//! The boundary owns rate-limit retries: a retryable
//! [`SuggestError::RateLimited`] is retried with exponential backoff, a zero
//! quota fails fast with `503`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

use crate::backend::GenerationBackend;
use crate::catalog::ModelCatalog;
use crate::config::MurmurConfig;
use crate::error::{Result, SuggestError};
use crate::service::{
    MAX_SUGGESTIONS, MIN_SUGGESTIONS, SuggestionRequest, SuggestionService, SuggestionSet,
};

const QUOTA_EXHAUSTED_DETAIL: &str =
    "Gemini quota is zero for this model. Enable billing or allocate quota.";
const RATE_LIMITED_DETAIL: &str = "Upstream rate limit exceeded. Retry later.";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// `POST /suggest` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestBody {
    /// What the other person just said. Must not be empty.
    pub question: String,
    /// What the user has spoken of their reply so far.
    #[serde(default)]
    pub partial_answer: String,
    /// Conversation context as `role: text` lines.
    #[serde(default)]
    pub conversation: String,
    /// Root suggestion count in `1..=10`; omitted uses the server default.
    #[serde(default)]
    pub suggestions_count: Option<i64>,
}

/// Error body: `{"detail": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Human-readable reason.
    pub detail: String,
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Rate-limit retry settings for `/suggest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
        }
    }

    /// Delay before retry number `retry` (1-based): `initial * 2^(retry-1)`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff.saturating_mul(factor)
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct AppState {
    backend: Arc<dyn GenerationBackend>,
    catalog: ModelCatalog,
    requested_model: Option<String>,
    default_count: usize,
    retry: RetryPolicy,
}

// ---------------------------------------------------------------------------
// SuggestServer
// ---------------------------------------------------------------------------

/// HTTP server hosting the suggestion endpoints.
pub struct SuggestServer {
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl SuggestServer {
    /// Start serving in a background task.
    ///
    /// Binds to `{server.host}:{server.port}` (port `0` picks a free port).
    /// Discovery results are cached in `catalog`; each request builds its
    /// own service on top of it.
    ///
    /// # Errors
    ///
    /// Returns [`SuggestError::ConfigError`] if the listener cannot bind.
    pub async fn start(
        backend: Arc<dyn GenerationBackend>,
        catalog: ModelCatalog,
        config: &MurmurConfig,
    ) -> Result<Self> {
        let state = AppState {
            backend,
            catalog,
            requested_model: config.provider.requested_model().map(str::to_owned),
            default_count: config.suggestions.default_count,
            retry: RetryPolicy::new(
                config.server.max_rate_limit_retries,
                Duration::from_millis(config.server.initial_backoff_ms),
            ),
        };

        let app = Router::new()
            .route("/health", get(handle_health))
            .route("/suggest", post(handle_suggest))
            .with_state(state);

        let bind_addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SuggestError::ConfigError(format!("bind {bind_addr} failed: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| SuggestError::ConfigError(format!("failed to get local addr: {e}")))?;

        info!("suggestion server listening on http://{addr}");

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("suggestion server error: {e}");
            }
        });

        Ok(Self { addr, handle })
    }

    /// Returns the address the server is listening on.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Abort the server task.
    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SuggestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// `GET /health`
async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// `POST /suggest`
async fn handle_suggest(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let request = match decode_body(&body) {
        Ok(request) => request,
        Err(detail) => {
            warn!(request_id = %request_id, %detail, "rejected suggestion request");
            return detail_response(StatusCode::UNPROCESSABLE_ENTITY, detail);
        }
    };

    let count = request.suggestions_count.unwrap_or(state.default_count);
    let span = crate::suggest_request_span!(request_id.as_str(), count);
    async move {
        let started = Instant::now();
        let outcome = suggest_with_retries(&state, &request).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(set) => {
                info!(elapsed_ms, roots = set.suggestions.len(), "suggestions served");
                Json(set).into_response()
            }
            Err(e) => {
                warn!(elapsed_ms, code = e.code(), error = %e, "suggestion request failed");
                error_response(&e)
            }
        }
    }
    .instrument(span)
    .await
}

async fn suggest_with_retries(
    state: &AppState,
    request: &SuggestionRequest,
) -> Result<SuggestionSet> {
    let service = SuggestionService::connect(
        state.backend.clone(),
        &state.catalog,
        state.requested_model.as_deref(),
        state.default_count,
    )
    .await?;

    let mut retries = 0;
    loop {
        match service.predict(request).await {
            Err(e) if e.is_retryable() && retries < state.retry.max_retries => {
                retries += 1;
                let delay = state.retry.backoff(retries);
                warn!(
                    retry = retries,
                    max = state.retry.max_retries,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "upstream rate limited, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            outcome => return outcome,
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Decode a `/suggest` body. A JSON string holding JSON is unwrapped once.
fn decode_body(body: &[u8]) -> std::result::Result<SuggestionRequest, String> {
    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| format!("Body is not valid JSON: {e}"))?;
    let value = match value {
        serde_json::Value::String(inner) => serde_json::from_str(&inner)
            .map_err(|_| "Body is a string but not valid JSON.".to_owned())?,
        other => other,
    };

    let body: SuggestBody =
        serde_json::from_value(value).map_err(|e| format!("Invalid request body: {e}"))?;

    if body.question.trim().is_empty() {
        return Err("question must not be empty".to_owned());
    }
    let suggestions_count = match body.suggestions_count {
        None => None,
        Some(count) => Some(
            usize::try_from(count)
                .ok()
                .filter(|c| (MIN_SUGGESTIONS..=MAX_SUGGESTIONS).contains(c))
                .ok_or_else(|| {
                    format!(
                        "suggestions_count must be between {MIN_SUGGESTIONS} and {MAX_SUGGESTIONS}, got {count}"
                    )
                })?,
        ),
    };

    Ok(SuggestionRequest {
        question: body.question,
        partial_answer: body.partial_answer,
        conversation: body.conversation,
        suggestions_count,
    })
}

fn detail_response(status: StatusCode, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorDetail {
            detail: detail.into(),
        }),
    )
        .into_response()
}

/// Map a pipeline error to its HTTP response.
fn error_response(err: &SuggestError) -> Response {
    match err {
        SuggestError::RateLimited {
            quota_exhausted: true,
            ..
        } => detail_response(StatusCode::SERVICE_UNAVAILABLE, QUOTA_EXHAUSTED_DETAIL),
        SuggestError::RateLimited { retry_after, .. } => {
            let mut response = detail_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_DETAIL);
            if let Some(delay) = retry_after {
                response.headers_mut().insert(
                    header::RETRY_AFTER,
                    HeaderValue::from(delay.as_secs().saturating_add(1)),
                );
            }
            response
        }
        SuggestError::ConfigError(message) => {
            detail_response(StatusCode::INTERNAL_SERVER_ERROR, message.clone())
        }
        SuggestError::InvalidRequest(message) => {
            detail_response(StatusCode::UNPROCESSABLE_ENTITY, message.clone())
        }
        other => detail_response(StatusCode::BAD_GATEWAY, other.message()),
    }
}
