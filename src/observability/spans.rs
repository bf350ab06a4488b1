//! Structured tracing spans for observability.
//!
//! Span names are hierarchical and dot-separated:
//!
//! ```text
//! murmur.suggest.request
//!   └─> murmur.chain.candidate
//! murmur.models.discover (parallel to request spans)
//! ```

/// Root span for one `/suggest` request or one `predict` call.
pub const SPAN_SUGGEST_REQUEST: &str = "murmur.suggest.request";

/// Span for one candidate model attempt inside the fallback chain.
pub const SPAN_CHAIN_CANDIDATE: &str = "murmur.chain.candidate";

/// Span for model discovery against the backend.
pub const SPAN_MODEL_DISCOVERY: &str = "murmur.models.discover";

/// Request identifier field (UUID).
pub const FIELD_REQUEST_ID: &str = "request_id";

/// Model identifier field (e.g. "gemini-2.0-flash").
pub const FIELD_MODEL: &str = "model";

/// Backend name field (e.g. "gemini").
pub const FIELD_BACKEND: &str = "backend";

/// 1-indexed position of the candidate in the chain.
pub const FIELD_ATTEMPT: &str = "attempt";

/// Requested number of root suggestions.
pub const FIELD_SUGGESTIONS_COUNT: &str = "suggestions_count";

/// Helper macro for creating request spans.
///
/// ```rust,ignore
/// let span = murmur::suggest_request_span!(request_id, 5);
/// ```
#[macro_export]
macro_rules! suggest_request_span {
    ($request_id:expr, $count:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_SUGGEST_REQUEST,
            { $crate::observability::spans::FIELD_REQUEST_ID } = $request_id,
            { $crate::observability::spans::FIELD_SUGGESTIONS_COUNT } = $count,
        )
    };
}

/// Helper macro for creating candidate spans.
#[macro_export]
macro_rules! chain_candidate_span {
    ($backend:expr, $model:expr, $attempt:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_CHAIN_CANDIDATE,
            { $crate::observability::spans::FIELD_BACKEND } = $backend,
            { $crate::observability::spans::FIELD_MODEL } = $model,
            { $crate::observability::spans::FIELD_ATTEMPT } = $attempt,
        )
    };
}

/// Helper macro for creating discovery spans.
#[macro_export]
macro_rules! model_discovery_span {
    ($backend:expr) => {
        tracing::info_span!(
            $crate::observability::spans::SPAN_MODEL_DISCOVERY,
            { $crate::observability::spans::FIELD_BACKEND } = $backend,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_constants_are_hierarchical() {
        assert!(SPAN_SUGGEST_REQUEST.starts_with("murmur."));
        assert!(SPAN_CHAIN_CANDIDATE.starts_with("murmur."));
        assert!(SPAN_MODEL_DISCOVERY.starts_with("murmur."));
    }

    #[test]
    fn span_names_are_unique() {
        let spans = [
            SPAN_SUGGEST_REQUEST,
            SPAN_CHAIN_CANDIDATE,
            SPAN_MODEL_DISCOVERY,
        ];
        let unique: std::collections::HashSet<_> = spans.iter().collect();
        assert_eq!(spans.len(), unique.len(), "Span names must be unique");
    }

    #[test]
    fn macros_build_spans() {
        let _request = crate::suggest_request_span!("req-1", 3u8);
        let _candidate = crate::chain_candidate_span!("stub", "m1", 1usize);
        let _discovery = crate::model_discovery_span!("stub");
    }
}
