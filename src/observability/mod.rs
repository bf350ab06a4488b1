//! Observability helpers: span names and secret redaction.
//!
//! Use the span macros ([`suggest_request_span!`](crate::suggest_request_span),
//! [`chain_candidate_span!`](crate::chain_candidate_span),
//! [`model_discovery_span!`](crate::model_discovery_span)) for consistent naming,
//! and [`RedactedString`](redact::RedactedString) for anything that holds a credential.

pub mod redact;
pub mod spans;

pub use redact::{RedactedString, fingerprint, redact_all, redact_google_key, redact_query_key};
pub use spans::{
    FIELD_ATTEMPT, FIELD_BACKEND, FIELD_MODEL, FIELD_REQUEST_ID, FIELD_SUGGESTIONS_COUNT,
    SPAN_CHAIN_CANDIDATE, SPAN_MODEL_DISCOVERY, SPAN_SUGGEST_REQUEST,
};
