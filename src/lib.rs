//! Murmur: next-word and sentence suggestions for assisted speech.
//!
//! Given what another person just said, the conversation so far, and the
//! part of the reply the user has already spoken, murmur asks a generative
//! model for a branching tree of likely next words plus three complete
//! sentence alternatives, then normalizes that untrusted output into a
//! bounded, deduplicated result.
//!
//! # Architecture
//!
//! - **Payload** ([`payload`]): wire shape of the model's reply and its strict parser
//! - **Prompt** ([`prompt`]): fixed instructions plus per-request variables
//! - **Catalog** ([`catalog`]): per-credential model discovery and candidate ordering
//! - **Chain** ([`chain`]): candidate pipelines tried in order, falling through on "model not found"
//! - **Sanitize** ([`sanitize`]): trim, dedup, depth and count limits, sentence ordering
//! - **Service** ([`service`]): blocking and suspending `predict`
//! - **Server** ([`server`]): axum HTTP boundary with rate-limit retries
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use murmur::backend::{GeminiBackend, GeminiConfig};
//! use murmur::{ModelCatalog, SuggestionRequest, SuggestionService};
//!
//! # async fn example() -> murmur::Result<()> {
//! let backend = Arc::new(GeminiBackend::new(GeminiConfig::new("AIza...")));
//! let service = SuggestionService::connect(backend, ModelCatalog::global(), None, 5).await?;
//! let set = service
//!     .predict(&SuggestionRequest::new("Would you like some water?").with_partial_answer("Yes"))
//!     .await?;
//! println!("{}", serde_json::to_string_pretty(&set).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod catalog;
pub mod chain;
pub mod config;
pub mod error;
pub mod observability;
pub mod payload;
pub mod prompt;
pub mod sanitize;
pub mod server;
pub mod service;

pub use catalog::ModelCatalog;
pub use chain::{CandidatePipeline, SuggestionChain};
pub use config::MurmurConfig;
pub use error::{Result, SuggestError};
pub use payload::{StyledSentence, SuggestionPayload, WordBranch};
pub use server::SuggestServer;
pub use service::{SuggestionRequest, SuggestionService, SuggestionSet};
