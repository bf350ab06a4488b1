//! End-to-end pipeline tests over the scripted backend: blocking and async
//! entry points, fallback, and sanitization bounds.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;

use murmur::backend::{GenerationBackend, ScriptedBackend, ScriptedReply};
use murmur::sanitize::MAX_DEPTH;
use murmur::{ModelCatalog, SuggestError, SuggestionRequest, SuggestionService, WordBranch};

/// Messy output: duplicate words, blank words, an over-deep branch, extra
/// sentences with mixed-case styles.
const MESSY: &str = r#"```json
{
  "suggestions": [
    {"word": " Sure ", "next": [
      {"word": "thing", "next": [{"word": "buddy", "next": [{"word": "pal", "next": [{"word": "mate"}]}]}]},
      {"word": "THING"},
      {"word": "  "}
    ]},
    {"word": "sure"},
    {"word": ""},
    {"word": "Nope"},
    {"word": "maybe"},
    {"word": "later"}
  ],
  "sentences": [
    {"style": "Funny", "text": "Only if it's sparkling."},
    {"style": "", "text": "Yes, thank you."},
    {"style": "funny", "text": "Another joke."},
    {"style": "casual", "text": "Sure."},
    {"style": "poetic", "text": "Water, the mirror of thirst."}
  ]
}
```"#;

fn shared(backend: &Arc<ScriptedBackend>) -> Arc<dyn GenerationBackend> {
    backend.clone()
}

fn request() -> SuggestionRequest {
    SuggestionRequest::new("  Would you like some water?  ")
        .with_partial_answer(" Yes ")
        .with_conversation("friend: hi\nme: hello")
        .with_count(3)
}

fn depth_ok(branches: &[WordBranch]) -> bool {
    branches.iter().all(|b| b.depth() <= MAX_DEPTH)
}

#[tokio::test]
async fn blocking_and_async_outputs_are_identical() {
    let backend = Arc::new(
        ScriptedBackend::new(["gemini-2.0-flash"])
            .with_reply("gemini-2.0-flash", ScriptedReply::text(MESSY)),
    );

    let async_service =
        SuggestionService::connect(shared(&backend), &ModelCatalog::new(), None, 5)
            .await
            .unwrap();
    let async_json = serde_json::to_string(&async_service.predict(&request()).await.unwrap()).unwrap();

    let blocking_backend = shared(&backend);
    let blocking_json = tokio::task::spawn_blocking(move || {
        let service =
            SuggestionService::connect_blocking(blocking_backend, &ModelCatalog::new(), None, 5)
                .unwrap();
        serde_json::to_string(&service.predict_blocking(&request()).unwrap()).unwrap()
    })
    .await
    .unwrap();

    assert_eq!(async_json, blocking_json);
}

#[test]
fn messy_output_is_bounded_and_ordered() {
    let backend = Arc::new(
        ScriptedBackend::new(["gemini-2.0-flash"])
            .with_reply("gemini-2.0-flash", ScriptedReply::text(MESSY)),
    );
    let service =
        SuggestionService::connect_blocking(shared(&backend), &ModelCatalog::new(), None, 5).unwrap();
    let set = service.predict_blocking(&request()).unwrap();

    let roots: Vec<_> = set.suggestions.iter().map(|b| b.word.as_str()).collect();
    assert_eq!(roots, ["Sure", "Nope", "maybe"]);
    assert!(depth_ok(&set.suggestions));

    let sure = &set.suggestions[0];
    assert_eq!(sure.children.len(), 1);
    assert_eq!(sure.children[0].word, "thing");
    let pal = &sure.children[0].children[0].children[0];
    assert_eq!(pal.word, "pal");
    assert!(pal.children.is_empty());

    let styles: Vec<_> = set.sentences.iter().map(|s| s.style.as_str()).collect();
    assert_eq!(styles, ["smart", "funny", "casual"]);
}

#[test]
fn fallback_skips_retired_models() {
    let backend = Arc::new(
        ScriptedBackend::new(["gemini-2.0-flash-exp", "gemini-2.0-flash", "gemini-2.5-pro"])
            .with_reply("gemini-2.0-flash-exp", ScriptedReply::NotFound)
            .with_reply("gemini-2.0-flash", ScriptedReply::NotFound)
            .with_reply("gemini-2.5-pro", ScriptedReply::text(MESSY)),
    );
    let service =
        SuggestionService::connect_blocking(shared(&backend), &ModelCatalog::new(), None, 5).unwrap();
    assert!(service.predict_blocking(&request()).is_ok());
    assert_eq!(
        backend.attempted_models(),
        ["gemini-2.0-flash-exp", "gemini-2.0-flash", "gemini-2.5-pro"]
    );
}

#[tokio::test]
async fn every_candidate_missing_names_all_of_them() {
    let backend = Arc::new(ScriptedBackend::new(["a", "b", "c"]));
    let service = SuggestionService::connect(shared(&backend), &ModelCatalog::new(), None, 5)
        .await
        .unwrap();
    let err = service.predict(&request()).await.unwrap_err();
    assert!(matches!(err, SuggestError::FallbackExhausted { .. }));
    let text = err.to_string();
    assert!(text.contains("a, b, c"), "{text}");
}

#[tokio::test]
async fn discovery_failure_is_a_config_error() {
    let backend = Arc::new(ScriptedBackend::new(["a"]).with_list_failure("network down"));
    let err = SuggestionService::connect(shared(&backend), &ModelCatalog::new(), None, 5)
        .await
        .unwrap_err();
    assert!(matches!(err, SuggestError::ConfigError(_)));
}
