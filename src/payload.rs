//! Suggestion payload model and the strict parser for model output.
//!
//! The generation backend returns free text that should contain one JSON
//! object shaped like [`SuggestionPayload`]. [`parse_payload`] accepts the
//! usual wrapping noise (Markdown fences, leading prose) but fails closed on
//! anything that does not deserialize into the schema.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SuggestError};

/// Characters of raw model output included in parse-error messages.
const PARSE_PREVIEW_CHARS: usize = 200;

/// A node in the next-word suggestion tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordBranch {
    /// Candidate word the user might speak at this turn.
    pub word: String,
    /// Follow-up words if the user selects this word.
    #[serde(rename = "next", default)]
    pub children: Vec<WordBranch>,
}

impl WordBranch {
    /// A branch with no follow-ups.
    pub fn leaf(word: impl Into<String>) -> Self {
        Self {
            word: word.into(),
            children: Vec::new(),
        }
    }

    /// A branch with the given follow-ups.
    pub fn new(word: impl Into<String>, children: Vec<WordBranch>) -> Self {
        Self {
            word: word.into(),
            children,
        }
    }

    /// Depth of the subtree rooted here (a leaf has depth 1).
    pub fn depth(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(WordBranch::depth)
            .max()
            .unwrap_or(0)
    }
}

/// A complete reply tagged with a tone label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyledSentence {
    /// Tone label. Expected values: smart, funny, casual.
    pub style: String,
    /// Full sentence the user could speak.
    pub text: String,
}

impl StyledSentence {
    /// Create a styled sentence.
    pub fn new(style: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            style: style.into(),
            text: text.into(),
        }
    }
}

/// Unsanitized result returned by the generation backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestionPayload {
    /// Nested tree of candidate words.
    pub suggestions: Vec<WordBranch>,
    /// Sentence alternatives labelled by style.
    pub sentences: Vec<StyledSentence>,
}

/// JSON Schema describing [`SuggestionPayload`] as sent to the model.
pub fn payload_schema() -> serde_json::Value {
    serde_json::json!({
        "$defs": {
            "SuggestionBranch": {
                "description": "Single node in the nested suggestion tree.",
                "properties": {
                    "word": {
                        "description": "A candidate word the user might speak at this turn.",
                        "type": "string"
                    },
                    "next": {
                        "description": "Possible follow-up words if the user selects this word.",
                        "items": { "$ref": "#/$defs/SuggestionBranch" },
                        "type": "array"
                    }
                },
                "required": ["word"],
                "type": "object"
            },
            "SentenceSuggestion": {
                "description": "Full-sentence recommendation with a tone label.",
                "properties": {
                    "style": {
                        "description": "Tone label for the sentence. Expected values: smart, funny, casual.",
                        "type": "string"
                    },
                    "text": {
                        "description": "Full-sentence response the user could speak.",
                        "minLength": 1,
                        "type": "string"
                    }
                },
                "required": ["style", "text"],
                "type": "object"
            }
        },
        "properties": {
            "suggestions": {
                "description": "Nested tree of candidate words with follow-up options for the next 3-4 turns.",
                "items": { "$ref": "#/$defs/SuggestionBranch" },
                "type": "array"
            },
            "sentences": {
                "description": "Three complete sentence suggestions labelled smart, funny, and casual.",
                "items": { "$ref": "#/$defs/SentenceSuggestion" },
                "type": "array"
            }
        },
        "required": ["suggestions", "sentences"],
        "type": "object"
    })
}

/// Schema-format instructions embedded in the system prompt.
pub fn format_instructions() -> String {
    format!(
        "The output should be formatted as a JSON instance that conforms to the JSON schema below.\n\n\
         As an example, for the schema {{\"properties\": {{\"foo\": {{\"title\": \"Foo\", \"description\": \"a list of strings\", \"type\": \"array\", \"items\": {{\"type\": \"string\"}}}}}}, \"required\": [\"foo\"]}}\n\
         the object {{\"foo\": [\"bar\", \"baz\"]}} is a well-formatted instance of the schema. \
         The object {{\"properties\": {{\"foo\": [\"bar\", \"baz\"]}}}} is not well-formatted.\n\n\
         Here is the output schema:\n```\n{}\n```",
        payload_schema()
    )
}

/// Parse raw model output into a [`SuggestionPayload`].
///
/// # Errors
///
/// Returns [`SuggestError::UpstreamParse`] when no JSON object can be found,
/// when it does not match the schema, or when a sentence has empty `text`.
pub fn parse_payload(raw: &str) -> Result<SuggestionPayload> {
    let clean = strip_markdown_fences(raw);
    let json = extract_json_object(clean).ok_or_else(|| {
        SuggestError::UpstreamParse(format!(
            "no JSON object in model output: {}",
            preview(raw)
        ))
    })?;

    let payload: SuggestionPayload = serde_json::from_str(json).map_err(|e| {
        SuggestError::UpstreamParse(format!(
            "model output does not match the suggestion schema ({e}): {}",
            preview(json)
        ))
    })?;

    if let Some(index) = payload.sentences.iter().position(|s| s.text.is_empty()) {
        return Err(SuggestError::UpstreamParse(format!(
            "sentence {index} has empty text"
        )));
    }

    Ok(payload)
}

/// Strip Markdown code fences from a response.
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    let clean = clean.strip_suffix("```").unwrap_or(clean);
    clean.trim()
}

/// The span from the first `{` to the last `}`.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start <= end).then(|| &text[start..=end])
}

/// Truncate raw output for error messages (Unicode-safe).
fn preview(s: &str) -> &str {
    match s.char_indices().nth(PARSE_PREVIEW_CHARS) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
