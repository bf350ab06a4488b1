//! Prompt construction for the suggestion request.
//!
//! [`render`] is a pure function of [`PromptVars`] plus the fixed instruction
//! text below. The generation policies in the system instruction (root
//! count, branching factor, depth, three styled sentences) are what keep the
//! sanitizer's work bounded in practice.

use serde::Serialize;

use crate::payload::format_instructions;

/// Placeholder sent when the conversation is blank.
pub const EMPTY_CONVERSATION: &str = "(none)";

const SYSTEM_TEMPLATE: &str = "You help a user craft a spoken reply by building both concise next-word suggestions and a few complete sentences. \
You are always given the running conversation with speaker labels plus the partial reply the user has already spoken. \
Respond only with JSON matching this schema:\n{format_instructions}\nGuidelines:\n\
Word suggestions:\n\
- Provide exactly {suggestions_count} root-level word options ordered from most to least likely.\n\
- Every `word` must be a single conversational token in lowercase unless a proper noun or acronym is required.\n\
- For each root word, populate `next` with 2-3 follow-up words and continue expanding each branch until it reaches a depth of at least 3 levels (root + 2) and at most 4.\n\
- Ensure each follow-up word is contextually coherent given the previous selections and the incoming sentence.\n\
- Do not repeat the same word within the same branch. Trim whitespace and omit punctuation or fillers.\n\
Sentence suggestions:\n\
- Produce exactly three complete sentences in the `sentences` array.\n\
- Use the styles `smart`, `funny`, and `casual` once each.\n\
- Each sentence should be natural, succinct (max ~20 words), and aligned with the specified style while staying relevant to the conversation.\n\
- Sentences must not repeat verbatim what appears in the word suggestions.\n";

const HUMAN_TEMPLATE: &str = "Conversation so far (may be empty):\n{conversation}\n\
Incoming sentence from another person: {question}\n\
User's reply so far: {partial_answer}\n\
Produce the JSON with both the nested word suggestions and the three styled full-sentence options.";

/// Per-request variables interpolated into the templates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptVars {
    /// What the other person just said.
    pub question: String,
    /// What the user has spoken of their reply so far.
    pub partial_answer: String,
    /// Running transcript, `role: text` lines.
    pub conversation: String,
    /// Number of root-level words to request.
    pub suggestions_count: u8,
}

impl PromptVars {
    /// Build variables, normalizing the conversation placeholder.
    pub fn new(
        question: impl Into<String>,
        partial_answer: impl Into<String>,
        conversation: &str,
        suggestions_count: u8,
    ) -> Self {
        Self {
            question: question.into(),
            partial_answer: partial_answer.into(),
            conversation: conversation_context(conversation),
            suggestions_count,
        }
    }
}

/// Fully rendered request: one system instruction plus one human turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedPrompt {
    /// System instruction, including schema format instructions.
    pub system: String,
    /// Human turn with the request variables filled in.
    pub user: String,
}

/// Trimmed conversation, or [`EMPTY_CONVERSATION`] when blank.
pub fn conversation_context(conversation: &str) -> String {
    let trimmed = conversation.trim();
    if trimmed.is_empty() {
        EMPTY_CONVERSATION.to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Render the request sent to the generation backend.
pub fn render(vars: &PromptVars) -> RenderedPrompt {
    let count = vars.suggestions_count.to_string();
    let instructions = format_instructions();
    let system = fill(
        SYSTEM_TEMPLATE,
        &[
            ("format_instructions", instructions.as_str()),
            ("suggestions_count", count.as_str()),
        ],
    );

    let conversation = if vars.conversation.trim().is_empty() {
        EMPTY_CONVERSATION
    } else {
        vars.conversation.as_str()
    };
    let user = fill(
        HUMAN_TEMPLATE,
        &[
            ("conversation", conversation),
            ("question", vars.question.as_str()),
            ("partial_answer", vars.partial_answer.as_str()),
        ],
    );

    RenderedPrompt { system, user }
}

/// Single-pass `{name}` substitution. Inserted values are never re-scanned,
/// and unknown placeholders are left as they are.
fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let matched = after.find('}').and_then(|end| {
            let name = &after[..end];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, end))
        });
        match matched {
            Some((value, end)) => {
                out.push_str(value);
                rest = &after[end + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(conversation: &str) -> PromptVars {
        PromptVars::new("Would you like some water?", "Yes", conversation, 3)
    }

    #[test]
    fn blank_conversation_becomes_placeholder() {
        assert_eq!(conversation_context("   \n"), "(none)");
        assert_eq!(conversation_context(""), "(none)");
        assert_eq!(conversation_context("  a: hi "), "a: hi");
    }

    #[test]
    fn render_is_deterministic() {
        assert_eq!(render(&vars("a: hi")), render(&vars("a: hi")));
    }

    #[test]
    fn system_embeds_count_and_schema() {
        let prompt = render(&vars(""));
        assert!(prompt.system.contains("Provide exactly 3 root-level word options"));
        assert!(prompt.system.contains("\"sentences\""));
        assert!(!prompt.system.contains("{suggestions_count}"));
        assert!(!prompt.system.contains("{format_instructions}"));
    }

    #[test]
    fn human_turn_interpolates_all_variables() {
        let prompt = render(&vars("friend: thirsty?"));
        assert!(prompt.user.contains("Conversation so far (may be empty):\nfriend: thirsty?\n"));
        assert!(prompt
            .user
            .contains("Incoming sentence from another person: Would you like some water?"));
        assert!(prompt.user.contains("User's reply so far: Yes\n"));
    }

    #[test]
    fn blank_conversation_renders_placeholder() {
        let mut raw = vars("");
        raw.conversation = "  ".into();
        let prompt = render(&raw);
        assert!(prompt.user.contains("(may be empty):\n(none)\n"));
    }

    #[test]
    fn fill_leaves_unknown_placeholders() {
        assert_eq!(fill("{a} {b} {", &[("a", "1")]), "1 {b} {");
    }

    #[test]
    fn braces_in_user_text_stay_literal() {
        let prompt = render(&PromptVars::new("say {partial_answer}", "ok", "", 2));
        assert!(prompt.user.contains("say {partial_answer}"));
    }
}
