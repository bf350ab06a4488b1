//! Normalization of untrusted model output.
//!
//! Both passes are pure. Running either one over its own output returns the
//! input unchanged.

use std::collections::HashSet;

use crate::payload::{StyledSentence, WordBranch};

/// Maximum tree depth kept (roots are depth 1).
pub const MAX_DEPTH: usize = 4;

/// Maximum number of sentences kept.
pub const MAX_SENTENCES: usize = 3;

/// Style assigned to sentences with a blank style label.
pub const DEFAULT_STYLE: &str = "smart";

/// Styles in presentation order. Anything else sorts after these.
const STYLE_ORDER: [&str; 3] = ["smart", "funny", "casual"];

/// Clean a raw suggestion tree.
///
/// Words are trimmed and blank branches are dropped together with their
/// subtree. Siblings are deduplicated case-insensitively with the first
/// occurrence winning. Nodes at `max_depth` lose their children. At most
/// `limit` roots are kept; dropped duplicates do not use up a slot. Input
/// order is preserved at every level.
///
/// ```rust
/// use murmur::payload::WordBranch;
/// use murmur::sanitize::{MAX_DEPTH, sanitize_tree};
///
/// let raw = vec![WordBranch::leaf("Yes"), WordBranch::leaf(" yes "), WordBranch::leaf("possibly")];
/// let clean = sanitize_tree(&raw, 3, MAX_DEPTH);
/// let words: Vec<_> = clean.iter().map(|b| b.word.as_str()).collect();
/// assert_eq!(words, ["Yes", "possibly"]);
/// ```
pub fn sanitize_tree(raw_roots: &[WordBranch], limit: usize, max_depth: usize) -> Vec<WordBranch> {
    let mut roots = Vec::new();
    let mut seen = HashSet::new();

    for raw in raw_roots {
        if roots.len() >= limit {
            break;
        }
        let Some(branch) = sanitize_branch(raw, 1, max_depth) else {
            continue;
        };
        if seen.insert(branch.word.to_lowercase()) {
            roots.push(branch);
        }
    }

    roots
}

fn sanitize_branch(raw: &WordBranch, depth: usize, max_depth: usize) -> Option<WordBranch> {
    let word = raw.word.trim();
    if word.is_empty() {
        return None;
    }

    let mut children = Vec::new();
    if depth < max_depth {
        let mut seen = HashSet::new();
        for child in &raw.children {
            let Some(child) = sanitize_branch(child, depth + 1, max_depth) else {
                continue;
            };
            if seen.insert(child.word.to_lowercase()) {
                children.push(child);
            }
        }
    }

    Some(WordBranch::new(word, children))
}

/// Clean the sentence list.
///
/// Styles are lowercased and trimmed (blank becomes [`DEFAULT_STYLE`]), texts
/// are trimmed and blank ones skipped. The first sentence per style wins and
/// at most [`MAX_SENTENCES`] are kept in arrival order; the kept entries are
/// then stably sorted smart, funny, casual, everything else.
pub fn sanitize_sentences(raw: &[StyledSentence]) -> Vec<StyledSentence> {
    let mut kept: Vec<StyledSentence> = Vec::new();
    let mut seen_styles = HashSet::new();

    for sentence in raw {
        let text = sentence.text.trim();
        if text.is_empty() {
            continue;
        }
        let style = match sentence.style.trim().to_lowercase() {
            s if s.is_empty() => DEFAULT_STYLE.to_owned(),
            s => s,
        };
        if !seen_styles.insert(style.clone()) {
            continue;
        }
        kept.push(StyledSentence::new(style, text));
        if kept.len() >= MAX_SENTENCES {
            break;
        }
    }

    kept.sort_by_key(|s| style_rank(&s.style));
    kept
}

fn style_rank(style: &str) -> usize {
    STYLE_ORDER
        .iter()
        .position(|known| *known == style)
        .unwrap_or(STYLE_ORDER.len())
}
