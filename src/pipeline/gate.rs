//! Quality gate: the minimum-length heuristic.
//!
//! Decoy pages ("please enable JavaScript", cookie walls, empty SPA shells)
//! are syntactically valid and often slip past the challenge markers. Their
//! visible text is short, so raw character count is a cheap proxy for "did
//! we get the real content".

use crate::output::{ExtractedDocument, StrategyKind};

/// Why the gate rejected a text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TooShort {
    pub chars: usize,
    pub required: usize,
}

impl std::fmt::Display for TooShort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "extracted {} characters, need at least {}", self.chars, self.required)
    }
}

/// Accept `text` as a document when it has at least `min_chars` characters.
///
/// This is the only constructor of [`ExtractedDocument`] outside tests.
pub fn admit(
    source_url: &str,
    text: String,
    strategy: StrategyKind,
    min_chars: usize,
) -> Result<ExtractedDocument, TooShort> {
    let chars = text.chars().count();
    if chars < min_chars {
        return Err(TooShort {
            chars,
            required: min_chars,
        });
    }
    Ok(ExtractedDocument::new(source_url, text, strategy))
}
