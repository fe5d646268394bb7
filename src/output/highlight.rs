use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A tagged half-open range inside a Data block's payload.
///
/// On the wire the range is in bytes of the decoded payload. After
/// normalization of a text payload it is in characters of the text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub kind: HighlightKind,
    pub range: Range<usize>,
}

impl Highlight {
    pub fn value(range: Range<usize>) -> Self {
        Self {
            kind: HighlightKind::Value,
            range,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightKind {
    Value,
}

/// Turns quoted markup into plain text plus byte-offset highlights.
///
/// `` "`quick` fox" `` becomes `"quick fox"` with a highlight over `0..5`.
/// A backslash escapes the next character.
pub struct Highlighter {
    quotation: char,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::new('`')
    }
}

impl Highlighter {
    pub fn new(quotation: char) -> Self {
        Self { quotation }
    }

    pub fn highlight(&self, s: &str) -> (String, Vec<Highlight>) {
        let mut plain = String::with_capacity(s.len());
        let mut highlights = Vec::new();
        let mut start: Option<usize> = None;
        let mut escaped = false;
        for c in s.chars() {
            if escaped {
                escaped = false;
                plain.push(c);
            } else if c == '\\' {
                escaped = true;
            } else if c == self.quotation {
                match start.take() {
                    Some(start) => highlights.push(Highlight::value(start..plain.len())),
                    None => start = Some(plain.len()),
                }
            } else {
                plain.push(c);
            }
        }
        (plain, highlights)
    }
}
