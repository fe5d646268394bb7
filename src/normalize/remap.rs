//! Byte-offset to character-offset highlight remapping
//!
//! Highlights arrive as byte ranges over the decoded payload. Once the
//! payload is known to be valid UTF-8 they are rewritten as character
//! ranges over the text, in one cumulative pass:
//!
//! `c_start = c + chars(text[b..start])`, `c_end = c_start + chars(text[start..end])`,
//! then `c = c_end`, `b = end`.
//!
//! A character is a Unicode scalar value (a Rust `char`), not a UTF-16 code
//! unit. Characters outside the Basic Multilingual Plane such as `🦊` count
//! once, so consumers indexing UTF-16 strings must convert.
//!
//! Slicing is only done on validated char boundaries. Ranges that cannot be
//! validated are handled by a [`BoundaryPolicy`].

use crate::output::Highlight;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, warn};

/// What to do with a highlight whose byte range does not fit the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Discard any highlight that is misaligned, out of range, inverted or overlapping.
    #[default]
    Drop,
    /// Widen misaligned edges to the enclosing char boundaries and clamp to the
    /// text length. Inverted or overlapping ranges are still discarded.
    Clamp,
}

/// Rewrite byte-offset highlights over `text` as character offsets.
///
/// Offsets count Unicode scalar values (`text.chars()`), not UTF-16 code
/// units.
///
/// Input order is preserved. Highlights must be ascending and non-overlapping;
/// any that are not are dropped regardless of policy.
pub fn remap_highlights(
    text: &str,
    highlights: Vec<Highlight>,
    policy: BoundaryPolicy,
) -> Vec<Highlight> {
    let mut remapped = Vec::with_capacity(highlights.len());
    let mut byte_cursor = 0usize;
    let mut char_cursor = 0usize;

    for highlight in highlights {
        let range = match admit(text, &highlight.range, byte_cursor, policy) {
            Some(range) => range,
            None => continue,
        };

        let char_start = char_cursor + text[byte_cursor..range.start].chars().count();
        let char_end = char_start + text[range.start..range.end].chars().count();

        remapped.push(Highlight {
            kind: highlight.kind,
            range: char_start..char_end,
        });
        char_cursor = char_end;
        byte_cursor = range.end;
    }

    remapped
}

/// Validate (and under `Clamp`, repair) one byte range against the text and
/// the end of the previously accepted highlight.
fn admit(
    text: &str,
    range: &Range<usize>,
    byte_cursor: usize,
    policy: BoundaryPolicy,
) -> Option<Range<usize>> {
    if range.start > range.end {
        warn!(start = range.start, end = range.end, "dropping inverted highlight");
        return None;
    }

    let range = match policy {
        BoundaryPolicy::Drop => {
            if range.end > text.len() {
                warn!(
                    start = range.start,
                    end = range.end,
                    len = text.len(),
                    "dropping highlight past end of payload"
                );
                return None;
            }
            if !text.is_char_boundary(range.start) || !text.is_char_boundary(range.end) {
                warn!(
                    start = range.start,
                    end = range.end,
                    "dropping highlight not on a char boundary"
                );
                return None;
            }
            range.clone()
        }
        BoundaryPolicy::Clamp => {
            let start = floor_char_boundary(text, range.start.min(text.len()));
            let end = ceil_char_boundary(text, range.end.min(text.len()));
            if start != range.start || end != range.end {
                debug!(
                    from_start = range.start,
                    from_end = range.end,
                    start,
                    end,
                    "clamped highlight to char boundaries"
                );
            }
            start..end
        }
    };

    if range.start < byte_cursor {
        warn!(
            start = range.start,
            previous_end = byte_cursor,
            "dropping overlapping or out-of-order highlight"
        );
        return None;
    }

    Some(range)
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(text: &str, mut index: usize) -> usize {
    while !text.is_char_boundary(index) {
        index += 1;
    }
    index
}
