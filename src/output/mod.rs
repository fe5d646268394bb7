//! Command result data model
//!
//! Shared by the wire envelope and the normalized result handed to callers.

mod highlight;
mod payload;
mod types;

pub use highlight::{Highlight, HighlightKind, Highlighter};
pub use payload::Payload;
pub use types::{
    BinaryDisplay, Block, CommandResult, Comment, Data, DisplaySuggestion, ImageDisplay,
    Metadata, Output, OutputMode, Spoiler, APPLICATION_OCTET_STREAM, TEXT_PLAIN,
};

/// Envelope as produced by a backend: Data payloads are base64 text.
pub type RawResult = CommandResult<String>;

/// Result after normalization: Data payloads are text or bytes.
pub type NormalizedResult = CommandResult<Payload>;
