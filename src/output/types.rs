//! Result, output and block types
//!
//! Every type is generic over the Data-block payload `P`. The wire envelope
//! uses `String` (base64 text); the normalized form uses [`Payload`].
//!
//! [`Payload`]: super::Payload

use super::highlight::Highlight;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Outcome of one `exec` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandResult<P> {
    Ok { outputs: Vec<Output<P>> },
    Fail { outputs: Vec<Output<P>> },
    /// The input did not resolve to any runnable command
    NoCommand,
}

impl<P> CommandResult<P> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn is_fail(&self) -> bool {
        matches!(self, Self::Fail { .. })
    }

    pub fn is_no_command(&self) -> bool {
        matches!(self, Self::NoCommand)
    }

    /// Outputs of an `Ok`/`Fail` result; empty for `NoCommand`.
    pub fn outputs(&self) -> &[Output<P>] {
        match self {
            Self::Ok { outputs } | Self::Fail { outputs } => outputs,
            Self::NoCommand => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    #[default]
    Primary,
    Attachment,
}

/// A titled unit of response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(deserialize = "P: Deserialize<'de>"))]
pub struct Output<P> {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub mode: OutputMode,
    #[serde(default)]
    pub blocks: Vec<Block<P>>,
    #[serde(default)]
    pub metadata: Vec<Metadata>,
}

impl<P> Output<P> {
    pub fn new() -> Self {
        Self {
            title: String::new(),
            mode: OutputMode::Primary,
            blocks: Vec::new(),
            metadata: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_block(mut self, block: impl Into<Block<P>>) -> Self {
        self.blocks.push(block.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata.push(metadata);
        self
    }
}

impl<P> Default for Output<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block<P> {
    Comment(Comment),
    Data(Data<P>),
    Spoiler(Spoiler),
}

impl<P> From<Comment> for Block<P> {
    fn from(block: Comment) -> Self {
        Self::Comment(block)
    }
}

impl<P> From<Data<P>> for Block<P> {
    fn from(block: Data<P>) -> Self {
        Self::Data(block)
    }
}

impl<P> From<Spoiler> for Block<P> {
    fn from(block: Spoiler) -> Self {
        Self::Spoiler(block)
    }
}

fn default_text_media_type() -> String {
    TEXT_PLAIN.to_string()
}

fn default_data_media_type() -> String {
    APPLICATION_OCTET_STREAM.to_string()
}

/// Plain-text commentary. Passed through normalization untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub text: String,
    #[serde(default = "default_text_media_type")]
    pub media_type: String,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            title: None,
            text: text.into(),
            media_type: default_text_media_type(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }
}

/// A payload-carrying block, the only kind that needs normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data<P> {
    pub data: P,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default = "default_data_media_type")]
    pub media_type: String,
    #[serde(default, skip_serializing_if = "DisplaySuggestion::is_default")]
    pub display: DisplaySuggestion,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<Highlight>,
}

impl<P> Data<P> {
    pub fn new(data: P) -> Self {
        Self {
            data,
            title: None,
            file_name: None,
            media_type: default_data_media_type(),
            display: DisplaySuggestion::default(),
            highlights: Vec::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = media_type.into();
        self
    }

    pub fn with_display(mut self, display: DisplaySuggestion) -> Self {
        self.display = display;
        self
    }

    pub fn with_highlights<I>(mut self, highlights: I) -> Self
    where
        I: IntoIterator<Item = Highlight>,
    {
        self.highlights = highlights.into_iter().collect();
        self
    }

    /// Swap the payload, keeping every other field.
    pub fn map_data<Q>(self, f: impl FnOnce(P) -> Q) -> Data<Q> {
        Data {
            data: f(self.data),
            title: self.title,
            file_name: self.file_name,
            media_type: self.media_type,
            display: self.display,
            highlights: self.highlights,
        }
    }
}

impl Data<String> {
    /// Wire block carrying `bytes` as standard base64.
    pub fn encoded(bytes: impl AsRef<[u8]>) -> Self {
        Self::new(BASE64.encode(bytes.as_ref()))
    }

    /// Wire block carrying UTF-8 text, tagged `text/plain`.
    pub fn encoded_text(text: impl AsRef<str>) -> Self {
        Self::encoded(text.as_ref().as_bytes()).with_media_type(TEXT_PLAIN)
    }
}

/// Content revealed on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spoiler {
    pub title: String,
    pub data: String,
}

impl Spoiler {
    pub fn new(title: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Metadata {
    Link { title: String, url: String },
    Docs { url: String },
    Value { value: serde_json::Value },
    Color { color: String },
}

impl Metadata {
    pub fn link(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self::Link {
            title: title.into(),
            url: url.into(),
        }
    }

    pub fn docs(url: impl Into<String>) -> Self {
        Self::Docs { url: url.into() }
    }

    pub fn value(value: impl Into<serde_json::Value>) -> Self {
        Self::Value {
            value: value.into(),
        }
    }

    pub fn color(color: impl Into<String>) -> Self {
        Self::Color {
            color: color.into(),
        }
    }
}

/// Rendering hint for a Data block. Never interpreted by normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySuggestion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<BinaryDisplay>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageDisplay>,
}

impl DisplaySuggestion {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryDisplay {
    Viewer,
    Base64,
    Hex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageDisplay {
    Smooth,
    Pixelated,
}
