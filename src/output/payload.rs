//! Normalized Data-block payload
//!
//! Text payloads serialize as JSON strings, binary payloads as
//! `{"base64": "..."}`. Both forms are accepted on input.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Strictly valid UTF-8; highlights carry character offsets
    Text(String),
    /// Anything else; highlights, if any, still carry byte offsets
    Binary(Vec<u8>),
}

impl Payload {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Self::Text(_))
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PayloadRepr<'a> {
    Text(std::borrow::Cow<'a, str>),
    Base64 { base64: std::borrow::Cow<'a, str> },
}

impl Serialize for Payload {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Text(text) => PayloadRepr::Text(text.as_str().into()).serialize(serializer),
            Self::Binary(bytes) => PayloadRepr::Base64 {
                base64: BASE64.encode(bytes).into(),
            }
            .serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        match PayloadRepr::deserialize(deserializer)? {
            PayloadRepr::Text(text) => Ok(Self::Text(text.into_owned())),
            PayloadRepr::Base64 { base64 } => BASE64
                .decode(base64.as_bytes())
                .map(Self::Binary)
                .map_err(Error::custom),
        }
    }
}
