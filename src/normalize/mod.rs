//! Output normalization
//!
//! Backends return Data payloads as base64 text with byte-offset highlights.
//! Normalization decodes every Data payload and decides text vs. binary:
//!
//! 1. base64-decode the payload; malformed base64 degrades to binary
//! 2. strict UTF-8 decode; on success the payload becomes text and its
//!    highlights are remapped to character offsets
//! 3. on failure the payload stays binary and highlights are left as-is
//!
//! Comment and Spoiler blocks pass through unchanged.

mod remap;

pub use remap::{remap_highlights, BoundaryPolicy};

use crate::output::{Block, CommandResult, Data, NormalizedResult, Output, Payload, RawResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tracing::{debug, warn};

/// Converts raw backend envelopes into caller-ready results.
#[derive(Debug, Clone, Copy, Default)]
pub struct Normalizer {
    policy: BoundaryPolicy,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    pub fn normalize(&self, raw: RawResult) -> NormalizedResult {
        match raw {
            CommandResult::Ok { outputs } => CommandResult::Ok {
                outputs: self.normalize_outputs(outputs),
            },
            CommandResult::Fail { outputs } => CommandResult::Fail {
                outputs: self.normalize_outputs(outputs),
            },
            CommandResult::NoCommand => CommandResult::NoCommand,
        }
    }

    fn normalize_outputs(&self, outputs: Vec<Output<String>>) -> Vec<Output<Payload>> {
        outputs
            .into_iter()
            .map(|output| Output {
                title: output.title,
                mode: output.mode,
                blocks: output
                    .blocks
                    .into_iter()
                    .map(|block| self.normalize_block(block))
                    .collect(),
                metadata: output.metadata,
            })
            .collect()
    }

    fn normalize_block(&self, block: Block<String>) -> Block<Payload> {
        match block {
            Block::Data(data) => Block::Data(self.normalize_data(data)),
            Block::Comment(comment) => Block::Comment(comment),
            Block::Spoiler(spoiler) => Block::Spoiler(spoiler),
        }
    }

    /// Decode one Data block.
    pub fn normalize_data(&self, data: Data<String>) -> Data<Payload> {
        let mut decoded = data.map_data(decode_payload);
        if let Payload::Text(text) = &decoded.data {
            if !decoded.highlights.is_empty() {
                let highlights = std::mem::take(&mut decoded.highlights);
                decoded.highlights = remap_highlights(text, highlights, self.policy);
            }
        }
        decoded
    }
}

/// base64 then strict UTF-8. Never fails: anything that is not valid text
/// comes back as [`Payload::Binary`].
pub fn decode_payload(encoded: String) -> Payload {
    let bytes = match BASE64.decode(encoded.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "payload is not valid base64; keeping encoded bytes as binary");
            return Payload::Binary(encoded.into_bytes());
        }
    };
    match String::from_utf8(bytes) {
        Ok(text) => Payload::Text(text),
        Err(e) => {
            debug!(valid_up_to = e.utf8_error().valid_up_to(), "payload is binary");
            Payload::Binary(e.into_bytes())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{Comment, Highlight, Spoiler};
    use proptest::prelude::*;
    use rand::RngCore;

    fn data_of(result: &NormalizedResult) -> &Data<Payload> {
        match &result.outputs()[0].blocks[0] {
            Block::Data(data) => data,
            other => panic!("expected data block, got {:?}", other),
        }
    }

    fn ok(block: impl Into<Block<String>>) -> RawResult {
        CommandResult::Ok {
            outputs: vec![Output::new().with_title("t").with_block(block)],
        }
    }

    #[test]
    fn text_payload_is_decoded_and_highlights_remapped() {
        let raw = ok(Data::encoded("café,").with_highlights([Highlight::value(2..5)]));
        let result = Normalizer::new().normalize(raw);
        let data = data_of(&result);
        assert_eq!(data.data, Payload::Text("café,".to_string()));
        assert_eq!(data.highlights, vec![Highlight::value(2..4)]);
    }

    #[test]
    fn binary_payload_keeps_bytes_and_byte_highlights() {
        let bytes = vec![0xff, 0xfe, 0x00, 0x41];
        let raw = ok(Data::encoded(&bytes).with_highlights([Highlight::value(1..3)]));
        let result = Normalizer::new().normalize(raw);
        let data = data_of(&result);
        assert_eq!(data.data, Payload::Binary(bytes));
        assert_eq!(data.highlights, vec![Highlight::value(1..3)]);
    }

    #[test]
    fn malformed_base64_degrades_to_binary() {
        let raw = ok(Data::new("not base64!!".to_string()));
        let result = Normalizer::new().normalize(raw);
        assert_eq!(data_of(&result).data, Payload::Binary(b"not base64!!".to_vec()));
    }

    #[test]
    fn fail_results_are_normalized_too() {
        let raw: RawResult = CommandResult::Fail {
            outputs: vec![Output::new().with_block(Data::encoded_text("oops"))],
        };
        let result = Normalizer::new().normalize(raw);
        assert!(result.is_fail());
        assert_eq!(data_of(&result).data.as_text(), Some("oops"));
    }

    #[test]
    fn comments_and_spoilers_pass_through() {
        let raw: RawResult = CommandResult::Ok {
            outputs: vec![Output::new()
                .with_block(Comment::new("note").with_title("c"))
                .with_block(Spoiler::new("password", "hunter2"))],
        };
        let result = Normalizer::new().normalize(raw);
        let blocks = &result.outputs()[0].blocks;
        assert_eq!(blocks[0], Block::Comment(Comment::new("note").with_title("c")));
        assert_eq!(blocks[1], Block::Spoiler(Spoiler::new("password", "hunter2")));
    }

    #[test]
    fn no_command_passes_through() {
        let result = Normalizer::new().normalize(CommandResult::NoCommand);
        assert!(result.is_no_command());
    }

    #[test]
    fn policy_is_applied() {
        let raw = ok(Data::encoded("éa").with_highlights([Highlight::value(1..2)]));
        let dropped = Normalizer::new().normalize(raw.clone());
        assert!(data_of(&dropped).highlights.is_empty());

        let clamped = Normalizer::new().with_policy(BoundaryPolicy::Clamp).normalize(raw);
        assert_eq!(data_of(&clamped).highlights, vec![Highlight::value(0..1)]);
    }

    #[test]
    fn random_bytes_never_become_text() {
        let mut rng = rand::thread_rng();
        for _ in 0..64 {
            let mut bytes = vec![0u8; 256];
            rng.fill_bytes(&mut bytes);
            // Guarantee invalid UTF-8 regardless of what the RNG produced
            bytes[0] = 0xff;
            let payload = decode_payload(BASE64.encode(&bytes));
            assert_eq!(payload, Payload::Binary(bytes));
        }
    }

    proptest! {
        #[test]
        fn base64_round_trip_reproduces_input(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
            let payload = decode_payload(BASE64.encode(&bytes));
            match std::str::from_utf8(&bytes) {
                Ok(text) => prop_assert_eq!(payload, Payload::Text(text.to_string())),
                Err(_) => prop_assert_eq!(payload, Payload::Binary(bytes.clone())),
            }
        }

        #[test]
        fn text_round_trip_reproduces_input(text in "\\PC{0,64}") {
            let payload = decode_payload(BASE64.encode(text.as_bytes()));
            prop_assert_eq!(payload, Payload::Text(text));
        }
    }
}
