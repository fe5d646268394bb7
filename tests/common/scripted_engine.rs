//! Deterministic engine with a handful of fixed commands
//!
//! | command | result |
//! |---|---|
//! | `echo <text>` | ok, one text block |
//! | `highlight <markup>` | ok, text block with highlights from backtick markup |
//! | `cat` | ok, one data block per input stream |
//! | `blob` | ok, invalid UTF-8 block carrying a byte-range highlight |
//! | `split` | ok, text `é` with a highlight ending mid-character |
//! | `corrupt` | ok, block whose payload is not base64 |
//! | `tz` | ok, comment with the context timezone |
//! | `bad` | fail, comment |
//! | anything else | no_command |

use zuk_bridge::{
    BackendError, CommandResult, Comment, Context, Data, Engine, Highlight, Highlighter, Output,
    RawResult,
};

pub const BLOB: [u8; 4] = [0xff, 0x00, 0xc3, 0xa9];

#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine;

impl ScriptedEngine {
    fn ok(output: Output<String>) -> RawResult {
        CommandResult::Ok {
            outputs: vec![output],
        }
    }
}

impl Engine for ScriptedEngine {
    fn exec(
        &self,
        command: &str,
        context: &Context,
        streams: Vec<Vec<u8>>,
    ) -> Result<RawResult, BackendError> {
        let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
        let result = match name {
            "echo" => Self::ok(
                Output::new()
                    .with_title("echo")
                    .with_block(Data::encoded_text(rest)),
            ),
            "highlight" => {
                let (plain, highlights) = Highlighter::default().highlight(rest);
                Self::ok(
                    Output::new().with_block(Data::encoded_text(plain).with_highlights(highlights)),
                )
            }
            "cat" => {
                let mut output = Output::new().with_title("cat");
                for stream in streams {
                    output = output.with_block(Data::encoded(stream));
                }
                Self::ok(output)
            }
            "blob" => Self::ok(
                Output::new()
                    .with_block(Data::encoded(BLOB).with_highlights([Highlight::value(2..4)])),
            ),
            "split" => Self::ok(
                Output::new()
                    .with_block(Data::encoded_text("é").with_highlights([Highlight::value(0..1)])),
            ),
            "corrupt" => Self::ok(Output::new().with_block(Data::new("***".to_string()))),
            "tz" => Self::ok(Output::new().with_block(Comment::new(
                context.timezone.clone().unwrap_or_else(|| "unknown".to_string()),
            ))),
            "bad" => CommandResult::Fail {
                outputs: vec![Output::new()
                    .with_title("bad")
                    .with_block(Comment::new("invalid argument"))],
            },
            _ => CommandResult::NoCommand,
        };
        Ok(result)
    }

    fn random_suggestions(&self, amount: usize) -> Vec<String> {
        ["echo hello", "highlight `x`", "cat", "tz"]
            .iter()
            .cycle()
            .take(amount)
            .map(|s| s.to_string())
            .collect()
    }

    fn suggestions(&self, command: &str, streams: &[Vec<u8>], amount: usize) -> Vec<String> {
        streams
            .iter()
            .map(|s| format!("{} {}", command, String::from_utf8_lossy(s)))
            .take(amount)
            .collect()
    }
}
