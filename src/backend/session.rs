//! Engine-side state shared by every binding
//!
//! The engine itself is opaque. An [`EngineSession`] owns one engine
//! instance together with the two pieces of mutable state the backend
//! protocol implies: the queue of input streams drained by the next
//! `execute`, and the suggestion context buffer.

use super::traits::BackendError;
use crate::context::Context;
use crate::output::RawResult;
use std::mem;
use tracing::debug;

/// The in-process face of the command engine.
pub trait Engine: Send + Sync {
    /// Interpret and run `command`. Data payloads in the result are base64.
    fn exec(
        &self,
        command: &str,
        context: &Context,
        streams: Vec<Vec<u8>>,
    ) -> Result<RawResult, BackendError>;

    /// `amount` arbitrary example commands.
    fn random_suggestions(&self, amount: usize) -> Vec<String>;

    /// Up to `amount` suggestions for `command`, informed by `streams`.
    fn suggestions(&self, command: &str, streams: &[Vec<u8>], amount: usize) -> Vec<String>;
}

/// One engine instance plus its pending streams and suggestion buffer.
pub struct EngineSession {
    engine: Box<dyn Engine>,
    streams: Vec<Vec<u8>>,
    suggestion_streams: Vec<Vec<u8>>,
}

impl EngineSession {
    pub fn new(engine: Box<dyn Engine>) -> Self {
        Self {
            engine,
            streams: Vec::new(),
            suggestion_streams: Vec::new(),
        }
    }

    pub fn push_stream(&mut self, stream: Vec<u8>) {
        self.streams.push(stream);
    }

    pub fn push_suggestion_stream(&mut self, stream: Vec<u8>) {
        self.suggestion_streams.push(stream);
    }

    pub fn clear_suggestion_stream(&mut self) {
        self.suggestion_streams.clear();
    }

    pub fn pending_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn suggestion_streams(&self) -> &[Vec<u8>] {
        &self.suggestion_streams
    }

    /// Run a command against every stream pushed since the last execute.
    ///
    /// An unparsable context falls back to the empty context.
    pub fn execute(&mut self, command: &str, context: &str) -> Result<String, BackendError> {
        let streams = mem::take(&mut self.streams);
        let context: Context = serde_json::from_str(context).unwrap_or_default();
        debug!(command, streams = streams.len(), "engine exec");
        let result = self.engine.exec(command, &context, streams)?;
        serde_json::to_string(&result).map_err(|e| BackendError::Engine(e.to_string()))
    }

    pub fn random_suggestions(&self, amount: usize) -> Result<String, BackendError> {
        serde_json::to_string(&self.engine.random_suggestions(amount))
            .map_err(|e| BackendError::Engine(e.to_string()))
    }

    pub fn suggestions(&self, command: &str, amount: usize) -> Result<String, BackendError> {
        let suggestions = self
            .engine
            .suggestions(command, &self.suggestion_streams, amount);
        serde_json::to_string(&suggestions).map_err(|e| BackendError::Engine(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::{CommandResult, Data, Output};
    use std::sync::{Arc, Mutex};

    /// Records what each exec saw.
    struct RecordingEngine {
        seen: Arc<Mutex<Vec<(String, Context, usize)>>>,
    }

    impl Engine for RecordingEngine {
        fn exec(
            &self,
            command: &str,
            context: &Context,
            streams: Vec<Vec<u8>>,
        ) -> Result<RawResult, BackendError> {
            self.seen
                .lock()
                .unwrap()
                .push((command.to_string(), context.clone(), streams.len()));
            Ok(CommandResult::Ok {
                outputs: vec![Output::new().with_block(Data::encoded_text(command))],
            })
        }

        fn random_suggestions(&self, amount: usize) -> Vec<String> {
            (0..amount).map(|i| format!("example {}", i)).collect()
        }

        fn suggestions(&self, command: &str, streams: &[Vec<u8>], amount: usize) -> Vec<String> {
            streams
                .iter()
                .map(|s| format!("{} {}", command, String::from_utf8_lossy(s)))
                .take(amount)
                .collect()
        }
    }

    fn session() -> (EngineSession, Arc<Mutex<Vec<(String, Context, usize)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let engine = RecordingEngine { seen: seen.clone() };
        (EngineSession::new(Box::new(engine)), seen)
    }

    #[test]
    fn execute_drains_pushed_streams() {
        let (mut session, seen) = session();
        session.push_stream(b"one".to_vec());
        session.push_stream(b"two".to_vec());
        assert_eq!(session.pending_streams(), 2);

        session.execute("first", "{}").unwrap();
        session.execute("second", "{}").unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].2, 2);
        assert_eq!(seen[1].2, 0);
        assert_eq!(session.pending_streams(), 0);
    }

    #[test]
    fn execute_parses_context_and_tolerates_garbage() {
        let (mut session, seen) = session();
        session.execute("a", r#"{"timezone":"UTC"}"#).unwrap();
        session.execute("b", "not json").unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].1.timezone.as_deref(), Some("UTC"));
        assert_eq!(seen[1].1, Context::default());
    }

    #[test]
    fn execute_returns_serialized_envelope() {
        let (mut session, _) = session();
        let envelope = session.execute("hi", "{}").unwrap();
        let parsed: RawResult = serde_json::from_str(&envelope).unwrap();
        assert!(parsed.is_ok());
    }

    #[test]
    fn suggestion_buffer_persists_until_cleared() {
        let (mut session, _) = session();
        session.push_suggestion_stream(b"A".to_vec());
        session.push_suggestion_stream(b"B".to_vec());

        assert_eq!(session.suggestions("x", 5).unwrap(), r#"["x A","x B"]"#);
        assert_eq!(session.suggestions("y", 1).unwrap(), r#"["y A"]"#);

        session.clear_suggestion_stream();
        assert_eq!(session.suggestions("x", 5).unwrap(), "[]");
    }

    #[test]
    fn random_suggestions_are_serialized() {
        let (session, _) = session();
        assert_eq!(
            session.random_suggestions(2).unwrap(),
            r#"["example 0","example 1"]"#
        );
    }
}
