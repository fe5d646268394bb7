//! Scripted backend for tests. Records every call and detects overlap.
//!
//! Suggestion queries answer with the current suggestion buffer (each
//! stream rendered lossily as text, prefixed by the command), so callers can
//! observe exactly which streams the backend holds.

use super::traits::{Backend, BackendError};
use crate::context::Context;
use crate::output::RawResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Init,
    Execute { command: String, context: String },
    PushStream(Vec<u8>),
    PushSuggestionStream(Vec<u8>),
    ClearSuggestionStream,
    ListRandomSuggestions(usize),
    ComputeSuggestions { command: String, count: usize },
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    suggestion_streams: Vec<Vec<u8>>,
}

pub struct MockBackend {
    envelope: String,
    context: Context,
    state: Mutex<MockState>,
    init_failures: AtomicUsize,
    retriable: bool,
    delay: Duration,
    failure: Option<(usize, fn() -> BackendError)>,
    operations: AtomicUsize,
    in_flight: AtomicUsize,
    overlapped: AtomicBool,
}

impl MockBackend {
    /// A backend whose `execute` always answers `no_command`.
    pub fn new() -> Self {
        Self {
            envelope: r#"{"type":"no_command"}"#.to_string(),
            context: Context::default(),
            state: Mutex::new(MockState::default()),
            init_failures: AtomicUsize::new(0),
            retriable: false,
            delay: Duration::ZERO,
            failure: None,
            operations: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            overlapped: AtomicBool::new(false),
        }
    }

    /// Answer every `execute` with this serialized envelope.
    pub fn with_envelope(mut self, envelope: impl Into<String>) -> Self {
        self.envelope = envelope.into();
        self
    }

    /// Answer every `execute` with this result.
    pub fn with_result(self, result: &RawResult) -> Self {
        let envelope = serde_json::to_string(result).unwrap_or_default();
        self.with_envelope(envelope)
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = context;
        self
    }

    /// Fail the first `times` calls to `lazy_init`.
    pub fn with_init_failures(self, times: usize, retriable: bool) -> Self {
        self.init_failures.store(times, Ordering::SeqCst);
        Self { retriable, ..self }
    }

    /// Set what `retriable_init` reports.
    pub fn with_retriable_init(mut self, retriable: bool) -> Self {
        self.retriable = retriable;
        self
    }

    /// Fail the `nth` call after initialization (counting from 1) with
    /// `error()`. The call is still recorded.
    pub fn with_failure_at(mut self, nth: usize, error: fn() -> BackendError) -> Self {
        self.failure = Some((nth, error));
        self
    }

    /// Sleep inside every call, widening any window for overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn init_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Init))
            .count()
    }

    /// True if two calls were ever in flight at once.
    pub fn overlapped(&self) -> bool {
        self.overlapped.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self, call: Call) -> Result<(), BackendError> {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        let counted = call != Call::Init;
        self.lock().calls.push(call);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if counted {
            let nth = self.operations.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some((at, error)) = self.failure {
                if nth == at {
                    self.leave();
                    return Err(error());
                }
            }
        }
        Ok(())
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn id(&self) -> &str {
        "mock"
    }

    async fn lazy_init(&self) -> Result<(), BackendError> {
        self.enter(Call::Init).await?;
        let remaining = self.init_failures.load(Ordering::SeqCst);
        let result = if remaining > 0 {
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            Err(BackendError::Init("mock init failure".to_string()))
        } else {
            Ok(())
        };
        self.leave();
        result
    }

    fn retriable_init(&self) -> bool {
        self.retriable
    }

    async fn execute(&self, command: &str, context: &str) -> Result<String, BackendError> {
        self.enter(Call::Execute {
            command: command.to_string(),
            context: context.to_string(),
        })
        .await?;
        let envelope = self.envelope.clone();
        self.leave();
        Ok(envelope)
    }

    async fn push_stream(&self, stream: Vec<u8>) -> Result<(), BackendError> {
        self.enter(Call::PushStream(stream)).await?;
        self.leave();
        Ok(())
    }

    async fn push_suggestion_stream(&self, stream: Vec<u8>) -> Result<(), BackendError> {
        self.enter(Call::PushSuggestionStream(stream.clone())).await?;
        self.lock().suggestion_streams.push(stream);
        self.leave();
        Ok(())
    }

    async fn clear_suggestion_stream(&self) -> Result<(), BackendError> {
        self.enter(Call::ClearSuggestionStream).await?;
        self.lock().suggestion_streams.clear();
        self.leave();
        Ok(())
    }

    async fn list_random_suggestions(&self, count: usize) -> Result<String, BackendError> {
        self.enter(Call::ListRandomSuggestions(count)).await?;
        let list: Vec<String> = (0..count).map(|i| format!("example {}", i)).collect();
        self.leave();
        serde_json::to_string(&list).map_err(|e| BackendError::Engine(e.to_string()))
    }

    async fn compute_suggestions(
        &self,
        command: &str,
        count: usize,
    ) -> Result<String, BackendError> {
        self.enter(Call::ComputeSuggestions {
            command: command.to_string(),
            count,
        })
        .await?;
        let list: Vec<String> = self
            .lock()
            .suggestion_streams
            .iter()
            .take(count)
            .map(|s| format!("{} {}", command, String::from_utf8_lossy(s)))
            .collect();
        self.leave();
        serde_json::to_string(&list).map_err(|e| BackendError::Engine(e.to_string()))
    }

    fn context_descriptor(&self) -> Context {
        self.context.clone()
    }
}
