//! Engine facade
//!
//! [`EngineFacade`] is the single entry point applications use. It owns one
//! backend and is the only place that serializes calls into it: every
//! operation, including the push-then-execute sequence inside
//! [`EngineFacade::exec`], runs while holding one call gate, so the backend
//! never sees two calls at once.
//!
//! The first operation of any kind initializes the engine. Concurrent first
//! callers wait on the same initialization attempt.
//!
//! When an operation fails because the backend lost its connection (see
//! [`BackendError::is_connection_loss`]), the facade forgets the suggestion
//! buffer. If the backend's initialization is retriable, the next operation
//! initializes it again.
//!
//! # Cancellation
//!
//! Dropping a facade future part way through is not a cancellation
//! mechanism. The backend may be left holding pushed streams that the next
//! `exec` would consume. Apply timeouts around whole facade lifetimes, not
//! single calls.

mod init;
mod suggestions;

pub use init::InitGuard;
pub use suggestions::SuggestionStreamManager;

use crate::backend::{Backend, BackendError};
use crate::context::Context;
use crate::normalize::{BoundaryPolicy, Normalizer};
use crate::output::{NormalizedResult, RawResult};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Suggestion count used when callers have no preference.
pub const DEFAULT_SUGGESTION_AMOUNT: usize = 5;

/// Errors surfaced by facade operations
///
/// Command-level failures are not errors; they come back as
/// `CommandResult::Fail` or `CommandResult::NoCommand`.
#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("Engine initialization failed: {0}")]
    Init(String),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Unparsable backend payload: {0}")]
    Envelope(serde_json::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type FacadeResult<T> = Result<T, FacadeError>;

pub struct EngineFacade {
    backend: Arc<dyn Backend>,
    normalizer: Normalizer,
    init: InitGuard,
    suggestions: SuggestionStreamManager,
    gate: Mutex<()>,
}

impl EngineFacade {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self {
            backend,
            normalizer: Normalizer::new(),
            init: InitGuard::new(),
            suggestions: SuggestionStreamManager::new(),
            gate: Mutex::new(()),
        }
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Set how misaligned highlight boundaries are handled.
    pub fn with_highlight_policy(mut self, policy: BoundaryPolicy) -> Self {
        self.normalizer = self.normalizer.with_policy(policy);
        self
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn is_initialized(&self) -> bool {
        self.init.is_initialized()
    }

    /// Streams currently held in the Suggestion Context Buffer.
    pub fn active_suggestion_streams(&self) -> usize {
        self.suggestions.active_streams()
    }

    /// Run `command`, first pushing `streams` to the backend in order.
    ///
    /// Unknown or failing commands are normal results. Errors mean the
    /// backend failed or answered with something that is not an envelope.
    pub async fn exec(
        &self,
        command: &str,
        streams: Vec<Vec<u8>>,
    ) -> FacadeResult<NormalizedResult> {
        self.init.ensure(self.backend.as_ref()).await?;
        let context = serde_json::to_string(&self.backend.context_descriptor())?;

        let envelope = {
            let _gate = self.gate.lock().await;
            debug!(command, streams = streams.len(), "exec");
            self.push_then_execute(command, &context, streams)
                .await
                .map_err(|e| self.backend_failure(e))?
        };

        let raw: RawResult = serde_json::from_str(&envelope).map_err(FacadeError::Envelope)?;
        Ok(self.normalizer.normalize(raw))
    }

    /// `amount` arbitrary example commands.
    pub async fn random_suggestions(&self, amount: usize) -> FacadeResult<Vec<String>> {
        self.init.ensure(self.backend.as_ref()).await?;
        let list = {
            let _gate = self.gate.lock().await;
            debug!(amount, "random suggestions");
            self.backend
                .list_random_suggestions(amount)
                .await
                .map_err(|e| self.backend_failure(e))?
        };
        parse_list(&list)
    }

    /// Replace the Suggestion Context Buffer with `streams`.
    ///
    /// Not atomic. If a push fails part way, the error is returned and the
    /// buffer keeps the streams pushed before the failure;
    /// [`active_suggestion_streams`] reports how many. Call again, or
    /// [`clear_suggestion_streams`], before relying on suggestions.
    ///
    /// [`active_suggestion_streams`]: Self::active_suggestion_streams
    /// [`clear_suggestion_streams`]: Self::clear_suggestion_streams
    pub async fn set_suggestion_streams(&self, streams: Vec<Vec<u8>>) -> FacadeResult<()> {
        self.init.ensure(self.backend.as_ref()).await?;
        let _gate = self.gate.lock().await;
        self.suggestions
            .replace(self.backend.as_ref(), streams)
            .await
            .map_err(|e| self.backend_failure(e))?;
        Ok(())
    }

    /// Empty the Suggestion Context Buffer.
    pub async fn clear_suggestion_streams(&self) -> FacadeResult<()> {
        self.init.ensure(self.backend.as_ref()).await?;
        let _gate = self.gate.lock().await;
        self.suggestions
            .clear(self.backend.as_ref())
            .await
            .map_err(|e| self.backend_failure(e))?;
        Ok(())
    }

    /// Up to `amount` suggestions for `command`, informed by the current
    /// Suggestion Context Buffer. The buffer is left as it is.
    pub async fn suggestions(&self, command: &str, amount: usize) -> FacadeResult<Vec<String>> {
        self.init.ensure(self.backend.as_ref()).await?;
        let list = {
            let _gate = self.gate.lock().await;
            debug!(command, amount, "suggestions");
            self.backend
                .compute_suggestions(command, amount)
                .await
                .map_err(|e| self.backend_failure(e))?
        };
        parse_list(&list)
    }

    pub fn context_descriptor(&self) -> Context {
        self.backend.context_descriptor()
    }

    async fn push_then_execute(
        &self,
        command: &str,
        context: &str,
        streams: Vec<Vec<u8>>,
    ) -> Result<String, BackendError> {
        for stream in streams {
            self.backend.push_stream(stream).await?;
        }
        self.backend.execute(command, context).await
    }

    /// Must be called while holding the gate.
    fn backend_failure(&self, error: BackendError) -> FacadeError {
        if error.is_connection_loss() {
            self.suggestions.reset();
            if self.backend.retriable_init() {
                warn!(
                    backend = self.backend.id(),
                    error = %error,
                    "engine connection lost; reinitializing on next call"
                );
                self.init.reset();
            }
        }
        FacadeError::Backend(error)
    }
}

fn parse_list(text: &str) -> FacadeResult<Vec<String>> {
    serde_json::from_str(text).map_err(FacadeError::Envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Call, MockBackend};
    use crate::output::{CommandResult, Data, Output, Payload};
    use std::time::Duration;

    fn facade(backend: MockBackend) -> (EngineFacade, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        (EngineFacade::new(backend.clone()), backend)
    }

    #[tokio::test]
    async fn exec_pushes_streams_before_execute() {
        let (facade, backend) = facade(MockBackend::new());
        let result = facade
            .exec("digest", vec![b"one".to_vec(), b"two".to_vec()])
            .await
            .unwrap();
        assert!(result.is_no_command());

        let calls = backend.calls();
        assert_eq!(calls[0], Call::Init);
        assert_eq!(calls[1], Call::PushStream(b"one".to_vec()));
        assert_eq!(calls[2], Call::PushStream(b"two".to_vec()));
        assert!(matches!(&calls[3], Call::Execute { command, .. } if command == "digest"));
    }

    #[tokio::test]
    async fn exec_normalizes_data_blocks() {
        let raw: RawResult = CommandResult::Ok {
            outputs: vec![Output::new().with_block(Data::encoded_text("hello"))],
        };
        let (facade, _) = facade(MockBackend::new().with_result(&raw));
        let result = facade.exec("hi", Vec::new()).await.unwrap();

        match result {
            CommandResult::Ok { outputs } => match &outputs[0].blocks[0] {
                crate::output::Block::Data(data) => {
                    assert_eq!(data.data, Payload::Text("hello".into()))
                }
                other => panic!("expected data block, got {:?}", other),
            },
            other => panic!("expected ok, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn exec_sends_serialized_context() {
        let context = Context::new().with_timezone("Asia/Tokyo");
        let (facade, backend) = facade(MockBackend::new().with_context(context));
        facade.exec("now", Vec::new()).await.unwrap();

        let sent = backend
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Execute { context, .. } => Some(context),
                _ => None,
            })
            .unwrap();
        assert_eq!(sent, r#"{"timezone":"Asia/Tokyo"}"#);
    }

    #[tokio::test]
    async fn unparsable_envelope_is_an_error() {
        let (facade, _) = facade(MockBackend::new().with_envelope("not json"));
        let err = facade.exec("x", Vec::new()).await.unwrap_err();
        assert!(matches!(err, FacadeError::Envelope(_)));
    }

    #[tokio::test]
    async fn suggestions_read_buffer_without_mutating_it() {
        let (facade, backend) = facade(MockBackend::new());
        facade
            .set_suggestion_streams(vec![b"A".to_vec(), b"B".to_vec()])
            .await
            .unwrap();
        assert_eq!(facade.active_suggestion_streams(), 2);

        let first = facade.suggestions("sha", 5).await.unwrap();
        let second = facade.suggestions("sha", 5).await.unwrap();
        assert_eq!(first, vec!["sha A", "sha B"]);
        assert_eq!(first, second);

        let clears = backend
            .calls()
            .iter()
            .filter(|c| matches!(c, Call::ClearSuggestionStream))
            .count();
        assert_eq!(clears, 1);
    }

    #[tokio::test]
    async fn random_suggestions_are_parsed() {
        let (facade, _) = facade(MockBackend::new());
        let list = facade
            .random_suggestions(DEFAULT_SUGGESTION_AMOUNT)
            .await
            .unwrap();
        assert_eq!(list.len(), DEFAULT_SUGGESTION_AMOUNT);
    }

    #[tokio::test]
    async fn init_failure_propagates_to_first_call() {
        let (facade, backend) = facade(MockBackend::new().with_init_failures(1, false));
        assert!(matches!(
            facade.exec("x", Vec::new()).await,
            Err(FacadeError::Init(_))
        ));
        assert!(matches!(
            facade.random_suggestions(1).await,
            Err(FacadeError::Init(_))
        ));
        assert_eq!(backend.init_count(), 1);
        assert!(!facade.is_initialized());
    }

    #[tokio::test]
    async fn lost_connection_reinitializes_retriable_backend() {
        // clear, push A, then execute times out
        let (facade, backend) = facade(
            MockBackend::new()
                .with_retriable_init(true)
                .with_failure_at(3, || BackendError::Timeout(Duration::from_millis(50))),
        );
        facade
            .set_suggestion_streams(vec![b"A".to_vec()])
            .await
            .unwrap();

        let err = facade.exec("a", Vec::new()).await.unwrap_err();
        assert!(matches!(err, FacadeError::Backend(BackendError::Timeout(_))));
        assert!(!facade.is_initialized());
        assert_eq!(facade.active_suggestion_streams(), 0);

        facade.exec("b", Vec::new()).await.unwrap();
        assert!(facade.is_initialized());
        assert_eq!(backend.init_count(), 2);
    }

    #[tokio::test]
    async fn lost_connection_on_fixed_backend_is_not_reinitialized() {
        let (facade, backend) =
            facade(MockBackend::new().with_failure_at(1, || BackendError::ConnectionLost));
        assert!(facade.exec("a", Vec::new()).await.is_err());
        assert!(facade.is_initialized());
        facade.exec("b", Vec::new()).await.unwrap();
        assert_eq!(backend.init_count(), 1);
    }

    #[tokio::test]
    async fn engine_error_keeps_the_connection() {
        let (facade, backend) = facade(
            MockBackend::new()
                .with_retriable_init(true)
                .with_failure_at(1, || BackendError::Engine("panicked".into())),
        );
        assert!(facade.exec("a", Vec::new()).await.is_err());
        assert!(facade.is_initialized());
        facade.exec("b", Vec::new()).await.unwrap();
        assert_eq!(backend.init_count(), 1);
    }

    #[tokio::test]
    async fn partial_suggestion_replace_reports_streams_sent() {
        // clear, push A, push B, then the push of C fails
        let (facade, _) = facade(
            MockBackend::new().with_failure_at(4, || BackendError::Engine("buffer full".into())),
        );
        let err = facade
            .set_suggestion_streams(vec![b"A".to_vec(), b"B".to_vec(), b"C".to_vec()])
            .await
            .unwrap_err();
        assert!(matches!(err, FacadeError::Backend(BackendError::Engine(_))));
        assert_eq!(facade.active_suggestion_streams(), 2);
        assert_eq!(facade.suggestions("sha", 5).await.unwrap(), vec!["sha A", "sha B"]);
    }

    #[tokio::test]
    async fn concurrent_operations_never_overlap() {
        let (facade, backend) = facade(MockBackend::new().with_delay(Duration::from_millis(5)));
        let _ = tokio::join!(
            facade.exec("a", vec![b"1".to_vec(), b"2".to_vec()]),
            facade.set_suggestion_streams(vec![b"x".to_vec()]),
            facade.suggestions("b", 3),
            facade.random_suggestions(2),
            facade.exec("c", vec![b"3".to_vec()]),
        );
        assert!(!backend.overlapped());
        assert_eq!(backend.init_count(), 1);
    }
}
