//! Same-process binding
//!
//! The engine is built lazily through a factory the first time the facade
//! initializes the backend, then lives as long as the backend does.

use super::session::{Engine, EngineSession};
use super::traits::{Backend, BackendError};
use crate::context::{Context, ContextProvider, SystemContext};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;

type EngineFactory = dyn Fn() -> Result<Box<dyn Engine>, BackendError> + Send + Sync;

pub struct InProcessBackend {
    id: String,
    factory: Box<EngineFactory>,
    session: OnceCell<Mutex<EngineSession>>,
    context: Arc<dyn ContextProvider>,
    retriable: bool,
}

impl InProcessBackend {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn() -> Result<Box<dyn Engine>, BackendError> + Send + Sync + 'static,
    {
        Self {
            id: "in-process".to_string(),
            factory: Box::new(factory),
            session: OnceCell::new(),
            context: Arc::new(SystemContext::new()),
            retriable: false,
        }
    }

    /// Wrap an already-built engine; initialization cannot fail.
    pub fn with_engine<E>(engine: E) -> Self
    where
        E: Engine + Clone + 'static,
    {
        Self::new(move || Ok(Box::new(engine.clone()) as Box<dyn Engine>))
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = provider;
        self
    }

    /// Allow the facade to retry a failed engine construction.
    pub fn with_retriable_init(mut self, retriable: bool) -> Self {
        self.retriable = retriable;
        self
    }

    fn session(&self) -> Result<&Mutex<EngineSession>, BackendError> {
        self.session.get().ok_or(BackendError::NotInitialized)
    }
}

#[async_trait]
impl Backend for InProcessBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn lazy_init(&self) -> Result<(), BackendError> {
        if self.session.initialized() {
            return Ok(());
        }
        let engine = (self.factory)()?;
        if self.session.set(Mutex::new(EngineSession::new(engine))).is_ok() {
            info!(backend = %self.id, "engine constructed");
        }
        Ok(())
    }

    fn retriable_init(&self) -> bool {
        self.retriable
    }

    async fn execute(&self, command: &str, context: &str) -> Result<String, BackendError> {
        self.session()?.lock().await.execute(command, context)
    }

    async fn push_stream(&self, stream: Vec<u8>) -> Result<(), BackendError> {
        self.session()?.lock().await.push_stream(stream);
        Ok(())
    }

    async fn push_suggestion_stream(&self, stream: Vec<u8>) -> Result<(), BackendError> {
        self.session()?.lock().await.push_suggestion_stream(stream);
        Ok(())
    }

    async fn clear_suggestion_stream(&self) -> Result<(), BackendError> {
        self.session()?.lock().await.clear_suggestion_stream();
        Ok(())
    }

    async fn list_random_suggestions(&self, count: usize) -> Result<String, BackendError> {
        self.session()?.lock().await.random_suggestions(count)
    }

    async fn compute_suggestions(
        &self,
        command: &str,
        count: usize,
    ) -> Result<String, BackendError> {
        self.session()?.lock().await.suggestions(command, count)
    }

    fn context_descriptor(&self) -> Context {
        self.context.context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FixedContext;
    use crate::output::{CommandResult, RawResult};

    #[derive(Clone)]
    struct NullEngine;

    impl Engine for NullEngine {
        fn exec(&self, _: &str, _: &Context, _: Vec<Vec<u8>>) -> Result<RawResult, BackendError> {
            Ok(CommandResult::NoCommand)
        }

        fn random_suggestions(&self, _: usize) -> Vec<String> {
            Vec::new()
        }

        fn suggestions(&self, _: &str, _: &[Vec<u8>], _: usize) -> Vec<String> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn operations_before_init_fail() {
        let backend = InProcessBackend::with_engine(NullEngine);
        let err = backend.execute("x", "{}").await.unwrap_err();
        assert!(matches!(err, BackendError::NotInitialized));
    }

    #[tokio::test]
    async fn execute_after_init_returns_envelope() {
        let backend = InProcessBackend::with_engine(NullEngine);
        backend.lazy_init().await.unwrap();
        assert_eq!(
            backend.execute("x", "{}").await.unwrap(),
            r#"{"type":"no_command"}"#
        );
    }

    #[tokio::test]
    async fn factory_error_propagates() {
        let backend = InProcessBackend::new(|| Err(BackendError::Init("no model".into())));
        let err = backend.lazy_init().await.unwrap_err();
        assert!(matches!(err, BackendError::Init(_)));
        assert!(!backend.retriable_init());
    }

    #[tokio::test]
    async fn context_comes_from_provider() {
        let backend = InProcessBackend::with_engine(NullEngine)
            .with_context_provider(Arc::new(FixedContext(Context::new().with_locale("ja-JP"))));
        assert_eq!(backend.context_descriptor().locale.as_deref(), Some("ja-JP"));
    }
}
