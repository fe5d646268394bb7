//! Backend trait: the capability set every engine binding implements
//!
//! A backend reaches the engine either in the same process or across a
//! process boundary. The facade only ever talks to this trait, so every
//! binding must present the same semantics:
//!
//! - `push_stream` queues an input stream that the next `execute` consumes
//! - `push_suggestion_stream`/`clear_suggestion_stream` mutate the
//!   suggestion context buffer, which persists until cleared
//! - payload-returning operations return serialized text

use crate::context::Context;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from reaching or driving the engine.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Engine not initialized")]
    NotInitialized,
    #[error("Engine initialization failed: {0}")]
    Init(String),
    #[error("Failed to start engine process: {0}")]
    Spawn(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Engine did not respond within {0:?}")]
    Timeout(std::time::Duration),
    #[error("Engine error {code}: {message}")]
    Remote { code: i64, message: String },
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Engine failure: {0}")]
    Engine(String),
    /// An earlier failure closed the connection to the engine.
    #[error("Engine connection lost")]
    ConnectionLost,
}

impl BackendError {
    /// Whether this error leaves the binding without a usable connection.
    ///
    /// Backends with a retriable `lazy_init` reconnect on their next
    /// initialization.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Protocol(_) | Self::ConnectionLost
        )
    }
}

/// The contract engine bindings implement.
///
/// Calls are never issued concurrently against one backend by the facade,
/// but implementations are still `Sync` and use interior mutability.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str;

    /// One-time engine setup. The facade guarantees a single successful call.
    async fn lazy_init(&self) -> Result<(), BackendError>;

    /// Whether a failed `lazy_init` may be attempted again.
    fn retriable_init(&self) -> bool {
        false
    }

    /// Run a command; returns the serialized result envelope.
    async fn execute(&self, command: &str, context: &str) -> Result<String, BackendError>;

    async fn push_stream(&self, stream: Vec<u8>) -> Result<(), BackendError>;

    async fn push_suggestion_stream(&self, stream: Vec<u8>) -> Result<(), BackendError>;

    async fn clear_suggestion_stream(&self) -> Result<(), BackendError>;

    /// Serialized list of `count` arbitrary example commands.
    async fn list_random_suggestions(&self, count: usize) -> Result<String, BackendError>;

    /// Serialized list of suggestions for `command`, ranked with the
    /// current suggestion context buffer.
    async fn compute_suggestions(&self, command: &str, count: usize)
        -> Result<String, BackendError>;

    /// Per-call context descriptor. Pure and synchronous.
    fn context_descriptor(&self) -> Context;
}
