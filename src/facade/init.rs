//! Exactly-once engine initialization
//!
//! The first caller runs `lazy_init`; concurrent callers wait for that
//! attempt and see its outcome. A failure is remembered for good unless the
//! backend says its initialization can be retried. [`InitGuard::reset`]
//! makes the next caller initialize again, which is how a lost connection
//! is reopened.

use super::FacadeError;
use crate::backend::{Backend, BackendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct InitGuard {
    ready: AtomicBool,
    attempt: Mutex<()>,
    fatal: OnceLock<String>,
}

impl InitGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Require a fresh `lazy_init` before the next operation.
    pub fn reset(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub async fn ensure(&self, backend: &dyn Backend) -> Result<(), FacadeError> {
        if self.is_initialized() {
            return Ok(());
        }
        if let Some(message) = self.fatal.get() {
            return Err(FacadeError::Init(message.clone()));
        }

        let _attempt = self.attempt.lock().await;
        // Another caller may have finished while we waited
        if self.is_initialized() {
            return Ok(());
        }
        if let Some(message) = self.fatal.get() {
            return Err(FacadeError::Init(message.clone()));
        }

        debug!(backend = backend.id(), "initializing engine");
        match backend.lazy_init().await {
            Ok(()) => {
                self.ready.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                let message = match e {
                    BackendError::Init(message) => message,
                    other => other.to_string(),
                };
                if backend.retriable_init() {
                    warn!(
                        backend = backend.id(),
                        error = %message,
                        "engine initialization failed; will retry"
                    );
                } else {
                    warn!(
                        backend = backend.id(),
                        error = %message,
                        "engine initialization failed permanently"
                    );
                    let _ = self.fatal.set(message.clone());
                }
                Err(FacadeError::Init(message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn initializes_once() {
        let guard = InitGuard::new();
        let backend = MockBackend::new();
        guard.ensure(&backend).await.unwrap();
        guard.ensure(&backend).await.unwrap();
        assert!(guard.is_initialized());
        assert_eq!(backend.init_count(), 1);
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_attempt() {
        let guard = Arc::new(InitGuard::new());
        let backend = Arc::new(MockBackend::new().with_delay(Duration::from_millis(20)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let backend = backend.clone();
                tokio::spawn(async move { guard.ensure(backend.as_ref()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(backend.init_count(), 1);
    }

    #[tokio::test]
    async fn non_retriable_failure_is_permanent() {
        let guard = InitGuard::new();
        let backend = MockBackend::new().with_init_failures(1, false);
        assert!(matches!(guard.ensure(&backend).await, Err(FacadeError::Init(_))));
        assert!(matches!(guard.ensure(&backend).await, Err(FacadeError::Init(_))));
        assert_eq!(backend.init_count(), 1);
        assert!(!guard.is_initialized());
    }

    #[tokio::test]
    async fn retriable_failure_is_retried() {
        let guard = InitGuard::new();
        let backend = MockBackend::new().with_init_failures(1, true);
        assert!(guard.ensure(&backend).await.is_err());
        guard.ensure(&backend).await.unwrap();
        assert_eq!(backend.init_count(), 2);
    }

    #[tokio::test]
    async fn reset_runs_init_again() {
        let guard = InitGuard::new();
        let backend = MockBackend::new();
        guard.ensure(&backend).await.unwrap();
        guard.reset();
        assert!(!guard.is_initialized());
        guard.ensure(&backend).await.unwrap();
        guard.ensure(&backend).await.unwrap();
        assert_eq!(backend.init_count(), 2);
    }
}
