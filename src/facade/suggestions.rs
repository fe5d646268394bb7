//! Suggestion Context Buffer lifecycle
//!
//! A replacement is always one `clear` followed by the new streams in order.
//! The facade runs it while holding its call gate, so no other operation can
//! observe a half-replaced buffer.

use crate::backend::{Backend, BackendError};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
pub struct SuggestionStreamManager {
    active: AtomicUsize,
}

impl SuggestionStreamManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams the backend buffer holds, as far as this manager knows.
    pub fn active_streams(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Clear the backend buffer, then push `streams` in order.
    ///
    /// A failed push stops the replacement. The backend then holds only the
    /// streams pushed before it, and [`active_streams`] counts exactly those.
    /// Replace again or clear to get back to a known buffer.
    ///
    /// [`active_streams`]: Self::active_streams
    pub async fn replace(
        &self,
        backend: &dyn Backend,
        streams: Vec<Vec<u8>>,
    ) -> Result<(), BackendError> {
        self.clear(backend).await?;
        let total = streams.len();
        for stream in streams {
            backend.push_suggestion_stream(stream).await?;
            self.active.fetch_add(1, Ordering::SeqCst);
        }
        debug!(backend = backend.id(), streams = total, "suggestion streams replaced");
        Ok(())
    }

    pub async fn clear(&self, backend: &dyn Backend) -> Result<(), BackendError> {
        backend.clear_suggestion_stream().await?;
        self.active.store(0, Ordering::SeqCst);
        Ok(())
    }

    /// Record that the backend buffer is gone, e.g. with its connection.
    pub fn reset(&self) {
        self.active.store(0, Ordering::SeqCst);
    }
}
