//! Shared document handle
//!
//! Each document owns a single mutual-exclusion primitive: all mutation and
//! flush operations go through it, and different documents proceed fully
//! independently. Server-initiated work uses a scope that flushes the delta
//! queue over the push channel on every exit path.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::Document;

/// A document behind its own mutex, shareable across threads
#[derive(Clone)]
pub struct SharedDocument {
    inner: Arc<Mutex<Document>>,
}

impl SharedDocument {
    pub fn new(document: Document) -> Self {
        Self { inner: Arc::new(Mutex::new(document)) }
    }

    fn lock(&self) -> MutexGuard<'_, Document> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the document
    pub fn with<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut self.lock())
    }

    /// Start a server-initiated change scope.
    ///
    /// The scope holds the document's exclusivity; when it drops, pending
    /// deltas are pushed over the live channel (if the coordinator is
    /// enabled), so a batch of related mutations reaches the client as one
    /// coherent sequence.
    pub fn server_event(&self) -> ServerEventScope<'_> {
        ServerEventScope { guard: self.lock() }
    }
}

impl std::fmt::Debug for SharedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedDocument").finish_non_exhaustive()
    }
}

/// RAII scope for a server-initiated change batch
pub struct ServerEventScope<'a> {
    guard: MutexGuard<'a, Document>,
}

impl Deref for ServerEventScope<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        &self.guard
    }
}

impl DerefMut for ServerEventScope<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        &mut self.guard
    }
}

impl Drop for ServerEventScope<'_> {
    fn drop(&mut self) {
        // Drop cannot return an error; a failed push stays queued for the
        // next request and the transport owns any retry policy.
        if let Err(err) = self.guard.flush_to_channel() {
            tracing::warn!(error = %err, "server event flush failed");
        }
    }
}
