//! Subscription handles
//!
//! Cancellation is explicit: dropping a handle leaves the reaction attached,
//! so registries (not scopes) own unbinding.

/// Cancel handle for one registered reaction
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Detach the reaction from its source. Idempotent.
    pub fn cancel(&mut self) {
        if let Some(f) = self.cancel.take() {
            f();
        }
    }

    /// Whether `cancel` has already run
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_none()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
