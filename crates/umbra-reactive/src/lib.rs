//! Umbra reactive primitives
//!
//! Observable sources for the binding graph: a single-value cell and an
//! ordered collection, each notifying subscribers synchronously with a typed
//! change descriptor. The primitives know nothing about documents — reactions
//! are generic over a mutation-context type `C` that the caller threads
//! through every mutating call (the DOM crate instantiates `C = Document`).
//!
//! Re-entrancy is a graph-integrity error: a source that is notified again
//! while its own dispatch is still running reports [`ReactiveError::Cycle`]
//! instead of recursing.

mod list;
mod subscription;
mod value;

pub use list::{ListChange, ObservableList};
pub use subscription::Subscription;
pub use value::Value;

/// Errors raised by the reactive graph
#[derive(Debug, thiserror::Error)]
pub enum ReactiveError {
    /// A reaction synchronously re-triggered the source it was reacting to
    #[error("reactive cycle: source notified again during its own dispatch")]
    Cycle,
    /// A collection operation addressed a position outside the collection
    #[error("index {index} out of bounds for collection of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
}

/// Reaction signature shared by all sources.
///
/// Reactions run synchronously on the thread that mutated the source and
/// receive the caller's mutation context; returning an error aborts the
/// dispatch and surfaces to the caller that triggered the change.
pub type Reaction<C, E> = Box<dyn FnMut(&mut C, &E) -> Result<(), ReactiveError> + Send>;
