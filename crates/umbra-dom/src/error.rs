//! DOM operation errors
//!
//! Programming errors (bad structure, blank names) fail loudly with a
//! variant here; lookups that can legitimately miss return `Option`/`bool`
//! instead and never construct an error.

use umbra_reactive::ReactiveError;

/// Result type for DOM operations
pub type DomResult<T> = Result<T, DomError>;

/// DOM operation errors
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    /// Node handle does not belong to this document or was discarded
    #[error("unknown node handle")]
    UnknownNode,
    /// Operation requires an element but the node is text
    #[error("node is not an element")]
    NotAnElement,
    /// Removing a node that has no parent
    #[error("cannot remove: node has no parent")]
    NoParent,
    /// The given reference node is not a child of the given parent
    #[error("node is not a child of the given parent")]
    NotAChild,
    /// Inserting a node into its own subtree
    #[error("node cannot be inserted into its own subtree")]
    HierarchyCycle,
    /// A child index outside the child list
    #[error("index {index} out of bounds for {len} children")]
    IndexOutOfBounds { index: usize, len: usize },
    /// The element already hosts a shadow root
    #[error("element already hosts a shadow root")]
    ShadowExists,
    /// Head and body are permanent composition boundaries
    #[error("head and body cannot host a shadow root")]
    CompositionBoundary,
    /// Discarding a node that is still attached to a parent
    #[error("cannot discard a node that is still attached")]
    StillAttached,
    /// Focusing an element that is not connected to the document tree
    #[error("cannot focus a disconnected element")]
    FocusDisconnected,
    /// Event registration with a blank event name
    #[error("event name must not be blank")]
    BlankEventName,
    /// Binding registration with a blank attribute or class name
    #[error("attribute or class name must not be blank")]
    BlankAttributeName,
    /// Error raised by the reactive graph (cycle detection)
    #[error(transparent)]
    Reactive(#[from] ReactiveError),
    /// Wire payload could not be serialized
    #[error(transparent)]
    Wire(#[from] umbra_wire::WireError),
    /// Push channel failure while flushing
    #[error(transparent)]
    Channel(#[from] crate::push::ChannelError),
}
