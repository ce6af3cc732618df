//! Umbra DOM - the server-held document
//!
//! An in-memory HTML document that mirrors itself to a remote browser. Every
//! mutation flows through one authority per concern: the surgeon for
//! structure, the attribute API for element state, the binding engine for
//! reactive updates. Each mutation applied while the document is live
//! enqueues exactly one wire delta, and flushing the queue yields the deltas
//! in mutation order.

mod bindings;
mod classlist;
mod compose;
mod document;
mod error;
mod escape;
mod events;
mod idmap;
mod node;
mod push;
mod shared;
mod surgeon;
mod writer;

pub use bindings::{
    BindAttributeOptions, BindChildrenOptions, BindFlagOptions, BindInnerTextOptions,
    BindToggleClassOptions, ChildFactory,
};
pub use document::{Document, INITIAL_DELTA_ATTRIBUTE};
pub use error::{DomError, DomResult};
pub use events::{dispatch_event, EventHandler};
pub use node::NodeKind;
pub use push::{ChannelError, PushChannel, PushStatus};
pub use shared::{ServerEventScope, SharedDocument};
pub use surgeon::NodeHooks;
pub use writer::render_page;

// Re-exported so callers need only one import for the common types.
pub use umbra_reactive::{ListChange, ObservableList, ReactiveError, Subscription, Value};
pub use umbra_wire::{
    ContentAttribute, ContentElement, ContentNode, ContentText, Delta, DeltaBatch, EventOptions,
    EventPayload, InboundEvent,
};

/// Node handle into a document's node store.
///
/// Handles are document-scoped: a `NodeId` minted by one [`Document`] means
/// nothing to another. A handle stays valid until the node is explicitly
/// discarded or the document is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub(crate) u32);

/// Observable value whose reactions mutate a [`Document`]
pub type DomValue<T> = Value<T, Document>;

/// Observable list whose reactions mutate a [`Document`]
pub type DomList<T> = ObservableList<T, Document>;
