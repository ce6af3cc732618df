//! Umbra wire protocol
//!
//! The serializable vocabulary shared between the server-held document and
//! the browser runtime: delta records describing incremental DOM changes,
//! content-node descriptions for newly inserted markup, and inbound event
//! messages travelling the other way.

mod content;
mod delta;
mod event;

pub use content::{ContentAttribute, ContentElement, ContentNode, ContentText};
pub use delta::{Delta, DeltaBatch, EventOptions};
pub use event::{EventPayload, InboundEvent};

/// Wire encoding/decoding errors
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Payload could not be encoded or decoded as JSON
    #[error("wire payload error: {0}")]
    Json(#[from] serde_json::Error),
}
