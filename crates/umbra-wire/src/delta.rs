//! Delta records
//!
//! One delta describes one atomic change to the server-held document. The
//! per-document queue preserves mutation order; a flush drains the queue into
//! a `DeltaBatch` serialized as a single JSON array, replayed positionally by
//! the client.

use serde::{Deserialize, Serialize};

use crate::content::ContentNode;
use crate::WireError;

/// One atomic change record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Delta {
    /// Append content as the last child of `parent_id`
    Append { parent_id: String, node: ContentNode },
    /// Insert content immediately before the element `anchor_id`
    InsertBefore { anchor_id: String, node: ContentNode },
    /// Insert content immediately after the element `anchor_id`
    InsertAfter { anchor_id: String, node: ContentNode },
    /// Insert content at a child index of `parent_id`
    InsertAt {
        parent_id: String,
        index: usize,
        node: ContentNode,
    },
    /// Remove the element `node_id`
    Remove { node_id: String },
    /// Remove the child at a given index of `parent_id`
    RemoveAt { parent_id: String, index: usize },
    /// Remove all children of `parent_id`
    ClearChildren { parent_id: String },
    /// Swap two children of `parent_id` by index
    SwapChildren {
        parent_id: String,
        index1: usize,
        index2: usize,
    },
    /// Set (`Some`) or remove (`None`) an attribute on `element_id`
    SetAttribute {
        element_id: String,
        name: String,
        value: Option<String>,
    },
    /// Start listening for a DOM event on `element_id`
    Subscribe {
        element_id: String,
        event_name: String,
        options: EventOptions,
    },
    /// Stop listening for a DOM event on `element_id`
    Unsubscribe { element_id: String, event_name: String },
    /// Move browser focus to `element_id`
    Focus { element_id: String },
}

/// Client-side handling flags carried by a `Subscribe` delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOptions {
    /// Call `preventDefault()` on the browser event
    #[serde(default, skip_serializing_if = "is_false")]
    pub prevent_default: bool,
    /// Call `stopPropagation()` on the browser event
    #[serde(default, skip_serializing_if = "is_false")]
    pub stop_propagation: bool,
    /// Block further input while the round trip is in flight
    #[serde(default, skip_serializing_if = "is_false")]
    pub block_ui: bool,
}

fn is_false(v: &bool) -> bool {
    !*v
}

/// An ordered, drained queue ready for the transport
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaBatch(pub Vec<Delta>);

impl DeltaBatch {
    /// Serialize the batch as a single JSON payload
    pub fn to_json(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Parse a batch back from its JSON payload
    pub fn from_json(payload: &str) -> Result<Self, WireError> {
        Ok(Self(serde_json::from_str(payload)?))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentNode, ContentText};

    #[test]
    fn test_delta_tagging() {
        let delta = Delta::SetAttribute {
            element_id: "_e1".into(),
            name: "class".into(),
            value: Some("active".into()),
        };

        let json = serde_json::to_string(&delta).unwrap();
        assert!(json.contains("\"op\":\"set_attribute\""));
        assert!(json.contains("\"elementId\":\"_e1\""));
    }

    #[test]
    fn test_batch_preserves_order() {
        let batch = DeltaBatch(vec![
            Delta::Append {
                parent_id: "_e1".into(),
                node: ContentNode::Text(ContentText { text: "x".into() }),
            },
            Delta::Remove { node_id: "_e2".into() },
            Delta::Focus { element_id: "_e3".into() },
        ]);

        let json = batch.to_json().unwrap();
        let back = DeltaBatch::from_json(&json).unwrap();
        assert_eq!(back, batch);

        let append = json.find("append").unwrap();
        let remove = json.find("remove").unwrap();
        let focus = json.find("focus").unwrap();
        assert!(append < remove && remove < focus);
    }

    #[test]
    fn test_event_options_default_serializes_empty() {
        let delta = Delta::Subscribe {
            element_id: "_e1".into(),
            event_name: "click".into(),
            options: EventOptions::default(),
        };

        let json = serde_json::to_string(&delta).unwrap();
        assert!(json.contains("\"options\":{}"));
    }
}
