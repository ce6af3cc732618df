//! Content-node descriptions
//!
//! The payload carried by structural deltas and the initial render: either a
//! plain element description, a text run, or an ordered array of content
//! nodes (the flattened light-DOM form of composite content).

use serde::{Deserialize, Serialize};

/// One concrete node as it appears on the wire.
///
/// The three forms are disjoint JSON shapes (object with `tag`, object with
/// `text`, array), so the enum is untagged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContentNode {
    /// A single element with its flattened children
    Element(ContentElement),
    /// A text run (already encoded as markup payload)
    Text(ContentText),
    /// Flattened composite content: an ordered list spliced into the parent
    Array(Vec<ContentNode>),
}

impl ContentNode {
    /// Number of concrete top-level nodes this description splices in
    pub fn node_count(&self) -> usize {
        match self {
            Self::Element(_) | Self::Text(_) => 1,
            Self::Array(nodes) => nodes.iter().map(ContentNode::node_count).sum(),
        }
    }
}

/// Element description: tag, optional namespace, attributes and children
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentElement {
    /// Lowercase tag name
    pub tag: String,
    /// XML namespace, present only for namespaced elements (e.g. SVG)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ns: Option<String>,
    /// Attribute name/value pairs in insertion order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<ContentAttribute>,
    /// Recursively flattened children
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ContentNode>,
}

/// A single attribute on a content element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAttribute {
    pub name: String,
    pub value: String,
}

/// A text node's markup payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentText {
    pub text: String,
}
