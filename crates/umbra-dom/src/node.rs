//! Node payloads
//!
//! Closed tagged variant for node data: an element or a text run. Behavior
//! dispatch is an explicit match, never a virtual hierarchy.

use std::collections::HashMap;

use umbra_wire::EventOptions;

use crate::events::EventHandler;
use crate::NodeId;

/// Tag names whose elements always need a client-side identifier because
/// their value round-trips with the browser.
const VALUE_TAGS: [&str; 4] = ["input", "textarea", "select", "option"];

/// Node kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Element,
    Text,
}

/// One slot in the document's node store
pub(crate) struct NodeSlot {
    /// Weak back-reference: the child list owns document order
    pub parent: Option<NodeId>,
    pub data: NodeData,
}

/// Node-specific payload
pub(crate) enum NodeData {
    Element(ElementData),
    Text(TextData),
}

impl NodeSlot {
    pub fn element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    pub fn text(&self) -> Option<&TextData> {
        match &self.data {
            NodeData::Text(t) => Some(t),
            NodeData::Element(_) => None,
        }
    }

    pub fn text_mut(&mut self) -> Option<&mut TextData> {
        match &mut self.data {
            NodeData::Text(t) => Some(t),
            NodeData::Element(_) => None,
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.data {
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Text(_) => NodeKind::Text,
        }
    }
}

/// Element payload
pub(crate) struct ElementData {
    /// Lowercase tag name, immutable after creation
    pub tag: String,
    /// XML namespace for namespaced elements (e.g. SVG)
    pub ns: Option<String>,
    /// Attribute name/value pairs in insertion order; `id` lives in its own
    /// field and is spliced in front on serialization
    pub attributes: Vec<(String, String)>,
    /// Element identifier, unique within the owning document
    pub id: Option<String>,
    /// Ordered child list (owns document order)
    pub children: Vec<NodeId>,
    /// Event-name -> handler registration
    pub events: HashMap<String, EventEntry>,
    /// Shadow root hosted by this element, if any
    pub shadow: Option<NodeId>,
    /// Permanent top of a light-DOM composition boundary (head/body)
    pub boundary: bool,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            ns: None,
            attributes: Vec::new(),
            id: None,
            children: Vec::new(),
            events: HashMap::new(),
            shadow: None,
            boundary: false,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        if name == "id" {
            return self.id.as_deref();
        }
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Set an attribute in place, returning whether the stored value changed
    pub fn set_attribute(&mut self, name: &str, value: &str) -> bool {
        for (n, v) in self.attributes.iter_mut() {
            if n == name {
                if v == value {
                    return false;
                }
                *v = value.to_string();
                return true;
            }
        }
        self.attributes.push((name.to_string(), value.to_string()));
        true
    }

    /// Remove an attribute, returning whether it was present
    pub fn remove_attribute(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|(n, _)| n != name);
        self.attributes.len() != before
    }

    /// Whether the element must carry an identifier before it is serialized
    pub fn needs_id(&self) -> bool {
        if self.id.is_some() {
            return false;
        }
        !self.events.is_empty() || VALUE_TAGS.contains(&self.tag.as_str())
    }
}

/// Text payload.
///
/// `data` is the markup-ready form: encoded appends are HTML-escaped on the
/// way in, raw appends are stored verbatim.
pub(crate) struct TextData {
    pub data: String,
    /// Created from raw markup rather than encoded text
    pub raw: bool,
}

/// One event registration on an element
pub(crate) struct EventEntry {
    pub options: EventOptions,
    /// Taken out of the slot for the duration of a dispatch
    pub handler: Option<EventHandler>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_change_detection() {
        let mut el = ElementData::new("DIV");
        assert_eq!(el.tag, "div");

        assert!(el.set_attribute("class", "row"));
        assert!(!el.set_attribute("class", "row"), "unchanged value");
        assert!(el.set_attribute("class", "col"));
        assert_eq!(el.attribute("class"), Some("col"));

        assert!(el.remove_attribute("class"));
        assert!(!el.remove_attribute("class"));
    }

    #[test]
    fn test_needs_id_for_value_tags() {
        let input = ElementData::new("input");
        assert!(input.needs_id());

        let mut div = ElementData::new("div");
        assert!(!div.needs_id());
        div.id = Some("_e1".into());
        assert!(!div.needs_id());
    }
}
