//! Light-DOM composition
//!
//! An element either represents its own tag directly or, when it hosts a
//! shadow root, the ordered array of nodes its shadow content flattens to.
//! The flattening rules here are shared by delta generation, the document
//! writer and the surgeon, so server and client always agree on the set of
//! concrete nodes at a given position.
//!
//! Flattening terminates without a depth bound: the surgeon rejects
//! inserting a node into its own subtree, shadow trees hang off their host
//! through the same parent links, and a slot only ever expands to light
//! children of its own host, so no expansion can revisit a node.

use std::collections::HashSet;

use umbra_wire::{ContentAttribute, ContentElement, ContentNode, ContentText};

use crate::node::NodeSlot;
use crate::{Document, DomResult, NodeId};

/// Whether `node` is the shadow root container of its parent
pub(crate) fn is_shadow_root(doc: &Document, node: NodeId) -> bool {
    match doc.parent(node) {
        Some(parent) => doc.element(parent).ok().and_then(|el| el.shadow) == Some(node),
        None => false,
    }
}

/// Host of the shadow tree containing `node`, if any
pub(crate) fn shadow_host(doc: &Document, node: NodeId) -> Option<NodeId> {
    let mut current = node;
    while let Some(parent) = doc.parent(current) {
        if doc.element(parent).ok().and_then(|el| el.shadow) == Some(current) {
            return Some(parent);
        }
        current = parent;
    }
    None
}

/// Whether the node renders its own tag in the flattened output.
///
/// Shadow hosts render as their shadow content, shadow root containers are
/// transparent, and slots inside a shadow tree expand to assigned content.
pub(crate) fn is_printable(doc: &Document, node: NodeId) -> bool {
    let Ok(slot) = doc.slot(node) else {
        return false;
    };
    let Some(el) = slot.element() else {
        return true;
    };
    if el.shadow.is_some() || is_shadow_root(doc, node) {
        return false;
    }
    !(el.tag == "slot" && shadow_host(doc, node).is_some())
}

/// Whether the node is attached under head or body, crossing shadow
/// boundaries the way the flattened output does.
pub(crate) fn is_connected(doc: &Document, node: NodeId) -> bool {
    let mut current = node;
    loop {
        if current == doc.head() || current == doc.body() {
            return true;
        }
        let Some(parent) = doc.parent(current) else {
            return false;
        };
        if let Some(shadow) = doc.element(parent).ok().and_then(|el| el.shadow) {
            // A light child of a composite host only renders through a slot.
            if shadow != current && !is_slot_assigned(doc, parent, current) {
                return false;
            }
        }
        current = parent;
    }
}

/// Whether mutations of this node are reflected on the client: connected and
/// rendering its own tag.
pub(crate) fn is_tracked(doc: &Document, node: NodeId) -> bool {
    is_connected(doc, node) && is_printable(doc, node)
}

/// Whether a light child of `host` is picked up by any slot in its shadow
pub(crate) fn is_slot_assigned(doc: &Document, host: NodeId, child: NodeId) -> bool {
    let Some(shadow) = doc.element(host).ok().and_then(|el| el.shadow) else {
        return false;
    };
    let mut names = HashSet::new();
    collect_slot_names(doc, shadow, &mut names);
    names.contains(&slot_name_of_child(doc, child))
}

fn collect_slot_names(doc: &Document, node: NodeId, names: &mut HashSet<String>) {
    let Ok(el) = doc.element(node) else {
        return;
    };
    if el.tag == "slot" {
        names.insert(el.attribute("name").unwrap_or_default().to_string());
    }
    // Nested hosts consume their own light children; their shadow trees
    // carry their own slots.
    if el.shadow.is_some() {
        return;
    }
    for child in &el.children {
        collect_slot_names(doc, *child, names);
    }
}

/// Slot a light child asks for via its `slot` attribute; text goes unnamed
fn slot_name_of_child(doc: &Document, child: NodeId) -> String {
    doc.slot(child)
        .ok()
        .and_then(NodeSlot::element)
        .and_then(|el| el.attribute("slot"))
        .unwrap_or_default()
        .to_string()
}

/// The ordered list of concrete nodes `node` renders as in its parent's
/// place: itself for plain nodes, the flattened shadow content for hosts,
/// the assigned light children for slots.
pub(crate) fn light_slotted(doc: &Document, node: NodeId) -> Vec<NodeId> {
    let Ok(slot) = doc.slot(node) else {
        return Vec::new();
    };
    let Some(el) = slot.element() else {
        return vec![node];
    };
    if let Some(shadow) = el.shadow {
        return light_children(doc, shadow);
    }
    if el.tag == "slot" {
        if let Some(host) = shadow_host(doc, node) {
            let name = el.attribute("name").unwrap_or_default().to_string();
            let mut out = Vec::new();
            for child in doc.children(host) {
                if slot_name_of_child(doc, child) == name {
                    out.extend(light_slotted(doc, child));
                }
            }
            if out.is_empty() {
                // Fallback content: the slot's own children.
                return light_children(doc, node);
            }
            return out;
        }
    }
    vec![node]
}

/// Flattened child list of an element
pub(crate) fn light_children(doc: &Document, node: NodeId) -> Vec<NodeId> {
    doc.children(node)
        .into_iter()
        .flat_map(|child| light_slotted(doc, child))
        .collect()
}

/// Client-side index of the child at tree index `tree_index`: composite
/// siblings before it occupy as many positions as they flatten to.
pub(crate) fn flat_index(doc: &Document, parent: NodeId, tree_index: usize) -> usize {
    doc.children(parent)
        .iter()
        .take(tree_index)
        .map(|child| light_slotted(doc, *child).len())
        .sum()
}

/// Serialize a node for the wire, assigning pending identifiers first.
///
/// A single-node expansion equal to the node itself yields the plain
/// element form; anything else yields the ordered array form.
pub(crate) fn content_node(doc: &mut Document, node: NodeId) -> DomResult<ContentNode> {
    ensure_ids(doc, node);
    doc.slot(node)?;
    Ok(build_content(doc, node))
}

/// Assign generated identifiers to every element in the subtree that needs
/// one before it is serialized. No deltas: the identifier rides along inside
/// the serialized content.
pub(crate) fn ensure_ids(doc: &mut Document, node: NodeId) {
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        let Ok(el) = doc.element(current) else {
            continue;
        };
        let needs = el.needs_id();
        stack.extend(el.children.iter().copied());
        if let Some(shadow) = el.shadow {
            stack.push(shadow);
        }
        if needs {
            doc.ensure_id_silent(current);
        }
    }
}

fn build_content(doc: &Document, node: NodeId) -> ContentNode {
    let Ok(slot) = doc.slot(node) else {
        return ContentNode::Array(Vec::new());
    };
    if let Some(text) = slot.text() {
        return ContentNode::Text(ContentText { text: text.data.clone() });
    }

    let expansion = light_slotted(doc, node);
    if expansion.len() == 1 && expansion[0] == node {
        let attributes = doc
            .attributes(node)
            .into_iter()
            .map(|(name, value)| ContentAttribute { name, value })
            .collect();
        let ns = slot.element().and_then(|el| el.ns.clone());
        let tag = slot.element().map_or_else(String::new, |el| el.tag.clone());
        let children = light_children(doc, node)
            .into_iter()
            .map(|child| build_content(doc, child))
            .collect();
        return ContentNode::Element(ContentElement { tag, ns, attributes, children });
    }

    ContentNode::Array(expansion.into_iter().map(|n| build_content(doc, n)).collect())
}
