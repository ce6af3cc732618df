//! DOM surgeon
//!
//! Every structural change funnels through here so three things always
//! happen together: the child list is mutated, lifecycle hooks fire on the
//! affected subtree in document order, and the correct delta is enqueued
//! when the mutation is visible to the client.

use umbra_wire::Delta;

use crate::compose;
use crate::error::{DomError, DomResult};
use crate::events;
use crate::node::NodeData;
use crate::{Document, NodeId};

/// Lifecycle callbacks for one element.
///
/// Hooks run after the structural change, with the registry entry taken out
/// for the duration, so a hook may freely mutate the tree.
pub trait NodeHooks: Send {
    /// The element became connected to the document tree
    fn on_connect(&mut self, _doc: &mut Document, _node: NodeId) {}
    /// The element was disconnected from the document tree
    fn on_disconnect(&mut self, _doc: &mut Document, _node: NodeId) {}
    /// The element moved into this document from another one
    fn on_adopted(&mut self, _doc: &mut Document, _node: NodeId) {}
    /// The element (or an ancestor) moved within the same document
    fn on_moved(&mut self, _doc: &mut Document, _node: NodeId) {}
}

/// Where an insertion lands relative to the parent's child list
#[derive(Clone, Copy)]
enum Position {
    Append,
    Before(NodeId),
    After(NodeId),
    At(usize),
}

enum Lifecycle {
    Connect,
    Disconnect,
    Adopted,
    Moved,
}

impl Document {
    /// Append a child node
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        insert(self, parent, Position::Append, child)
    }

    /// Insert `child` right before the child node `before`
    pub fn insert_child_before(
        &mut self,
        parent: NodeId,
        before: NodeId,
        child: NodeId,
    ) -> DomResult<()> {
        insert(self, parent, Position::Before(before), child)
    }

    /// Insert `child` right after the child node `after`
    pub fn insert_child_after(
        &mut self,
        parent: NodeId,
        after: NodeId,
        child: NodeId,
    ) -> DomResult<()> {
        insert(self, parent, Position::After(after), child)
    }

    /// Insert `child` at a child-list index
    pub fn insert_child_at(&mut self, parent: NodeId, index: usize, child: NodeId) -> DomResult<()> {
        insert(self, parent, Position::At(index), child)
    }

    /// Remove a direct child
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> DomResult<()> {
        let was_connected = self.is_connected(child);
        detach(self, parent, child, true)?;
        if was_connected {
            notify(self, child, &Lifecycle::Disconnect);
        }
        Ok(())
    }

    /// Remove the child at the given index, returning it (still alive,
    /// detached)
    pub fn remove_child_at(&mut self, parent: NodeId, index: usize) -> DomResult<NodeId> {
        let child = self
            .child_at(parent, index)
            .ok_or(DomError::IndexOutOfBounds { index, len: self.child_count(parent) })?;
        self.remove_child(parent, child)?;
        Ok(child)
    }

    /// Remove this node from its parent.
    ///
    /// A node without a parent is a programming error, not a no-op.
    pub fn remove(&mut self, node: NodeId) -> DomResult<()> {
        let parent = self.parent(node).ok_or(DomError::NoParent)?;
        self.remove_child(parent, node)
    }

    /// Remove all child nodes
    pub fn clear_children(&mut self, parent: NodeId) -> DomResult<()> {
        clear_children(self, parent)
    }

    /// Swap two child nodes by index
    pub fn swap_children(&mut self, parent: NodeId, index1: usize, index2: usize) -> DomResult<()> {
        if index1 == index2 {
            return Ok(());
        }
        let len = self.child_count(parent);
        for index in [index1, index2] {
            if index >= len {
                return Err(DomError::IndexOutOfBounds { index, len });
            }
        }
        let emit = self.queueing() && compose::is_tracked(self, parent);
        let delta = if emit {
            let flat1 = compose::flat_index(self, parent, index1);
            let flat2 = compose::flat_index(self, parent, index2);
            let singles = [index1, index2].iter().all(|i| {
                self.child_at(parent, *i)
                    .map(|c| compose::light_slotted(self, c).len() == 1)
                    .unwrap_or(false)
            });
            if singles {
                Some(Delta::SwapChildren {
                    parent_id: client_id(self, parent),
                    index1: flat1,
                    index2: flat2,
                })
            } else {
                tracing::warn!(parent = parent.0, "swap of composite children not mirrored");
                None
            }
        } else {
            None
        };
        self.element_mut(parent)?.children.swap(index1, index2);
        if let Some(delta) = delta {
            self.emit(delta);
        }
        Ok(())
    }

    /// Attach a shadow root to `host` and return its container node.
    ///
    /// From then on the host renders as the flattened content of the shadow
    /// tree; `slot` elements inside it pull the host's light children.
    pub fn attach_shadow(&mut self, host: NodeId) -> DomResult<NodeId> {
        let el = self.element(host)?;
        if el.shadow.is_some() {
            return Err(DomError::ShadowExists);
        }
        if el.boundary {
            return Err(DomError::CompositionBoundary);
        }
        if self.is_connected(host) && self.queueing() {
            tracing::warn!(host = host.0, "shadow attached to an element already rendered");
        }
        let root = self.create_element("#shadow-root");
        self.slot_mut(root)?.parent = Some(host);
        self.element_mut(host)?.shadow = Some(root);
        Ok(root)
    }

    /// Register lifecycle hooks for an element, replacing any previous ones
    pub fn set_hooks(&mut self, node: NodeId, hooks: Box<dyn NodeHooks>) {
        self.hooks.insert(node, hooks);
    }

    /// Move a detached subtree out of `source` into this document.
    ///
    /// Handles are re-minted in this document's store, identifiers are
    /// re-registered (conflicting ones are dropped), bindings are cancelled
    /// on the way over, and the subtree receives the adopted notification —
    /// distinct from a move within one document. The returned handle is
    /// detached; attach it with a normal insertion.
    pub fn adopt(&mut self, source: &mut Document, node: NodeId) -> DomResult<NodeId> {
        if source.parent(node).is_some() {
            // Detach-then-attach: leaving the old tree emits its removal
            // delta and disconnect notifications over there.
            source.remove(node)?;
        }
        let imported = import(self, source, node)?;
        notify(self, imported, &Lifecycle::Adopted);
        Ok(imported)
    }
}

/// Shared insertion path for append/before/after/at
fn insert(doc: &mut Document, parent: NodeId, position: Position, child: NodeId) -> DomResult<()> {
    doc.element(parent)?;
    doc.slot(child)?;
    if doc.descends_from(parent, child) {
        return Err(DomError::HierarchyCycle);
    }

    let was_connected = doc.is_connected(child);
    if let Some(old_parent) = doc.parent(child) {
        // Already attached elsewhere: automatic detach, not an error.
        detach(doc, old_parent, child, true)?;
    }

    let len = doc.child_count(parent);
    let index = match position {
        Position::Append => len,
        Position::At(index) => {
            if index > len {
                return Err(DomError::IndexOutOfBounds { index, len });
            }
            index
        }
        Position::Before(anchor) => {
            doc.child_position(parent, anchor).ok_or(DomError::NotAChild)?
        }
        Position::After(anchor) => {
            doc.child_position(parent, anchor).ok_or(DomError::NotAChild)? + 1
        }
    };

    doc.element_mut(parent)?.children.insert(index, child);
    doc.slot_mut(child)?.parent = Some(parent);

    if doc.queueing() && compose::is_tracked(doc, parent) {
        let content = compose::content_node(doc, child)?;
        let delta = match position {
            Position::Append => Delta::Append {
                parent_id: client_id(doc, parent),
                node: content,
            },
            Position::Before(anchor) if addressable(doc, anchor) => Delta::InsertBefore {
                anchor_id: client_id(doc, anchor),
                node: content,
            },
            Position::After(anchor) if addressable(doc, anchor) => Delta::InsertAfter {
                anchor_id: client_id(doc, anchor),
                node: content,
            },
            // Text anchors have no identifier; fall back to the positional
            // form against the parent.
            _ => Delta::InsertAt {
                parent_id: client_id(doc, parent),
                index: compose::flat_index(doc, parent, index),
                node: content,
            },
        };
        doc.emit(delta);
    }

    let now_connected = doc.is_connected(child);
    match (was_connected, now_connected) {
        (false, true) => notify(doc, child, &Lifecycle::Connect),
        (true, true) => notify(doc, child, &Lifecycle::Moved),
        (true, false) => notify(doc, child, &Lifecycle::Disconnect),
        (false, false) => {}
    }
    Ok(())
}

/// Unlink `child` from `parent`, emitting the removal delta when the client
/// can see the region. Lifecycle notification is the caller's decision.
fn detach(doc: &mut Document, parent: NodeId, child: NodeId, emit: bool) -> DomResult<()> {
    let index = doc.child_position(parent, child).ok_or(DomError::NotAChild)?;

    let deltas = if emit && doc.queueing() && compose::is_tracked(doc, parent) {
        let expansion = compose::light_slotted(doc, child);
        match doc.id(child) {
            // A plain element the client can address directly.
            Some(id) if expansion.len() == 1 && expansion[0] == child => {
                vec![Delta::Remove { node_id: id }]
            }
            // Text or composite content: positional removal of every
            // concrete node it occupies.
            _ => {
                let parent_id = client_id(doc, parent);
                let flat = compose::flat_index(doc, parent, index);
                (0..expansion.len())
                    .map(|_| Delta::RemoveAt { parent_id: parent_id.clone(), index: flat })
                    .collect()
            }
        }
    } else {
        Vec::new()
    };

    self_remove(doc, parent, child, index)?;
    for delta in deltas {
        doc.emit(delta);
    }
    Ok(())
}

fn self_remove(doc: &mut Document, parent: NodeId, child: NodeId, index: usize) -> DomResult<()> {
    doc.element_mut(parent)?.children.remove(index);
    doc.slot_mut(child)?.parent = None;
    Ok(())
}

pub(crate) fn clear_children(doc: &mut Document, parent: NodeId) -> DomResult<()> {
    let children = doc.children(parent);
    if children.is_empty() {
        return Ok(());
    }
    let emit = doc.queueing() && compose::is_tracked(doc, parent);
    let connected: Vec<bool> = children.iter().map(|c| doc.is_connected(*c)).collect();

    for child in &children {
        let index = doc.child_position(parent, *child).ok_or(DomError::NotAChild)?;
        self_remove(doc, parent, *child, index)?;
    }
    if emit {
        let parent_id = client_id(doc, parent);
        doc.emit(Delta::ClearChildren { parent_id });
    }
    for (child, was_connected) in children.iter().zip(connected) {
        if was_connected {
            notify(doc, *child, &Lifecycle::Disconnect);
        }
    }
    Ok(())
}

/// Append helper used by the text API
pub(crate) fn append_child(doc: &mut Document, parent: NodeId, child: NodeId) -> DomResult<()> {
    insert(doc, parent, Position::Append, child)
}

/// Whether a delta may reference this node by identifier: a plain element
/// that already carries one (so the client can resolve it). Anything else
/// falls back to the positional delta forms.
fn addressable(doc: &Document, node: NodeId) -> bool {
    doc.id(node).is_some() && compose::is_printable(doc, node)
}

/// Identifier to address `node` with on the wire.
///
/// A node rendered before it had an identifier cannot be resolved by the
/// client; that case is logged and otherwise left to the caller.
fn client_id(doc: &mut Document, node: NodeId) -> String {
    if doc.id(node).is_none() {
        tracing::debug!(node = node.0, "minting identifier for an already-rendered node");
    }
    doc.ensure_id_silent(node)
}

/// Fire one lifecycle notification over the subtree in document order.
///
/// Connecting also re-announces the subtree's event subscriptions: the
/// content delta that carried the nodes does not express them.
fn notify(doc: &mut Document, node: NodeId, lifecycle: &Lifecycle) {
    let mut elements = Vec::new();
    collect_elements(doc, node, &mut elements);
    for element in elements {
        if matches!(lifecycle, Lifecycle::Connect) {
            events::flush_subscriptions(doc, element);
        }
        let Some(mut hooks) = doc.hooks.remove(&element) else {
            continue;
        };
        match lifecycle {
            Lifecycle::Connect => hooks.on_connect(doc, element),
            Lifecycle::Disconnect => hooks.on_disconnect(doc, element),
            Lifecycle::Adopted => hooks.on_adopted(doc, element),
            Lifecycle::Moved => hooks.on_moved(doc, element),
        }
        // A hook may have registered replacement hooks; keep those.
        doc.hooks.entry(element).or_insert(hooks);
    }
}

/// Elements of the subtree in document order, shadow trees included
fn collect_elements(doc: &Document, node: NodeId, out: &mut Vec<NodeId>) {
    let Ok(el) = doc.element(node) else {
        return;
    };
    out.push(node);
    let children = el.children.clone();
    let shadow = el.shadow;
    if let Some(shadow) = shadow {
        collect_elements(doc, shadow, out);
    }
    for child in children {
        collect_elements(doc, child, out);
    }
}

/// Deep-move a subtree from `source` into `target`, re-minting handles
fn import(target: &mut Document, source: &mut Document, node: NodeId) -> DomResult<NodeId> {
    let mut slot = source.take_slot(node)?;
    let hooks = source.hooks.remove(&node);

    // Children and shadow move over separately so their handles can be
    // re-minted one by one.
    let (children, shadow) = match &mut slot.data {
        NodeData::Element(el) => {
            if let Some(id) = el.id.clone() {
                if target.id_taken(&id) {
                    tracing::warn!(id = %id, "identifier collides in adopting document, dropped");
                    el.id = None;
                }
            }
            (std::mem::take(&mut el.children), el.shadow.take())
        }
        NodeData::Text(_) => (Vec::new(), None),
    };

    slot.parent = None;
    let new_node = target.insert_slot(slot);
    if let Some(id) = target.id(new_node) {
        target.register_id(new_node, &id);
    }
    for child in children {
        let new_child = import(target, source, child)?;
        target.slot_mut(new_child)?.parent = Some(new_node);
        target.element_mut(new_node)?.children.push(new_child);
    }
    if let Some(shadow) = shadow {
        let new_shadow = import(target, source, shadow)?;
        target.slot_mut(new_shadow)?.parent = Some(new_node);
        target.element_mut(new_node)?.shadow = Some(new_shadow);
    }

    if let Some(hooks) = hooks {
        target.hooks.insert(new_node, hooks);
    }
    Ok(new_node)
}
