//! The server-held document
//!
//! Owns the node store, head/body, the identity map, the delta queue, the
//! push coordinator and the binding registry. All per-document state lives
//! here; there are no process-wide maps.

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use umbra_wire::{Delta, DeltaBatch};

use crate::bindings::ElementBindings;
use crate::classlist;
use crate::compose;
use crate::error::{DomError, DomResult};
use crate::escape::{escape_text, unescape_text};
use crate::node::{ElementData, NodeData, NodeKind, NodeSlot, TextData};
use crate::push::{PushChannel, PushCoordinator, PushStatus};
use crate::surgeon::{self, NodeHooks};
use crate::{idmap::IdMap, NodeId};

/// Attribute carrying the initial delta payload on the head element
pub const INITIAL_DELTA_ATTRIBUTE: &str = "data-umbra-init";

/// An HTML document mirrored to one browser page view
pub struct Document {
    nodes: Vec<Option<NodeSlot>>,
    free: Vec<u32>,
    head: NodeId,
    body: NodeId,
    idmap: IdMap,
    queue: VecDeque<Delta>,
    id_counter: u64,
    queueing: bool,
    lang: String,
    last_activity: Instant,
    pub(crate) push: PushCoordinator,
    pub(crate) bindings: HashMap<NodeId, ElementBindings>,
    pub(crate) hooks: HashMap<NodeId, Box<dyn NodeHooks>>,
    unload_handlers: Vec<Box<dyn FnMut(&mut Document) + Send>>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create a document with its permanent head and body elements.
    ///
    /// Head and body are the top of their own light-DOM composition boundary
    /// and carry identifiers from the start so deltas can address them.
    pub fn new() -> Self {
        let mut doc = Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: NodeId(0),
            body: NodeId(0),
            idmap: IdMap::default(),
            queue: VecDeque::new(),
            id_counter: 0,
            queueing: false,
            lang: "en".to_string(),
            last_activity: Instant::now(),
            push: PushCoordinator::default(),
            bindings: HashMap::new(),
            hooks: HashMap::new(),
            unload_handlers: Vec::new(),
        };
        doc.head = doc.create_element("head");
        doc.body = doc.create_element("body");
        for root in [doc.head, doc.body] {
            if let Some(el) = doc.nodes[root.0 as usize].as_mut().and_then(NodeSlot::element_mut) {
                el.boundary = true;
            }
            doc.ensure_element_id(root);
        }
        doc
    }

    /// Permanent head element
    pub fn head(&self) -> NodeId {
        self.head
    }

    /// Permanent body element
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Document language, rendered as the `lang` attribute of `<html>`
    pub fn lang(&self) -> &str {
        &self.lang
    }

    pub fn set_lang(&mut self, lang: &str) {
        self.lang = lang.to_string();
    }

    // ---- node store ---------------------------------------------------

    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.insert_slot(NodeSlot { parent: None, data })
    }

    pub(crate) fn insert_slot(&mut self, slot: NodeSlot) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index as usize] = Some(slot);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(slot));
                NodeId(self.nodes.len() as u32 - 1)
            }
        }
    }

    pub(crate) fn id_taken(&self, id: &str) -> bool {
        self.idmap.contains(id)
    }

    pub(crate) fn register_id(&mut self, node: NodeId, id: &str) {
        self.idmap.rename(node, None, Some(id));
    }

    pub(crate) fn slot(&self, node: NodeId) -> DomResult<&NodeSlot> {
        self.nodes
            .get(node.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(DomError::UnknownNode)
    }

    pub(crate) fn slot_mut(&mut self, node: NodeId) -> DomResult<&mut NodeSlot> {
        self.nodes
            .get_mut(node.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(DomError::UnknownNode)
    }

    pub(crate) fn element(&self, node: NodeId) -> DomResult<&ElementData> {
        self.slot(node)?.element().ok_or(DomError::NotAnElement)
    }

    pub(crate) fn element_mut(&mut self, node: NodeId) -> DomResult<&mut ElementData> {
        self.slot_mut(node)?.element_mut().ok_or(DomError::NotAnElement)
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.alloc(NodeData::Element(ElementData::new(tag)))
    }

    /// Create a detached namespaced element (e.g. SVG)
    pub fn create_element_ns(&mut self, ns: &str, tag: &str) -> NodeId {
        let mut el = ElementData::new(tag);
        el.ns = Some(ns.to_string());
        self.alloc(NodeData::Element(el))
    }

    /// Create a detached text node; content is HTML-escaped
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.alloc(NodeData::Text(TextData { data: escape_text(text), raw: false }))
    }

    /// Create a detached text node holding raw markup, stored verbatim
    pub fn create_raw_text(&mut self, markup: &str) -> NodeId {
        self.alloc(NodeData::Text(TextData { data: markup.to_string(), raw: true }))
    }

    /// Free a detached node and its whole subtree.
    ///
    /// Cancels the subtree's bindings and drops identifiers, handlers and
    /// hooks. Fails if the node still has a parent.
    pub fn discard_subtree(&mut self, node: NodeId) -> DomResult<()> {
        if self.slot(node)?.parent.is_some() {
            return Err(DomError::StillAttached);
        }
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(slot) = self.nodes.get_mut(current.0 as usize).and_then(Option::take) else {
                continue;
            };
            if let Some(el) = slot.element() {
                if let Some(id) = &el.id {
                    self.idmap.remove(id);
                }
                stack.extend(el.children.iter().copied());
                if let Some(shadow) = el.shadow {
                    stack.push(shadow);
                }
            }
            if let Some(mut bindings) = self.bindings.remove(&current) {
                bindings.cancel_all();
            }
            self.hooks.remove(&current);
            self.free.push(current.0);
        }
        Ok(())
    }

    // ---- tree queries -------------------------------------------------

    /// Node kind, or `Err` for a stale handle
    pub fn kind(&self, node: NodeId) -> DomResult<NodeKind> {
        Ok(self.slot(node)?.kind())
    }

    /// Lowercase tag name for elements, `None` for text nodes
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.slot(node).ok().and_then(NodeSlot::element).map(|el| el.tag.as_str())
    }

    /// Parent element, if attached
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.slot(node).ok().and_then(|slot| slot.parent)
    }

    pub fn child_count(&self, node: NodeId) -> usize {
        self.slot(node)
            .ok()
            .and_then(NodeSlot::element)
            .map_or(0, |el| el.children.len())
    }

    /// Child at `index`, if any
    pub fn child_at(&self, node: NodeId, index: usize) -> Option<NodeId> {
        self.slot(node)
            .ok()
            .and_then(NodeSlot::element)
            .and_then(|el| el.children.get(index).copied())
    }

    /// All children of an element (empty for text nodes)
    pub fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.slot(node)
            .ok()
            .and_then(NodeSlot::element)
            .map_or_else(Vec::new, |el| el.children.clone())
    }

    /// Index of a direct child, or `None`
    pub fn child_position(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.slot(parent)
            .ok()
            .and_then(NodeSlot::element)
            .and_then(|el| el.children.iter().position(|c| *c == child))
    }

    pub fn contains_child(&self, parent: NodeId, child: NodeId) -> bool {
        self.child_position(parent, child).is_some()
    }

    /// Whether `node` descends from `ancestor` (reflexive)
    pub fn descends_from(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(n) = current {
            if n == ancestor {
                return true;
            }
            current = self.parent(n);
        }
        false
    }

    /// Whether the node is attached under head or body (through any shadow
    /// boundary it renders into)
    pub fn is_connected(&self, node: NodeId) -> bool {
        compose::is_connected(self, node)
    }

    // ---- identifiers --------------------------------------------------

    /// Element identifier, if assigned
    pub fn id(&self, node: NodeId) -> Option<String> {
        self.slot(node).ok().and_then(NodeSlot::element).and_then(|el| el.id.clone())
    }

    /// Look up an element by identifier; misses are soft
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.idmap.get(id)
    }

    /// Set or remove the element's identifier.
    ///
    /// The identity map is renamed, the `id` attribute follows, and when the
    /// element is live on the client a rename delta is emitted against the
    /// old identifier. A no-op when the value is unchanged.
    pub fn set_id(&mut self, node: NodeId, id: Option<&str>) -> DomResult<()> {
        let before = self.element(node)?.id.clone();
        if before.as_deref() == id {
            return Ok(());
        }
        self.idmap.rename(node, before.as_deref(), id);
        let tracked = self.queueing && compose::is_tracked(self, node);
        let el = self.element_mut(node)?;
        el.id = id.map(str::to_string);
        if tracked {
            match before {
                Some(old) => self.emit(Delta::SetAttribute {
                    element_id: old,
                    name: "id".to_string(),
                    value: id.map(str::to_string),
                }),
                // Without a previous identifier there is nothing the client
                // could resolve the rename against.
                None => tracing::warn!(
                    node = node.0,
                    "identifier assigned to an element already rendered without one"
                ),
            }
        }
        Ok(())
    }

    /// Return the element's identifier, assigning a generated one if blank
    pub fn ensure_element_id(&mut self, node: NodeId) -> String {
        if let Some(id) = self.id(node) {
            return id;
        }
        let id = self.generate_element_id();
        if let Err(err) = self.set_id(node, Some(id.as_str())) {
            tracing::error!(error = %err, "failed to assign generated identifier");
        }
        id
    }

    /// Assign a generated identifier without emitting anything; used at
    /// serialization time, where the identifier rides inside the content.
    pub(crate) fn ensure_id_silent(&mut self, node: NodeId) -> String {
        if let Some(id) = self.id(node) {
            return id;
        }
        let id = self.generate_element_id();
        self.idmap.rename(node, None, Some(id.as_str()));
        if let Ok(el) = self.element_mut(node) {
            el.id = Some(id.clone());
        }
        id
    }

    /// Detach a slot from the store entirely (cross-document adoption)
    pub(crate) fn take_slot(&mut self, node: NodeId) -> DomResult<NodeSlot> {
        let slot = self
            .nodes
            .get_mut(node.0 as usize)
            .and_then(Option::take)
            .ok_or(DomError::UnknownNode)?;
        self.free.push(node.0);
        if let Some(id) = slot.element().and_then(|el| el.id.as_deref()) {
            self.idmap.remove(id);
        }
        if let Some(mut bindings) = self.bindings.remove(&node) {
            bindings.cancel_all();
        }
        Ok(slot)
    }

    /// Next identifier: `"_e"` + per-document counter, never reused
    pub(crate) fn generate_element_id(&mut self) -> String {
        loop {
            self.id_counter += 1;
            let id = format!("_e{}", self.id_counter);
            if !self.idmap.contains(&id) {
                return id;
            }
        }
    }

    // ---- attributes ---------------------------------------------------

    /// Attribute value, or `None`
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let name = name.to_lowercase();
        self.slot(node)
            .ok()
            .and_then(NodeSlot::element)
            .and_then(|el| el.attribute(&name).map(str::to_string))
    }

    pub fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, name).is_some()
    }

    /// Attribute name/value pairs in insertion order, identifier first
    pub fn attributes(&self, node: NodeId) -> Vec<(String, String)> {
        let Ok(el) = self.element(node) else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(el.attributes.len() + 1);
        if let Some(id) = &el.id {
            out.push(("id".to_string(), id.clone()));
        }
        out.extend(el.attributes.iter().cloned());
        out
    }

    /// Set an attribute; setting `id` routes through [`Document::set_id`].
    ///
    /// An unchanged value emits nothing.
    pub fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> DomResult<()> {
        self.set_attribute_inner(node, name, Some(value), true)
    }

    /// Remove an attribute
    pub fn remove_attribute(&mut self, node: NodeId, name: &str) -> DomResult<()> {
        self.set_attribute_inner(node, name, None, true)
    }

    /// Set or clear an attribute without emitting a delta; used when the
    /// client already has the state (inbound input feedback).
    pub(crate) fn set_attribute_silent(
        &mut self,
        node: NodeId,
        name: &str,
        value: Option<&str>,
    ) -> DomResult<()> {
        self.set_attribute_inner(node, name, value, false)
    }

    fn set_attribute_inner(
        &mut self,
        node: NodeId,
        name: &str,
        value: Option<&str>,
        emit: bool,
    ) -> DomResult<()> {
        let name = name.to_lowercase();
        if name == "id" {
            return self.set_id(node, value);
        }
        let el = self.element_mut(node)?;
        let changed = match value {
            Some(v) => el.set_attribute(&name, v),
            None => el.remove_attribute(&name),
        };
        if changed && emit && self.queueing && compose::is_tracked(self, node) {
            let element_id = self.ensure_id_silent(node);
            self.emit(Delta::SetAttribute {
                element_id,
                name,
                value: value.map(str::to_string),
            });
        }
        Ok(())
    }

    /// Add (`true`) or remove (`false`) a flag attribute
    pub fn set_flag_attribute(&mut self, node: NodeId, name: &str, value: bool) -> DomResult<()> {
        if value {
            self.set_attribute(node, name, "")
        } else {
            self.remove_attribute(node, name)
        }
    }

    pub fn has_flag_attribute(&self, node: NodeId, name: &str) -> bool {
        self.has_attribute(node, name)
    }

    // ---- class list ---------------------------------------------------

    pub fn has_class(&self, node: NodeId, name: &str) -> bool {
        self.attribute(node, "class")
            .is_some_and(|classes| classlist::has_class(&classes, name))
    }

    pub fn add_class(&mut self, node: NodeId, name: &str) -> DomResult<()> {
        let classes = self.attribute(node, "class").unwrap_or_default();
        self.set_attribute(node, "class", &classlist::add_class(&classes, name))
    }

    pub fn remove_class(&mut self, node: NodeId, name: &str) -> DomResult<()> {
        let classes = self.attribute(node, "class").unwrap_or_default();
        self.set_attribute(node, "class", &classlist::remove_class(&classes, name))
    }

    /// Add or remove a class according to `value`
    pub fn toggle_class(&mut self, node: NodeId, name: &str, value: bool) -> DomResult<()> {
        let classes = self.attribute(node, "class").unwrap_or_default();
        self.set_attribute(node, "class", &classlist::toggle_class(&classes, name, value))
    }

    // ---- text ---------------------------------------------------------

    /// Append text, HTML-escaped.
    ///
    /// When the element's last child is a text node the content is merged
    /// into it; otherwise a new text child is appended.
    pub fn append_text(&mut self, node: NodeId, text: &str) -> DomResult<()> {
        self.append_encode(node, text, true)
    }

    /// Append raw markup without encoding
    pub fn append_raw(&mut self, node: NodeId, markup: &str) -> DomResult<()> {
        self.append_encode(node, markup, false)
    }

    fn append_encode(&mut self, node: NodeId, content: &str, encode: bool) -> DomResult<()> {
        let data = if encode { escape_text(content) } else { content.to_string() };
        let el = self.element(node)?;
        let last_text = el
            .children
            .last()
            .copied()
            .filter(|last| self.slot(*last).ok().and_then(NodeSlot::text).is_some());
        match last_text {
            Some(text_node) => {
                if let Some(text) = self.slot_mut(text_node)?.text_mut() {
                    text.data.push_str(&data);
                }
                self.emit_text_refresh(node, text_node)
            }
            None => {
                let text_node = if encode {
                    self.create_text(content)
                } else {
                    self.create_raw_text(content)
                };
                surgeon::append_child(self, node, text_node)
            }
        }
    }

    /// Re-send a merged text child by positional replace
    fn emit_text_refresh(&mut self, parent: NodeId, text_node: NodeId) -> DomResult<()> {
        if !(self.queueing && compose::is_tracked(self, parent)) {
            return Ok(());
        }
        let Some(index) = self.child_position(parent, text_node) else {
            return Ok(());
        };
        let index = compose::flat_index(self, parent, index);
        let parent_id = self.ensure_id_silent(parent);
        let node = compose::content_node(self, text_node)?;
        self.emit(Delta::RemoveAt { parent_id: parent_id.clone(), index });
        self.emit(Delta::InsertAt { parent_id, index, node });
        Ok(())
    }

    /// Concatenated text content of the subtree, entities decoded
    pub fn inner_text(&self, node: NodeId) -> String {
        let Ok(slot) = self.slot(node) else {
            return String::new();
        };
        match slot.text() {
            // Raw nodes hold markup, not encoded text; hand it back as-is.
            Some(text) if text.raw => text.data.clone(),
            Some(text) => unescape_text(&text.data),
            None => self
                .children(node)
                .into_iter()
                .map(|child| self.inner_text(child))
                .collect(),
        }
    }

    /// Replace all children with a single text node.
    ///
    /// An existing sole text child is updated in place.
    pub fn set_inner_text(&mut self, node: NodeId, text: &str) -> DomResult<()> {
        self.set_inner_encode(node, text, true)
    }

    /// Replace all children with raw markup
    pub fn set_inner_data(&mut self, node: NodeId, markup: &str) -> DomResult<()> {
        self.set_inner_encode(node, markup, false)
    }

    fn set_inner_encode(&mut self, node: NodeId, content: &str, encode: bool) -> DomResult<()> {
        let el = self.element(node)?;
        let sole_text = (el.children.len() == 1)
            .then(|| el.children[0])
            .filter(|only| self.slot(*only).ok().and_then(NodeSlot::text).is_some());
        if let Some(text_node) = sole_text {
            let data = if encode { escape_text(content) } else { content.to_string() };
            if let Some(text) = self.slot_mut(text_node)?.text_mut() {
                if text.data == data {
                    return Ok(());
                }
                text.data = data;
                text.raw = !encode;
            }
            return self.emit_text_refresh(node, text_node);
        }
        surgeon::clear_children(self, node)?;
        self.append_encode(node, content, encode)
    }

    // ---- delta queue --------------------------------------------------

    pub(crate) fn emit(&mut self, delta: Delta) {
        self.queue.push_back(delta);
    }

    /// Whether structural and attribute deltas are being recorded
    pub(crate) fn queueing(&self) -> bool {
        self.queueing
    }

    /// True when there are UI changes pending to be flushed to the client
    pub fn has_pending_changes(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Drain the queue into an ordered batch, leaving it empty
    pub fn flush_deltas(&mut self) -> DeltaBatch {
        DeltaBatch(self.queue.drain(..).collect())
    }

    /// Drain the queue and serialize it as one JSON payload
    pub fn flush_queue(&mut self) -> DomResult<String> {
        Ok(self.flush_deltas().to_json()?)
    }

    /// Open the live queue before the first content reaches the client.
    ///
    /// Anything already queued (event subscriptions registered while the
    /// page was built) is embedded as the initial-state payload on the head
    /// element instead of being pushed.
    pub fn open_event_queue(&mut self) -> DomResult<()> {
        if self.has_pending_changes() {
            let payload = self.flush_queue()?;
            let head = self.head;
            self.set_attribute_silent(head, INITIAL_DELTA_ATTRIBUTE, Some(payload.as_str()))?;
        }
        self.queueing = true;
        Ok(())
    }

    // ---- activity & unload --------------------------------------------

    pub(crate) fn update_timestamp(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time of the last client interaction or render
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Run when the owning session discards the page
    pub fn on_unload(&mut self, handler: impl FnMut(&mut Document) + Send + 'static) {
        self.unload_handlers.push(Box::new(handler));
    }

    /// Tear the document down: leave `Enabled`, release the push channel and
    /// run the unload handlers.
    pub fn notify_unload(&mut self) {
        self.push.shutdown();
        let mut handlers = std::mem::take(&mut self.unload_handlers);
        for handler in handlers.iter_mut() {
            handler(self);
        }
        handlers.extend(std::mem::take(&mut self.unload_handlers));
        self.unload_handlers = handlers;
    }

    // ---- server push --------------------------------------------------

    /// Current push channel state
    pub fn push_status(&self) -> PushStatus {
        self.push.status()
    }

    /// Instructed the client to open a push channel; `Disabled -> Connecting`
    pub fn enable_push(&mut self) {
        self.push.start_connecting();
    }

    /// A live channel attached; `-> Enabled`. Any backlog flushes at once.
    pub fn attach_push_channel(&mut self, channel: Box<dyn PushChannel>) -> DomResult<()> {
        self.push.attach(channel);
        self.flush_to_channel()?;
        Ok(())
    }

    /// Push pending changes over the live channel, if any.
    ///
    /// Returns whether a payload was sent. Outside `Enabled` this is a
    /// no-op: mutations stay queued for the next request.
    pub fn flush_to_channel(&mut self) -> DomResult<bool> {
        if !self.push.is_enabled() || !self.has_pending_changes() {
            return Ok(false);
        }
        let batch = self.flush_deltas();
        let payload = batch.to_json()?;
        if let Err(err) = self.push.send(&payload) {
            // Keep the batch for the next request rather than dropping it.
            for delta in batch.0.into_iter().rev() {
                self.queue.push_front(delta);
            }
            return Err(err.into());
        }
        tracing::debug!(bytes = payload.len(), "pushed delta batch");
        Ok(true)
    }
}
