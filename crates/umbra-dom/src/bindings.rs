//! Element bindings
//!
//! Standing subscriptions that turn observable-source changes into element
//! mutations: generic handler, attribute, flag attribute, class toggle,
//! inner text, two-way input value, and ordered child collections. Each
//! element keeps its active subscriptions grouped by purpose so they can be
//! unbound selectively.

use std::collections::HashMap;

use umbra_reactive::{ListChange, ReactiveError, Subscription};
use umbra_wire::EventPayload;

use crate::error::{DomError, DomResult};
use crate::{Document, DomList, DomValue, NodeId};

/// Builds one child element for a bound collection item
pub type ChildFactory<T> = Box<dyn FnMut(&mut Document, &T) -> NodeId + Send>;

/// Options for binding a single attribute value
pub struct BindAttributeOptions<T> {
    pub source: DomValue<T>,
    pub attribute: String,
    /// Renders the source value into the attribute text
    pub render: Box<dyn Fn(&T) -> String + Send>,
}

/// Options for binding a boolean flag attribute
pub struct BindFlagOptions {
    pub source: DomValue<bool>,
    pub attribute: String,
}

/// Options for toggling a class from a boolean source
pub struct BindToggleClassOptions {
    pub source: DomValue<bool>,
    pub class_name: String,
}

/// Options for binding an element's inner text
pub struct BindInnerTextOptions<T> {
    pub source: DomValue<T>,
    pub render: Box<dyn Fn(&T) -> String + Send>,
}

/// Options for binding the child list to an observable collection
pub struct BindChildrenOptions<T> {
    pub collection: DomList<T>,
    pub create: ChildFactory<T>,
}

/// Per-element registry of active subscriptions, grouped by purpose
#[derive(Default)]
pub(crate) struct ElementBindings {
    handler: Vec<Subscription>,
    attributes: HashMap<String, Subscription>,
    classes: HashMap<String, Subscription>,
    inner_text: Option<Subscription>,
    inputs: Vec<InputBinding>,
    children: Option<Subscription>,
}

pub(crate) struct InputBinding {
    attribute: String,
    sink: InputSink,
    subscription: Subscription,
}

#[derive(Clone)]
enum InputSink {
    Value(DomValue<String>),
    Flag(DomValue<bool>),
}

impl ElementBindings {
    pub fn cancel_all(&mut self) {
        for sub in self.handler.iter_mut() {
            sub.cancel();
        }
        self.handler.clear();
        for (_, sub) in self.attributes.iter_mut() {
            sub.cancel();
        }
        self.attributes.clear();
        for (_, sub) in self.classes.iter_mut() {
            sub.cancel();
        }
        self.classes.clear();
        if let Some(mut sub) = self.inner_text.take() {
            sub.cancel();
        }
        for input in self.inputs.iter_mut() {
            input.subscription.cancel();
        }
        self.inputs.clear();
        if let Some(mut sub) = self.children.take() {
            sub.cancel();
        }
    }
}

/// Map a DOM failure out of a reaction: cycles propagate to the mutating
/// caller, anything else is a defect in the binding itself and is logged.
fn relay(result: DomResult<()>) -> Result<(), ReactiveError> {
    match result {
        Ok(()) => Ok(()),
        Err(DomError::Reactive(err)) => Err(err),
        Err(err) => {
            tracing::error!(error = %err, "binding reaction failed");
            Ok(())
        }
    }
}

impl Document {
    /// Bind an arbitrary reaction to a source: `handler` runs once now and
    /// then on every change notification.
    pub fn bind_handler<T: Clone + PartialEq + Send + 'static>(
        &mut self,
        node: NodeId,
        source: &DomValue<T>,
        mut handler: impl FnMut(&mut Document, &T) -> DomResult<()> + Send + 'static,
    ) -> DomResult<()> {
        self.slot(node)?;
        let value = source.get();
        handler(self, &value)?;
        let sub = source.subscribe(move |doc: &mut Document, v: &T| relay(handler(doc, v)));
        self.bindings.entry(node).or_default().handler.push(sub);
        Ok(())
    }

    /// Bind one attribute to a source value
    pub fn bind_attribute<T: Clone + PartialEq + Send + 'static>(
        &mut self,
        node: NodeId,
        options: BindAttributeOptions<T>,
    ) -> DomResult<()> {
        let BindAttributeOptions { source, attribute, render } = options;
        let attribute = checked_name(&attribute)?;
        let value = source.get();
        self.set_attribute(node, &attribute, &render(&value))?;

        let attr = attribute.clone();
        let sub = source.subscribe(move |doc: &mut Document, v: &T| {
            relay(doc.set_attribute(node, &attr, &render(v)))
        });
        self.replace_attribute_binding(node, attribute, sub);
        Ok(())
    }

    /// Bind a flag attribute to a boolean source
    pub fn bind_flag_attribute(&mut self, node: NodeId, options: BindFlagOptions) -> DomResult<()> {
        let BindFlagOptions { source, attribute } = options;
        let attribute = checked_name(&attribute)?;
        self.set_flag_attribute(node, &attribute, source.get())?;

        let attr = attribute.clone();
        let sub = source.subscribe(move |doc: &mut Document, v: &bool| {
            relay(doc.set_flag_attribute(node, &attr, *v))
        });
        self.replace_attribute_binding(node, attribute, sub);
        Ok(())
    }

    /// Toggle a class from a boolean source
    pub fn bind_toggle_class(
        &mut self,
        node: NodeId,
        options: BindToggleClassOptions,
    ) -> DomResult<()> {
        let BindToggleClassOptions { source, class_name } = options;
        let class_name = checked_name(&class_name)?;
        self.toggle_class(node, &class_name, source.get())?;

        let class = class_name.clone();
        let sub = source.subscribe(move |doc: &mut Document, v: &bool| {
            relay(doc.toggle_class(node, &class, *v))
        });
        let entry = self.bindings.entry(node).or_default();
        if let Some(mut old) = entry.classes.insert(class_name, sub) {
            old.cancel();
        }
        Ok(())
    }

    /// Bind the element's inner text to a source value
    pub fn bind_inner_text<T: Clone + PartialEq + Send + 'static>(
        &mut self,
        node: NodeId,
        options: BindInnerTextOptions<T>,
    ) -> DomResult<()> {
        let BindInnerTextOptions { source, render } = options;
        let value = source.get();
        self.set_inner_text(node, &render(&value))?;

        let sub = source.subscribe(move |doc: &mut Document, v: &T| {
            relay(doc.set_inner_text(node, &render(v)))
        });
        let entry = self.bindings.entry(node).or_default();
        if let Some(mut old) = entry.inner_text.replace(sub) {
            old.cancel();
        }
        Ok(())
    }

    /// Two-way binding for a value-carrying attribute.
    ///
    /// Source to element: change notifications write the attribute. Element
    /// to source: inbound input events write the source back (the echo
    /// reaction then sees an unchanged attribute and emits nothing).
    pub fn bind_input(
        &mut self,
        node: NodeId,
        attribute: &str,
        source: &DomValue<String>,
    ) -> DomResult<()> {
        let attribute = checked_name(attribute)?;
        self.ensure_id_silent(node);
        self.set_attribute(node, &attribute, &source.get())?;

        let attr = attribute.clone();
        let subscription = source.subscribe(move |doc: &mut Document, v: &String| {
            relay(doc.set_attribute(node, &attr, v))
        });
        self.bindings.entry(node).or_default().inputs.push(InputBinding {
            attribute,
            sink: InputSink::Value(source.clone()),
            subscription,
        });
        Ok(())
    }

    /// Two-way binding for a boolean flag attribute (e.g. `checked`)
    pub fn bind_flag_input(
        &mut self,
        node: NodeId,
        attribute: &str,
        source: &DomValue<bool>,
    ) -> DomResult<()> {
        let attribute = checked_name(attribute)?;
        self.ensure_id_silent(node);
        self.set_flag_attribute(node, &attribute, source.get())?;

        let attr = attribute.clone();
        let subscription = source.subscribe(move |doc: &mut Document, v: &bool| {
            relay(doc.set_flag_attribute(node, &attr, *v))
        });
        self.bindings.entry(node).or_default().inputs.push(InputBinding {
            attribute,
            sink: InputSink::Flag(source.clone()),
            subscription,
        });
        Ok(())
    }

    /// Bind the child list to an observable collection.
    ///
    /// Existing children are cleared, one child is built per item, and each
    /// change notification is mirrored with the minimal structural edit: a
    /// moved item relocates its existing child node, it is never rebuilt.
    pub fn bind_children<T: Clone + Send + 'static>(
        &mut self,
        node: NodeId,
        options: BindChildrenOptions<T>,
    ) -> DomResult<()> {
        let BindChildrenOptions { collection, mut create } = options;
        self.element(node)?;
        if let Some(mut old) = self.bindings.entry(node).or_default().children.take() {
            old.cancel();
        }

        self.clear_children(node)?;
        let items = collection.snapshot();
        let mut tracked: Vec<NodeId> = Vec::with_capacity(items.len());
        for item in &items {
            let child = create(self, item);
            self.append_child(node, child)?;
            tracked.push(child);
        }

        let sub = collection.subscribe(move |doc: &mut Document, change| {
            relay(reconcile(doc, node, &mut tracked, &mut create, change))
        });
        self.bindings.entry(node).or_default().children = Some(sub);
        Ok(())
    }

    fn replace_attribute_binding(&mut self, node: NodeId, attribute: String, sub: Subscription) {
        let entry = self.bindings.entry(node).or_default();
        if let Some(mut old) = entry.attributes.insert(attribute, sub) {
            old.cancel();
        }
    }

    // ---- unbind -------------------------------------------------------

    /// Remove the binding for one attribute; absent bindings are a no-op
    pub fn unbind_attribute(&mut self, node: NodeId, attribute: &str) {
        if let Some(bindings) = self.bindings.get_mut(&node) {
            if let Some(mut sub) = bindings.attributes.remove(&attribute.to_lowercase()) {
                sub.cancel();
            }
        }
    }

    /// Remove all attribute and flag bindings
    pub fn unbind_attributes(&mut self, node: NodeId) {
        if let Some(bindings) = self.bindings.get_mut(&node) {
            for (_, sub) in bindings.attributes.iter_mut() {
                sub.cancel();
            }
            bindings.attributes.clear();
        }
    }

    /// Remove the inner text binding
    pub fn unbind_inner_text(&mut self, node: NodeId) {
        if let Some(bindings) = self.bindings.get_mut(&node) {
            if let Some(mut sub) = bindings.inner_text.take() {
                sub.cancel();
            }
        }
    }

    /// Remove all generic handler bindings
    pub fn unbind_handler(&mut self, node: NodeId) {
        if let Some(bindings) = self.bindings.get_mut(&node) {
            for sub in bindings.handler.iter_mut() {
                sub.cancel();
            }
            bindings.handler.clear();
        }
    }

    /// Stop mirroring the bound collection; current children stay in place
    pub fn unbind_children(&mut self, node: NodeId) {
        if let Some(bindings) = self.bindings.get_mut(&node) {
            if let Some(mut sub) = bindings.children.take() {
                sub.cancel();
            }
        }
    }

    /// Remove every binding on the element
    pub fn unbind_all(&mut self, node: NodeId) {
        if let Some(mut bindings) = self.bindings.remove(&node) {
            bindings.cancel_all();
        }
    }
}

fn checked_name(name: &str) -> DomResult<String> {
    let name = name.trim().to_lowercase();
    if name.is_empty() {
        return Err(DomError::BlankAttributeName);
    }
    Ok(name)
}

/// Mirror one collection change with the minimal structural edit
fn reconcile<T>(
    doc: &mut Document,
    parent: NodeId,
    tracked: &mut Vec<NodeId>,
    create: &mut ChildFactory<T>,
    change: &ListChange<T>,
) -> DomResult<()> {
    match change {
        ListChange::Added { index, item } => {
            let child = create(doc, item);
            doc.insert_child_at(parent, *index, child)?;
            tracked.insert(*index, child);
        }
        ListChange::Removed { index } => {
            if *index >= tracked.len() {
                return Ok(());
            }
            let child = tracked.remove(*index);
            doc.remove_child(parent, child)?;
            doc.discard_subtree(child)?;
        }
        ListChange::Replaced { index, item } => {
            if *index >= tracked.len() {
                return Ok(());
            }
            let old = tracked[*index];
            doc.remove_child(parent, old)?;
            doc.discard_subtree(old)?;
            let child = create(doc, item);
            doc.insert_child_at(parent, *index, child)?;
            tracked[*index] = child;
        }
        ListChange::Moved { from, to } => {
            if *from >= tracked.len() || *to >= tracked.len() {
                return Ok(());
            }
            // Relocate the existing node: rebuilding it would lose its own
            // nested bindings and state.
            let child = tracked.remove(*from);
            doc.remove_child(parent, child)?;
            doc.insert_child_at(parent, *to, child)?;
            tracked.insert(*to, child);
        }
        ListChange::Reset => {
            doc.clear_children(parent)?;
            for child in tracked.drain(..) {
                doc.discard_subtree(child)?;
            }
        }
    }
    Ok(())
}

/// Feed inbound input state back into two-way bound sources.
///
/// Runs after the payload was applied to the element itself; a cycle raised
/// by a write-back surfaces to the event dispatcher.
pub(crate) fn apply_input_feedback(
    doc: &mut Document,
    node: NodeId,
    payload: &EventPayload,
) -> DomResult<()> {
    let sinks: Vec<(String, InputSink)> = match doc.bindings.get(&node) {
        Some(bindings) => bindings
            .inputs
            .iter()
            .map(|input| (input.attribute.clone(), input.sink.clone()))
            .collect(),
        None => return Ok(()),
    };
    for (attribute, sink) in sinks {
        match sink {
            InputSink::Value(source) => {
                if attribute == "value" {
                    if let Some(value) = &payload.value {
                        source.set(doc, value.clone())?;
                    }
                }
            }
            InputSink::Flag(source) => {
                if attribute == "checked" {
                    if let Some(checked) = payload.checked {
                        source.set(doc, checked)?;
                    }
                }
            }
        }
    }
    Ok(())
}
