//! Event subscription and inbound dispatch
//!
//! Registering an event announces it to the client with a Subscribe delta;
//! inbound events resolve their target by identifier, apply the input
//! payload silently, then run the handler to completion on the dispatching
//! thread.

use umbra_wire::{Delta, EventOptions, EventPayload, InboundEvent};

use crate::bindings;
use crate::compose;
use crate::error::{DomError, DomResult};
use crate::node::EventEntry;
use crate::{Document, NodeId};

/// Handler invoked for one event registration
pub type EventHandler = Box<dyn FnMut(&mut Document, &EventPayload) -> DomResult<()> + Send>;

impl Document {
    /// Register an event with default options, replacing any previous
    /// registration for the same event name.
    pub fn on(
        &mut self,
        node: NodeId,
        event_name: &str,
        handler: impl FnMut(&mut Document, &EventPayload) -> DomResult<()> + Send + 'static,
    ) -> DomResult<()> {
        self.on_with_options(node, event_name, EventOptions::default(), handler)
    }

    /// Register an event and its client-side handling options
    pub fn on_with_options(
        &mut self,
        node: NodeId,
        event_name: &str,
        options: EventOptions,
        handler: impl FnMut(&mut Document, &EventPayload) -> DomResult<()> + Send + 'static,
    ) -> DomResult<()> {
        let event_name = event_name.trim().to_string();
        if event_name.is_empty() {
            return Err(DomError::BlankEventName);
        }
        // Replace-then-subscribe, so the client never holds two listeners.
        self.off(node, &event_name)?;
        let entry = EventEntry { options, handler: Some(Box::new(handler)) };
        self.element_mut(node)?.events.insert(event_name.clone(), entry);
        if compose::is_tracked(self, node) {
            let element_id = self.ensure_id_silent(node);
            self.emit(Delta::Subscribe { element_id, event_name, options });
        }
        Ok(())
    }

    /// Drop an event registration; absent registrations are a no-op
    pub fn off(&mut self, node: NodeId, event_name: &str) -> DomResult<()> {
        let removed = self.element_mut(node)?.events.remove(event_name).is_some();
        if removed && compose::is_tracked(self, node) {
            let element_id = self.ensure_id_silent(node);
            self.emit(Delta::Unsubscribe { element_id, event_name: event_name.to_string() });
        }
        Ok(())
    }

    /// Registered event names, in no particular order
    pub fn event_names(&self, node: NodeId) -> Vec<String> {
        self.element(node)
            .map(|el| el.events.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Ask the browser to focus this element
    pub fn focus(&mut self, node: NodeId) -> DomResult<()> {
        if !self.is_connected(node) {
            return Err(DomError::FocusDisconnected);
        }
        let element_id = self.ensure_id_silent(node);
        self.emit(Delta::Focus { element_id });
        Ok(())
    }
}

/// Re-announce every registration on a newly connected element.
///
/// The content delta that carried the element does not express event
/// subscriptions, so they follow as Subscribe deltas.
pub(crate) fn flush_subscriptions(doc: &mut Document, node: NodeId) {
    let Ok(el) = doc.element(node) else {
        return;
    };
    if el.events.is_empty() || !compose::is_tracked(doc, node) {
        return;
    }
    let mut names: Vec<(String, EventOptions)> =
        el.events.iter().map(|(name, entry)| (name.clone(), entry.options)).collect();
    names.sort_by(|a, b| a.0.cmp(&b.0));
    let element_id = doc.ensure_id_silent(node);
    for (event_name, options) in names {
        doc.emit(Delta::Subscribe { element_id: element_id.clone(), event_name, options });
    }
}

/// Dispatch one inbound client event.
///
/// The target is resolved by identifier (misses are soft and return
/// `Ok(false)`), the payload is applied to the element without echoing a
/// delta, input-binding write-backs run, then the registered handler runs to
/// completion before this returns.
pub fn dispatch_event(doc: &mut Document, event: &InboundEvent) -> DomResult<bool> {
    let Some(node) = doc.element_by_id(&event.element_id) else {
        tracing::debug!(element_id = %event.element_id, "inbound event for unknown element");
        return Ok(false);
    };
    doc.update_timestamp();
    tracing::trace!(element_id = %event.element_id, event = %event.event_name, "dispatching");

    apply_payload(doc, node, &event.payload)?;
    bindings::apply_input_feedback(doc, node, &event.payload)?;

    let handler = {
        let el = doc.element_mut(node)?;
        el.events.get_mut(&event.event_name).and_then(|entry| entry.handler.take())
    };
    let Some(mut handler) = handler else {
        return Ok(false);
    };
    let result = handler(doc, &event.payload);
    if let Ok(el) = doc.element_mut(node) {
        if let Some(entry) = el.events.get_mut(&event.event_name) {
            if entry.handler.is_none() {
                entry.handler = Some(handler);
            }
        }
    }
    result.map(|()| true)
}

/// Mirror the client's input state onto the element without a delta echo
fn apply_payload(doc: &mut Document, node: NodeId, payload: &EventPayload) -> DomResult<()> {
    if let Some(value) = &payload.value {
        doc.set_attribute_silent(node, "value", Some(value.as_str()))?;
    }
    if let Some(checked) = payload.checked {
        let value = checked.then_some("");
        doc.set_attribute_silent(node, "checked", value)?;
    }
    Ok(())
}
