//! Tree mutation, delta emission and composition tests
//!
//! Covers the structural core: mutation-order flushing, positional delta
//! fallbacks, identifier renames, text merging, light-DOM flattening and
//! cross-document adoption.

use std::sync::{Arc, Mutex};

use umbra_dom::{
    dispatch_event, render_page, ContentNode, Delta, Document, DomError, InboundEvent, NodeHooks,
    NodeId, INITIAL_DELTA_ATTRIBUTE,
};

fn live_document() -> Document {
    let mut doc = Document::new();
    doc.open_event_queue().expect("open queue");
    doc
}

// ============================================================================
// DELTA ORDERING
// ============================================================================

#[test]
fn test_flush_preserves_mutation_order() {
    let mut doc = live_document();
    let body = doc.body();

    let div = doc.create_element("div");
    doc.append_child(body, div).unwrap();
    doc.set_attribute(div, "class", "row").unwrap();
    let span = doc.create_element("span");
    doc.append_child(body, span).unwrap();
    doc.remove(div).unwrap();

    let batch = doc.flush_deltas();
    assert_eq!(batch.len(), 4);
    assert!(matches!(batch.0[0], Delta::Append { .. }));
    assert!(matches!(batch.0[1], Delta::SetAttribute { .. }));
    assert!(matches!(batch.0[2], Delta::Append { .. }));
    assert!(matches!(batch.0[3], Delta::Remove { .. }));
    assert!(!doc.has_pending_changes(), "flush must drain the queue");
}

#[test]
fn test_flush_serializes_to_json_array() {
    let mut doc = live_document();
    let div = doc.create_element("div");
    doc.append_child(doc.body(), div).unwrap();

    let json = doc.flush_queue().unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert!(parsed.is_array());
    assert_eq!(parsed.as_array().unwrap().len(), 1);
}

// ============================================================================
// INSERTION
// ============================================================================

#[test]
fn test_insert_before_uses_anchor_id_when_available() {
    let mut doc = live_document();
    let body = doc.body();

    // An input carries an identifier from the moment it is serialized.
    let input = doc.create_element("input");
    doc.append_child(body, input).unwrap();
    doc.flush_deltas();

    let label = doc.create_element("label");
    doc.insert_child_before(body, input, label).unwrap();

    let batch = doc.flush_deltas();
    let anchor = doc.id(input).unwrap();
    match &batch.0[0] {
        Delta::InsertBefore { anchor_id, .. } => assert_eq!(*anchor_id, anchor),
        other => panic!("expected InsertBefore, got {other:?}"),
    }
    assert_eq!(doc.child_position(body, label), Some(0));
}

#[test]
fn test_insert_relative_to_text_falls_back_to_positional() {
    let mut doc = live_document();
    let body = doc.body();
    let div = doc.create_element("div");
    doc.append_text(div, "anchor").unwrap();
    doc.append_child(body, div).unwrap();
    doc.flush_deltas();

    let text = doc.child_at(div, 0).unwrap();
    let em = doc.create_element("em");
    doc.insert_child_after(div, text, em).unwrap();

    let batch = doc.flush_deltas();
    match &batch.0[0] {
        Delta::InsertAt { index, .. } => assert_eq!(*index, 1),
        other => panic!("expected InsertAt, got {other:?}"),
    }
}

#[test]
fn test_insert_at_bounds() {
    let mut doc = Document::new();
    let div = doc.create_element("div");
    let span = doc.create_element("span");

    let err = doc.insert_child_at(div, 1, span).unwrap_err();
    assert!(matches!(err, DomError::IndexOutOfBounds { index: 1, len: 0 }));
    doc.insert_child_at(div, 0, span).unwrap();
    assert_eq!(doc.child_count(div), 1);
}

#[test]
fn test_reparent_detaches_first() {
    let mut doc = live_document();
    let body = doc.body();
    let a = doc.create_element("div");
    let b = doc.create_element("section");
    doc.append_child(body, a).unwrap();
    doc.append_child(body, b).unwrap();
    doc.flush_deltas();

    // Attached elsewhere: moving is not an error.
    doc.append_child(b, a).unwrap();
    assert_eq!(doc.parent(a), Some(b));
    assert_eq!(doc.child_count(body), 1);

    let batch = doc.flush_deltas();
    assert_eq!(batch.len(), 2, "detach then attach: {batch:?}");
    assert!(matches!(batch.0[0], Delta::RemoveAt { .. }));
    assert!(matches!(batch.0[1], Delta::Append { .. }));
}

#[test]
fn test_insert_into_own_subtree_fails() {
    let mut doc = Document::new();
    let outer = doc.create_element("div");
    let inner = doc.create_element("div");
    doc.append_child(outer, inner).unwrap();

    let err = doc.append_child(inner, outer).unwrap_err();
    assert!(matches!(err, DomError::HierarchyCycle));
    let err = doc.append_child(outer, outer).unwrap_err();
    assert!(matches!(err, DomError::HierarchyCycle));
}

// ============================================================================
// REMOVAL
// ============================================================================

#[test]
fn test_remove_without_parent_fails_loudly() {
    let mut doc = Document::new();
    let div = doc.create_element("div");
    let err = doc.remove(div).unwrap_err();
    assert!(matches!(err, DomError::NoParent));
}

#[test]
fn test_clear_children_emits_single_delta() {
    let mut doc = live_document();
    let body = doc.body();
    for _ in 0..3 {
        let li = doc.create_element("li");
        doc.append_child(body, li).unwrap();
    }
    doc.flush_deltas();

    doc.clear_children(body).unwrap();
    let batch = doc.flush_deltas();
    assert_eq!(batch.len(), 1);
    assert!(matches!(batch.0[0], Delta::ClearChildren { .. }));
    assert_eq!(doc.child_count(body), 0);
}

#[test]
fn test_swap_children() {
    let mut doc = live_document();
    let body = doc.body();
    let a = doc.create_element("a");
    let b = doc.create_element("b");
    let c = doc.create_element("c");
    for node in [a, b, c] {
        doc.append_child(body, node).unwrap();
    }
    doc.flush_deltas();

    doc.swap_children(body, 0, 2).unwrap();
    assert_eq!(doc.child_at(body, 0), Some(c));
    assert_eq!(doc.child_at(body, 2), Some(a));

    let batch = doc.flush_deltas();
    match &batch.0[0] {
        Delta::SwapChildren { index1, index2, .. } => {
            assert_eq!((*index1, *index2), (0, 2));
        }
        other => panic!("expected SwapChildren, got {other:?}"),
    }

    // Swapping an index with itself changes nothing.
    doc.swap_children(body, 1, 1).unwrap();
    assert!(doc.flush_deltas().is_empty());
}

// ============================================================================
// IDENTIFIERS
// ============================================================================

#[test]
fn test_identifier_rename_updates_map_and_attribute() {
    let mut doc = Document::new();
    let div = doc.create_element("div");
    doc.set_id(div, Some("alpha")).unwrap();
    assert_eq!(doc.element_by_id("alpha"), Some(div));

    doc.set_id(div, Some("beta")).unwrap();
    assert_eq!(doc.element_by_id("alpha"), None);
    assert_eq!(doc.element_by_id("beta"), Some(div));
    assert_eq!(doc.attribute(div, "id").as_deref(), Some("beta"));

    doc.set_id(div, None).unwrap();
    assert_eq!(doc.element_by_id("beta"), None);
    assert_eq!(doc.attribute(div, "id"), None);
}

#[test]
fn test_identifier_rename_emits_delta_against_old_id() {
    let mut doc = live_document();
    let div = doc.create_element("div");
    doc.set_id(div, Some("alpha")).unwrap();
    doc.append_child(doc.body(), div).unwrap();
    doc.flush_deltas();

    doc.set_id(div, Some("beta")).unwrap();
    let batch = doc.flush_deltas();
    match &batch.0[0] {
        Delta::SetAttribute { element_id, name, value } => {
            assert_eq!(element_id, "alpha");
            assert_eq!(name, "id");
            assert_eq!(value.as_deref(), Some("beta"));
        }
        other => panic!("expected id rename delta, got {other:?}"),
    }
}

#[test]
fn test_ensure_element_id_is_monotonic_and_stable() {
    let mut doc = Document::new();
    let a = doc.create_element("div");
    let b = doc.create_element("div");

    let id_a = doc.ensure_element_id(a);
    let id_b = doc.ensure_element_id(b);
    assert!(id_a.starts_with("_e"));
    assert_ne!(id_a, id_b);
    assert_eq!(doc.ensure_element_id(a), id_a, "second call returns the same id");
}

#[test]
fn test_setting_same_id_is_a_noop() {
    let mut doc = live_document();
    let div = doc.create_element("div");
    doc.append_child(doc.body(), div).unwrap();
    doc.set_id(div, Some("x")).unwrap();
    doc.flush_deltas();

    doc.set_id(div, Some("x")).unwrap();
    assert!(!doc.has_pending_changes());
}

// ============================================================================
// TEXT
// ============================================================================

#[test]
fn test_append_text_merges_into_last_text_child() {
    let mut doc = Document::new();
    let span = doc.create_element("span");
    doc.append_text(span, "Hello").unwrap();
    doc.append_text(span, " world").unwrap();

    assert_eq!(doc.child_count(span), 1, "one merged text child");
    assert_eq!(doc.inner_text(span), "Hello world");
}

#[test]
fn test_append_text_after_element_starts_new_node() {
    let mut doc = Document::new();
    let div = doc.create_element("div");
    doc.append_text(div, "a").unwrap();
    let em = doc.create_element("em");
    doc.append_child(div, em).unwrap();
    doc.append_text(div, "b").unwrap();

    assert_eq!(doc.child_count(div), 3);
    assert_eq!(doc.inner_text(div), "ab");
}

#[test]
fn test_text_is_escaped_unless_raw() {
    let mut doc = Document::new();
    let div = doc.create_element("div");
    doc.append_text(div, "1 < 2").unwrap();
    assert_eq!(doc.node_html(div).unwrap(), "<div>1 &lt; 2</div>");

    let raw = doc.create_element("div");
    doc.append_raw(raw, "<b>bold</b>").unwrap();
    assert_eq!(doc.node_html(raw).unwrap(), "<div><b>bold</b></div>");
}

#[test]
fn test_set_inner_text_reuses_sole_text_child() {
    let mut doc = Document::new();
    let span = doc.create_element("span");
    doc.set_inner_text(span, "hello").unwrap();
    assert_eq!(doc.child_count(span), 1);
    let text = doc.child_at(span, 0).unwrap();

    doc.set_inner_text(span, "bye").unwrap();
    assert_eq!(doc.child_at(span, 0), Some(text), "text node reused in place");
    assert_eq!(doc.inner_text(span), "bye");
}

// ============================================================================
// LIGHT-DOM COMPOSITION
// ============================================================================

#[test]
fn test_plain_element_serializes_as_element_form() {
    let mut doc = live_document();
    let div = doc.create_element("div");
    doc.set_attribute(div, "class", "row").unwrap();
    doc.append_text(div, "hi").unwrap();
    doc.append_child(doc.body(), div).unwrap();

    let batch = doc.flush_deltas();
    match &batch.0[0] {
        Delta::Append { node: ContentNode::Element(el), .. } => {
            assert_eq!(el.tag, "div");
            assert_eq!(el.children.len(), 1);
            assert!(el.attributes.iter().any(|a| a.name == "class" && a.value == "row"));
        }
        other => panic!("expected element content, got {other:?}"),
    }
}

#[test]
fn test_shadow_host_serializes_as_array_form() {
    let mut doc = live_document();
    let host = doc.create_element("x-panel");
    let shadow = doc.attach_shadow(host).unwrap();
    let div = doc.create_element("div");
    doc.append_text(div, "inside").unwrap();
    doc.append_child(shadow, div).unwrap();

    doc.append_child(doc.body(), host).unwrap();
    let batch = doc.flush_deltas();
    match &batch.0[0] {
        Delta::Append { node: ContentNode::Array(nodes), .. } => {
            assert_eq!(nodes.len(), 1, "single shadow child still uses the array form");
            assert!(matches!(&nodes[0], ContentNode::Element(el) if el.tag == "div"));
        }
        other => panic!("expected array content, got {other:?}"),
    }
}

#[test]
fn test_slot_splices_light_children_in_shadow_order() {
    let mut doc = Document::new();
    let host = doc.create_element("x-card");
    let shadow = doc.attach_shadow(host).unwrap();

    let h1 = doc.create_element("h1");
    doc.append_text(h1, "title").unwrap();
    doc.append_child(shadow, h1).unwrap();
    let slot = doc.create_element("slot");
    doc.append_child(shadow, slot).unwrap();

    let span = doc.create_element("span");
    doc.append_text(span, "body").unwrap();
    doc.append_child(host, span).unwrap();

    assert_eq!(
        doc.node_html(host).unwrap(),
        "<h1>title</h1><span>body</span>",
        "shadow content first, slotted light children in its place"
    );
}

#[test]
fn test_named_slots_reorder_light_children() {
    let mut doc = Document::new();
    let host = doc.create_element("x-card");
    let shadow = doc.attach_shadow(host).unwrap();

    let title_slot = doc.create_element("slot");
    doc.set_attribute(title_slot, "name", "title").unwrap();
    doc.append_child(shadow, title_slot).unwrap();
    let default_slot = doc.create_element("slot");
    doc.append_child(shadow, default_slot).unwrap();

    let body_div = doc.create_element("div");
    doc.append_text(body_div, "body").unwrap();
    doc.append_child(host, body_div).unwrap();
    let title_span = doc.create_element("span");
    doc.set_attribute(title_span, "slot", "title").unwrap();
    doc.append_text(title_span, "T").unwrap();
    doc.append_child(host, title_span).unwrap();

    assert_eq!(
        doc.node_html(host).unwrap(),
        "<span slot=\"title\">T</span><div>body</div>",
        "slot order wins over light order"
    );
}

#[test]
fn test_unassigned_light_child_is_not_tracked() {
    let mut doc = live_document();
    let host = doc.create_element("x-card");
    let _shadow = doc.attach_shadow(host).unwrap();
    let orphan = doc.create_element("div");
    doc.append_child(host, orphan).unwrap();
    doc.append_child(doc.body(), host).unwrap();
    doc.flush_deltas();

    // No slot picks the child up, so its mutations stay server-side.
    doc.set_attribute(orphan, "class", "hidden").unwrap();
    assert!(!doc.has_pending_changes());
}

#[test]
fn test_shadow_on_boundary_is_rejected() {
    let mut doc = Document::new();
    let body = doc.body();
    let err = doc.attach_shadow(body).unwrap_err();
    assert!(matches!(err, DomError::CompositionBoundary));

    let host = doc.create_element("x-a");
    doc.attach_shadow(host).unwrap();
    let err = doc.attach_shadow(host).unwrap_err();
    assert!(matches!(err, DomError::ShadowExists));
}

// ============================================================================
// PAGE RENDER
// ============================================================================

#[test]
fn test_render_page_shape() {
    let mut doc = Document::new();
    let div = doc.create_element("div");
    doc.set_attribute(div, "class", "row").unwrap();
    doc.append_text(div, "hi").unwrap();
    doc.append_child(doc.body(), div).unwrap();

    let html = render_page(&mut doc).unwrap();
    assert!(html.starts_with("<!DOCTYPE html><html lang=\"en\">"));
    assert!(html.contains("<div class=\"row\">hi</div>"));
    assert!(html.ends_with("</html>"));
}

#[test]
fn test_prerender_subscriptions_become_initial_payload() {
    let mut doc = Document::new();
    let button = doc.create_element("button");
    doc.append_child(doc.body(), button).unwrap();
    doc.on(button, "click", |_, _| Ok(())).unwrap();

    let html = render_page(&mut doc).unwrap();
    assert!(!doc.has_pending_changes());
    let payload = doc.attribute(doc.head(), INITIAL_DELTA_ATTRIBUTE).expect("initial payload");
    assert!(payload.contains("subscribe"));
    assert!(html.contains(INITIAL_DELTA_ATTRIBUTE));

    // Evented elements always render with their identifier.
    let id = doc.id(button).unwrap();
    assert!(html.contains(&format!("<button id=\"{id}\">")));
}

#[test]
fn test_void_elements_have_no_closing_tag() {
    let mut doc = Document::new();
    let input = doc.create_element("input");
    doc.set_attribute(input, "type", "text").unwrap();
    doc.append_child(doc.body(), input).unwrap();

    let html = render_page(&mut doc).unwrap();
    assert!(!html.contains("</input>"));
}

// ============================================================================
// LIFECYCLE & ADOPTION
// ============================================================================

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<String>>>);

impl Recorder {
    fn log(&self, entry: &str) {
        self.0.lock().unwrap().push(entry.to_string());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

struct RecordingHooks(Recorder);

impl NodeHooks for RecordingHooks {
    fn on_connect(&mut self, _doc: &mut Document, _node: NodeId) {
        self.0.log("connect");
    }

    fn on_disconnect(&mut self, _doc: &mut Document, _node: NodeId) {
        self.0.log("disconnect");
    }

    fn on_adopted(&mut self, _doc: &mut Document, _node: NodeId) {
        self.0.log("adopted");
    }

    fn on_moved(&mut self, _doc: &mut Document, _node: NodeId) {
        self.0.log("moved");
    }
}

#[test]
fn test_lifecycle_notifications() {
    let recorder = Recorder::default();
    let mut doc = Document::new();
    let body = doc.body();
    let div = doc.create_element("div");
    doc.set_hooks(div, Box::new(RecordingHooks(recorder.clone())));

    doc.append_child(body, div).unwrap();
    let section = doc.create_element("section");
    doc.append_child(body, section).unwrap();
    doc.append_child(section, div).unwrap();
    doc.remove(div).unwrap();

    assert_eq!(recorder.entries(), ["connect", "moved", "disconnect"]);
}

#[test]
fn test_adoption_is_distinct_from_move() {
    let recorder = Recorder::default();
    let mut source = Document::new();
    let mut target = Document::new();

    let div = source.create_element("div");
    source.set_id(div, Some("x")).unwrap();
    source.append_text(div, "hi").unwrap();
    source.set_hooks(div, Box::new(RecordingHooks(recorder.clone())));

    let adopted = target.adopt(&mut source, div).unwrap();
    assert_eq!(recorder.entries(), ["adopted"]);
    assert_eq!(target.id(adopted).as_deref(), Some("x"));
    assert_eq!(target.element_by_id("x"), Some(adopted));
    assert_eq!(source.element_by_id("x"), None);
    assert_eq!(target.inner_text(adopted), "hi");

    target.append_child(target.body(), adopted).unwrap();
    assert_eq!(recorder.entries(), ["adopted", "connect"]);
}

#[test]
fn test_adoption_drops_conflicting_identifier() {
    let mut source = Document::new();
    let mut target = Document::new();

    let original = target.create_element("div");
    target.set_id(original, Some("dup")).unwrap();
    let incoming = source.create_element("div");
    source.set_id(incoming, Some("dup")).unwrap();

    let adopted = target.adopt(&mut source, incoming).unwrap();
    assert_eq!(target.id(adopted), None, "conflicting identifier is dropped");
    assert_eq!(target.element_by_id("dup"), Some(original));
}

// ============================================================================
// EVENTS
// ============================================================================

#[test]
fn test_event_dispatch_runs_handler() {
    let recorder = Recorder::default();
    let mut doc = live_document();
    let button = doc.create_element("button");
    doc.append_child(doc.body(), button).unwrap();
    let log = recorder.clone();
    doc.on(button, "click", move |_, _| {
        log.log("clicked");
        Ok(())
    })
    .unwrap();

    let id = doc.id(button).unwrap();
    let handled = dispatch_event(
        &mut doc,
        &InboundEvent { element_id: id, event_name: "click".into(), payload: Default::default() },
    )
    .unwrap();
    assert!(handled);
    assert_eq!(recorder.entries(), ["clicked"]);
}

#[test]
fn test_event_dispatch_misses_are_soft() {
    let mut doc = live_document();
    let handled = dispatch_event(
        &mut doc,
        &InboundEvent {
            element_id: "_e99".into(),
            event_name: "click".into(),
            payload: Default::default(),
        },
    )
    .unwrap();
    assert!(!handled);
}

#[test]
fn test_subscribe_and_unsubscribe_deltas() {
    let mut doc = live_document();
    let button = doc.create_element("button");
    doc.append_child(doc.body(), button).unwrap();
    doc.flush_deltas();

    doc.on(button, "click", |_, _| Ok(())).unwrap();
    let batch = doc.flush_deltas();
    assert!(matches!(&batch.0[0], Delta::Subscribe { event_name, .. } if event_name == "click"));

    doc.off(button, "click").unwrap();
    let batch = doc.flush_deltas();
    assert!(matches!(&batch.0[0], Delta::Unsubscribe { event_name, .. } if event_name == "click"));
}

#[test]
fn test_focus_requires_connection() {
    let mut doc = live_document();
    let input = doc.create_element("input");
    let err = doc.focus(input).unwrap_err();
    assert!(matches!(err, DomError::FocusDisconnected));

    doc.append_child(doc.body(), input).unwrap();
    doc.flush_deltas();
    doc.focus(input).unwrap();
    let batch = doc.flush_deltas();
    assert!(matches!(batch.0[0], Delta::Focus { .. }));
}
