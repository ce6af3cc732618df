//! Document writer
//!
//! Renders the server-held document to an HTML page string for the initial
//! response. Uses the same light-DOM flattening as delta generation, so the
//! client starts from exactly the tree the deltas will mutate.

use crate::compose;
use crate::error::DomResult;
use crate::escape::escape_attribute;
use crate::{Document, NodeId};

/// Tags with no closing tag
const VOID_TAGS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Render the full page: doctype, html element, head and body.
///
/// Opens the live event queue first, so anything queued during page build
/// lands in the head's initial-delta attribute.
pub fn render_page(doc: &mut Document) -> DomResult<String> {
    doc.update_timestamp();
    doc.open_event_queue()?;

    let mut out = String::with_capacity(1024);
    out.push_str("<!DOCTYPE html>");
    out.push_str("<html lang=\"");
    out.push_str(&escape_attribute(doc.lang()));
    out.push_str("\">");
    write_node(doc, doc.head(), &mut out)?;
    write_node(doc, doc.body(), &mut out)?;
    out.push_str("</html>");
    Ok(out)
}

impl Document {
    /// HTML markup of one node (flattened), mainly for diagnostics and tests
    pub fn node_html(&mut self, node: NodeId) -> DomResult<String> {
        let mut out = String::new();
        write_node(self, node, &mut out)?;
        Ok(out)
    }
}

fn write_node(doc: &mut Document, node: NodeId, out: &mut String) -> DomResult<()> {
    compose::ensure_ids(doc, node);
    write_flattened(doc, node, out);
    Ok(())
}

fn write_flattened(doc: &Document, node: NodeId, out: &mut String) {
    let Ok(slot) = doc.slot(node) else {
        return;
    };
    if let Some(text) = slot.text() {
        out.push_str(&text.data);
        return;
    }

    let expansion = compose::light_slotted(doc, node);
    if expansion.len() == 1 && expansion[0] == node {
        write_element(doc, node, out);
        return;
    }
    for member in expansion {
        if member == node {
            write_element(doc, node, out);
        } else {
            write_flattened(doc, member, out);
        }
    }
}

fn write_element(doc: &Document, node: NodeId, out: &mut String) {
    let Ok(el) = doc.element(node) else {
        return;
    };
    let tag = el.tag.clone();
    out.push('<');
    out.push_str(&tag);
    for (name, value) in doc.attributes(node) {
        out.push(' ');
        out.push_str(&name);
        if !value.is_empty() {
            out.push_str("=\"");
            out.push_str(&escape_attribute(&value));
            out.push('"');
        }
    }
    out.push('>');
    if VOID_TAGS.contains(&tag.as_str()) {
        return;
    }
    for child in compose::light_children(doc, node) {
        write_flattened(doc, child, out);
    }
    out.push_str("</");
    out.push_str(&tag);
    out.push('>');
}
