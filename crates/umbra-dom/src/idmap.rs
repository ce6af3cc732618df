//! Document identity map
//!
//! Index from element identifier to node handle. Kept consistent by the
//! document as identifiers are assigned, renamed and removed; lookups fail
//! softly.

use std::collections::HashMap;

use crate::NodeId;

#[derive(Default)]
pub(crate) struct IdMap {
    map: HashMap<String, NodeId>,
}

impl IdMap {
    pub fn get(&self, id: &str) -> Option<NodeId> {
        self.map.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    /// Apply an identifier change: drop the old key, claim the new one.
    ///
    /// Both sides are optional so the same path serves assignment, rename
    /// and removal. The caller guarantees the new key is not taken.
    pub fn rename(&mut self, node: NodeId, before: Option<&str>, after: Option<&str>) {
        if let Some(old) = before {
            self.map.remove(old);
        }
        if let Some(new) = after {
            self.map.insert(new.to_string(), node);
        }
    }

    pub fn remove(&mut self, id: &str) {
        self.map.remove(id);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}
