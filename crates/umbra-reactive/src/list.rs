//! Observable ordered collection
//!
//! Every mutation produces one typed [`ListChange`] descriptor carrying the
//! position information subscribers need to mirror the edit with a minimal
//! structural change of their own.

use std::collections::HashSet;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::{Reaction, ReactiveError, Subscription};

/// Typed change descriptor for an ordered collection
#[derive(Debug, Clone, PartialEq)]
pub enum ListChange<T> {
    /// `item` was inserted at `index`
    Added { index: usize, item: T },
    /// The item at `index` was removed
    Removed { index: usize },
    /// The item at `index` was replaced by `item`
    Replaced { index: usize, item: T },
    /// The item at `from` now lives at `to`; everything between shifted
    Moved { from: usize, to: usize },
    /// The collection was cleared
    Reset,
}

/// A shared observable ordered collection
pub struct ObservableList<T, C> {
    state: Arc<Mutex<State<T, C>>>,
}

struct State<T, C> {
    items: Vec<T>,
    subscribers: Vec<(u64, Reaction<C, ListChange<T>>)>,
    cancelled: HashSet<u64>,
    next_id: u64,
    dispatching: bool,
}

impl<T, C> Clone for ObservableList<T, C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: std::fmt::Debug, C> std::fmt::Debug for ObservableList<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableList").field("items", &self.lock().items).finish()
    }
}

impl<T, C> Default for ObservableList<T, C>
where
    T: Clone + Send + 'static,
    C: 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, C> ObservableList<T, C> {
    fn lock(&self) -> MutexGuard<'_, State<T, C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, C> ObservableList<T, C>
where
    T: Clone + Send + 'static,
    C: 'static,
{
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                items,
                subscribers: Vec::new(),
                cancelled: HashSet::new(),
                next_id: 0,
                dispatching: false,
            })),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Item at `index`, cloned out
    pub fn get(&self, index: usize) -> Option<T> {
        self.lock().items.get(index).cloned()
    }

    /// Snapshot of the current items
    pub fn snapshot(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    /// Append an item to the tail
    pub fn push(&self, ctx: &mut C, item: T) -> Result<(), ReactiveError> {
        let index = self.len();
        self.insert(ctx, index, item)
    }

    /// Insert an item at `index`
    pub fn insert(&self, ctx: &mut C, index: usize, item: T) -> Result<(), ReactiveError> {
        self.mutate(ctx, |items| {
            if index > items.len() {
                return Err(ReactiveError::IndexOutOfBounds { index, len: items.len() });
            }
            items.insert(index, item.clone());
            Ok(((), Some(ListChange::Added { index, item })))
        })
    }

    /// Remove and return the item at `index`
    pub fn remove(&self, ctx: &mut C, index: usize) -> Result<T, ReactiveError> {
        self.mutate(ctx, |items| {
            if index >= items.len() {
                return Err(ReactiveError::IndexOutOfBounds { index, len: items.len() });
            }
            let removed = items.remove(index);
            Ok((removed, Some(ListChange::Removed { index })))
        })
    }

    /// Replace the item at `index`, returning the old item
    pub fn replace(&self, ctx: &mut C, index: usize, item: T) -> Result<T, ReactiveError> {
        self.mutate(ctx, |items| {
            if index >= items.len() {
                return Err(ReactiveError::IndexOutOfBounds { index, len: items.len() });
            }
            let old = mem::replace(&mut items[index], item.clone());
            Ok((old, Some(ListChange::Replaced { index, item })))
        })
    }

    /// Move the item at `from` so it ends up at `to`
    pub fn move_item(&self, ctx: &mut C, from: usize, to: usize) -> Result<(), ReactiveError> {
        self.mutate(ctx, |items| {
            let len = items.len();
            if from >= len {
                return Err(ReactiveError::IndexOutOfBounds { index: from, len });
            }
            if to >= len {
                return Err(ReactiveError::IndexOutOfBounds { index: to, len });
            }
            if from == to {
                return Ok(((), None));
            }
            let item = items.remove(from);
            items.insert(to, item);
            Ok(((), Some(ListChange::Moved { from, to })))
        })
    }

    /// Remove every item
    pub fn clear(&self, ctx: &mut C) -> Result<(), ReactiveError> {
        self.mutate(ctx, |items| {
            items.clear();
            Ok(((), Some(ListChange::Reset)))
        })
    }

    /// Register a reaction; returns its cancel handle
    pub fn subscribe(
        &self,
        reaction: impl FnMut(&mut C, &ListChange<T>) -> Result<(), ReactiveError> + Send + 'static,
    ) -> Subscription {
        let mut st = self.lock();
        let id = st.next_id;
        st.next_id += 1;
        st.subscribers.push((id, Box::new(reaction)));
        drop(st);

        let weak = Arc::downgrade(&self.state);
        Subscription::new(move || cancel_subscriber(&weak, id))
    }

    fn mutate<R>(
        &self,
        ctx: &mut C,
        op: impl FnOnce(&mut Vec<T>) -> Result<(R, Option<ListChange<T>>), ReactiveError>,
    ) -> Result<R, ReactiveError> {
        let mut st = self.lock();
        if st.dispatching {
            return Err(ReactiveError::Cycle);
        }
        let (result, change) = op(&mut st.items)?;
        let Some(change) = change else {
            return Ok(result);
        };
        st.dispatching = true;
        let mut active = mem::take(&mut st.subscribers);
        drop(st);

        tracing::trace!(
            subscribers = active.len(),
            kind = change_kind(&change),
            "collection changed"
        );
        let mut outcome = Ok(());
        for (id, reaction) in active.iter_mut() {
            if self.lock().cancelled.contains(id) {
                continue;
            }
            if let Err(err) = reaction(ctx, &change) {
                outcome = Err(err);
                break;
            }
        }

        let mut st = self.lock();
        let added = mem::take(&mut st.subscribers);
        active.extend(added);
        let cancelled = mem::take(&mut st.cancelled);
        active.retain(|(id, _)| !cancelled.contains(id));
        st.subscribers = active;
        st.dispatching = false;
        outcome.map(|()| result)
    }
}

fn change_kind<T>(change: &ListChange<T>) -> &'static str {
    match change {
        ListChange::Added { .. } => "added",
        ListChange::Removed { .. } => "removed",
        ListChange::Replaced { .. } => "replaced",
        ListChange::Moved { .. } => "moved",
        ListChange::Reset => "reset",
    }
}

fn cancel_subscriber<T, C>(weak: &Weak<Mutex<State<T, C>>>, id: u64) {
    let Some(state) = weak.upgrade() else {
        return;
    };
    let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(pos) = st.subscribers.iter().position(|(sid, _)| *sid == id) {
        st.subscribers.remove(pos);
    } else {
        st.cancelled.insert(id);
    }
}
