//! Observable value cell
//!
//! A shared single-value source. Setting a new value notifies subscribers
//! synchronously on the calling thread; setting an equal value is a no-op.

use std::collections::HashSet;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::{Reaction, ReactiveError, Subscription};

/// A shared observable cell holding one value
pub struct Value<T, C> {
    state: Arc<Mutex<State<T, C>>>,
}

struct State<T, C> {
    value: T,
    subscribers: Vec<(u64, Reaction<C, T>)>,
    cancelled: HashSet<u64>,
    next_id: u64,
    dispatching: bool,
}

impl<T, C> Clone for Value<T, C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: std::fmt::Debug, C> std::fmt::Debug for Value<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Value").field("value", &self.lock().value).finish()
    }
}

impl<T, C> Value<T, C> {
    fn lock(&self) -> MutexGuard<'_, State<T, C>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T, C> Value<T, C>
where
    T: Clone + PartialEq + Send + 'static,
    C: 'static,
{
    pub fn new(value: T) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                value,
                subscribers: Vec::new(),
                cancelled: HashSet::new(),
                next_id: 0,
                dispatching: false,
            })),
        }
    }

    /// Current value (cloned out of the cell)
    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Store a new value and notify subscribers in registration order.
    ///
    /// An unchanged value does not notify. A call made while this source is
    /// already dispatching fails with [`ReactiveError::Cycle`] and leaves the
    /// stored value untouched.
    pub fn set(&self, ctx: &mut C, value: T) -> Result<(), ReactiveError> {
        let mut st = self.lock();
        if st.value == value {
            return Ok(());
        }
        if st.dispatching {
            return Err(ReactiveError::Cycle);
        }
        st.value = value.clone();
        st.dispatching = true;
        let mut active = mem::take(&mut st.subscribers);
        drop(st);

        tracing::trace!(subscribers = active.len(), "value changed, dispatching");
        let mut outcome = Ok(());
        for (id, reaction) in active.iter_mut() {
            if self.lock().cancelled.contains(id) {
                continue;
            }
            if let Err(err) = reaction(ctx, &value) {
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
        outcome
    }

    /// Register a reaction; returns its cancel handle.
    ///
    /// The reaction is not invoked for the value already stored — callers
    /// that need an initial render run it once themselves.
    pub fn subscribe(
        &self,
        reaction: impl FnMut(&mut C, &T) -> Result<(), ReactiveError> + Send + 'static,
    ) -> Subscription {
        let mut st = self.lock();
        let id = st.next_id;
        st.next_id += 1;
        st.subscribers.push((id, Box::new(reaction)));
        drop(st);

        let weak = Arc::downgrade(&self.state);
        Subscription::new(move || cancel_subscriber(&weak, id))
    }

    /// Number of attached reactions (cancelled ones excluded)
    pub fn subscriber_count(&self) -> usize {
        let st = self.lock();
        st.subscribers.iter().filter(|(id, _)| !st.cancelled.contains(id)).count()
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
        // Reaction list is checked out for a dispatch; flag for removal on merge.
        st.cancelled.insert(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(Vec<String>);

    #[test]
    fn test_set_notifies_in_order() {
        let mut log = Log::default();
        let value: Value<i32, Log> = Value::new(0);
        let mut sub_a = value.subscribe(|ctx, v| {
            ctx.0.push(format!("a={v}"));
            Ok(())
        });
        let _sub_b = value.subscribe(|ctx, v| {
            ctx.0.push(format!("b={v}"));
            Ok(())
        });

        value.set(&mut log, 5).unwrap();
        assert_eq!(log.0, vec!["a=5", "b=5"]);

        sub_a.cancel();
        value.set(&mut log, 6).unwrap();
        assert_eq!(log.0, vec!["a=5", "b=5", "b=6"]);
    }

    #[test]
    fn test_unchanged_value_skips_dispatch() {
        let mut log = Log::default();
        let value: Value<i32, Log> = Value::new(3);
        let _sub = value.subscribe(|ctx, _| {
            ctx.0.push("fired".into());
            Ok(())
        });

        value.set(&mut log, 3).unwrap();
        assert!(log.0.is_empty());
    }

    #[test]
    fn test_reentrant_set_is_a_cycle() {
        let mut log = Log::default();
        let value: Value<i32, Log> = Value::new(0);
        let inner = value.clone();
        let _sub = value.subscribe(move |ctx, v| inner.set(ctx, v + 1));

        let err = value.set(&mut log, 1).unwrap_err();
        assert!(matches!(err, ReactiveError::Cycle));
        // The rejected inner write must not have landed.
        assert_eq!(value.get(), 1);
    }

    #[test]
    fn test_cancel_during_dispatch() {
        let mut log = Log::default();
        let value: Value<i32, Log> = Value::new(0);

        // First reaction cancels the second mid-dispatch.
        let handle: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let stolen = Arc::clone(&handle);
        let _sub_a = value.subscribe(move |_, _| {
            if let Some(sub) = stolen.lock().unwrap().as_mut() {
                sub.cancel();
            }
            Ok(())
        });
        let sub_b = value.subscribe(|ctx: &mut Log, v: &i32| {
            ctx.0.push(format!("b={v}"));
            Ok(())
        });
        *handle.lock().unwrap() = Some(sub_b);

        value.set(&mut log, 1).unwrap();
        assert!(log.0.is_empty(), "cancelled reaction must not fire");
        assert_eq!(value.subscriber_count(), 1);
    }
}
