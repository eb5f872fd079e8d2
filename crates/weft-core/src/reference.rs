#![forbid(unsafe_code)]

//! Primitive mutable value holder.
//!
//! [`Reference<T>`] is the only node kind that stores state of its own. Every
//! other node republishes through an internal `Reference`.
//!
//! # Invariants
//!
//! 1. `set` with a value equal to the current one is a no-op: no mutation,
//!    no notification.
//! 2. While disabled, `set` still stores the value but notifies nobody.
//!    Intermediate values written while disabled are never replayed.
//! 3. `enable` after `disable` replays the current value exactly once to
//!    every subscriber.
//! 4. `disable` is a pure flag flip; value and subscribers are untouched.
//!
//! # Failure Modes
//!
//! - **Handler panics**: isolated per handler (see [`crate::handler`]).
//! - **Re-entrant writes**: a handler may `set` the same reference. The
//!   equality guard is the only cycle breaker; two handlers ping-ponging
//!   different values will recurse until the stack overflows.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::FaultPolicy;
use crate::handler::{Handler, HandlerSet, fan_out};
use crate::value::{Destroyable, NodeId, Reactivity, Value};

struct ReferenceInner<T> {
    value: T,
    subscribers: HandlerSet<Handler<T>>,
    enabled: bool,
    fault_policy: FaultPolicy,
}

/// A mutable value cell with its own subscriber set.
///
/// Cloning a `Reference` creates a new handle to the **same** inner state.
pub struct Reference<T> {
    id: NodeId,
    inner: Rc<RefCell<ReferenceInner<T>>>,
}

impl<T> Clone for Reference<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Reference<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Reference")
            .field("id", &self.id)
            .field("value", &inner.value)
            .field("enabled", &inner.enabled)
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Reference<T> {
    /// Create an enabled reference holding `value`.
    pub fn new(value: T) -> Self {
        Self {
            id: NodeId::next(),
            inner: Rc::new(RefCell::new(ReferenceInner {
                value,
                subscribers: HandlerSet::default(),
                enabled: true,
                fault_policy: FaultPolicy::default(),
            })),
        }
    }

    /// Set the handler fault policy.
    #[must_use]
    pub fn with_fault_policy(self, policy: FaultPolicy) -> Self {
        self.set_fault_policy(policy);
        self
    }

    pub(crate) fn set_fault_policy(&self, policy: FaultPolicy) {
        self.inner.borrow_mut().fault_policy = policy;
    }

    /// Access the current value by reference without cloning.
    ///
    /// # Panics
    ///
    /// Panics if the closure writes to the same `Reference` (re-entrant borrow).
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.borrow().value)
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.borrow().subscribers.len()
    }

    fn notify(&self, subscribers: &[Handler<T>], policy: FaultPolicy, value: &T) {
        fan_out(subscribers, policy, self.id, "reference", |h| h.call(value));
    }
}

impl<T: Clone + PartialEq + 'static> Destroyable for Reference<T> {
    fn destroy(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.subscribers.clear();
        inner.enabled = false;
    }
}

impl<T: Clone + PartialEq + 'static> Reactivity for Reference<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn enable(&self) {
        let (subscribers, policy, value) = {
            let mut inner = self.inner.borrow_mut();
            if inner.enabled {
                return;
            }
            // Flag first: a subscriber that calls `enable` during the replay
            // must not trigger a second replay.
            inner.enabled = true;
            (
                inner.subscribers.snapshot(),
                inner.fault_policy,
                inner.value.clone(),
            )
        };
        self.notify(&subscribers, policy, &value);
    }

    fn disable(&self) {
        self.inner.borrow_mut().enabled = false;
    }

    fn is_enabled(&self) -> bool {
        self.inner.borrow().enabled
    }
}

impl<T: Clone + PartialEq + 'static> Value for Reference<T> {
    type Item = T;

    fn get(&self) -> T {
        self.inner.borrow().value.clone()
    }

    fn set(&self, value: T) {
        let (subscribers, policy) = {
            let mut inner = self.inner.borrow_mut();
            if inner.value == value {
                return;
            }
            inner.value = value.clone();
            if !inner.enabled {
                return;
            }
            (inner.subscribers.snapshot(), inner.fault_policy)
        };
        self.notify(&subscribers, policy, &value);
    }

    fn subscribe(&self, handler: &Handler<T>) {
        self.inner.borrow_mut().subscribers.insert(handler);
    }

    fn unsubscribe(&self, handler: &Handler<T>) {
        self.inner.borrow_mut().subscribers.remove(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn counter<T: 'static>() -> (Handler<T>, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        let c = Rc::clone(&count);
        (Handler::new(move |_: &T| c.set(c.get() + 1)), count)
    }

    fn recorder<T: Clone + 'static>() -> (Handler<T>, Rc<RefCell<Vec<T>>>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        (Handler::new(move |v: &T| s.borrow_mut().push(v.clone())), seen)
    }

    #[test]
    fn get_returns_initial() {
        let cell = Reference::new(42);
        assert_eq!(cell.get(), 42);
        assert!(cell.is_enabled());
    }

    #[test]
    fn set_notifies_with_new_value() {
        let cell = Reference::new(1);
        let (h, seen) = recorder();
        cell.subscribe(&h);

        cell.set(2);
        cell.set(3);
        assert_eq!(*seen.borrow(), vec![2, 3]);
        assert_eq!(cell.get(), 3);
    }

    #[test]
    fn equal_set_is_noop() {
        let cell = Reference::new("a".to_string());
        let (h, count) = counter();
        cell.subscribe(&h);

        cell.set("a".to_string());
        assert_eq!(count.get(), 0);

        cell.set("b".to_string());
        cell.set("b".to_string());
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn duplicate_subscribe_fires_once() {
        let cell = Reference::new(0);
        let (h, count) = counter();
        cell.subscribe(&h);
        cell.subscribe(&h);
        assert_eq!(cell.subscriber_count(), 1);

        cell.set(1);
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let cell = Reference::new(0);
        let (h, count) = counter();
        cell.subscribe(&h);
        cell.unsubscribe(&h);
        cell.unsubscribe(&h);

        cell.set(1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn disabled_set_stores_silently() {
        let cell = Reference::new(1);
        let (h, count) = counter();
        cell.subscribe(&h);

        cell.disable();
        cell.set(2);
        assert_eq!(cell.get(), 2);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn enable_replays_only_final_value_once() {
        let cell = Reference::new(1);
        cell.disable();
        cell.set(2);
        cell.set(3);

        let (h, seen) = recorder();
        cell.subscribe(&h);
        cell.enable();
        assert_eq!(*seen.borrow(), vec![3]);

        // Already enabled: no second replay.
        cell.enable();
        assert_eq!(*seen.borrow(), vec![3]);
    }

    #[test]
    fn disable_twice_then_enable_replays_once() {
        let cell = Reference::new(0);
        let (h, count) = counter();
        cell.subscribe(&h);
        cell.disable();
        cell.disable();
        cell.enable();
        assert_eq!(count.get(), 1);
    }

    #[test]
    fn enable_from_inside_the_replay_does_not_replay_again() {
        let cell = Reference::new(0);
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let (d, reentrant) = (Rc::clone(&delivered), cell.clone());
        cell.subscribe(&Handler::new(move |v: &i32| {
            d.borrow_mut().push((*v, reentrant.is_enabled()));
            reentrant.enable();
        }));

        cell.disable();
        cell.set(5);
        cell.enable();

        // Already enabled while the replay runs, so the nested call is a no-op.
        assert_eq!(*delivered.borrow(), vec![(5, true)]);
        assert!(cell.is_enabled());
    }

    #[test]
    fn panicking_subscriber_does_not_block_others() {
        let cell = Reference::new(0);
        let bad = Handler::new(|_: &i32| panic!("bad subscriber"));
        let (good, seen) = recorder();
        cell.subscribe(&bad);
        cell.subscribe(&good);

        cell.set(7);
        assert_eq!(*seen.borrow(), vec![7]);
        assert_eq!(cell.subscriber_count(), 2);
    }

    #[test]
    fn reentrant_set_settles_on_dedup() {
        let cell = Reference::new(0);
        let inner = cell.clone();
        // Clamp to 10 from inside the handler.
        let h = Handler::new(move |v: &i32| {
            if *v > 10 {
                inner.set(10);
            }
        });
        cell.subscribe(&h);

        cell.set(50);
        assert_eq!(cell.get(), 10);
    }

    #[test]
    fn unsubscribe_during_fan_out_is_safe() {
        let cell = Reference::new(0);
        let (other, count) = counter();
        let target = cell.clone();
        let other_clone = other.clone();
        let remover = Handler::new(move |_: &i32| target.unsubscribe(&other_clone));
        cell.subscribe(&remover);
        cell.subscribe(&other);

        cell.set(1);
        cell.set(2);
        assert!(count.get() <= 1);
        assert_eq!(cell.subscriber_count(), 1);
    }

    #[test]
    fn destroy_clears_subscribers() {
        let cell = Reference::new(0);
        let (h, count) = counter();
        cell.subscribe(&h);
        cell.destroy();
        assert_eq!(cell.subscriber_count(), 0);
        cell.set(1);
        assert_eq!(count.get(), 0);
    }

    #[test]
    fn clone_shares_state() {
        let a = Reference::new(1);
        let b = a.clone();
        b.set(9);
        assert_eq!(a.get(), 9);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn with_reads_without_clone() {
        let cell = Reference::new(vec![1, 2, 3]);
        assert_eq!(cell.with(|v| v.iter().sum::<i32>()), 6);
    }

    #[test]
    fn debug_format() {
        let cell = Reference::new(5);
        let dbg = format!("{cell:?}");
        assert!(dbg.contains("Reference"));
        assert!(dbg.contains('5'));
    }
}
