#![forbid(unsafe_code)]

//! Add/remove notification bus for keyed collections.
//!
//! A [`Listener<K, V>`] is either **live** or **frozen**:
//!
//! ```text
//!            disable_reactivity()
//!   Live  ───────────────────────▶  Frozen (queue accumulating)
//!     ▲                                 │
//!     └─────────────────────────────────┘
//!     enable_reactivity(): replay queue, clear, thaw
//! ```
//!
//! # Invariants
//!
//! 1. While frozen, the queue holds at most one entry per key: emitting for a
//!    key that already has a queued entry drops the stale entry (whatever its
//!    sign) and appends the new one. Last write wins per key.
//! 2. Replay follows enqueue order of the surviving entries and uses the
//!    handler sets current at replay time.
//! 3. Thaw is atomic for callers: emissions made by handlers during replay
//!    are queued behind the replay and delivered before the listener goes
//!    live, so they never interleave with replayed events.
//!
//! This is deliberately different from [`Reference`](crate::Reference),
//! which drops updates made while disabled: collection views need every
//! surviving membership change, scalar bindings only the latest value.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::config::FaultPolicy;
use crate::handler::{DeferredFault, HandlerSet, fan_out};
use crate::model::Model;
use crate::value::NodeId;

// ─── Events ──────────────────────────────────────────────────────────────────

/// Direction of a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sign {
    Added,
    Removed,
}

impl Sign {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Removed => "removed",
        }
    }
}

/// A queued membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerEvent<K, V> {
    pub sign: Sign,
    pub index: K,
    pub value: V,
}

// ─── Item handlers ───────────────────────────────────────────────────────────

/// Handler receiving `(index, value)` of an added or removed item.
///
/// Identity is pointer identity, as for [`Handler`](crate::Handler).
pub struct ItemHandler<K, V>(Rc<dyn Fn(&K, &V)>);

impl<K, V> ItemHandler<K, V> {
    pub fn new(f: impl Fn(&K, &V) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, index: &K, value: &V) {
        (self.0)(index, value);
    }
}

impl<K, V> Clone for ItemHandler<K, V> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<K, V> PartialEq for ItemHandler<K, V> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<K, V> Eq for ItemHandler<K, V> {}

impl<K, V> fmt::Debug for ItemHandler<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ItemHandler")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

// ─── Listener ────────────────────────────────────────────────────────────────

struct ListenerInner<K, V> {
    on_added: HandlerSet<ItemHandler<K, V>>,
    on_removed: HandlerSet<ItemHandler<K, V>>,
    frozen: bool,
    queue: Vec<ListenerEvent<K, V>>,
    fault_policy: FaultPolicy,
}

/// Change bus for a keyed collection.
///
/// Cloning a `Listener` creates a new handle to the **same** inner state.
pub struct Listener<K, V> {
    id: NodeId,
    inner: Rc<RefCell<ListenerInner<K, V>>>,
}

impl<K, V> Clone for Listener<K, V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<K, V> fmt::Debug for Listener<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("frozen", &inner.frozen)
            .field("queued", &inner.queue.len())
            .field("on_added", &inner.on_added.len())
            .field("on_removed", &inner.on_removed.len())
            .finish()
    }
}

impl<K, V> Default for Listener<K, V>
where
    K: Clone + PartialEq + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Listener<K, V>
where
    K: Clone + PartialEq + 'static,
    V: Clone + 'static,
{
    /// Create a live listener with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NodeId::next(),
            inner: Rc::new(RefCell::new(ListenerInner {
                on_added: HandlerSet::default(),
                on_removed: HandlerSet::default(),
                frozen: false,
                queue: Vec::new(),
                fault_policy: FaultPolicy::default(),
            })),
        }
    }

    #[must_use]
    pub fn with_fault_policy(self, policy: FaultPolicy) -> Self {
        self.inner.borrow_mut().fault_policy = policy;
        self
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.borrow().frozen
    }

    /// Number of queued events.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.inner.borrow().queue.len()
    }

    /// Copy of the queued events, in replay order.
    #[must_use]
    pub fn queued(&self) -> Vec<ListenerEvent<K, V>> {
        self.inner.borrow().queue.clone()
    }

    pub fn on_add(&self, handler: &ItemHandler<K, V>) {
        self.inner.borrow_mut().on_added.insert(handler);
    }

    pub fn on_remove(&self, handler: &ItemHandler<K, V>) {
        self.inner.borrow_mut().on_removed.insert(handler);
    }

    pub fn off_add(&self, handler: &ItemHandler<K, V>) {
        self.inner.borrow_mut().on_added.remove(handler);
    }

    pub fn off_remove(&self, handler: &ItemHandler<K, V>) {
        self.inner.borrow_mut().on_removed.remove(handler);
    }

    pub fn emit_added(&self, index: K, value: V) {
        self.emit(Sign::Added, index, value);
    }

    pub fn emit_removed(&self, index: K, value: V) {
        self.emit(Sign::Removed, index, value);
    }

    fn emit(&self, sign: Sign, index: K, value: V) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.frozen {
                let before = inner.queue.len();
                inner.queue.retain(|event| event.index != index);
                if inner.queue.len() != before {
                    trace!(listener = %self.id, sign = sign.as_str(), "collapsed stale queued event");
                }
                inner.queue.push(ListenerEvent { sign, index, value });
                return;
            }
        }
        self.dispatch(&ListenerEvent { sign, index, value });
    }

    fn dispatch(&self, event: &ListenerEvent<K, V>) {
        let (handlers, policy) = {
            let inner = self.inner.borrow();
            let set = match event.sign {
                Sign::Added => &inner.on_added,
                Sign::Removed => &inner.on_removed,
            };
            (set.snapshot(), inner.fault_policy)
        };
        fan_out(&handlers, policy, self.id, event.sign.as_str(), |h| {
            h.call(&event.index, &event.value);
        });
    }

    /// Enter the frozen state. Subsequent emissions are queued.
    pub fn disable_reactivity(&self) {
        self.inner.borrow_mut().frozen = true;
    }

    /// Replay the queue to the current handlers, then go live.
    ///
    /// No-op when already live. Under [`FaultPolicy::Propagate`] the whole
    /// queue is still replayed and the listener is live before the first
    /// handler panic is resumed.
    pub fn enable_reactivity(&self) {
        if !self.is_frozen() {
            return;
        }
        let mut replayed = 0_usize;
        let mut fault = DeferredFault::default();
        loop {
            let batch = std::mem::take(&mut self.inner.borrow_mut().queue);
            if batch.is_empty() {
                break;
            }
            replayed += batch.len();
            for event in &batch {
                fault.run(|| self.dispatch(event));
            }
        }
        self.inner.borrow_mut().frozen = false;
        debug!(listener = %self.id, replayed, "listener thawed");
        fault.resume();
    }
}

impl<K, V> Model for Listener<K, V>
where
    K: Clone + PartialEq + 'static,
    V: Clone + 'static,
{
    fn enable_reactivity(&self) {
        Listener::enable_reactivity(self);
    }

    fn disable_reactivity(&self) {
        Listener::disable_reactivity(self);
    }
}
