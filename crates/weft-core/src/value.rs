#![forbid(unsafe_code)]

//! The Value capability contract.
//!
//! Every node in the graph ([`Reference`](crate::Reference),
//! [`Expression`](crate::Expression), [`Mirror`](crate::Mirror),
//! [`Pointer`](crate::Pointer)) is a cheaply cloneable handle implementing
//! [`Value`]. The contract is split in two so that an owner can hold
//! heterogeneous nodes behind one type-erased trait:
//!
//! - [`Reactivity`]: identity, enable/disable, teardown. Object safe and
//!   independent of the carried type.
//! - [`Value`]: read, write, subscribe, unsubscribe over its `Item` type.
//!
//! Neither trait has default method bodies, so a node kind that forgets a
//! capability fails to compile instead of failing at runtime.

use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::handler::Handler;

// ─── Node identity ───────────────────────────────────────────────────────────

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a graph node. Clones of a handle share it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Allocate a fresh id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed))
    }

    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ─── Capability traits ───────────────────────────────────────────────────────

/// Something that can be torn down explicitly.
pub trait Destroyable {
    fn destroy(&self);
}

/// Type-erased half of the Value contract.
pub trait Reactivity: Destroyable {
    /// Identity shared by every clone of this handle.
    fn id(&self) -> NodeId;

    /// Resume change propagation. No-op when already enabled.
    fn enable(&self);

    /// Suspend change propagation. No-op when already disabled.
    fn disable(&self);

    fn is_enabled(&self) -> bool;
}

/// A value that can be read, written and observed.
pub trait Value: Reactivity {
    /// The carried value type.
    type Item;

    /// Current value.
    fn get(&self) -> Self::Item;

    /// Write a new value. Writing a value equal to the current one is a no-op.
    fn set(&self, value: Self::Item);

    /// Register `handler` for change notifications. Idempotent.
    fn subscribe(&self, handler: &Handler<Self::Item>);

    /// Remove `handler`. Idempotent.
    fn unsubscribe(&self, handler: &Handler<Self::Item>);
}

// Shared handles (`Rc<dyn Value<Item = T>>` in particular) are Values too.

impl<D: Destroyable + ?Sized> Destroyable for Rc<D> {
    fn destroy(&self) {
        (**self).destroy();
    }
}

impl<R: Reactivity + ?Sized> Reactivity for Rc<R> {
    fn id(&self) -> NodeId {
        (**self).id()
    }

    fn enable(&self) {
        (**self).enable();
    }

    fn disable(&self) {
        (**self).disable();
    }

    fn is_enabled(&self) -> bool {
        (**self).is_enabled()
    }
}

impl<V: Value + ?Sized> Value for Rc<V> {
    type Item = V::Item;

    fn get(&self) -> V::Item {
        (**self).get()
    }

    fn set(&self, value: V::Item) {
        (**self).set(value);
    }

    fn subscribe(&self, handler: &Handler<V::Item>) {
        (**self).subscribe(handler);
    }

    fn unsubscribe(&self, handler: &Handler<V::Item>) {
        (**self).unsubscribe(handler);
    }
}
