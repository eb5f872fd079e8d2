#![forbid(unsafe_code)]

//! Values that shadow another Value.
//!
//! A [`Mirror<T>`] republishes every change of its source through its own
//! [`Reference`]. Writes to a bidirectional mirror flow back into the
//! source; writes to a forward-only mirror stay local.
//!
//! A [`Pointer<T>`] is a mirror whose source can be swapped at runtime while
//! its own identity and subscribers stay put.
//!
//! # Invariants
//!
//! 1. The single upstream handler is registered on at most one source, and
//!    only while the mirror is enabled.
//! 2. `enable` resyncs from the source, recovering an update missed while
//!    disabled.
//! 3. After `point(new)`, changes of the previous source never reach the
//!    pointer's subscribers.
//! 4. `point(new)` leaves the pointer enabled and resynced from `new`, even
//!    when it was disabled before the call.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::config::FaultPolicy;
use crate::handler::Handler;
use crate::reference::Reference;
use crate::value::{Destroyable, NodeId, Reactivity, Value};

struct MirrorInner<T> {
    pointed: Rc<dyn Value<Item = T>>,
    enabled: bool,
}

/// A Value shadowing another Value.
///
/// Cloning a `Mirror` creates a new handle to the **same** inner state.
pub struct Mirror<T> {
    id: NodeId,
    own: Reference<T>,
    handler: Handler<T>,
    forward_only: bool,
    inner: Rc<RefCell<MirrorInner<T>>>,
}

impl<T> Clone for Mirror<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            own: self.own.clone(),
            handler: self.handler.clone(),
            forward_only: self.forward_only,
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Mirror<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Mirror")
            .field("id", &self.id)
            .field("own", &self.own)
            .field("pointed", &inner.pointed.id())
            .field("forward_only", &self.forward_only)
            .field("enabled", &inner.enabled)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Mirror<T> {
    /// Mirror `source`. Writes go back to `source` unless `forward_only`.
    pub fn new<V>(source: &V, forward_only: bool) -> Self
    where
        V: Value<Item = T> + Clone + 'static,
    {
        Self::from_shared(Rc::new(source.clone()), forward_only)
    }

    /// Mirror `source` one way: source changes flow in, writes stay local.
    pub fn forward<V>(source: &V) -> Self
    where
        V: Value<Item = T> + Clone + 'static,
    {
        Self::new(source, true)
    }

    /// Mirror an already shared source handle.
    pub fn from_shared(source: Rc<dyn Value<Item = T>>, forward_only: bool) -> Self {
        let own = Reference::new(source.get());
        let handler = {
            let own = own.clone();
            Handler::new(move |value: &T| own.set(value.clone()))
        };
        source.subscribe(&handler);
        Self {
            id: NodeId::next(),
            own,
            handler,
            forward_only,
            inner: Rc::new(RefCell::new(MirrorInner {
                pointed: source,
                enabled: true,
            })),
        }
    }

    /// Set the handler fault policy of the mirror's own subscribers.
    #[must_use]
    pub fn with_fault_policy(self, policy: FaultPolicy) -> Self {
        self.own.set_fault_policy(policy);
        self
    }

    #[must_use]
    pub fn is_forward_only(&self) -> bool {
        self.forward_only
    }

    /// Id of the Value currently mirrored.
    #[must_use]
    pub fn pointed_id(&self) -> NodeId {
        self.inner.borrow().pointed.id()
    }

    fn pointed(&self) -> Rc<dyn Value<Item = T>> {
        Rc::clone(&self.inner.borrow().pointed)
    }

    /// Swap the source: detach from the old one, then attach to the new one
    /// and resync. The mirror is enabled afterwards even if it was disabled.
    fn repoint(&self, source: Rc<dyn Value<Item = T>>) {
        if self.pointed_id() == source.id() {
            return;
        }
        self.disable();
        let previous = std::mem::replace(&mut self.inner.borrow_mut().pointed, source);
        debug!(node = %self.id, from = %previous.id(), to = %self.pointed_id(), "pointer retargeted");
        self.enable();
    }
}

impl<T: Clone + PartialEq + 'static> Destroyable for Mirror<T> {
    fn destroy(&self) {
        self.disable();
        self.own.destroy();
    }
}

impl<T: Clone + PartialEq + 'static> Reactivity for Mirror<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn enable(&self) {
        let pointed = {
            let mut inner = self.inner.borrow_mut();
            if inner.enabled {
                return;
            }
            inner.enabled = true;
            Rc::clone(&inner.pointed)
        };
        pointed.subscribe(&self.handler);
        self.own.set(pointed.get());
    }

    fn disable(&self) {
        let pointed = {
            let mut inner = self.inner.borrow_mut();
            if !inner.enabled {
                return;
            }
            inner.enabled = false;
            Rc::clone(&inner.pointed)
        };
        pointed.unsubscribe(&self.handler);
    }

    fn is_enabled(&self) -> bool {
        self.inner.borrow().enabled
    }
}

impl<T: Clone + PartialEq + 'static> Value for Mirror<T> {
    type Item = T;

    fn get(&self) -> T {
        self.own.get()
    }

    fn set(&self, value: T) {
        if self.forward_only {
            self.own.set(value);
            return;
        }
        self.own.set(value.clone());
        self.pointed().set(value);
    }

    fn subscribe(&self, handler: &Handler<T>) {
        self.own.subscribe(handler);
    }

    fn unsubscribe(&self, handler: &Handler<T>) {
        self.own.unsubscribe(handler);
    }
}

// ─── Pointer ─────────────────────────────────────────────────────────────────

/// A [`Mirror`] that can be retargeted with [`point`](Pointer::point).
#[derive(Clone)]
pub struct Pointer<T> {
    mirror: Mirror<T>,
}

impl<T: fmt::Debug> fmt::Debug for Pointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Pointer").field(&self.mirror).finish()
    }
}

impl<T: Clone + PartialEq + 'static> Pointer<T> {
    pub fn new<V>(source: &V, forward_only: bool) -> Self
    where
        V: Value<Item = T> + Clone + 'static,
    {
        Self {
            mirror: Mirror::new(source, forward_only),
        }
    }

    pub fn from_shared(source: Rc<dyn Value<Item = T>>, forward_only: bool) -> Self {
        Self {
            mirror: Mirror::from_shared(source, forward_only),
        }
    }

    #[must_use]
    pub fn with_fault_policy(self, policy: FaultPolicy) -> Self {
        Self {
            mirror: self.mirror.with_fault_policy(policy),
        }
    }

    /// Retarget at `source` and go live on it, resyncing the value. No-op if
    /// `source` is already the pointed Value.
    pub fn point<V>(&self, source: &V)
    where
        V: Value<Item = T> + Clone + 'static,
    {
        if self.mirror.pointed_id() == source.id() {
            return;
        }
        self.mirror.repoint(Rc::new(source.clone()));
    }

    /// Retarget at an already shared handle.
    pub fn point_shared(&self, source: Rc<dyn Value<Item = T>>) {
        self.mirror.repoint(source);
    }

    #[must_use]
    pub fn pointed_id(&self) -> NodeId {
        self.mirror.pointed_id()
    }

    #[must_use]
    pub fn is_forward_only(&self) -> bool {
        self.mirror.is_forward_only()
    }

    #[must_use]
    pub fn as_mirror(&self) -> &Mirror<T> {
        &self.mirror
    }
}

impl<T: Clone + PartialEq + 'static> Destroyable for Pointer<T> {
    fn destroy(&self) {
        self.mirror.destroy();
    }
}

impl<T: Clone + PartialEq + 'static> Reactivity for Pointer<T> {
    fn id(&self) -> NodeId {
        self.mirror.id()
    }

    fn enable(&self) {
        self.mirror.enable();
    }

    fn disable(&self) {
        self.mirror.disable();
    }

    fn is_enabled(&self) -> bool {
        self.mirror.is_enabled()
    }
}

impl<T: Clone + PartialEq + 'static> Value for Pointer<T> {
    type Item = T;

    fn get(&self) -> T {
        self.mirror.get()
    }

    fn set(&self, value: T) {
        self.mirror.set(value);
    }

    fn subscribe(&self, handler: &Handler<T>) {
        self.mirror.subscribe(handler);
    }

    fn unsubscribe(&self, handler: &Handler<T>) {
        self.mirror.unsubscribe(handler);
    }
}
