#![forbid(unsafe_code)]

//! Change handlers and fault-isolated fan-out.
//!
//! # Invariants
//!
//! 1. Handler identity is pointer identity: two clones of the same
//!    [`Handler`] are equal, two handlers built from identical closures are not.
//! 2. A [`HandlerSet`] never holds the same handler twice.
//! 3. Fan-out iterates a snapshot, so handlers may subscribe or unsubscribe
//!    while being notified without corrupting the set. Changes made mid
//!    fan-out take effect on the next emission.
//!
//! # Failure Modes
//!
//! - **Handler panics**: caught per handler, logged at WARN, counted in
//!   [`handler_faults_total`]. Remaining handlers still run. Under
//!   [`FaultPolicy::Propagate`] the first panic is resumed after the last
//!   handler returns.
//! - **Multi-step transitions** (listener thaw, owner cascades) run every
//!   step under a [`DeferredFault`], finish the transition, then resume.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use crate::config::FaultPolicy;
use crate::value::NodeId;

// ─── Metrics counters ────────────────────────────────────────────────────────

static HANDLER_FAULTS_TOTAL: AtomicU64 = AtomicU64::new(0);

/// Total number of handler panics caught during fan-out (process-wide).
#[must_use]
pub fn handler_faults_total() -> u64 {
    HANDLER_FAULTS_TOTAL.load(Ordering::Relaxed)
}

// ─── Handler ─────────────────────────────────────────────────────────────────

/// A change handler receiving the new value of a node.
pub struct Handler<T: ?Sized>(Rc<dyn Fn(&T)>);

impl<T: ?Sized> Handler<T> {
    pub fn new(f: impl Fn(&T) + 'static) -> Self {
        Self(Rc::new(f))
    }

    pub fn call(&self, value: &T) {
        (self.0)(value);
    }
}

impl<T: ?Sized> Clone for Handler<T> {
    fn clone(&self) -> Self {
        Self(Rc::clone(&self.0))
    }
}

impl<T: ?Sized> PartialEq for Handler<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: ?Sized> Eq for Handler<T> {}

impl<T: ?Sized> fmt::Debug for Handler<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler")
            .field(&Rc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

// ─── HandlerSet ──────────────────────────────────────────────────────────────

/// Insertion-ordered set of handlers without duplicates.
#[derive(Debug)]
pub(crate) struct HandlerSet<H> {
    handlers: Vec<H>,
}

impl<H> Default for HandlerSet<H> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<H: Clone + PartialEq> HandlerSet<H> {
    /// Returns `false` if the handler was already present.
    pub(crate) fn insert(&mut self, handler: &H) -> bool {
        if self.handlers.contains(handler) {
            return false;
        }
        self.handlers.push(handler.clone());
        true
    }

    /// Returns `false` if the handler was not present.
    pub(crate) fn remove(&mut self, handler: &H) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h != handler);
        self.handlers.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<H> {
        self.handlers.clone()
    }

    pub(crate) fn clear(&mut self) {
        self.handlers.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.handlers.len()
    }
}

// ─── Fan-out ─────────────────────────────────────────────────────────────────

/// Invoke every handler in `handlers`, isolating panics per handler.
///
/// `origin` and `kind` only feed the WARN event emitted for a fault.
pub(crate) fn fan_out<H>(
    handlers: &[H],
    policy: FaultPolicy,
    origin: NodeId,
    kind: &'static str,
    invoke: impl Fn(&H),
) {
    let mut first_fault: Option<Box<dyn Any + Send>> = None;
    for (index, handler) in handlers.iter().enumerate() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| invoke(handler)));
        if let Err(payload) = outcome {
            HANDLER_FAULTS_TOTAL.fetch_add(1, Ordering::Relaxed);
            warn!(
                node = %origin,
                kind,
                index,
                payload = panic_message(payload.as_ref()),
                "handler panicked during fan-out"
            );
            if policy == FaultPolicy::Propagate && first_fault.is_none() {
                first_fault = Some(payload);
            }
        }
    }
    if let Some(payload) = first_fault {
        panic::resume_unwind(payload);
    }
}

/// First panic caught across a multi-step state transition.
///
/// Each step runs under [`run`](Self::run); the transition is completed by
/// the caller and only then is the first captured panic resumed.
#[derive(Default)]
pub(crate) struct DeferredFault(Option<Box<dyn Any + Send>>);

impl DeferredFault {
    pub(crate) fn run(&mut self, step: impl FnOnce()) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(step)) {
            if self.0.is_none() {
                self.0 = Some(payload);
            }
        }
    }

    /// Resume the first captured panic, if any.
    pub(crate) fn resume(self) {
        if let Some(payload) = self.0 {
            panic::resume_unwind(payload);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
