#![forbid(unsafe_code)]

//! Aggregation root for a reactive unit.
//!
//! An [`Owner`] creates Values through its factory methods and keeps them in
//! its `watch` set, holds external side-effecting bindings, and registers
//! collection models. It cascades enable/disable to Values and models, and
//! tears everything down in a fixed order on [`destroy`](Destroyable::destroy).
//!
//! The owner never subscribes to anything itself, except through its
//! optional freeze binding ([`Owner::bind_alive`]).
//!
//! # Destroy order
//!
//! 1. every `watch` member is destroyed;
//! 2. every binding is destroyed;
//! 3. every model gets `disable_reactivity` (models are detached, not
//!    destroyed: they may outlive the view that watched them);
//! 4. the freeze expression is destroyed;
//! 5. `run_on_destroy` hooks run, in registration order, exactly once.
//!
//! # Invariants
//!
//! 1. At most one freeze binding per owner.
//! 2. The freeze condition is never one of the owner's own `watch` members.
//! 3. A failed `bind_alive` leaves the owner unchanged.
//! 4. `destroy` is idempotent.
//! 5. A panic escaping one member never cuts a cascade short: every member
//!    is visited and the owner's state is final before the panic resumes.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::config::ReactiveConfig;
use crate::error::{BindingError, Result};
use crate::expression::{Expression, Sources};
use crate::handler::DeferredFault;
use crate::mirror::{Mirror, Pointer};
use crate::model::Model;
use crate::reference::Reference;
use crate::value::{Destroyable, NodeId, Reactivity, Value};

// ─── Freeze hooks ────────────────────────────────────────────────────────────

/// Callbacks run by a freeze binding before the owner is toggled.
#[derive(Default)]
pub struct AliveHooks {
    on_off: Option<Box<dyn Fn()>>,
    on_on: Option<Box<dyn Fn()>>,
}

impl AliveHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run before the owner is disabled.
    #[must_use]
    pub fn on_off(mut self, f: impl Fn() + 'static) -> Self {
        self.on_off = Some(Box::new(f));
        self
    }

    /// Run before the owner is enabled.
    #[must_use]
    pub fn on_on(mut self, f: impl Fn() + 'static) -> Self {
        self.on_on = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for AliveHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AliveHooks")
            .field("on_off", &self.on_off.is_some())
            .field("on_on", &self.on_on.is_some())
            .finish()
    }
}

// ─── Owner ───────────────────────────────────────────────────────────────────

#[derive(Default)]
struct OwnerInner {
    watch: Vec<Rc<dyn Reactivity>>,
    bindings: Vec<Box<dyn Destroyable>>,
    models: Vec<Rc<dyn Model>>,
    enabled: bool,
    frozen: bool,
    destroyed: bool,
    freeze_expr: Option<Expression<()>>,
    on_destroy: Vec<Box<dyn FnOnce()>>,
}

/// The aggregation root of a reactive unit.
///
/// Cloning an `Owner` creates a new handle to the **same** inner state.
///
/// # Example
///
/// ```
/// use weft_core::{Destroyable, Owner, Value};
///
/// let owner = Owner::new();
/// let count = owner.reference(1);
/// let doubled = owner.expr(|&(n,): &(i32,)| n * 2, (count.clone(),));
///
/// count.set(21);
/// assert_eq!(doubled.get(), 42);
///
/// owner.destroy();
/// assert!(owner.is_destroyed());
/// ```
#[derive(Clone)]
pub struct Owner {
    id: NodeId,
    config: Rc<ReactiveConfig>,
    inner: Rc<RefCell<OwnerInner>>,
}

impl fmt::Debug for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Owner")
            .field("label", &self.label())
            .field("watch", &inner.watch.len())
            .field("bindings", &inner.bindings.len())
            .field("models", &inner.models.len())
            .field("enabled", &inner.enabled)
            .field("frozen", &inner.frozen)
            .field("destroyed", &inner.destroyed)
            .finish()
    }
}

impl Default for Owner {
    fn default() -> Self {
        Self::new()
    }
}

impl Owner {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(ReactiveConfig::default())
    }

    #[must_use]
    pub fn with_config(config: ReactiveConfig) -> Self {
        Self {
            id: NodeId::next(),
            config: Rc::new(config),
            inner: Rc::new(RefCell::new(OwnerInner {
                enabled: true,
                ..OwnerInner::default()
            })),
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.id
    }

    #[must_use]
    pub fn config(&self) -> &ReactiveConfig {
        &self.config
    }

    /// Configured label, or `owner#<id>`.
    #[must_use]
    pub fn label(&self) -> String {
        self.config
            .label
            .clone()
            .unwrap_or_else(|| format!("owner{}", self.id))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.borrow().enabled
    }

    /// Whether the freeze binding last saw a false condition.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.inner.borrow().frozen
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.inner.borrow().destroyed
    }

    #[must_use]
    pub fn watch_len(&self) -> usize {
        self.inner.borrow().watch.len()
    }

    #[must_use]
    pub fn binding_len(&self) -> usize {
        self.inner.borrow().bindings.len()
    }

    #[must_use]
    pub fn model_len(&self) -> usize {
        self.inner.borrow().models.len()
    }

    /// Whether `node` was created by (and is still held by) this owner.
    #[must_use]
    pub fn owns(&self, node: NodeId) -> bool {
        self.inner.borrow().watch.iter().any(|w| w.id() == node)
    }

    fn downgrade(&self) -> WeakOwner {
        WeakOwner {
            id: self.id,
            config: Rc::clone(&self.config),
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn track(&self, node: Rc<dyn Reactivity>) {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            return;
        }
        inner.watch.push(node);
    }

    // ── Factories ────────────────────────────────────────────────────

    /// Hold a Value built elsewhere (a custom node kind, say) as if this
    /// owner had created it. Returns it unchanged.
    pub fn adopt<V: Reactivity + Clone + 'static>(&self, node: V) -> V {
        self.track(Rc::new(node.clone()));
        node
    }

    /// Create a [`Reference`] owned by this owner.
    pub fn reference<T: Clone + PartialEq + 'static>(&self, value: T) -> Reference<T> {
        let node = Reference::new(value).with_fault_policy(self.config.fault_policy);
        self.track(Rc::new(node.clone()));
        node
    }

    /// Create a linked [`Expression`] owned by this owner.
    pub fn expr<T, S, F>(&self, func: F, sources: S) -> Expression<T>
    where
        T: Clone + PartialEq + 'static,
        S: Sources,
        F: Fn(&S::Args) -> T + 'static,
    {
        let node = Expression::linked(func, sources).with_fault_policy(self.config.fault_policy);
        self.track(Rc::new(node.clone()));
        node
    }

    /// Like [`expr`](Self::expr), for side effects only.
    pub fn watch<S, F>(&self, func: F, sources: S)
    where
        S: Sources,
        F: Fn(&S::Args) + 'static,
    {
        let _ = self.expr(func, sources);
    }

    /// Create a bidirectional [`Mirror`] of `source`.
    pub fn mirror<V>(&self, source: &V) -> Mirror<V::Item>
    where
        V: Value + Clone + 'static,
        V::Item: Clone + PartialEq + 'static,
    {
        self.adopt_mirror(Mirror::new(source, false))
    }

    /// Create a forward-only [`Mirror`] of `source`.
    pub fn forward<V>(&self, source: &V) -> Mirror<V::Item>
    where
        V: Value + Clone + 'static,
        V::Item: Clone + PartialEq + 'static,
    {
        self.adopt_mirror(Mirror::new(source, true))
    }

    fn adopt_mirror<T: Clone + PartialEq + 'static>(&self, mirror: Mirror<T>) -> Mirror<T> {
        let node = mirror.with_fault_policy(self.config.fault_policy);
        self.track(Rc::new(node.clone()));
        node
    }

    /// Create a [`Pointer`] at `source`.
    pub fn point<V>(&self, source: &V, forward_only: bool) -> Pointer<V::Item>
    where
        V: Value + Clone + 'static,
        V::Item: Clone + PartialEq + 'static,
    {
        let node = Pointer::new(source, forward_only).with_fault_policy(self.config.fault_policy);
        self.track(Rc::new(node.clone()));
        node
    }

    // ── Registration ─────────────────────────────────────────────────

    /// Register a collection model; returns it unchanged.
    pub fn register<M: Model + 'static>(&self, model: Rc<M>) -> Rc<M> {
        let mut inner = self.inner.borrow_mut();
        if !inner.destroyed {
            inner.models.push(Rc::clone(&model) as Rc<dyn Model>);
        }
        model
    }

    /// Take ownership of an external binding, destroyed with the owner.
    pub fn bind(&self, binding: impl Destroyable + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            drop(inner);
            binding.destroy();
            return;
        }
        inner.bindings.push(Box::new(binding));
    }

    /// Run `f` once, after everything the owner holds has been torn down.
    ///
    /// On an already destroyed owner `f` runs immediately.
    pub fn run_on_destroy(&self, f: impl FnOnce() + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.destroyed {
            drop(inner);
            f();
            return;
        }
        inner.on_destroy.push(Box::new(f));
    }

    // ── Cascade ──────────────────────────────────────────────────────

    /// Enable every Value and model. No-op when already enabled.
    pub fn enable(&self) {
        let (watch, models) = {
            let mut inner = self.inner.borrow_mut();
            if inner.enabled || inner.destroyed {
                return;
            }
            inner.enabled = true;
            (inner.watch.clone(), inner.models.clone())
        };
        if self.config.trace_lifecycle {
            debug!(owner = %self.label(), values = watch.len(), models = models.len(), "owner enabled");
        }
        let mut fault = DeferredFault::default();
        for node in &watch {
            fault.run(|| node.enable());
        }
        for model in &models {
            fault.run(|| model.enable_reactivity());
        }
        fault.resume();
    }

    /// Disable every Value and model. No-op when already disabled.
    pub fn disable(&self) {
        let (watch, models) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.enabled || inner.destroyed {
                return;
            }
            inner.enabled = false;
            (inner.watch.clone(), inner.models.clone())
        };
        if self.config.trace_lifecycle {
            debug!(owner = %self.label(), values = watch.len(), models = models.len(), "owner disabled");
        }
        let mut fault = DeferredFault::default();
        for node in &watch {
            fault.run(|| node.disable());
        }
        for model in &models {
            fault.run(|| model.disable_reactivity());
        }
        fault.resume();
    }

    // ── Freeze binding ───────────────────────────────────────────────

    /// Gate this owner on `cond`: enabled while true, disabled while false.
    pub fn bind_alive<V>(&self, cond: &V) -> Result<&Self>
    where
        V: Value<Item = bool> + Clone + 'static,
    {
        self.bind_alive_with(cond, AliveHooks::default())
    }

    /// [`bind_alive`](Self::bind_alive) with callbacks run before each toggle.
    ///
    /// The condition is evaluated immediately, so a false `cond` disables the
    /// owner before this returns.
    ///
    /// # Errors
    ///
    /// - [`BindingError::AlreadyBound`] if a freeze binding exists.
    /// - [`BindingError::SelfReferential`] if `cond` is owned by this owner.
    /// - [`BindingError::Destroyed`] if the owner is destroyed.
    pub fn bind_alive_with<V>(&self, cond: &V, hooks: AliveHooks) -> Result<&Self>
    where
        V: Value<Item = bool> + Clone + 'static,
    {
        {
            let inner = self.inner.borrow();
            if inner.destroyed {
                return Err(BindingError::Destroyed {
                    owner: self.label(),
                });
            }
            if inner.freeze_expr.is_some() {
                return Err(BindingError::AlreadyBound {
                    owner: self.label(),
                });
            }
            if inner.watch.iter().any(|w| w.id() == cond.id()) {
                return Err(BindingError::SelfReferential {
                    owner: self.label(),
                    node: cond.id(),
                });
            }
        }

        if self.config.trace_lifecycle {
            debug!(owner = %self.label(), cond = %cond.id(), "freeze binding attached");
        }
        let weak = self.downgrade();
        let AliveHooks { on_off, on_on } = hooks;
        let freeze = Expression::linked(
            move |&(alive,): &(bool,)| {
                let Some(owner) = weak.upgrade() else {
                    return;
                };
                if alive {
                    if let Some(hook) = &on_on {
                        hook();
                    }
                    owner.inner.borrow_mut().frozen = false;
                    owner.enable();
                } else {
                    if let Some(hook) = &on_off {
                        hook();
                    }
                    owner.inner.borrow_mut().frozen = true;
                    owner.disable();
                }
            },
            (cond.clone(),),
        );
        self.inner.borrow_mut().freeze_expr = Some(freeze);
        Ok(self)
    }
}

impl Destroyable for Owner {
    fn destroy(&self) {
        let (watch, bindings, models, freeze_expr, hooks) = {
            let mut inner = self.inner.borrow_mut();
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            (
                std::mem::take(&mut inner.watch),
                std::mem::take(&mut inner.bindings),
                std::mem::take(&mut inner.models),
                inner.freeze_expr.take(),
                std::mem::take(&mut inner.on_destroy),
            )
        };
        if self.config.trace_lifecycle {
            debug!(
                owner = %self.label(),
                values = watch.len(),
                bindings = bindings.len(),
                models = models.len(),
                "owner destroyed"
            );
        }
        let mut fault = DeferredFault::default();
        for node in &watch {
            fault.run(|| node.destroy());
        }
        for binding in &bindings {
            fault.run(|| binding.destroy());
        }
        for model in &models {
            fault.run(|| model.disable_reactivity());
        }
        if let Some(freeze) = freeze_expr {
            fault.run(|| freeze.destroy());
        }
        for hook in hooks {
            fault.run(hook);
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.enabled = false;
            inner.frozen = false;
        }
        fault.resume();
    }
}

/// Non-owning handle used by the freeze binding, so the binding does not
/// keep its owner alive.
struct WeakOwner {
    id: NodeId,
    config: Rc<ReactiveConfig>,
    inner: Weak<RefCell<OwnerInner>>,
}

impl WeakOwner {
    fn upgrade(&self) -> Option<Owner> {
        Some(Owner {
            id: self.id,
            config: Rc::clone(&self.config),
            inner: self.inner.upgrade()?,
        })
    }
}
