#![forbid(unsafe_code)]

//! Derived values computed from a fixed tuple of source Values.
//!
//! # Design
//!
//! An [`Expression<T>`] owns:
//!
//! - a cache holding the last observed value of every source (a tuple with
//!   the same arity as the source tuple),
//! - one handler per source, stored at a stable offset; the handler for
//!   source *i* updates only slot *i* of the cache before recomputing,
//! - a sink [`Reference<T>`] that publishes the result.
//!
//! Arity is fixed by the tuple type at construction and never changes.
//! Sources are any handles implementing [`Value`]; tuples of 1 to 8 sources
//! implement [`Sources`].
//!
//! # Invariants
//!
//! 1. The sink always holds a valid value, even for a lazy expression that
//!    has never been enabled.
//! 2. A linked expression is subscribed to every source; a disabled or lazy
//!    one is subscribed to none.
//! 3. `enable` resyncs the cache from the sources and recomputes once.
//!
//! # Failure Modes
//!
//! - **Compute function panics inside a source fan-out**: isolated like any
//!   other handler fault; the sink keeps its previous value.
//! - **Destroyed expression**: source handlers become inert; `get` keeps
//!   returning the last published value.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::config::FaultPolicy;
use crate::handler::Handler;
use crate::reference::Reference;
use crate::value::{Destroyable, NodeId, Reactivity, Value};

// ─── Source links ────────────────────────────────────────────────────────────

/// Subscription of one per-source handler to its source.
///
/// Built once per source at construction; `attach`/`detach` are replayed on
/// every enable/disable.
pub struct SourceLink {
    source: NodeId,
    attach: Box<dyn Fn()>,
    detach: Box<dyn Fn()>,
}

impl SourceLink {
    /// Id of the source this link subscribes to.
    #[must_use]
    pub fn source(&self) -> NodeId {
        self.source
    }
}

impl fmt::Debug for SourceLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceLink")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// A fixed-arity tuple of source Values.
pub trait Sources: 'static {
    /// Tuple of the sources' value types, in order.
    type Args: 'static;

    fn arity(&self) -> usize;

    /// Read every source's current value.
    fn snapshot(&self) -> Self::Args;

    /// Build one link per source. Each link's handler writes its own slot of
    /// `cache` and then calls `recompute`. Handlers hold weak references only.
    fn links(&self, cache: &Rc<RefCell<Self::Args>>, recompute: &Rc<dyn Fn()>) -> Vec<SourceLink>;
}

macro_rules! impl_sources {
    ($arity:expr; $($S:ident $idx:tt),+) => {
        impl<$($S),+> Sources for ($($S,)+)
        where
            $($S: Value + Clone + 'static, <$S as Value>::Item: Clone + PartialEq + 'static,)+
        {
            type Args = ($(<$S as Value>::Item,)+);

            fn arity(&self) -> usize {
                $arity
            }

            fn snapshot(&self) -> Self::Args {
                ($(self.$idx.get(),)+)
            }

            fn links(
                &self,
                cache: &Rc<RefCell<Self::Args>>,
                recompute: &Rc<dyn Fn()>,
            ) -> Vec<SourceLink> {
                vec![$({
                    let weak_cache = Rc::downgrade(cache);
                    let weak_recompute = Rc::downgrade(recompute);
                    let handler = Handler::new(move |value: &<$S as Value>::Item| {
                        let Some(cache) = weak_cache.upgrade() else {
                            return;
                        };
                        cache.borrow_mut().$idx = value.clone();
                        if let Some(recompute) = weak_recompute.upgrade() {
                            recompute();
                        }
                    });
                    let attach_source = self.$idx.clone();
                    let attach_handler = handler.clone();
                    let detach_source = self.$idx.clone();
                    SourceLink {
                        source: self.$idx.id(),
                        attach: Box::new(move || attach_source.subscribe(&attach_handler)),
                        detach: Box::new(move || detach_source.unsubscribe(&handler)),
                    }
                }),+]
            }
        }
    };
}

impl_sources!(1; S0 0);
impl_sources!(2; S0 0, S1 1);
impl_sources!(3; S0 0, S1 1, S2 2);
impl_sources!(4; S0 0, S1 1, S2 2, S3 3);
impl_sources!(5; S0 0, S1 1, S2 2, S3 3, S4 4);
impl_sources!(6; S0 0, S1 1, S2 2, S3 3, S4 4, S5 5);
impl_sources!(7; S0 0, S1 1, S2 2, S3 3, S4 4, S5 5, S6 6);
impl_sources!(8; S0 0, S1 1, S2 2, S3 3, S4 4, S5 5, S6 6, S7 7);

// ─── Expression ──────────────────────────────────────────────────────────────

struct ExpressionInner {
    /// One link per source, in source order. Empty once destroyed.
    links: Rc<[SourceLink]>,
    /// Re-read every source into the cache and recompute.
    resync: Option<Rc<dyn Fn()>>,
    enabled: bool,
}

/// A Value computed from a fixed tuple of source Values.
///
/// Cloning an `Expression` creates a new handle to the **same** inner state.
///
/// # Example
///
/// ```
/// use weft_core::{Expression, Reference, Value};
///
/// let x = Reference::new(1);
/// let y = Reference::new(1);
/// let sum = Expression::linked(|&(x, y): &(i32, i32)| x + y, (x.clone(), y.clone()));
/// assert_eq!(sum.get(), 2);
///
/// x.set(4);
/// assert_eq!(sum.get(), 5);
/// ```
pub struct Expression<T> {
    id: NodeId,
    sink: Reference<T>,
    inner: Rc<RefCell<ExpressionInner>>,
}

impl<T> Clone for Expression<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            sink: self.sink.clone(),
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Expression<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Expression")
            .field("id", &self.id)
            .field("sink", &self.sink)
            .field("arity", &inner.links.len())
            .field("enabled", &inner.enabled)
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Expression<T> {
    /// Build an expression over `sources`.
    ///
    /// The sink is seeded with `func` applied to the sources' current values.
    /// With `link` the expression subscribes to every source immediately;
    /// otherwise it stays detached until [`enable`](Reactivity::enable).
    pub fn new<S, F>(func: F, link: bool, sources: S) -> Self
    where
        S: Sources,
        F: Fn(&S::Args) -> T + 'static,
    {
        let cache = Rc::new(RefCell::new(sources.snapshot()));
        let initial = func(&*cache.borrow());
        let sink = Reference::new(initial);

        let recompute: Rc<dyn Fn()> = {
            let cache = Rc::clone(&cache);
            let sink = sink.clone();
            Rc::new(move || {
                let next = func(&*cache.borrow());
                sink.set(next);
            })
        };
        let links: Rc<[SourceLink]> = sources.links(&cache, &recompute).into();
        let resync: Rc<dyn Fn()> = Rc::new(move || {
            let fresh = sources.snapshot();
            *cache.borrow_mut() = fresh;
            recompute();
        });

        let expr = Self {
            id: NodeId::next(),
            sink,
            inner: Rc::new(RefCell::new(ExpressionInner {
                links,
                resync: Some(resync),
                enabled: false,
            })),
        };
        if link {
            // The cache was read a moment ago; subscribing is enough.
            expr.inner.borrow_mut().enabled = true;
            expr.attach();
        }
        expr
    }

    /// Build an expression that is subscribed to its sources right away.
    pub fn linked<S, F>(func: F, sources: S) -> Self
    where
        S: Sources,
        F: Fn(&S::Args) -> T + 'static,
    {
        Self::new(func, true, sources)
    }

    /// Build an expression that computes once and waits for `enable`.
    pub fn lazy<S, F>(func: F, sources: S) -> Self
    where
        S: Sources,
        F: Fn(&S::Args) -> T + 'static,
    {
        Self::new(func, false, sources)
    }

    /// Set the handler fault policy of the published result.
    #[must_use]
    pub fn with_fault_policy(self, policy: FaultPolicy) -> Self {
        self.sink.set_fault_policy(policy);
        self
    }

    /// Number of bound sources. Zero once destroyed.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.inner.borrow().links.len()
    }

    /// Ids of the bound sources, in order.
    #[must_use]
    pub fn source_ids(&self) -> Vec<NodeId> {
        self.inner.borrow().links.iter().map(SourceLink::source).collect()
    }

    fn attach(&self) {
        let links = Rc::clone(&self.inner.borrow().links);
        for link in links.iter() {
            (link.attach)();
        }
    }

    fn detach(&self) {
        let links = Rc::clone(&self.inner.borrow().links);
        for link in links.iter() {
            (link.detach)();
        }
    }
}

impl<T: Clone + PartialEq + 'static> Destroyable for Expression<T> {
    fn destroy(&self) {
        self.disable();
        let mut inner = self.inner.borrow_mut();
        inner.links = Rc::from(Vec::new());
        inner.resync = None;
    }
}

impl<T: Clone + PartialEq + 'static> Reactivity for Expression<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn enable(&self) {
        let resync = {
            let mut inner = self.inner.borrow_mut();
            if inner.enabled {
                return;
            }
            inner.enabled = true;
            inner.resync.clone()
        };
        self.attach();
        if let Some(resync) = resync {
            resync();
        }
    }

    fn disable(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.enabled {
                return;
            }
            inner.enabled = false;
        }
        self.detach();
    }

    fn is_enabled(&self) -> bool {
        self.inner.borrow().enabled
    }
}

impl<T: Clone + PartialEq + 'static> Value for Expression<T> {
    type Item = T;

    fn get(&self) -> T {
        self.sink.get()
    }

    fn set(&self, value: T) {
        self.sink.set(value);
    }

    fn subscribe(&self, handler: &Handler<T>) {
        self.sink.subscribe(handler);
    }

    fn unsubscribe(&self, handler: &Handler<T>) {
        self.sink.unsubscribe(handler);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn sum2() -> (Reference<i32>, Reference<i32>, Expression<i32>) {
        let a = Reference::new(1);
        let b = Reference::new(1);
        let sum = Expression::linked(|&(x, y): &(i32, i32)| x + y, (a.clone(), b.clone()));
        (a, b, sum)
    }

    #[test]
    fn incremental_recompute() {
        let (a, b, sum) = sum2();
        assert_eq!(sum.get(), 2);

        a.set(4);
        assert_eq!(sum.get(), 5);

        b.set(4);
        assert_eq!(sum.get(), 8);
    }

    #[test]
    fn linked_is_enabled_and_subscribed() {
        let (a, b, sum) = sum2();
        assert!(sum.is_enabled());
        assert_eq!(sum.arity(), 2);
        assert_eq!(a.subscriber_count(), 1);
        assert_eq!(b.subscriber_count(), 1);
        assert_eq!(sum.source_ids(), vec![a.id(), b.id()]);
    }

    #[test]
    fn subscribers_see_recomputed_value() {
        let (a, _b, sum) = sum2();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let s = Rc::clone(&seen);
        sum.subscribe(&Handler::new(move |v: &i32| s.borrow_mut().push(*v)));

        a.set(10);
        a.set(10);
        assert_eq!(*seen.borrow(), vec![11]);
    }

    #[test]
    fn only_changed_slot_is_read() {
        let reads = Rc::new(Cell::new(0));
        let a = Reference::new(1);
        let b = Reference::new(2);
        let r = Rc::clone(&reads);
        let expr = Expression::linked(
            move |&(x, y): &(i32, i32)| {
                r.set(r.get() + 1);
                x * y
            },
            (a.clone(), b.clone()),
        );
        assert_eq!(reads.get(), 1);

        a.set(3);
        assert_eq!(expr.get(), 6);
        assert_eq!(reads.get(), 2);
    }

    #[test]
    fn lazy_computes_once_without_subscribing() {
        let a = Reference::new(2);
        let doubled = Expression::lazy(|&(x,): &(i32,)| x * 2, (a.clone(),));
        assert_eq!(doubled.get(), 4);
        assert!(!doubled.is_enabled());
        assert_eq!(a.subscriber_count(), 0);

        a.set(5);
        assert_eq!(doubled.get(), 4);

        doubled.enable();
        assert_eq!(doubled.get(), 10);
        assert_eq!(a.subscriber_count(), 1);

        a.set(6);
        assert_eq!(doubled.get(), 12);
    }

    #[test]
    fn lazy_can_be_driven_manually() {
        let a = Reference::new(1);
        let expr = Expression::lazy(|&(x,): &(i32,)| x, (a.clone(),));
        expr.set(99);
        assert_eq!(expr.get(), 99);

        expr.enable();
        assert_eq!(expr.get(), 1);
    }

    #[test]
    fn disable_detaches_and_enable_resyncs() {
        let (a, b, sum) = sum2();
        sum.disable();
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 0);

        a.set(10);
        b.set(20);
        assert_eq!(sum.get(), 2);

        sum.enable();
        assert_eq!(sum.get(), 30);
        sum.enable();
        assert_eq!(a.subscriber_count(), 1);
    }

    #[test]
    fn heterogeneous_sources() {
        let name = Reference::new("row".to_string());
        let count = Reference::new(3_usize);
        let visible = Reference::new(true);
        let label = Expression::linked(
            |(name, count, visible): &(String, usize, bool)| {
                if *visible {
                    format!("{name} x{count}")
                } else {
                    String::new()
                }
            },
            (name.clone(), count.clone(), visible.clone()),
        );
        assert_eq!(label.get(), "row x3");

        count.set(4);
        assert_eq!(label.get(), "row x4");

        visible.set(false);
        assert_eq!(label.get(), "");
    }

    #[test]
    fn chained_expressions() {
        let a = Reference::new(2);
        let squared = Expression::linked(|&(x,): &(i32,)| x * x, (a.clone(),));
        let plus_one = Expression::linked(|&(x,): &(i32,)| x + 1, (squared.clone(),));
        assert_eq!(plus_one.get(), 5);

        a.set(3);
        assert_eq!(plus_one.get(), 10);
    }

    #[test]
    fn destroy_unsubscribes_and_clears_sources() {
        let (a, b, sum) = sum2();
        sum.destroy();
        assert!(!sum.is_enabled());
        assert_eq!(sum.arity(), 0);
        assert_eq!(a.subscriber_count(), 0);
        assert_eq!(b.subscriber_count(), 0);

        a.set(50);
        assert_eq!(sum.get(), 2);

        // Enabling a destroyed expression has nothing to attach to.
        sum.enable();
        assert_eq!(sum.get(), 2);
    }

    #[test]
    fn panicking_func_keeps_previous_value() {
        let a = Reference::new(1);
        let expr = Expression::linked(
            |&(x,): &(i32,)| {
                assert!(x >= 0, "negative input");
                x
            },
            (a.clone(),),
        );
        a.set(-1);
        assert_eq!(expr.get(), 1);
        a.set(7);
        assert_eq!(expr.get(), 7);
    }

    #[test]
    fn eight_sources() {
        let refs: Vec<Reference<u8>> = (1..=8).map(Reference::new).collect();
        let total = Expression::linked(
            |&(a, b, c, d, e, f, g, h): &(u8, u8, u8, u8, u8, u8, u8, u8)| {
                u32::from(a + b + c + d + e + f + g + h)
            },
            (
                refs[0].clone(),
                refs[1].clone(),
                refs[2].clone(),
                refs[3].clone(),
                refs[4].clone(),
                refs[5].clone(),
                refs[6].clone(),
                refs[7].clone(),
            ),
        );
        assert_eq!(total.arity(), 8);
        assert_eq!(total.get(), 36);
        refs[7].set(10);
        assert_eq!(total.get(), 38);
    }
}
