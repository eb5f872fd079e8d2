#![forbid(unsafe_code)]

//! Collection-model contract and reference containers.
//!
//! Any container exposing a [`Listener`] plus freeze/thaw can be registered
//! with an [`Owner`](crate::Owner). The owner only needs [`Model`]; view
//! layers materializing per-item fragments use [`ListenableModel::listener`].
//!
//! Three containers ship with the core:
//!
//! | Model | Key | Emits |
//! |---|---|---|
//! | [`ListModel<T>`] | [`ItemId`] | add on insert, remove on remove, remove (old id) then add (fresh id) on set |
//! | [`MapModel<K, V>`] | `K` | removed (old) then added (new) on replace |
//! | [`SetModel<V>`] | the value itself | add on first insert, remove on delete |
//!
//! A freeze window keeps only the last event per key. An item both added
//! and removed inside one window therefore replays as a bare removal of a
//! key the view never saw; views skip removals of unknown keys.
//!
//! Containers mutate their storage first and emit afterwards, with no borrow
//! held, so handlers may read the container back.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::listener::Listener;

/// Freeze/thaw contract an owner cascades to registered collections.
pub trait Model {
    fn enable_reactivity(&self);
    fn disable_reactivity(&self);
}

/// A [`Model`] that publishes membership changes through a [`Listener`].
pub trait ListenableModel: Model {
    type Key;
    type Item;

    fn listener(&self) -> &Listener<Self::Key, Self::Item>;
}

// ─── ListModel ───────────────────────────────────────────────────────────────

/// Stable identity of one [`ListModel`] item.
///
/// Allocated when the item enters the list and never reused by that list,
/// so it survives the position shifts caused by inserts and removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemId(u64);

impl ItemId {
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item{}", self.0)
    }
}

/// Ordered list whose events are keyed by [`ItemId`].
///
/// Positions shift on every insert and remove, so they cannot key a freeze
/// window: two inserts at position 0 would collapse into one. Each item
/// instead carries an id; [`index_of`](Self::index_of) maps it back to the
/// current position.
#[derive(Debug)]
pub struct ListModel<T> {
    items: RefCell<Vec<(ItemId, T)>>,
    next_id: Cell<u64>,
    listener: Listener<ItemId, T>,
}

impl<T: Clone + 'static> Default for ListModel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> ListModel<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    /// Wrap existing items. No events are emitted for them.
    #[must_use]
    pub fn from_vec(items: Vec<T>) -> Self {
        let len = items.len() as u64;
        Self {
            items: RefCell::new((0..len).map(ItemId).zip(items).collect()),
            next_id: Cell::new(len),
            listener: Listener::new(),
        }
    }

    fn allocate(&self) -> ItemId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        ItemId(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<T> {
        self.items.borrow().get(index).map(|(_, v)| v.clone())
    }

    /// Id of the item currently at `index`.
    #[must_use]
    pub fn id_at(&self, index: usize) -> Option<ItemId> {
        self.items.borrow().get(index).map(|(id, _)| *id)
    }

    /// Current position of item `id`, if it is still in the list.
    #[must_use]
    pub fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.borrow().iter().position(|(i, _)| *i == id)
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.borrow().iter().map(|(_, v)| v.clone()).collect()
    }

    /// Items with their ids, in list order.
    #[must_use]
    pub fn entries(&self) -> Vec<(ItemId, T)> {
        self.items.borrow().clone()
    }

    pub fn push(&self, value: T) -> ItemId {
        let id = self.allocate();
        self.items.borrow_mut().push((id, value.clone()));
        self.listener.emit_added(id, value);
        id
    }

    /// Insert at `index`, clamped to the list length.
    pub fn insert(&self, index: usize, value: T) -> ItemId {
        let id = self.allocate();
        {
            let mut items = self.items.borrow_mut();
            let index = index.min(items.len());
            items.insert(index, (id, value.clone()));
        }
        self.listener.emit_added(id, value);
        id
    }

    /// Remove the item at `index`. Out-of-range indices return `None`.
    pub fn remove(&self, index: usize) -> Option<T> {
        let (id, removed) = {
            let mut items = self.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            items.remove(index)
        };
        self.listener.emit_removed(id, removed.clone());
        Some(removed)
    }

    /// Replace the item at `index`, returning the previous one.
    ///
    /// The replacement is a new item: the old id is removed and a fresh id
    /// is added.
    pub fn set(&self, index: usize, value: T) -> Option<T> {
        let fresh = self.allocate();
        let (old_id, previous) = {
            let mut items = self.items.borrow_mut();
            let slot = items.get_mut(index)?;
            std::mem::replace(slot, (fresh, value.clone()))
        };
        self.listener.emit_removed(old_id, previous.clone());
        self.listener.emit_added(fresh, value);
        Some(previous)
    }
}

impl<T: Clone + 'static> Model for ListModel<T> {
    fn enable_reactivity(&self) {
        self.listener.enable_reactivity();
    }

    fn disable_reactivity(&self) {
        self.listener.disable_reactivity();
    }
}

impl<T: Clone + 'static> ListenableModel for ListModel<T> {
    type Key = ItemId;
    type Item = T;

    fn listener(&self) -> &Listener<ItemId, T> {
        &self.listener
    }
}

// ─── MapModel ────────────────────────────────────────────────────────────────

/// Key-ordered map.
#[derive(Debug)]
pub struct MapModel<K, V> {
    entries: RefCell<BTreeMap<K, V>>,
    listener: Listener<K, V>,
}

impl<K, V> Default for MapModel<K, V>
where
    K: Ord + Clone + 'static,
    V: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MapModel<K, V>
where
    K: Ord + Clone + 'static,
    V: Clone + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
            listener: Listener::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.borrow().get(key).cloned()
    }

    #[must_use]
    pub fn keys(&self) -> Vec<K> {
        self.entries.borrow().keys().cloned().collect()
    }

    /// Insert or replace. A replaced value is reported as removed first.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        let previous = self
            .entries
            .borrow_mut()
            .insert(key.clone(), value.clone());
        if let Some(old) = &previous {
            self.listener.emit_removed(key.clone(), old.clone());
        }
        self.listener.emit_added(key, value);
        previous
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.entries.borrow_mut().remove(key)?;
        self.listener.emit_removed(key.clone(), removed.clone());
        Some(removed)
    }
}

impl<K, V> Model for MapModel<K, V>
where
    K: Ord + Clone + 'static,
    V: Clone + 'static,
{
    fn enable_reactivity(&self) {
        self.listener.enable_reactivity();
    }

    fn disable_reactivity(&self) {
        self.listener.disable_reactivity();
    }
}

impl<K, V> ListenableModel for MapModel<K, V>
where
    K: Ord + Clone + 'static,
    V: Clone + 'static,
{
    type Key = K;
    type Item = V;

    fn listener(&self) -> &Listener<K, V> {
        &self.listener
    }
}

// ─── SetModel ────────────────────────────────────────────────────────────────

/// Ordered set; every member is its own key.
#[derive(Debug)]
pub struct SetModel<V> {
    members: RefCell<BTreeSet<V>>,
    listener: Listener<V, V>,
}

impl<V: Ord + Clone + 'static> Default for SetModel<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Ord + Clone + 'static> SetModel<V> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            members: RefCell::new(BTreeSet::new()),
            listener: Listener::new(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.borrow().is_empty()
    }

    #[must_use]
    pub fn contains(&self, value: &V) -> bool {
        self.members.borrow().contains(value)
    }

    /// Returns `false` (and emits nothing) if already present.
    pub fn add(&self, value: V) -> bool {
        if !self.members.borrow_mut().insert(value.clone()) {
            return false;
        }
        self.listener.emit_added(value.clone(), value);
        true
    }

    /// Returns `false` (and emits nothing) if absent.
    pub fn delete(&self, value: &V) -> bool {
        if !self.members.borrow_mut().remove(value) {
            return false;
        }
        self.listener.emit_removed(value.clone(), value.clone());
        true
    }
}

impl<V: Ord + Clone + 'static> Model for SetModel<V> {
    fn enable_reactivity(&self) {
        self.listener.enable_reactivity();
    }

    fn disable_reactivity(&self) {
        self.listener.disable_reactivity();
    }
}

impl<V: Ord + Clone + 'static> ListenableModel for SetModel<V> {
    type Key = V;
    type Item = V;

    fn listener(&self) -> &Listener<V, V> {
        &self.listener
    }
}
