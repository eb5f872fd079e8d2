#![forbid(unsafe_code)]

//! weft public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use weft_core as core;

pub mod prelude {
    pub use weft_core::{
        AliveHooks, BindingError, Destroyable, Expression, FaultPolicy, Handler, ItemHandler,
        ItemId, ListModel, ListenableModel, Listener, MapModel, Mirror, Model, Owner, Pointer,
        Reactivity, ReactiveConfig, Reference, SetModel, Value,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_covers_a_gated_view() {
        let visible = Reference::new(true);
        let owner = Owner::with_config(ReactiveConfig::default().with_label("view"));
        let count = owner.reference(0);
        let label = owner.expr(|&(n,): &(i32,)| format!("{n} items"), (count.clone(),));
        owner.bind_alive(&visible).unwrap();

        visible.set(false);
        count.set(3);
        assert_eq!(label.get(), "0 items");

        visible.set(true);
        assert_eq!(label.get(), "3 items");

        owner.destroy();
        assert!(!label.is_enabled());
    }
}
