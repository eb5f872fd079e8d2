#![forbid(unsafe_code)]

//! Core of weft: a fine-grained, push-based reactive value graph.
//!
//! - [`Reference`]: mutable cell, the only source of truth.
//! - [`Expression`]: value derived from a fixed tuple of sources.
//! - [`Mirror`] / [`Pointer`]: values shadowing (and retargeting) another value.
//! - [`Listener`]: add/remove bus for collections, with freeze/thaw replay.
//! - [`Owner`]: aggregation root that creates, cascades to, and tears down
//!   all of the above.
//!
//! # Architecture
//!
//! Every node is a cloneable handle over `Rc<RefCell<..>>`; the graph is
//! single-threaded and synchronous. Every operation runs to completion
//! before returning. Handlers may re-enter the graph; equality dedup in
//! [`Reference::set`](Value::set) is the only cycle breaker.
//!
//! # Batching policies
//!
//! Scalar values and collections batch differently on purpose:
//!
//! 1. A disabled [`Reference`] keeps only its latest value and replays it
//!    once on enable.
//! 2. A frozen [`Listener`] queues membership changes, collapsing per key,
//!    and replays the survivors on thaw.

pub mod config;
pub mod error;
pub mod expression;
pub mod handler;
pub mod listener;
pub mod mirror;
pub mod model;
pub mod owner;
pub mod reference;
pub mod value;

pub use config::{FaultPolicy, ReactiveConfig};
pub use error::{BindingError, Result};
pub use expression::{Expression, SourceLink, Sources};
pub use handler::{Handler, handler_faults_total};
pub use listener::{ItemHandler, Listener, ListenerEvent, Sign};
pub use mirror::{Mirror, Pointer};
pub use model::{ItemId, ListModel, ListenableModel, MapModel, Model, SetModel};
pub use owner::{AliveHooks, Owner};
pub use reference::Reference;
pub use value::{Destroyable, NodeId, Reactivity, Value};
