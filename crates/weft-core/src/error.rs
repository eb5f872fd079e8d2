#![forbid(unsafe_code)]

//! Binding-logic errors raised by [`Owner`](crate::owner::Owner).
//!
//! These are invariant violations detected synchronously at the offending
//! call. The owner is left untouched when one is returned.

use thiserror::Error;

use crate::value::NodeId;

pub type Result<T> = std::result::Result<T, BindingError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("owner {owner} already has a freeze binding")]
    AlreadyBound { owner: String },

    #[error("owner {owner} cannot gate itself on its own value {node}")]
    SelfReferential { owner: String, node: NodeId },

    #[error("owner {owner} is destroyed")]
    Destroyed { owner: String },
}

impl BindingError {
    /// Label of the owner the failed call was made on.
    #[must_use]
    pub fn owner(&self) -> &str {
        match self {
            Self::AlreadyBound { owner }
            | Self::SelfReferential { owner, .. }
            | Self::Destroyed { owner } => owner,
        }
    }
}
