//! Domain-level validation errors
//!
//! Distinct from [`crate::error::CoreError`]: these are raised while
//! constructing or validating domain values (newtypes, entity invariants),
//! before any RPC or storage call is in play.

use thiserror::Error;

/// Errors raised by domain value construction and invariant checks.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A guid/local-id string failed to parse or was empty.
    #[error("invalid id: {0}")]
    InvalidId(String),

    /// A tag's parent reference would introduce a cycle in the tag forest.
    #[error("cyclic tag parent reference: {0}")]
    CyclicTagParent(String),

    /// An entity reference pointed at a kind of relation the invariants
    /// forbid (e.g. a resource with no owning note).
    #[error("invalid relation: {0}")]
    InvalidRelation(String),
}
