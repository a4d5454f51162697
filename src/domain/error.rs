//! Domain-level error kinds (`spec.md` §7).

use thiserror::Error;

use super::edge::EdgeKindError;
use super::entity::EntityId;

/// Errors raised by pure domain operations and the in-memory graph (C2).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("name must not be empty")]
    NameEmpty,

    #[error("entity id {0} already exists")]
    IdConflict(EntityId),

    #[error("entity {0} not found")]
    NotFound(EntityId),

    #[error("adding this edge would create a cycle")]
    CycleError { parent: EntityId, child: EntityId },

    #[error(transparent)]
    EdgeKind(#[from] EdgeKindError),

    #[error("permission is not well-formed: {0}")]
    PermInvalid(String),

    #[error("entity {0} is already assigned to {1}")]
    AlreadyAssigned(EntityId, EntityId),
}
