//! Edge-kind legality rules (invariant 3 in `spec.md` §3).

use thiserror::Error;

use super::entity::EntityKind;

/// Raised when an edge would connect kinds that are not allowed to pair.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("edge kind {parent:?} -> {child:?} is not legal")]
pub struct EdgeKindError {
    pub parent: EntityKind,
    pub child: EntityKind,
}

/// Whether `parent` is allowed to parent `child` in the hierarchy.
///
/// - `User` can parent nothing (leaf only).
/// - `Role` can parent `User` only (never another `Role`).
/// - `Group` can parent `User`, `Group`, or `Role`.
#[must_use]
pub fn edge_kind_legal(parent: EntityKind, child: EntityKind) -> bool {
    matches!(
        (parent, child),
        (EntityKind::Group, EntityKind::User)
            | (EntityKind::Group, EntityKind::Group)
            | (EntityKind::Group, EntityKind::Role)
            | (EntityKind::Role, EntityKind::User)
    )
}

/// Validates an edge, returning `EdgeKindError` if illegal.
pub fn check_edge_kind(parent: EntityKind, child: EntityKind) -> Result<(), EdgeKindError> {
    if edge_kind_legal(parent, child) {
        Ok(())
    } else {
        Err(EdgeKindError { parent, child })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_can_parent_anything_but_itself_is_fine_too() {
        assert!(edge_kind_legal(EntityKind::Group, EntityKind::User));
        assert!(edge_kind_legal(EntityKind::Group, EntityKind::Group));
        assert!(edge_kind_legal(EntityKind::Group, EntityKind::Role));
    }

    #[test]
    fn role_cannot_parent_role() {
        assert!(!edge_kind_legal(EntityKind::Role, EntityKind::Role));
        assert!(edge_kind_legal(EntityKind::Role, EntityKind::User));
    }

    #[test]
    fn user_parents_nothing() {
        assert!(!edge_kind_legal(EntityKind::User, EntityKind::User));
        assert!(!edge_kind_legal(EntityKind::User, EntityKind::Group));
        assert!(!edge_kind_legal(EntityKind::User, EntityKind::Role));
    }
}
