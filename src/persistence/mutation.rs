//! The durable side of a staged command: what `Store::apply` writes to
//! `entities` / `entity_edges` / `permissions`, paired with one audit
//! row (`spec.md` §4.3, §4.5.1, §7's atomic-application rule).

use crate::domain::entity::{EntityId, EntityKind, Permission};

/// One row-level write against the persisted schema in `spec.md` §6.
#[derive(Debug, Clone)]
pub enum PersistedWrite {
    UpsertEntity {
        id: EntityId,
        kind: EntityKind,
        name: String,
    },
    DeleteEntity {
        id: EntityId,
    },
    InsertEdge {
        parent_id: EntityId,
        child_id: EntityId,
    },
    DeleteEdge {
        parent_id: EntityId,
        child_id: EntityId,
    },
    InsertPermission {
        owner_id: EntityId,
        permission: Permission,
    },
    DeletePermission {
        owner_id: EntityId,
        permission: Permission,
    },
    /// No row-level change (e.g. a pure query-adjacent command such as
    /// `ValidatePermissionStructure` with `fix=false`), but still worth
    /// an audit row.
    None,
}

/// A batch of writes that must commit atomically as a single persistence
/// transaction, per the atomic-application rule in `spec.md` §7.
#[derive(Debug, Clone, Default)]
pub struct StagedWrites {
    pub writes: Vec<PersistedWrite>,
}

impl StagedWrites {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, write: PersistedWrite) {
        self.writes.push(write);
    }

    pub fn single(write: PersistedWrite) -> Self {
        Self { writes: vec![write] }
    }
}
