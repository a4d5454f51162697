//! In-memory entity graph (C2): owns all entities for a tenant, maintains
//! O(1) lookup indices, and enforces the hierarchy invariants in
//! `spec.md` §3.
//!
//! Mutated only by the Command Buffer's single consumer (C4); read under
//! a reader lock by concurrent queries (see `spec.md` §5). The lock
//! itself lives one level up, in the tenant worker (`supervisor`); this
//! module is the plain, synchronous data structure it guards.

mod ancestors;
pub mod snapshot;

use std::collections::{HashMap, HashSet};

use chrono::Utc;

pub use ancestors::Ancestors;
pub use snapshot::{LoadTimings, Snapshot};

use crate::domain::edge::check_edge_kind;
use crate::domain::entity::{Entity, EntityId, EntityKind, Permission};
use crate::domain::error::DomainError;

/// The per-tenant in-memory object graph.
#[derive(Debug, Default, Clone)]
pub struct EntityGraph {
    entities: HashMap<EntityId, Entity>,
    parents: HashMap<EntityId, HashSet<EntityId>>,
    children: HashMap<EntityId, HashSet<EntityId>>,
}

impl EntityGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Lookups
    // ------------------------------------------------------------------

    #[must_use]
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    #[must_use]
    pub fn get_user(&self, id: EntityId) -> Option<&Entity> {
        self.get_kind(id, EntityKind::User)
    }

    #[must_use]
    pub fn get_group(&self, id: EntityId) -> Option<&Entity> {
        self.get_kind(id, EntityKind::Group)
    }

    #[must_use]
    pub fn get_role(&self, id: EntityId) -> Option<&Entity> {
        self.get_kind(id, EntityKind::Role)
    }

    fn get_kind(&self, id: EntityId, kind: EntityKind) -> Option<&Entity> {
        self.entities
            .get(&id)
            .filter(|e| std::mem::discriminant(&e.kind) == std::mem::discriminant(&kind))
    }

    fn by_kind(&self, kind: EntityKind) -> impl Iterator<Item = &Entity> {
        self.entities
            .values()
            .filter(move |e| std::mem::discriminant(&e.kind) == std::mem::discriminant(&kind))
    }

    #[must_use]
    pub fn users(&self) -> Vec<&Entity> {
        self.by_kind(EntityKind::User).collect()
    }

    #[must_use]
    pub fn groups(&self) -> Vec<&Entity> {
        self.by_kind(EntityKind::Group).collect()
    }

    #[must_use]
    pub fn roles(&self) -> Vec<&Entity> {
        self.by_kind(EntityKind::Role).collect()
    }

    #[must_use]
    pub fn parents_of(&self, id: EntityId) -> HashSet<EntityId> {
        self.parents.get(&id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn children_of(&self, id: EntityId) -> HashSet<EntityId> {
        self.children.get(&id).cloned().unwrap_or_default()
    }

    /// A lazy, non-restartable sequence of all ancestor ids of `id`
    /// (transitive closure over `parents`).
    #[must_use]
    pub fn ancestors(&self, id: EntityId) -> Ancestors<'_> {
        Ancestors::new(self, id)
    }

    /// Direct and inherited permissions reachable from `id`: the owner's
    /// own permissions plus those of every ancestor.
    #[must_use]
    pub fn reachable_permissions(&self, id: EntityId) -> Vec<(EntityId, &Permission)> {
        let mut out = Vec::new();
        if let Some(e) = self.entities.get(&id) {
            out.extend(e.permissions.iter().map(|p| (id, p)));
        }
        for ancestor in self.ancestors(id) {
            if let Some(e) = self.entities.get(&ancestor) {
                out.extend(e.permissions.iter().map(|p| (ancestor, p)));
            }
        }
        out
    }

    // ------------------------------------------------------------------
    // Mutations (single-writer; called only from the command consumer)
    // ------------------------------------------------------------------

    pub fn create_entity(
        &mut self,
        id: EntityId,
        kind: EntityKind,
        name: String,
    ) -> Result<(), DomainError> {
        if name.trim().is_empty() {
            return Err(DomainError::NameEmpty);
        }
        if self.entities.contains_key(&id) {
            return Err(DomainError::IdConflict(id));
        }
        self.entities
            .insert(id, Entity::new(id, kind, name, Utc::now()));
        self.parents.entry(id).or_default();
        self.children.entry(id).or_default();
        Ok(())
    }

    /// Detaches all edges, drops owned permissions, and removes the entity.
    pub fn delete_entity(&mut self, id: EntityId) -> Result<Entity, DomainError> {
        if !self.entities.contains_key(&id) {
            return Err(DomainError::NotFound(id));
        }
        let parents = self.parents.remove(&id).unwrap_or_default();
        for p in &parents {
            if let Some(c) = self.children.get_mut(p) {
                c.remove(&id);
            }
        }
        let children = self.children.remove(&id).unwrap_or_default();
        for c in &children {
            if let Some(p) = self.parents.get_mut(c) {
                p.remove(&id);
            }
        }
        Ok(self.entities.remove(&id).expect("checked above"))
    }

    /// Adds a `parent -> child` edge, validating kind legality and
    /// acyclicity (invariants 2 and 3 in `spec.md` §3).
    ///
    /// Cycle check: walk upward from `parent_id` through its *existing*
    /// parent chain. If `child_id` appears in that chain, the new edge
    /// would close a loop (`child_id` is already an ancestor of
    /// `parent_id`, and the new edge makes `parent_id` an ancestor of
    /// `child_id` too), so the edge is rejected.
    pub fn add_edge(
        &mut self,
        parent_id: EntityId,
        child_id: EntityId,
    ) -> Result<(), DomainError> {
        let parent = self.entities.get(&parent_id).ok_or(DomainError::NotFound(parent_id))?;
        let child = self.entities.get(&child_id).ok_or(DomainError::NotFound(child_id))?;
        check_edge_kind(parent.kind, child.kind)?;

        if parent_id == child_id || self.ancestors(parent_id).any(|a| a == child_id) {
            return Err(DomainError::CycleError {
                parent: parent_id,
                child: child_id,
            });
        }

        let added_parent = self.parents.entry(child_id).or_default().insert(parent_id);
        let added_child = self.children.entry(parent_id).or_default().insert(child_id);
        debug_assert_eq!(added_parent, added_child, "parent/child index desynced");
        Ok(())
    }

    pub fn remove_edge(&mut self, parent_id: EntityId, child_id: EntityId) -> Result<(), DomainError> {
        let removed = self
            .parents
            .get_mut(&child_id)
            .map(|s| s.remove(&parent_id))
            .unwrap_or(false);
        if !removed {
            return Err(DomainError::NotFound(child_id));
        }
        if let Some(s) = self.children.get_mut(&parent_id) {
            s.remove(&child_id);
        }
        Ok(())
    }

    pub fn add_permission(&mut self, owner_id: EntityId, permission: Permission) -> Result<(), DomainError> {
        let e = self
            .entities
            .get_mut(&owner_id)
            .ok_or(DomainError::NotFound(owner_id))?;
        e.permissions.push(permission);
        e.updated_at = Utc::now();
        Ok(())
    }

    /// Removes a permission matching `permission` exactly. If `cascade`
    /// is set and `owner_id` is a Group or Role, also removes matching
    /// permissions from every descendant that owns an identical record
    /// directly (descendants that only *inherit* the permission are
    /// unaffected, since they never owned a copy of it).
    pub fn remove_permission(
        &mut self,
        owner_id: EntityId,
        permission: &Permission,
        cascade: bool,
    ) -> Result<(), DomainError> {
        self.remove_permission_on(owner_id, permission)?;
        if cascade {
            let descendants = self.descendants(owner_id);
            for d in descendants {
                let _ = self.remove_permission_on(d, permission);
            }
        }
        Ok(())
    }

    fn remove_permission_on(&mut self, owner_id: EntityId, permission: &Permission) -> Result<(), DomainError> {
        let e = self
            .entities
            .get_mut(&owner_id)
            .ok_or(DomainError::NotFound(owner_id))?;
        let before = e.permissions.len();
        e.permissions.retain(|p| p != permission);
        if e.permissions.len() == before {
            return Err(DomainError::NotFound(owner_id));
        }
        e.updated_at = Utc::now();
        Ok(())
    }

    /// All descendants of `id` (transitive closure over `children`).
    #[must_use]
    pub fn descendants(&self, id: EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack: Vec<EntityId> = self.children_of(id).into_iter().collect();
        let mut seen: HashSet<EntityId> = HashSet::new();
        while let Some(n) = stack.pop() {
            if !seen.insert(n) {
                continue;
            }
            out.push(n);
            stack.extend(self.children_of(n));
        }
        out
    }

    /// Bulk-loads entities, edges, and permissions from a persisted
    /// snapshot, recording per-phase timings.
    pub fn load(&mut self, snapshot: Snapshot) -> LoadTimings {
        let t0 = std::time::Instant::now();
        self.entities.clear();
        self.parents.clear();
        self.children.clear();

        for e in snapshot.entities {
            self.parents.entry(e.id).or_default();
            self.children.entry(e.id).or_default();
            self.entities.insert(e.id, e);
        }
        let entity_loading = t0.elapsed();

        let t1 = std::time::Instant::now();
        for edge in snapshot.edges {
            self.parents.entry(edge.child_id).or_default().insert(edge.parent_id);
            self.children.entry(edge.parent_id).or_default().insert(edge.child_id);
        }
        let relationship_building = t1.elapsed();

        let t2 = std::time::Instant::now();
        // Indices above are built incrementally as entities/edges load;
        // this phase exists for symmetry with persisted-snapshot loaders
        // that build secondary indices (e.g. a URI trie) as a separate
        // pass once all entities are resident.
        let index_building = t2.elapsed();

        let t3 = std::time::Instant::now();
        let memory_estimate_bytes = self.estimate_memory_bytes();
        let memory_calculation = t3.elapsed();

        LoadTimings {
            total: t0.elapsed(),
            bulk_entity_loading: entity_loading,
            relationship_building,
            index_building,
            memory_calculation,
            memory_estimate_bytes,
        }
    }

    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn estimate_memory_bytes(&self) -> usize {
        let per_entity = std::mem::size_of::<Entity>();
        let perms: usize = self.entities.values().map(|e| e.permissions.len()).sum();
        self.entities.len() * per_entity + perms * std::mem::size_of::<Permission>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::EntityKind;

    fn group(g: &mut EntityGraph, id: EntityId, name: &str) {
        g.create_entity(id, EntityKind::Group, name.to_owned()).unwrap();
    }

    #[test]
    fn edge_mutuality_holds() {
        let mut g = EntityGraph::new();
        group(&mut g, 1, "a");
        group(&mut g, 2, "b");
        g.add_edge(1, 2).unwrap();
        assert!(g.parents_of(2).contains(&1));
        assert!(g.children_of(1).contains(&2));
    }

    #[test]
    fn cycle_is_rejected() {
        let mut g = EntityGraph::new();
        group(&mut g, 20, "a");
        group(&mut g, 21, "b");
        g.add_edge(20, 21).unwrap();
        let err = g.add_edge(21, 20).unwrap_err();
        assert!(matches!(err, DomainError::CycleError { .. }));
        // graph unchanged
        assert!(g.parents_of(20).is_empty());
        assert!(g.children_of(21).is_empty());
    }

    #[test]
    fn role_cannot_parent_role() {
        let mut g = EntityGraph::new();
        g.create_entity(1, EntityKind::Role, "r1".into()).unwrap();
        g.create_entity(2, EntityKind::Role, "r2".into()).unwrap();
        let err = g.add_edge(1, 2).unwrap_err();
        assert!(matches!(err, DomainError::EdgeKind(_)));
    }

    #[test]
    fn delete_detaches_edges() {
        let mut g = EntityGraph::new();
        group(&mut g, 1, "a");
        group(&mut g, 2, "b");
        g.add_edge(1, 2).unwrap();
        g.delete_entity(1).unwrap();
        assert!(g.parents_of(2).is_empty());
        assert!(g.get(1).is_none());
    }

    #[test]
    fn ancestors_are_transitive() {
        let mut g = EntityGraph::new();
        group(&mut g, 1, "a");
        group(&mut g, 2, "b");
        group(&mut g, 3, "c");
        g.add_edge(1, 2).unwrap();
        g.add_edge(2, 3).unwrap();
        let anc: HashSet<_> = g.ancestors(3).collect();
        assert_eq!(anc, HashSet::from([1, 2]));
    }
}
