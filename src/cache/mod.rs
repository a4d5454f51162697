//! Entity Cache (C7, optional adapter): a read-through cache in front of
//! C2/C3 with the two-tier TTL policy in `spec.md` §4.7, modeled
//! directly on teacher's `RebacService::permission_cache`
//! (`moka::future::Cache`).

pub mod moka_cache;
pub mod stats;

use async_trait::async_trait;

use crate::domain::entity::{Entity, EntityId, EntityKind, Permission};

pub use moka_cache::MokaEntityCache;
pub use stats::{CacheKind, CacheStats, CacheStatsSnapshot};

/// Read-through cache contract. A miss is never an error: callers fall
/// back to C2 and populate the cache with `set_*`.
#[async_trait]
pub trait EntityCache: Send + Sync {
    async fn get_entity(&self, kind: EntityKind, id: EntityId) -> Option<Entity>;
    async fn set_entity(&self, entity: Entity);
    async fn invalidate_entity(&self, id: EntityId);

    async fn get_entity_permissions(&self, id: EntityId) -> Option<Vec<Permission>>;
    async fn set_entity_permissions(&self, id: EntityId, perms: Vec<Permission>);
    async fn invalidate_entity_permissions(&self, id: EntityId);

    async fn get_user_groups(&self, user_id: EntityId) -> Option<Vec<EntityId>>;
    async fn set_user_groups(&self, user_id: EntityId, groups: Vec<EntityId>);
    async fn invalidate_user_groups(&self, user_id: EntityId);

    async fn get_user_roles(&self, user_id: EntityId) -> Option<Vec<EntityId>>;
    async fn set_user_roles(&self, user_id: EntityId, roles: Vec<EntityId>);
    async fn invalidate_user_roles(&self, user_id: EntityId);

    fn statistics(&self) -> CacheStatsSnapshot;
    async fn clear(&self);
    /// Pre-populates the cache from a batch of already-loaded entities
    /// (called once after `EntityGraph::load` on tenant worker startup).
    async fn warmup(&self, entities: Vec<Entity>);
}
