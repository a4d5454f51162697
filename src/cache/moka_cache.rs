//! `moka::future::Cache`-backed `EntityCache` adapter.
//!
//! Two TTL tiers (`spec.md` §4.7): entities use a 5-minute sliding /
//! 30-minute absolute window, permissions (and the derived
//! group/role membership views) use a 2-minute sliding / 10-minute
//! absolute window. `moka`'s builder already combines `time_to_idle`
//! (sliding) and `time_to_live` (absolute) on one cache — whichever
//! fires first evicts the entry — so no custom `Expiry` impl is needed
//! as long as every entry in a given cache shares one tier.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use crate::domain::entity::{Entity, EntityId, EntityKind, Permission};

use super::stats::{CacheKind, CacheStats, CacheStatsSnapshot};
use super::EntityCache;

const ENTITY_MAX_CAPACITY: u64 = 50_000;
const ENTITY_TTI: Duration = Duration::from_secs(5 * 60);
const ENTITY_TTL: Duration = Duration::from_secs(30 * 60);

const DERIVED_MAX_CAPACITY: u64 = 50_000;
const DERIVED_TTI: Duration = Duration::from_secs(2 * 60);
const DERIVED_TTL: Duration = Duration::from_secs(10 * 60);

pub struct MokaEntityCache {
    entities: Cache<EntityId, Entity>,
    permissions: Cache<EntityId, Vec<Permission>>,
    user_groups: Cache<EntityId, Vec<EntityId>>,
    user_roles: Cache<EntityId, Vec<EntityId>>,
    stats: Arc<CacheStats>,
}

impl Default for MokaEntityCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MokaEntityCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: Cache::builder()
                .max_capacity(ENTITY_MAX_CAPACITY)
                .time_to_idle(ENTITY_TTI)
                .time_to_live(ENTITY_TTL)
                .build(),
            permissions: Cache::builder()
                .max_capacity(DERIVED_MAX_CAPACITY)
                .time_to_idle(DERIVED_TTI)
                .time_to_live(DERIVED_TTL)
                .build(),
            user_groups: Cache::builder()
                .max_capacity(DERIVED_MAX_CAPACITY)
                .time_to_idle(DERIVED_TTI)
                .time_to_live(DERIVED_TTL)
                .build(),
            user_roles: Cache::builder()
                .max_capacity(DERIVED_MAX_CAPACITY)
                .time_to_idle(DERIVED_TTI)
                .time_to_live(DERIVED_TTL)
                .build(),
            stats: Arc::new(CacheStats::default()),
        }
    }
}

#[async_trait]
impl EntityCache for MokaEntityCache {
    async fn get_entity(&self, kind: EntityKind, id: EntityId) -> Option<Entity> {
        let hit = self.entities.get(&id).await.filter(|e| e.kind == kind);
        if hit.is_some() {
            self.stats.record_hit(CacheKind::Entity);
        } else {
            self.stats.record_miss(CacheKind::Entity);
        }
        hit
    }

    async fn set_entity(&self, entity: Entity) {
        self.entities.insert(entity.id, entity).await;
    }

    async fn invalidate_entity(&self, id: EntityId) {
        self.entities.invalidate(&id).await;
    }

    async fn get_entity_permissions(&self, id: EntityId) -> Option<Vec<Permission>> {
        let hit = self.permissions.get(&id).await;
        if hit.is_some() {
            self.stats.record_hit(CacheKind::EntityPermissions);
        } else {
            self.stats.record_miss(CacheKind::EntityPermissions);
        }
        hit
    }

    async fn set_entity_permissions(&self, id: EntityId, perms: Vec<Permission>) {
        self.permissions.insert(id, perms).await;
    }

    async fn invalidate_entity_permissions(&self, id: EntityId) {
        self.permissions.invalidate(&id).await;
    }

    async fn get_user_groups(&self, user_id: EntityId) -> Option<Vec<EntityId>> {
        let hit = self.user_groups.get(&user_id).await;
        if hit.is_some() {
            self.stats.record_hit(CacheKind::UserGroups);
        } else {
            self.stats.record_miss(CacheKind::UserGroups);
        }
        hit
    }

    async fn set_user_groups(&self, user_id: EntityId, groups: Vec<EntityId>) {
        self.user_groups.insert(user_id, groups).await;
    }

    async fn invalidate_user_groups(&self, user_id: EntityId) {
        self.user_groups.invalidate(&user_id).await;
    }

    async fn get_user_roles(&self, user_id: EntityId) -> Option<Vec<EntityId>> {
        let hit = self.user_roles.get(&user_id).await;
        if hit.is_some() {
            self.stats.record_hit(CacheKind::UserRoles);
        } else {
            self.stats.record_miss(CacheKind::UserRoles);
        }
        hit
    }

    async fn set_user_roles(&self, user_id: EntityId, roles: Vec<EntityId>) {
        self.user_roles.insert(user_id, roles).await;
    }

    async fn invalidate_user_roles(&self, user_id: EntityId) {
        self.user_roles.invalidate(&user_id).await;
    }

    fn statistics(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    async fn clear(&self) {
        self.entities.invalidate_all();
        self.permissions.invalidate_all();
        self.user_groups.invalidate_all();
        self.user_roles.invalidate_all();
    }

    async fn warmup(&self, entities: Vec<Entity>) {
        for entity in entities {
            let perms = entity.permissions.clone();
            let id = entity.id;
            self.entities.insert(id, entity).await;
            self.permissions.insert(id, perms).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entity(id: EntityId, kind: EntityKind) -> Entity {
        Entity::new(id, kind, format!("entity-{id}"), Utc::now())
    }

    #[tokio::test]
    async fn miss_then_hit() {
        let cache = MokaEntityCache::new();
        assert!(cache.get_entity(EntityKind::User, 1).await.is_none());
        cache.set_entity(entity(1, EntityKind::User)).await;
        assert!(cache.get_entity(EntityKind::User, 1).await.is_some());
        let stats = cache.statistics();
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.total_misses, 1);
    }

    #[tokio::test]
    async fn invalidate_drops_entry() {
        let cache = MokaEntityCache::new();
        cache.set_entity(entity(2, EntityKind::Group)).await;
        cache.invalidate_entity(2).await;
        assert!(cache.get_entity(EntityKind::Group, 2).await.is_none());
    }

    #[tokio::test]
    async fn clear_empties_every_tier() {
        let cache = MokaEntityCache::new();
        cache.set_entity(entity(3, EntityKind::Role)).await;
        cache.set_entity_permissions(3, vec![]).await;
        cache.clear().await;
        cache.entities.run_pending_tasks().await;
        assert!(cache.get_entity(EntityKind::Role, 3).await.is_none());
    }
}
