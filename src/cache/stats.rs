//! Cache hit/miss bookkeeping (`Statistics()` in `spec.md` §4.7).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Entity,
    EntityPermissions,
    UserGroups,
    UserRoles,
}

impl CacheKind {
    fn label(self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::EntityPermissions => "entity_permissions",
            Self::UserGroups => "user_groups",
            Self::UserRoles => "user_roles",
        }
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    total_hits: AtomicU64,
    total_misses: AtomicU64,
    hits_by_type: Mutex<HashMap<&'static str, u64>>,
    misses_by_type: Mutex<HashMap<&'static str, u64>>,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStatsSnapshot {
    pub total_hits: u64,
    pub total_misses: u64,
    pub hit_rate: f64,
    pub hits_by_type: HashMap<String, u64>,
    pub misses_by_type: HashMap<String, u64>,
}

impl CacheStats {
    pub fn record_hit(&self, kind: CacheKind) {
        self.total_hits.fetch_add(1, Ordering::Relaxed);
        *self.hits_by_type.lock().expect("poisoned").entry(kind.label()).or_insert(0) += 1;
    }

    pub fn record_miss(&self, kind: CacheKind) {
        self.total_misses.fetch_add(1, Ordering::Relaxed);
        *self.misses_by_type.lock().expect("poisoned").entry(kind.label()).or_insert(0) += 1;
    }

    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        let total_hits = self.total_hits.load(Ordering::Relaxed);
        let total_misses = self.total_misses.load(Ordering::Relaxed);
        let total = total_hits + total_misses;
        let hit_rate = if total == 0 { 0.0 } else { total_hits as f64 / total as f64 };
        CacheStatsSnapshot {
            total_hits,
            total_misses,
            hit_rate,
            hits_by_type: self
                .hits_by_type
                .lock()
                .expect("poisoned")
                .iter()
                .map(|(k, v)| ((*k).to_owned(), *v))
                .collect(),
            misses_by_type: self
                .misses_by_type
                .lock()
                .expect("poisoned")
                .iter()
                .map(|(k, v)| ((*k).to_owned(), *v))
                .collect(),
        }
    }
}
