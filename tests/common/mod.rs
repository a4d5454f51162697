//! Shared scaffolding for integration tests: an in-memory `Store` so
//! handler/buffer/supervisor behaviour can be exercised without a real
//! Postgres instance, mirroring the transaction/chain semantics of
//! `acs_core::persistence::postgres::PostgresStore`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use acs_core::domain::entity::{Entity, EntityId};
use acs_core::graph::snapshot::{Edge, Snapshot};
use acs_core::handlers::HandlerContext;
use acs_core::persistence::{
    AuditDraft, AuditRow, ChangeType, IntegrityReport, PersistedWrite, PersistenceError, StagedWrites, Store,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

#[derive(Default)]
struct Inner {
    entities: std::collections::HashMap<EntityId, Entity>,
    edges: HashSet<(EntityId, EntityId)>,
    audit: Vec<AuditRow>,
    next_audit_id: i64,
    last_hash: [u8; 32],
}

/// An in-process `Store` backed by a mutex-guarded map, chaining audit
/// hashes the same way `PostgresStore` does when integrity is enabled.
pub struct InMemoryStore {
    inner: Mutex<Inner>,
    chained: bool,
    /// When set, the next `apply` call fails instead of committing,
    /// without touching `inner` — used to exercise the atomicity
    /// property (`spec.md` §8 property 6).
    fail_next_apply: AtomicBool,
}

impl InMemoryStore {
    #[must_use]
    pub fn new(chained: bool) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            chained,
            fail_next_apply: AtomicBool::new(false),
        }
    }

    pub fn fail_next_apply(&self) {
        self.fail_next_apply.store(true, Ordering::SeqCst);
    }

    pub async fn audit_len(&self) -> usize {
        self.inner.lock().await.audit.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn apply(
        &self,
        _tenant_id: &str,
        writes: StagedWrites,
        audit: AuditDraft,
        extra_audits: Vec<AuditDraft>,
    ) -> Result<AuditRow, PersistenceError> {
        if self.fail_next_apply.swap(false, Ordering::SeqCst) {
            return Err(PersistenceError::RolledBack("injected failure".into()));
        }

        let mut inner = self.inner.lock().await;
        for write in &writes.writes {
            match write.clone() {
                PersistedWrite::UpsertEntity { id, kind, name } => {
                    let now = Utc::now();
                    inner
                        .entities
                        .entry(id)
                        .and_modify(|e| {
                            e.name = name.clone();
                            e.updated_at = now;
                        })
                        .or_insert_with(|| Entity::new(id, kind, name, now));
                }
                PersistedWrite::DeleteEntity { id } => {
                    inner.entities.remove(&id);
                    inner.edges.retain(|(p, c)| *p != id && *c != id);
                }
                PersistedWrite::InsertEdge { parent_id, child_id } => {
                    inner.edges.insert((parent_id, child_id));
                }
                PersistedWrite::DeleteEdge { parent_id, child_id } => {
                    inner.edges.remove(&(parent_id, child_id));
                }
                PersistedWrite::InsertPermission { owner_id, permission } => {
                    if let Some(e) = inner.entities.get_mut(&owner_id) {
                        e.permissions.push(permission);
                    }
                }
                PersistedWrite::DeletePermission { owner_id, permission } => {
                    if let Some(e) = inner.entities.get_mut(&owner_id) {
                        e.permissions.retain(|p| p != &permission);
                    }
                }
                PersistedWrite::None => {}
            }
        }

        let mut primary_row = None;
        for draft in std::iter::once(audit).chain(extra_audits) {
            let id = inner.next_audit_id + 1;
            inner.next_audit_id = id;
            let mut row = draft.into_row(id, None);
            if self.chained {
                row.hash = Some(acs_core::persistence::audit::chain_hash(&inner.last_hash, &row));
                inner.last_hash = row.hash.expect("set above");
            }
            inner.audit.push(row.clone());
            if primary_row.is_none() {
                primary_row = Some(row);
            }
        }
        Ok(primary_row.expect("at least the primary audit draft is always iterated"))
    }

    async fn load(&self, _tenant_id: &str) -> Result<Snapshot, PersistenceError> {
        let inner = self.inner.lock().await;
        Ok(Snapshot {
            entities: inner.entities.values().cloned().collect(),
            edges: inner
                .edges
                .iter()
                .map(|(parent_id, child_id)| Edge {
                    parent_id: *parent_id,
                    child_id: *child_id,
                })
                .collect(),
        })
    }

    async fn purge_audit_older_than(
        &self,
        _tenant_id: &str,
        older_than: DateTime<Utc>,
        except_change_types: &[ChangeType],
    ) -> Result<u64, PersistenceError> {
        let mut inner = self.inner.lock().await;
        let before = inner.audit.len();
        inner
            .audit
            .retain(|row| row.change_date >= older_than || except_change_types.contains(&row.change_type));
        Ok((before - inner.audit.len()) as u64)
    }

    async fn audit_trail(
        &self,
        _tenant_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        entity_id: Option<EntityId>,
    ) -> Result<Vec<AuditRow>, PersistenceError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .audit
            .iter()
            .filter(|r| since.map_or(true, |s| r.change_date >= s))
            .filter(|r| until.map_or(true, |u| r.change_date <= u))
            .filter(|r| entity_id.map_or(true, |id| r.entity_id == Some(id)))
            .cloned()
            .collect())
    }

    async fn validate_integrity(
        &self,
        tenant_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<IntegrityReport, PersistenceError> {
        let rows = self.audit_trail(tenant_id, since, until, None).await?;
        let inner = self.inner.lock().await;
        let prev = match rows.first() {
            Some(first) => inner
                .audit
                .iter()
                .take_while(|r| r.id < first.id)
                .last()
                .and_then(|r| r.hash)
                .unwrap_or(acs_core::persistence::audit::GENESIS_HASH),
            None => acs_core::persistence::audit::GENESIS_HASH,
        };
        Ok(acs_core::persistence::audit::validate_chain(&rows, prev))
    }
}

/// Fresh handler context over a brand-new in-memory graph and store.
pub fn context(tenant_id: &str) -> HandlerContext {
    let graph = Arc::new(tokio::sync::RwLock::new(acs_core::graph::EntityGraph::new()));
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new(true));
    HandlerContext::new(tenant_id.to_owned(), graph, store)
}

/// Same as [`context`] but exposes the concrete in-memory store so tests
/// can inject failures or inspect the raw audit log.
pub fn context_with_store(tenant_id: &str) -> (HandlerContext, Arc<InMemoryStore>) {
    let graph = Arc::new(tokio::sync::RwLock::new(acs_core::graph::EntityGraph::new()));
    let store = Arc::new(InMemoryStore::new(true));
    let ctx = HandlerContext::new(tenant_id.to_owned(), graph, store.clone() as Arc<dyn Store>);
    (ctx, store)
}

pub const ADMIN: EntityId = 999;
