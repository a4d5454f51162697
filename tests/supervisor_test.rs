//! Tenant Supervisor integration tests (`spec.md` §4.8): per-tenant
//! isolation, total ordering through the buffer, and routing by
//! `tenantId`.

mod common;

use std::sync::Arc;

use acs_core::cache::EntityCache;
use acs_core::domain::command::{Command, Query};
use acs_core::domain::entity::{EntityKind, Verb};
use acs_core::persistence::Store;
use acs_core::supervisor::{SupervisorConfig, SupervisorError, TenantResources, TenantSupervisor};
use acs_core::telemetry::MetricsRegistry;
use common::InMemoryStore;

struct PerTenantStores {
    stores: tokio::sync::Mutex<std::collections::HashMap<String, Arc<InMemoryStore>>>,
}

#[async_trait::async_trait]
impl TenantResources for PerTenantStores {
    async fn store_for(&self, tenant_id: &str) -> Arc<dyn Store> {
        let mut stores = self.stores.lock().await;
        stores
            .entry(tenant_id.to_owned())
            .or_insert_with(|| Arc::new(InMemoryStore::new(true)))
            .clone()
    }

    async fn cache_for(&self, _tenant_id: &str) -> Option<Arc<dyn EntityCache>> {
        None
    }
}

fn supervisor() -> Arc<TenantSupervisor> {
    let resources = Arc::new(PerTenantStores {
        stores: tokio::sync::Mutex::new(std::collections::HashMap::new()),
    });
    Arc::new(TenantSupervisor::new(
        resources,
        Arc::new(MetricsRegistry::new()),
        SupervisorConfig {
            buffer_capacity: 64,
            high_watermark_pct: 0.8,
            low_watermark_pct: 0.5,
            max_restart_attempts: 3,
        },
    ))
}

/// Commands enqueued in sequence observe that same order once applied
/// (`spec.md` §8 property 7): a chain of edges that only makes sense
/// created in order succeeds end to end.
#[tokio::test]
async fn total_order_per_tenant() {
    let sup = supervisor();
    sup.ensure_started("acme").await.unwrap();

    sup.route_command("acme", Command::CreateEntity { id: 1, kind: EntityKind::Group, name: "root".into() }, "c1".into())
        .await
        .unwrap();
    sup.route_command(
        "acme",
        Command::CreateEntity { id: 2, kind: EntityKind::Group, name: "child".into() },
        "c2".into(),
    )
    .await
    .unwrap();
    // This only succeeds if entities 1 and 2 were both committed before
    // it runs, proving the three commands were applied in enqueue order.
    sup.route_command("acme", Command::AddEdge { parent_id: 1, child_id: 2 }, "c3".into())
        .await
        .unwrap();

    let outcome = sup
        .route_query(
            "acme",
            Query::GetEntityPermissions { entity_id: 2, include_inherited: false },
        )
        .await
        .unwrap();
    assert!(matches!(outcome, acs_core::supervisor::QueryOutcome::EntityPermissions(_)));
}

/// Two tenants routed through the same supervisor never see each
/// other's entities.
#[tokio::test]
async fn tenants_are_isolated() {
    let sup = supervisor();
    sup.ensure_started("tenant-a").await.unwrap();
    sup.ensure_started("tenant-b").await.unwrap();

    sup.route_command(
        "tenant-a",
        Command::CreateEntity { id: 1, kind: EntityKind::User, name: "a-user".into() },
        "c1".into(),
    )
    .await
    .unwrap();

    let err = sup
        .route_query("tenant-b", Query::CheckPermission { entity_id: 1, uri: "/api/x".into(), verb: Verb::Get, at: None })
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::Handler(_)));
}

#[tokio::test]
async fn unknown_tenant_is_rejected() {
    let sup = supervisor();
    let err = sup
        .route_command("ghost", Command::CreateEntity { id: 1, kind: EntityKind::User, name: "x".into() }, "c1".into())
        .await
        .unwrap_err();
    assert!(matches!(err, SupervisorError::UnknownTenant(_)));
}
