//! HTTP-layer tests for the axum router (`spec.md` §6; `SPEC_FULL.md`
//! §1): drives the real `Router` through `tower::ServiceExt::oneshot`
//! instead of calling `RpcEdge` methods directly.

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use acs_core::cache::EntityCache;
use acs_core::persistence::Store;
use acs_core::rpc::RpcEdge;
use acs_core::supervisor::{SupervisorConfig, TenantResources, TenantSupervisor};
use acs_core::telemetry::MetricsRegistry;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use common::InMemoryStore;
use tower::ServiceExt;

struct PerTenantStores {
    stores: tokio::sync::Mutex<HashMap<String, Arc<InMemoryStore>>>,
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

async fn app() -> axum::Router {
    let resources = Arc::new(PerTenantStores {
        stores: tokio::sync::Mutex::new(HashMap::new()),
    });
    let supervisor = Arc::new(TenantSupervisor::new(
        resources,
        Arc::new(MetricsRegistry::new()),
        SupervisorConfig::default(),
    ));
    supervisor.ensure_started("acme").await.unwrap();
    let edge = Arc::new(RpcEdge::new(supervisor, Arc::new(MetricsRegistry::new())));
    acs_core::rpc::router::router(edge)
}

#[tokio::test]
async fn healthz_reports_started_tenants() {
    let response = app()
        .await
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["tenants"], serde_json::json!(["acme"]));
}

#[tokio::test]
async fn create_entity_command_round_trips_through_http() {
    let app = app().await;
    let envelope = serde_json::json!({
        "correlationId": "corr-1",
        "requestedAt": chrono::Utc::now(),
        "requestedBy": 999,
        "payload": { "id": 1, "kind": "User", "name": "alice" },
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/tenants/acme/commands/CreateEntity")
                .header("content-type", "application/json")
                .body(Body::from(envelope.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], serde_json::json!(true));
}

#[tokio::test]
async fn unknown_command_kind_reports_invalid_argument() {
    let app = app().await;
    let envelope = serde_json::json!({
        "correlationId": "corr-2",
        "requestedAt": chrono::Utc::now(),
        "requestedBy": 999,
        "payload": {},
    });
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/tenants/acme/commands/DoesNotExist")
                .header("content-type", "application/json")
                .body(Body::from(envelope.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["success"], serde_json::json!(false));
    assert_eq!(json["error"]["code"], serde_json::json!("InvalidArgument"));
}
