use std::sync::Arc;
use std::time::Duration;

use acs_core::cache::{EntityCache, MokaEntityCache};
use acs_core::config::{self, Config};
use acs_core::persistence::{PostgresStore, Store};
use acs_core::rpc::{router, RpcEdge};
use acs_core::supervisor::{SupervisorConfig, TenantResources, TenantSupervisor};
use acs_core::telemetry::MetricsRegistry;
use sqlx::postgres::PgPoolOptions;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resolves every tenant onto the one shared `PgPool`, matching
/// teacher's single-pool `main.rs` wiring (`SPEC_FULL.md` §0) — tenant
/// isolation here comes from the `tenant_id`-scoped SQL in
/// `PostgresStore`, not from per-tenant connections.
struct SharedPoolResources {
    store: Arc<dyn Store>,
    cache_enabled: bool,
}

#[async_trait::async_trait]
impl TenantResources for SharedPoolResources {
    async fn store_for(&self, _tenant_id: &str) -> Arc<dyn Store> {
        self.store.clone()
    }

    async fn cache_for(&self, _tenant_id: &str) -> Option<Arc<dyn EntityCache>> {
        if self.cache_enabled {
            Some(Arc::new(MokaEntityCache::new()))
        } else {
            None
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    config::init();
    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let tenant_ids: Vec<String> = cfg.tenant_id.split(',').map(|s| s.trim().to_owned()).filter(|s| !s.is_empty()).collect();
    if tenant_ids.is_empty() {
        tracing::error!("ACS_TENANT_ID must name at least one tenant");
        std::process::exit(1);
    }

    let pool = match PgPoolOptions::new().max_connections(20).connect(&cfg.database_url).await {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to database");
            std::process::exit(1);
        }
    };
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!(error = %e, "failed to run migrations");
        std::process::exit(1);
    }

    let store: Arc<dyn Store> = Arc::new(PostgresStore::new(pool, true));
    let resources: Arc<dyn TenantResources> = Arc::new(SharedPoolResources {
        store,
        cache_enabled: cfg.entity_cache_enabled,
    });
    let metrics = Arc::new(MetricsRegistry::new());

    let supervisor = Arc::new(TenantSupervisor::new(
        resources,
        metrics.clone(),
        SupervisorConfig {
            buffer_capacity: cfg.buffer_capacity,
            high_watermark_pct: cfg.high_watermark_pct,
            low_watermark_pct: cfg.low_watermark_pct,
            max_restart_attempts: cfg.max_restart_attempts,
        },
    ));

    for tenant_id in &tenant_ids {
        if let Err(e) = supervisor.ensure_started(tenant_id).await {
            tracing::error!(tenant_id, error = %e, "failed to start tenant worker");
            std::process::exit(1);
        }
    }

    let health_check_supervisor = supervisor.clone();
    let health_check_interval = Duration::from_secs(cfg.health_check_interval_secs);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(health_check_interval);
        loop {
            interval.tick().await;
            health_check_supervisor.check_and_restart_unhealthy().await;
        }
    });

    let edge = Arc::new(RpcEdge::new(supervisor.clone(), metrics));
    let app = router::router(edge).layer(TraceLayer::new_for_http());

    let addr: std::net::SocketAddr = cfg.bind_addr.parse().unwrap_or_else(|_| ([0, 0, 0, 0], 8080).into());
    tracing::info!(%addr, tenants = ?tenant_ids, "acs-core listening");
    let listener = tokio::net::TcpListener::bind(addr).await.expect("bind failed");

    let shutdown_supervisor = supervisor.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining tenant workers");
            shutdown_supervisor.shutdown_all().await;
        })
        .await
        .expect("server error");
}
