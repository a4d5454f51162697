//! Tenant Supervisor & Router (C8): starts one worker per active
//! tenant, tracks its health, restarts it with backoff, and routes
//! requests by `tenantId` (`spec.md` §4.8).

pub mod health;
pub mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::cache::EntityCache;
use crate::domain::command::{Command, Query};
use crate::handlers::{handle_command, queries, CommandOutcome, HandlerError};
use crate::persistence::{PersistenceError, Store};
use crate::telemetry::MetricsRegistry;

pub use worker::TenantWorker;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("unknown tenant: {0}")]
    UnknownTenant(String),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Produces a tenant's `Store` (and optional `EntityCache`) on demand.
/// A trait rather than a closure so the supervisor stays agnostic of
/// how tenants map onto connection pools (one pool per tenant, one pool
/// shared with a schema-per-tenant convention, etc).
#[async_trait::async_trait]
pub trait TenantResources: Send + Sync {
    async fn store_for(&self, tenant_id: &str) -> Arc<dyn Store>;
    async fn cache_for(&self, tenant_id: &str) -> Option<Arc<dyn EntityCache>>;
}

pub struct SupervisorConfig {
    pub buffer_capacity: usize,
    pub high_watermark_pct: f64,
    pub low_watermark_pct: f64,
    pub max_restart_attempts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: crate::buffer::DEFAULT_CAPACITY,
            high_watermark_pct: crate::buffer::DEFAULT_HIGH_WATERMARK_PCT,
            low_watermark_pct: crate::buffer::DEFAULT_LOW_WATERMARK_PCT,
            max_restart_attempts: 5,
        }
    }
}

/// Owns process-wide state: every active tenant worker plus the
/// resources needed to start a new one (`spec.md` §4.8). No method here
/// ever reaches across tenants — each lookup is keyed by `tenantId` and
/// every worker owns its own C2/C3 handles, which is the isolation
/// guarantee.
pub struct TenantSupervisor {
    workers: RwLock<HashMap<String, Arc<TenantWorker>>>,
    resources: Arc<dyn TenantResources>,
    metrics: Arc<MetricsRegistry>,
    config: SupervisorConfig,
}

impl TenantSupervisor {
    #[must_use]
    pub fn new(resources: Arc<dyn TenantResources>, metrics: Arc<MetricsRegistry>, config: SupervisorConfig) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            resources,
            metrics,
            config,
        }
    }

    /// Starts a tenant worker if one isn't already running. Idempotent.
    pub async fn ensure_started(&self, tenant_id: &str) -> Result<(), SupervisorError> {
        if self.workers.read().await.contains_key(tenant_id) {
            return Ok(());
        }
        let worker = self.start_worker(tenant_id).await?;
        self.workers.write().await.insert(tenant_id.to_owned(), Arc::new(worker));
        Ok(())
    }

    async fn start_worker(&self, tenant_id: &str) -> Result<TenantWorker, SupervisorError> {
        let store = self.resources.store_for(tenant_id).await;
        let cache = self.resources.cache_for(tenant_id).await;
        let worker = TenantWorker::spawn(
            tenant_id.to_owned(),
            store,
            cache,
            self.metrics.clone(),
            self.config.buffer_capacity,
            self.config.high_watermark_pct,
            self.config.low_watermark_pct,
        )
        .await?;
        info!(tenant_id, "tenant worker started");
        Ok(worker)
    }

    async fn worker(&self, tenant_id: &str) -> Result<Arc<TenantWorker>, SupervisorError> {
        self.workers
            .read()
            .await
            .get(tenant_id)
            .cloned()
            .ok_or_else(|| SupervisorError::UnknownTenant(tenant_id.to_owned()))
    }

    /// `RouteRequest(tenantId, op)`: hands a mutating command to the
    /// tenant's buffer (§4.8, §4.4).
    pub async fn route_command(
        &self,
        tenant_id: &str,
        command: Command,
        correlation_id: String,
    ) -> Result<CommandOutcome, SupervisorError> {
        let worker = self.worker(tenant_id).await?;
        Ok(worker.buffer.enqueue(command, correlation_id).await?)
    }

    /// Queries bypass the buffer entirely and run directly under the
    /// reader lock (`spec.md` §4.5, §5).
    pub async fn route_query(&self, tenant_id: &str, query: Query) -> Result<QueryOutcome, SupervisorError> {
        let worker = self.worker(tenant_id).await?;
        let ctx = &worker.ctx;
        let outcome = match query {
            Query::CheckPermission { entity_id, uri, verb, at } => {
                QueryOutcome::CheckPermission(queries::check_permission(ctx, entity_id, &uri, verb, at).await?)
            }
            Query::GetEntityPermissions { entity_id, include_inherited } => {
                QueryOutcome::EntityPermissions(queries::get_entity_permissions(ctx, entity_id, include_inherited).await?)
            }
            Query::GetEffectivePermissions {
                entity_id,
                resource_ids,
                resolve_conflicts: _,
            } => QueryOutcome::EffectivePermissions(
                queries::get_effective_permissions(ctx, entity_id, &resource_ids, crate::domain::entity::Verb::Get).await?,
            ),
            Query::GetAuditTrail { since, until, entity_id } => {
                QueryOutcome::AuditTrail(queries::get_audit_trail(ctx, since, until, entity_id).await?)
            }
            Query::GetComplianceReport { since, until } => {
                QueryOutcome::ComplianceReport(queries::get_compliance_report(ctx, since, until).await?)
            }
            Query::ValidateAuditIntegrity { since, until } => {
                QueryOutcome::IntegrityReport(queries::validate_audit_integrity(ctx, since, until).await?)
            }
            Query::PermissionImpactAnalysis {
                role_id,
                added_permissions,
                removed_permissions,
                max_depth,
            } => QueryOutcome::ImpactReport(
                queries::permission_impact_analysis(ctx, role_id, &added_permissions, &removed_permissions, max_depth).await?,
            ),
        };
        Ok(outcome)
    }

    /// Directly invokes a handler for a command, bypassing the buffer.
    /// Used by internal maintenance callers (e.g. a scheduled audit
    /// purge) that already run on the tenant's single-writer task.
    pub async fn handle_internal(
        &self,
        tenant_id: &str,
        command: Command,
        correlation_id: &str,
        changed_by: crate::domain::entity::EntityId,
    ) -> Result<CommandOutcome, SupervisorError> {
        let worker = self.worker(tenant_id).await?;
        Ok(handle_command(&worker.ctx, command, correlation_id, changed_by).await?)
    }

    /// One liveness pass over every tracked worker; unhealthy workers
    /// are torn down and restarted with exponential backoff
    /// (`spec.md` §4.8).
    pub async fn check_and_restart_unhealthy(&self) {
        let snapshot: Vec<(String, Arc<TenantWorker>)> = self
            .workers
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (tenant_id, worker) in snapshot {
            if worker.is_healthy().await {
                continue;
            }
            warn!(tenant_id = %tenant_id, "tenant worker unhealthy, restarting");
            worker.shutdown().await;
            self.workers.write().await.remove(&tenant_id);

            let mut attempt = 0u32;
            loop {
                sleep(health::backoff_delay(attempt)).await;
                match self.start_worker(&tenant_id).await {
                    Ok(restarted) => {
                        self.workers.write().await.insert(tenant_id.clone(), Arc::new(restarted));
                        break;
                    }
                    Err(err) => {
                        attempt += 1;
                        error!(tenant_id = %tenant_id, attempt, %err, "tenant worker restart failed");
                        if attempt >= self.config.max_restart_attempts {
                            error!(tenant_id = %tenant_id, "giving up on tenant worker restart");
                            break;
                        }
                    }
                }
            }
        }
    }

    pub async fn shutdown_all(&self) {
        let workers: Vec<Arc<TenantWorker>> = self.workers.write().await.drain().map(|(_, v)| v).collect();
        for worker in workers {
            worker.shutdown().await;
        }
    }

    pub async fn tenant_ids(&self) -> Vec<String> {
        self.workers.read().await.keys().cloned().collect()
    }
}

/// Tagged union of every query's result shape, returned by
/// `route_query` for the RPC edge (C9) to serialize.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "kind")]
pub enum QueryOutcome {
    CheckPermission(crate::domain::evaluation::EvaluationOutcome),
    EntityPermissions(Vec<queries::EntityPermissionView>),
    EffectivePermissions(Vec<queries::EffectivePermissionResult>),
    AuditTrail(Vec<crate::persistence::AuditRow>),
    ComplianceReport(queries::ComplianceReport),
    IntegrityReport(crate::persistence::IntegrityReport),
    ImpactReport(queries::ImpactReport),
}
