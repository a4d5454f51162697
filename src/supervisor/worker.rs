//! A single tenant worker: the owning bundle of C2-C5, C9 dependencies
//! for one `tenantId` (`spec.md` §4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use crate::buffer::{CommandBuffer, CommandConsumer, Dispatch};
use crate::cache::EntityCache;
use crate::domain::command::Command;
use crate::graph::EntityGraph;
use crate::handlers::{handle_command, HandlerContext};
use crate::persistence::{PersistenceError, Store};
use crate::telemetry::{names, MetricsRegistry};

/// `{tenantId, workerHandle, endpoint, startedAt, healthy, lastHealthCheck}`
/// tracked by the supervisor (`spec.md` §4.8).
pub struct TenantWorker {
    pub tenant_id: String,
    pub buffer: CommandBuffer,
    pub ctx: Arc<HandlerContext>,
    pub started_at: DateTime<Utc>,
    healthy: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    consumer_task: Mutex<Option<JoinHandle<()>>>,
}

impl TenantWorker {
    /// Loads the tenant's graph from C3, spins up the buffer + consumer
    /// task, and returns the fully wired worker. Isolation guarantee
    /// (`spec.md` §4.8): this worker's `graph`/`store` are never shared
    /// with another tenant's worker.
    #[instrument(skip(store, cache, metrics), fields(tenant_id = %tenant_id))]
    pub async fn spawn(
        tenant_id: String,
        store: Arc<dyn Store>,
        cache: Option<Arc<dyn EntityCache>>,
        metrics: Arc<MetricsRegistry>,
        buffer_capacity: usize,
        high_watermark_pct: f64,
        low_watermark_pct: f64,
    ) -> Result<Self, PersistenceError> {
        let snapshot = store.load(&tenant_id).await?;
        let mut graph = EntityGraph::default();
        let timings = graph.load(snapshot);
        info!(
            tenant_id = %tenant_id,
            entities = graph.entity_count(),
            load_ms = timings.total.num_milliseconds(),
            "tenant graph loaded"
        );
        metrics.set_gauge(names::GRAPH_ENTITY_COUNT, graph.entity_count() as f64);
        metrics.set_gauge(names::GRAPH_MEMORY_BYTES, graph.estimate_memory_bytes() as f64);

        if let Some(cache) = &cache {
            let entities: Vec<_> = graph
                .users()
                .into_iter()
                .chain(graph.groups())
                .chain(graph.roles())
                .cloned()
                .collect();
            cache.warmup(entities).await;
        }

        let graph = Arc::new(RwLock::new(graph));
        let mut ctx = HandlerContext::new(tenant_id.clone(), graph, store);
        if let Some(cache) = cache {
            ctx = ctx.with_cache(cache);
        }
        let ctx = Arc::new(ctx);

        let (buffer, consumer) = CommandBuffer::new(buffer_capacity, high_watermark_pct, low_watermark_pct);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let dispatch: Dispatch = {
            let ctx = ctx.clone();
            let metrics = metrics.clone();
            Arc::new(move |cmd: Command| {
                let ctx = ctx.clone();
                let metrics = metrics.clone();
                Box::pin(async move {
                    let kind = command_kind(&cmd);
                    let started = Utc::now();
                    let result = handle_command(&ctx, cmd, "worker-internal", 0).await;
                    let elapsed = (Utc::now() - started).num_milliseconds().max(0) as f64;
                    metrics.observe_histogram(&names::handler_duration_ms(kind), elapsed);
                    result
                })
            })
        };

        let consumer_task = tokio::spawn(run_consumer(consumer, dispatch, shutdown_rx));

        Ok(Self {
            tenant_id,
            buffer,
            ctx,
            started_at: Utc::now(),
            healthy: Arc::new(AtomicBool::new(true)),
            shutdown_tx,
            consumer_task: Mutex::new(Some(consumer_task)),
        })
    }

    /// Healthy as long as the consumer task is still running and no one
    /// has explicitly marked this worker unhealthy (`spec.md` §4.8
    /// liveness checks).
    pub async fn is_healthy(&self) -> bool {
        if !self.healthy.load(Ordering::Relaxed) {
            return false;
        }
        match self.consumer_task.lock().await.as_ref() {
            Some(handle) => !handle.is_finished(),
            None => false,
        }
    }

    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, Ordering::Relaxed);
    }

    /// Stops accepting new commands and signals the consumer to drain
    /// and exit. Does not forcibly abort in-flight work.
    pub async fn shutdown(&self) {
        self.buffer.stop();
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.consumer_task.lock().await.take() {
            let _ = handle.await;
        }
    }
}

async fn run_consumer(consumer: CommandConsumer, dispatch: Dispatch, shutdown: watch::Receiver<bool>) {
    consumer.run(dispatch, shutdown).await;
}

fn command_kind(cmd: &Command) -> &'static str {
    match cmd {
        Command::CreateEntity { .. } => "CreateEntity",
        Command::DeleteEntity { .. } => "DeleteEntity",
        Command::AddEdge { .. } => "AddEdge",
        Command::RemoveEdge { .. } => "RemoveEdge",
        Command::GrantPermission { .. } => "GrantPermission",
        Command::RevokePermission { .. } => "RevokePermission",
        Command::BulkPermissionUpdate { .. } => "BulkPermissionUpdate",
        Command::RecordAuditEvent { .. } => "RecordAuditEvent",
        Command::PurgeOldAuditData { .. } => "PurgeOldAuditData",
        Command::AccessViolation { .. } => "AccessViolation",
        Command::ValidatePermissionStructure { .. } => "ValidatePermissionStructure",
    }
}
