//! Metric name constants, one per named series in `spec.md` §6.

// Counters
pub const API_REQUEST_COUNT: &str = "acs.api.request.count";
pub const API_REQUEST_ERRORS: &str = "acs.api.request.errors";
pub const BUSINESS_ENTITIES_CREATED: &str = "acs.business.entities_created";
pub const BUSINESS_ENTITIES_DELETED: &str = "acs.business.entities_deleted";
pub const BUSINESS_PERMISSIONS_GRANTED: &str = "acs.business.permissions_granted";
pub const BUSINESS_PERMISSIONS_REVOKED: &str = "acs.business.permissions_revoked";
pub const BUSINESS_BULK_UPDATES: &str = "acs.business.bulk_updates";
pub const CACHE_HITS: &str = "acs.cache.hits";
pub const CACHE_MISSES: &str = "acs.cache.misses";
pub const BUFFER_ENQUEUED: &str = "acs.buffer.enqueued";
pub const BUFFER_COMPLETED: &str = "acs.buffer.completed";
pub const BUFFER_FAILED: &str = "acs.buffer.failed";

// Gauges
pub const API_ACTIVE_REQUESTS: &str = "acs.api.active_requests";
pub const BUFFER_QUEUE_DEPTH: &str = "acs.buffer.queue_depth";
pub const GRAPH_ENTITY_COUNT: &str = "acs.graph.entity_count";
pub const GRAPH_MEMORY_BYTES: &str = "acs.graph.memory_bytes";

// Histograms
pub const API_REQUEST_DURATION_MS: &str = "acs.api.request.duration_ms";
pub const BUFFER_LATENCY_MS: &str = "acs.buffer.latency_ms";
pub const DB_QUERY_DURATION_MS: &str = "acs.db.query.duration_ms";

/// Per-kind handler duration histogram name, e.g.
/// `acs.handler.duration_ms{kind=CreateEntity}`.
#[must_use]
pub fn handler_duration_ms(kind: &str) -> String {
    format!("acs.handler.duration_ms{{kind={kind}}}")
}
