//! The `Store` contract (`spec.md` §4.3): one atomic `apply` per command,
//! a full-tenant `load` for graph bootstrap, and bounded audit retention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::graph::snapshot::Snapshot;

use super::audit::{AuditDraft, AuditRow, ChangeType, IntegrityReport};
use super::error::PersistenceError;
use super::mutation::StagedWrites;

/// Durable store for one tenant's entities, edges, permissions, and
/// audit log. Implementations MUST make `apply` atomic: either every
/// staged write and the audit row commit, or none do (`spec.md` §7).
#[async_trait]
pub trait Store: Send + Sync {
    /// Commits `writes`, `audit`, and `extra_audits` in a single
    /// transaction, chaining each row's hash onto the previous one (the
    /// tenant's last known hash, then `audit`, then each of
    /// `extra_audits` in order) when the tenant has integrity chaining
    /// enabled. Returns the row for `audit`; `extra_audits` commit
    /// alongside it but are not returned, since callers that need them
    /// back (`BulkPermissionUpdate`'s per-op rows) can read them from
    /// `audit_trail` (`spec.md` §4.5.1 step 5).
    async fn apply(
        &self,
        tenant_id: &str,
        writes: StagedWrites,
        audit: AuditDraft,
        extra_audits: Vec<AuditDraft>,
    ) -> Result<AuditRow, PersistenceError>;

    /// Full snapshot used by `EntityGraph::load` on worker startup.
    async fn load(&self, tenant_id: &str) -> Result<Snapshot, PersistenceError>;

    /// Deletes audit rows strictly older than `older_than`, skipping any
    /// row whose `change_type` is in `except_change_types`. Returns the
    /// number of rows removed.
    async fn purge_audit_older_than(
        &self,
        tenant_id: &str,
        older_than: DateTime<Utc>,
        except_change_types: &[ChangeType],
    ) -> Result<u64, PersistenceError>;

    async fn audit_trail(
        &self,
        tenant_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        entity_id: Option<crate::domain::entity::EntityId>,
    ) -> Result<Vec<AuditRow>, PersistenceError>;

    /// Recomputes the hash chain for `[since, until]` and reports any
    /// mismatches (`ValidateAuditIntegrity`, `spec.md` §8 property 10).
    async fn validate_integrity(
        &self,
        tenant_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<IntegrityReport, PersistenceError>;
}
