//! The `BulkPermissionUpdate` algorithm (`spec.md` §4.5.1).
//!
//! Execution works against a scratch clone of the graph so a transactional
//! batch can be discarded wholesale on failure without ever touching the
//! live graph other components are reading concurrently.

use serde::Serialize;
use serde_json::json;

use crate::domain::command::BulkOp;
use crate::domain::entity::EntityId;
use crate::domain::error::DomainError;
use crate::graph::EntityGraph;
use crate::persistence::{AuditDraft, ChangeType, PersistedWrite, StagedWrites};

use super::context::HandlerContext;
use super::error::HandlerError;
use super::validate::validate_permission;

#[derive(Debug, Clone, Serialize)]
pub struct BulkOpError {
    pub index: usize,
    pub entity_id: EntityId,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkUpdateResult {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub errors: Vec<BulkOpError>,
    pub correlation_id: String,
    pub aggregate_audit_id: Option<i64>,
}

fn validate_bulk_op(graph: &EntityGraph, op: &BulkOp) -> Result<(), DomainError> {
    match op {
        BulkOp::Grant { entity_id, permission } => {
            graph.get(*entity_id).ok_or(DomainError::NotFound(*entity_id))?;
            validate_permission(permission)?;
        }
        BulkOp::Revoke { entity_id, permission } => {
            let e = graph.get(*entity_id).ok_or(DomainError::NotFound(*entity_id))?;
            if !e.permissions.contains(permission) {
                return Err(DomainError::NotFound(*entity_id));
            }
        }
        BulkOp::Update { entity_id, old, new } => {
            let e = graph.get(*entity_id).ok_or(DomainError::NotFound(*entity_id))?;
            if !e.permissions.contains(old) {
                return Err(DomainError::NotFound(*entity_id));
            }
            validate_permission(new)?;
        }
    }
    Ok(())
}

fn apply_bulk_op(scratch: &mut EntityGraph, op: &BulkOp) -> Result<PersistedWrite, DomainError> {
    match op {
        BulkOp::Grant { entity_id, permission } => {
            scratch.add_permission(*entity_id, permission.clone())?;
            Ok(PersistedWrite::InsertPermission {
                owner_id: *entity_id,
                permission: permission.clone(),
            })
        }
        BulkOp::Revoke { entity_id, permission } => {
            scratch.remove_permission(*entity_id, permission, false)?;
            Ok(PersistedWrite::DeletePermission {
                owner_id: *entity_id,
                permission: permission.clone(),
            })
        }
        BulkOp::Update { entity_id, old, new } => {
            scratch.remove_permission(*entity_id, old, false)?;
            scratch.add_permission(*entity_id, new.clone())?;
            Ok(PersistedWrite::InsertPermission {
                owner_id: *entity_id,
                permission: new.clone(),
            })
        }
    }
}

/// The per-op audit row to emit alongside the aggregate row for an op
/// that applied cleanly (`spec.md` §4.5.1 step 5).
fn per_op_audit(op: &BulkOp, index: usize, correlation_id: &str, changed_by: EntityId, when: chrono::DateTime<chrono::Utc>) -> AuditDraft {
    let (change_type, entity_id, details) = match op {
        BulkOp::Grant { entity_id, permission } => (
            ChangeType::GrantPermission,
            *entity_id,
            json!({ "index": index, "permission": permission }),
        ),
        BulkOp::Revoke { entity_id, permission } => (
            ChangeType::RevokePermission,
            *entity_id,
            json!({ "index": index, "permission": permission }),
        ),
        BulkOp::Update { entity_id, old, new } => (
            ChangeType::GrantPermission,
            *entity_id,
            json!({ "index": index, "old": old, "new": new }),
        ),
    };
    AuditDraft {
        entity_type: "permission".to_owned(),
        entity_id: Some(entity_id),
        change_type,
        changed_by,
        change_date: when,
        change_details: details,
        correlation_id: correlation_id.to_owned(),
    }
}

#[allow(clippy::too_many_arguments)]
pub async fn run_bulk_update(
    ctx: &HandlerContext,
    ops: Vec<BulkOp>,
    validate_before_execution: bool,
    stop_on_first_error: bool,
    execute_in_transaction: bool,
    correlation_id: &str,
    changed_by: EntityId,
) -> Result<BulkUpdateResult, HandlerError> {
    let total = ops.len();

    // 1. Validation pass.
    let mut errors: Vec<BulkOpError> = {
        let graph = ctx.graph.read().await;
        ops.iter()
            .enumerate()
            .filter_map(|(index, op)| {
                validate_bulk_op(&graph, op).err().map(|e| BulkOpError {
                    index,
                    entity_id: op.entity_id(),
                    message: e.to_string(),
                })
            })
            .collect()
    };

    // 2. Fail fast without touching the graph or the store.
    if validate_before_execution && !errors.is_empty() {
        return Ok(BulkUpdateResult {
            total,
            successful: 0,
            failed: total,
            errors,
            correlation_id: correlation_id.to_owned(),
            aggregate_audit_id: None,
        });
    }
    errors.clear();

    // 3. Execution pass against a scratch clone.
    let mut writes = StagedWrites::new();
    let mut per_op_audits = Vec::new();
    let mut applied = 0usize;
    let now = ctx.clock.now();
    let scratch = {
        let graph = ctx.graph.read().await;
        let mut scratch = graph.clone();
        for (index, op) in ops.iter().enumerate() {
            match apply_bulk_op(&mut scratch, op) {
                Ok(write) => {
                    writes.push(write);
                    per_op_audits.push(per_op_audit(op, index, correlation_id, changed_by, now));
                    applied += 1;
                }
                Err(e) => {
                    errors.push(BulkOpError {
                        index,
                        entity_id: op.entity_id(),
                        message: e.to_string(),
                    });
                    if stop_on_first_error {
                        break;
                    }
                }
            }
        }
        scratch
    };

    let any_failed = !errors.is_empty();
    let rolled_back = execute_in_transaction && any_failed;
    let (successful, failed, committed_writes, committed_audits) = if rolled_back {
        (0, total, StagedWrites::default(), Vec::new())
    } else {
        (applied, total - applied, writes, per_op_audits)
    };

    // 5. One aggregate audit row summarising counts, plus one per-op row
    // for every op that actually applied, all staged through the same
    // `Store::apply` transaction as the writes themselves (`spec.md`
    // §4.5.1 step 5).
    let audit = AuditDraft {
        entity_type: "bulk_permission_update".to_owned(),
        entity_id: None,
        change_type: ChangeType::BulkPermissionUpdate,
        changed_by,
        change_date: now,
        change_details: json!({
            "total": total,
            "successful": successful,
            "failed": failed,
            "rolled_back": rolled_back,
            "errors": errors,
        }),
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx
        .store
        .apply(&ctx.tenant_id, committed_writes, audit, committed_audits)
        .await?;

    if !rolled_back {
        let mut graph = ctx.graph.write().await;
        *graph = scratch;
    }

    Ok(BulkUpdateResult {
        total,
        successful,
        failed,
        errors,
        correlation_id: correlation_id.to_owned(),
        aggregate_audit_id: Some(audit_row.id),
    })
}
