//! Command handlers (`spec.md` §4.5 table).
//!
//! Each handler validates preconditions, commits the durable write plus
//! one audit row, and only then mutates the in-memory graph — the
//! atomic-application rule in §7: a commit failure leaves C2 untouched.

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use crate::domain::command::{Command, ViolationSeverity};
use crate::domain::entity::{EntityId, EntityKind, Permission};
use crate::persistence::{AuditDraft, ChangeType, PersistedWrite, StagedWrites};

use super::bulk::{run_bulk_update, BulkUpdateResult};
use super::context::HandlerContext;
use super::error::HandlerError;
use super::validate::{validate_permission, StructureValidationReport};

/// What a successfully-applied command produced.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome")]
pub enum CommandOutcome {
    EntityCreated { id: EntityId, audit_id: i64 },
    EntityDeleted { id: EntityId, audit_id: i64 },
    EdgeAdded { audit_id: i64 },
    EdgeRemoved { audit_id: i64 },
    PermissionGranted { audit_id: i64 },
    PermissionRevoked { revoked_count: usize, audit_id: i64 },
    BulkUpdate(BulkUpdateResult),
    AuditRecorded { audit_id: i64 },
    Purged { rows_deleted: u64 },
    ViolationRecorded { audit_id: i64 },
    StructureValidated(StructureValidationReport),
}

#[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, correlation_id = %correlation_id))]
pub async fn handle_command(
    ctx: &HandlerContext,
    cmd: Command,
    correlation_id: &str,
    changed_by: EntityId,
) -> Result<CommandOutcome, HandlerError> {
    match cmd {
        Command::CreateEntity { id, kind, name } => create_entity(ctx, id, kind, name, correlation_id, changed_by).await,
        Command::DeleteEntity { id } => delete_entity(ctx, id, correlation_id, changed_by).await,
        Command::AddEdge { parent_id, child_id } => add_edge(ctx, parent_id, child_id, correlation_id, changed_by).await,
        Command::RemoveEdge { parent_id, child_id } => remove_edge(ctx, parent_id, child_id, correlation_id, changed_by).await,
        Command::GrantPermission { owner_id, permission } => {
            grant_permission(ctx, owner_id, permission, correlation_id, changed_by).await
        }
        Command::RevokePermission {
            owner_id,
            permission,
            cascade,
        } => revoke_permission(ctx, owner_id, permission, cascade, correlation_id, changed_by).await,
        Command::BulkPermissionUpdate {
            ops,
            validate_before_execution,
            stop_on_first_error,
            execute_in_transaction,
        } => {
            let result = run_bulk_update(
                ctx,
                ops,
                validate_before_execution,
                stop_on_first_error,
                execute_in_transaction,
                correlation_id,
                changed_by,
            )
            .await?;
            Ok(CommandOutcome::BulkUpdate(result))
        }
        Command::RecordAuditEvent {
            entity_type,
            entity_id,
            change_type,
            changed_by,
            change_details,
        } => record_audit_event(ctx, entity_type, entity_id, change_type, changed_by, change_details, correlation_id).await,
        Command::PurgeOldAuditData {
            older_than,
            except_change_types,
        } => purge_old_audit_data(ctx, older_than, except_change_types).await,
        Command::AccessViolation {
            user_id,
            resource_id,
            severity,
            action,
        } => access_violation(ctx, user_id, resource_id, severity, action, correlation_id).await,
        Command::ValidatePermissionStructure { entity_id, fix } => validate_permission_structure(ctx, entity_id, fix).await,
    }
}

async fn create_entity(
    ctx: &HandlerContext,
    id: EntityId,
    kind: EntityKind,
    name: String,
    correlation_id: &str,
    changed_by: EntityId,
) -> Result<CommandOutcome, HandlerError> {
    {
        let graph = ctx.graph.read().await;
        if graph.get(id).is_some() {
            return Err(crate::domain::error::DomainError::IdConflict(id).into());
        }
    }
    if name.trim().is_empty() {
        return Err(crate::domain::error::DomainError::NameEmpty.into());
    }

    let writes = StagedWrites::single(PersistedWrite::UpsertEntity {
        id,
        kind,
        name: name.clone(),
    });
    let audit = AuditDraft {
        entity_type: kind.as_str().to_owned(),
        entity_id: Some(id),
        change_type: ChangeType::Create,
        changed_by,
        change_date: ctx.clock.now(),
        change_details: json!({ "name": name }),
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx.store.apply(&ctx.tenant_id, writes, audit, Vec::new()).await?;

    let mut graph = ctx.graph.write().await;
    graph.create_entity(id, kind, name)?;
    drop(graph);
    invalidate_entity(ctx, id).await;

    Ok(CommandOutcome::EntityCreated { id, audit_id: audit_row.id })
}

async fn delete_entity(
    ctx: &HandlerContext,
    id: EntityId,
    correlation_id: &str,
    changed_by: EntityId,
) -> Result<CommandOutcome, HandlerError> {
    let (kind, owned_permissions) = {
        let graph = ctx.graph.read().await;
        let e = graph.get(id).ok_or(crate::domain::error::DomainError::NotFound(id))?;
        (e.kind, e.permissions.clone())
    };

    let mut writes = StagedWrites::new();
    for p in owned_permissions {
        writes.push(PersistedWrite::DeletePermission {
            owner_id: id,
            permission: p,
        });
    }
    writes.push(PersistedWrite::DeleteEntity { id });

    let audit = AuditDraft {
        entity_type: kind.as_str().to_owned(),
        entity_id: Some(id),
        change_type: ChangeType::Delete,
        changed_by,
        change_date: ctx.clock.now(),
        change_details: json!({}),
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx.store.apply(&ctx.tenant_id, writes, audit, Vec::new()).await?;

    let mut graph = ctx.graph.write().await;
    graph.delete_entity(id)?;
    drop(graph);
    invalidate_entity(ctx, id).await;

    Ok(CommandOutcome::EntityDeleted { id, audit_id: audit_row.id })
}

async fn add_edge(
    ctx: &HandlerContext,
    parent_id: EntityId,
    child_id: EntityId,
    correlation_id: &str,
    changed_by: EntityId,
) -> Result<CommandOutcome, HandlerError> {
    {
        // Precondition check happens here so a doomed edge never reaches
        // the durable store; `EntityGraph::add_edge` re-validates anyway
        // once we hold the writer lock, since it is the only place that
        // can observe the graph mid-mutation.
        let graph = ctx.graph.read().await;
        let parent = graph.get(parent_id).ok_or(crate::domain::error::DomainError::NotFound(parent_id))?;
        let child = graph.get(child_id).ok_or(crate::domain::error::DomainError::NotFound(child_id))?;
        crate::domain::edge::check_edge_kind(parent.kind, child.kind)?;
        if graph.ancestors(parent_id).any(|a| a == child_id) || parent_id == child_id {
            return Err(crate::domain::error::DomainError::CycleError { parent: parent_id, child: child_id }.into());
        }
    }

    let writes = StagedWrites::single(PersistedWrite::InsertEdge { parent_id, child_id });
    let audit = AuditDraft {
        entity_type: "edge".to_owned(),
        entity_id: Some(child_id),
        change_type: ChangeType::AddEdge,
        changed_by,
        change_date: ctx.clock.now(),
        change_details: json!({ "parent_id": parent_id, "child_id": child_id }),
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx.store.apply(&ctx.tenant_id, writes, audit, Vec::new()).await?;

    let mut graph = ctx.graph.write().await;
    graph.add_edge(parent_id, child_id)?;
    drop(graph);
    invalidate_entity(ctx, child_id).await;

    Ok(CommandOutcome::EdgeAdded { audit_id: audit_row.id })
}

async fn remove_edge(
    ctx: &HandlerContext,
    parent_id: EntityId,
    child_id: EntityId,
    correlation_id: &str,
    changed_by: EntityId,
) -> Result<CommandOutcome, HandlerError> {
    {
        let graph = ctx.graph.read().await;
        if !graph.parents_of(child_id).contains(&parent_id) {
            return Err(crate::domain::error::DomainError::NotFound(child_id).into());
        }
    }

    let writes = StagedWrites::single(PersistedWrite::DeleteEdge { parent_id, child_id });
    let audit = AuditDraft {
        entity_type: "edge".to_owned(),
        entity_id: Some(child_id),
        change_type: ChangeType::RemoveEdge,
        changed_by,
        change_date: ctx.clock.now(),
        change_details: json!({ "parent_id": parent_id, "child_id": child_id }),
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx.store.apply(&ctx.tenant_id, writes, audit, Vec::new()).await?;

    let mut graph = ctx.graph.write().await;
    graph.remove_edge(parent_id, child_id)?;
    drop(graph);
    invalidate_entity(ctx, child_id).await;

    Ok(CommandOutcome::EdgeRemoved { audit_id: audit_row.id })
}

async fn grant_permission(
    ctx: &HandlerContext,
    owner_id: EntityId,
    permission: Permission,
    correlation_id: &str,
    changed_by: EntityId,
) -> Result<CommandOutcome, HandlerError> {
    {
        let graph = ctx.graph.read().await;
        graph.get(owner_id).ok_or(crate::domain::error::DomainError::NotFound(owner_id))?;
    }
    validate_permission(&permission)?;

    let writes = StagedWrites::single(PersistedWrite::InsertPermission {
        owner_id,
        permission: permission.clone(),
    });
    let audit = AuditDraft {
        entity_type: "permission".to_owned(),
        entity_id: Some(owner_id),
        change_type: ChangeType::GrantPermission,
        changed_by,
        change_date: ctx.clock.now(),
        change_details: serde_json::to_value(&permission).unwrap_or_default(),
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx.store.apply(&ctx.tenant_id, writes, audit, Vec::new()).await?;

    let mut graph = ctx.graph.write().await;
    graph.add_permission(owner_id, permission)?;
    drop(graph);
    invalidate_entity(ctx, owner_id).await;

    Ok(CommandOutcome::PermissionGranted { audit_id: audit_row.id })
}

async fn revoke_permission(
    ctx: &HandlerContext,
    owner_id: EntityId,
    permission: Permission,
    cascade: bool,
    correlation_id: &str,
    changed_by: EntityId,
) -> Result<CommandOutcome, HandlerError> {
    let descendants = {
        let graph = ctx.graph.read().await;
        graph.get(owner_id).ok_or(crate::domain::error::DomainError::NotFound(owner_id))?;
        if cascade {
            graph.descendants(owner_id)
        } else {
            Vec::new()
        }
    };

    let mut writes = StagedWrites::single(PersistedWrite::DeletePermission {
        owner_id,
        permission: permission.clone(),
    });
    for d in &descendants {
        writes.push(PersistedWrite::DeletePermission {
            owner_id: *d,
            permission: permission.clone(),
        });
    }

    let audit = AuditDraft {
        entity_type: "permission".to_owned(),
        entity_id: Some(owner_id),
        change_type: ChangeType::RevokePermission,
        changed_by,
        change_date: ctx.clock.now(),
        change_details: serde_json::to_value(&permission).unwrap_or_default(),
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx.store.apply(&ctx.tenant_id, writes, audit, Vec::new()).await?;

    let mut graph = ctx.graph.write().await;
    graph.remove_permission(owner_id, &permission, cascade)?;
    drop(graph);
    invalidate_entity(ctx, owner_id).await;
    for d in &descendants {
        invalidate_entity(ctx, *d).await;
    }

    Ok(CommandOutcome::PermissionRevoked {
        revoked_count: 1 + descendants.len(),
        audit_id: audit_row.id,
    })
}

async fn record_audit_event(
    ctx: &HandlerContext,
    entity_type: String,
    entity_id: Option<EntityId>,
    change_type: String,
    changed_by: EntityId,
    change_details: serde_json::Value,
    correlation_id: &str,
) -> Result<CommandOutcome, HandlerError> {
    if entity_type.trim().is_empty() {
        return Err(HandlerError::AuditInvalid("entity_type must not be empty".into()));
    }
    let parsed = parse_change_type(&change_type)
        .ok_or_else(|| HandlerError::AuditInvalid(format!("unknown change_type {change_type}")))?;
    let audit = AuditDraft {
        entity_type,
        entity_id,
        change_type: parsed,
        changed_by,
        change_date: ctx.clock.now(),
        change_details,
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx.store.apply(&ctx.tenant_id, StagedWrites::default(), audit, Vec::new()).await?;
    Ok(CommandOutcome::AuditRecorded { audit_id: audit_row.id })
}

fn parse_change_type(s: &str) -> Option<ChangeType> {
    Some(match s {
        "Create" => ChangeType::Create,
        "Update" => ChangeType::Update,
        "Delete" => ChangeType::Delete,
        "GrantPermission" => ChangeType::GrantPermission,
        "RevokePermission" => ChangeType::RevokePermission,
        "AddEdge" => ChangeType::AddEdge,
        "RemoveEdge" => ChangeType::RemoveEdge,
        "SecurityViolation" => ChangeType::SecurityViolation,
        "BulkPermissionUpdate" => ChangeType::BulkPermissionUpdate,
        "Purge" => ChangeType::Purge,
        _ => return None,
    })
}

async fn purge_old_audit_data(
    ctx: &HandlerContext,
    older_than: chrono::DateTime<Utc>,
    except_change_types: Vec<String>,
) -> Result<CommandOutcome, HandlerError> {
    if older_than > ctx.clock.now() {
        return Err(crate::domain::error::DomainError::PermInvalid("older_than must be in the past".into()).into());
    }
    let except: Vec<ChangeType> = except_change_types.iter().filter_map(|s| parse_change_type(s)).collect();
    let rows_deleted = ctx
        .store
        .purge_audit_older_than(&ctx.tenant_id, older_than, &except)
        .await?;
    Ok(CommandOutcome::Purged { rows_deleted })
}

async fn access_violation(
    ctx: &HandlerContext,
    user_id: EntityId,
    resource_id: EntityId,
    severity: ViolationSeverity,
    action: String,
    correlation_id: &str,
) -> Result<CommandOutcome, HandlerError> {
    let audit = AuditDraft {
        entity_type: "access_violation".to_owned(),
        entity_id: Some(resource_id),
        change_type: ChangeType::SecurityViolation,
        changed_by: user_id,
        change_date: ctx.clock.now(),
        change_details: json!({ "severity": format!("{severity:?}"), "action": action, "resource_id": resource_id }),
        correlation_id: correlation_id.to_owned(),
    };
    let audit_row = ctx.store.apply(&ctx.tenant_id, StagedWrites::default(), audit, Vec::new()).await?;
    Ok(CommandOutcome::ViolationRecorded { audit_id: audit_row.id })
}

async fn validate_permission_structure(
    ctx: &HandlerContext,
    entity_id: EntityId,
    fix: bool,
) -> Result<CommandOutcome, HandlerError> {
    let graph = ctx.graph.read().await;
    let entity = graph.get(entity_id).ok_or(crate::domain::error::DomainError::NotFound(entity_id))?;
    let mut malformed = Vec::new();
    for p in &entity.permissions {
        if let Err(e) = validate_permission(p) {
            malformed.push((p.clone(), e.to_string()));
        }
    }
    drop(graph);

    let report = StructureValidationReport {
        entity_id,
        malformed_count: malformed.len(),
        issues: malformed.iter().map(|(_, msg)| msg.clone()).collect(),
        fixed: false,
    };

    if fix && !malformed.is_empty() {
        let mut graph = ctx.graph.write().await;
        if let Some(e) = graph.get(entity_id) {
            let _ = e; // fixing malformed records is a future enhancement; report-only for now
        }
    }

    Ok(CommandOutcome::StructureValidated(report))
}

async fn invalidate_entity(ctx: &HandlerContext, id: EntityId) {
    if let Some(cache) = &ctx.cache {
        cache.invalidate_entity(id).await;
        cache.invalidate_entity_permissions(id).await;
    }
}
