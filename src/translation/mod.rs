//! Translation Layer (C6): pure mapping from wire DTOs to the
//! strongly-typed domain `Command`/`Query`, with mutation/query
//! classification (`spec.md` §4.6). No business logic lives here —
//! only shape validation and enum-name resolution.

pub mod dto;

use std::collections::BTreeMap;

use thiserror::Error;

use crate::domain::command::{BulkOp, Command, OpKind, Query, ViolationSeverity};
use crate::domain::entity::{Effect, EntityKind, MetadataValue, Permission, Verb};

use dto::{
    AccessViolationDto, BulkOpDto, BulkPermissionUpdateDto, CheckPermissionDto, CreateEntityDto, DeleteEntityDto, EdgeDto,
    GetAuditTrailDto, GetComplianceReportDto, GetEffectivePermissionsDto, GetEntityPermissionsDto, GrantPermissionDto,
    PermissionDto, PermissionImpactAnalysisDto, PurgeOldAuditDataDto, RecordAuditEventDto, RevokePermissionDto,
    ValidateAuditIntegrityDto, ValidatePermissionStructureDto,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("unknown entity kind: {0}")]
    UnknownKind(String),
    #[error("unknown verb: {0}")]
    UnknownVerb(String),
    #[error("unknown effect: {0}")]
    UnknownEffect(String),
    #[error("unknown bulk op kind: {0}")]
    UnknownBulkOpKind(String),
    #[error("bulk op {0} missing required permission field")]
    MissingPermission(String),
    #[error("field validation failed: {0}")]
    Invalid(String),
}

fn parse_kind(s: &str) -> Result<EntityKind, TranslationError> {
    match s.to_ascii_lowercase().as_str() {
        "user" => Ok(EntityKind::User),
        "group" => Ok(EntityKind::Group),
        "role" => Ok(EntityKind::Role),
        other => Err(TranslationError::UnknownKind(other.to_owned())),
    }
}

fn parse_verb(s: &str) -> Result<Verb, TranslationError> {
    match s.to_ascii_uppercase().as_str() {
        "GET" => Ok(Verb::Get),
        "POST" => Ok(Verb::Post),
        "PUT" => Ok(Verb::Put),
        "PATCH" => Ok(Verb::Patch),
        "DELETE" => Ok(Verb::Delete),
        "HEAD" => Ok(Verb::Head),
        "OPTIONS" => Ok(Verb::Options),
        "CONNECT" => Ok(Verb::Connect),
        "TRACE" => Ok(Verb::Trace),
        other => Err(TranslationError::UnknownVerb(other.to_owned())),
    }
}

fn parse_effect(s: &str) -> Result<Effect, TranslationError> {
    match s.to_ascii_lowercase().as_str() {
        "grant" => Ok(Effect::Grant),
        "deny" => Ok(Effect::Deny),
        other => Err(TranslationError::UnknownEffect(other.to_owned())),
    }
}

fn parse_severity(s: &str) -> Result<ViolationSeverity, TranslationError> {
    match s.to_ascii_lowercase().as_str() {
        "low" => Ok(ViolationSeverity::Low),
        "medium" => Ok(ViolationSeverity::Medium),
        "high" => Ok(ViolationSeverity::High),
        "critical" => Ok(ViolationSeverity::Critical),
        other => Err(TranslationError::Invalid(format!("unknown violation severity: {other}"))),
    }
}

fn parse_metadata(v: &serde_json::Value) -> BTreeMap<String, MetadataValue> {
    v.as_object()
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| serde_json::from_value::<MetadataValue>(v.clone()).ok().map(|mv| (k.clone(), mv)))
                .collect()
        })
        .unwrap_or_default()
}

pub fn translate_permission(dto: PermissionDto) -> Result<Permission, TranslationError> {
    Ok(Permission {
        uri: dto.uri,
        verb: parse_verb(&dto.verb)?,
        effect: parse_effect(&dto.effect)?,
        scheme: dto.scheme,
        expires_at: dto.expires_at,
        metadata: parse_metadata(&dto.metadata),
    })
}

pub fn translate_create_entity(dto: CreateEntityDto) -> Result<Command, TranslationError> {
    Ok(Command::CreateEntity {
        id: dto.id,
        kind: parse_kind(&dto.kind)?,
        name: dto.name,
    })
}

pub fn translate_delete_entity(dto: DeleteEntityDto) -> Command {
    Command::DeleteEntity { id: dto.id }
}

pub fn translate_add_edge(dto: EdgeDto) -> Command {
    Command::AddEdge {
        parent_id: dto.parent_id,
        child_id: dto.child_id,
    }
}

pub fn translate_remove_edge(dto: EdgeDto) -> Command {
    Command::RemoveEdge {
        parent_id: dto.parent_id,
        child_id: dto.child_id,
    }
}

pub fn translate_grant_permission(dto: GrantPermissionDto) -> Result<Command, TranslationError> {
    Ok(Command::GrantPermission {
        owner_id: dto.owner_id,
        permission: translate_permission(dto.permission)?,
    })
}

pub fn translate_revoke_permission(dto: RevokePermissionDto) -> Result<Command, TranslationError> {
    Ok(Command::RevokePermission {
        owner_id: dto.owner_id,
        permission: translate_permission(dto.permission)?,
        cascade: dto.cascade,
    })
}

fn translate_bulk_op(dto: BulkOpDto) -> Result<BulkOp, TranslationError> {
    match dto.kind.as_str() {
        "Grant" => Ok(BulkOp::Grant {
            entity_id: dto.entity_id,
            permission: translate_permission(dto.permission.ok_or_else(|| TranslationError::MissingPermission("Grant".into()))?)?,
        }),
        "Revoke" => Ok(BulkOp::Revoke {
            entity_id: dto.entity_id,
            permission: translate_permission(dto.permission.ok_or_else(|| TranslationError::MissingPermission("Revoke".into()))?)?,
        }),
        "Update" => Ok(BulkOp::Update {
            entity_id: dto.entity_id,
            old: translate_permission(dto.old_permission.ok_or_else(|| TranslationError::MissingPermission("Update.old".into()))?)?,
            new: translate_permission(dto.new_permission.ok_or_else(|| TranslationError::MissingPermission("Update.new".into()))?)?,
        }),
        other => Err(TranslationError::UnknownBulkOpKind(other.to_owned())),
    }
}

pub fn translate_bulk_update(dto: BulkPermissionUpdateDto) -> Result<Command, TranslationError> {
    let ops = dto.ops.into_iter().map(translate_bulk_op).collect::<Result<Vec<_>, _>>()?;
    Ok(Command::BulkPermissionUpdate {
        ops,
        validate_before_execution: dto.validate_before_execution,
        stop_on_first_error: dto.stop_on_first_error,
        execute_in_transaction: dto.execute_in_transaction,
    })
}

pub fn translate_check_permission(dto: CheckPermissionDto) -> Result<Query, TranslationError> {
    Ok(Query::CheckPermission {
        entity_id: dto.entity_id,
        uri: dto.uri,
        verb: parse_verb(&dto.verb)?,
        at: dto.at,
    })
}

pub fn translate_record_audit_event(dto: RecordAuditEventDto) -> Command {
    Command::RecordAuditEvent {
        entity_type: dto.entity_type,
        entity_id: dto.entity_id,
        change_type: dto.change_type,
        changed_by: dto.changed_by,
        change_details: dto.change_details,
    }
}

pub fn translate_purge_old_audit_data(dto: PurgeOldAuditDataDto) -> Command {
    Command::PurgeOldAuditData {
        older_than: dto.older_than,
        except_change_types: dto.except_change_types,
    }
}

pub fn translate_access_violation(dto: AccessViolationDto) -> Result<Command, TranslationError> {
    Ok(Command::AccessViolation {
        user_id: dto.user_id,
        resource_id: dto.resource_id,
        severity: parse_severity(&dto.severity)?,
        action: dto.action,
    })
}

pub fn translate_validate_permission_structure(dto: ValidatePermissionStructureDto) -> Command {
    Command::ValidatePermissionStructure {
        entity_id: dto.entity_id,
        fix: dto.fix,
    }
}

pub fn translate_get_entity_permissions(dto: GetEntityPermissionsDto) -> Query {
    Query::GetEntityPermissions {
        entity_id: dto.entity_id,
        include_inherited: dto.include_inherited,
    }
}

pub fn translate_get_effective_permissions(dto: GetEffectivePermissionsDto) -> Query {
    Query::GetEffectivePermissions {
        entity_id: dto.entity_id,
        resource_ids: dto.resource_ids,
        resolve_conflicts: dto.resolve_conflicts,
    }
}

pub fn translate_get_audit_trail(dto: GetAuditTrailDto) -> Query {
    Query::GetAuditTrail {
        since: dto.since,
        until: dto.until,
        entity_id: dto.entity_id,
    }
}

pub fn translate_get_compliance_report(dto: GetComplianceReportDto) -> Query {
    Query::GetComplianceReport {
        since: dto.since,
        until: dto.until,
    }
}

pub fn translate_validate_audit_integrity(dto: ValidateAuditIntegrityDto) -> Query {
    Query::ValidateAuditIntegrity {
        since: dto.since,
        until: dto.until,
    }
}

pub fn translate_permission_impact_analysis(dto: PermissionImpactAnalysisDto) -> Result<Query, TranslationError> {
    let added_permissions = dto.added_permissions.into_iter().map(translate_permission).collect::<Result<Vec<_>, _>>()?;
    let removed_permissions = dto.removed_permissions.into_iter().map(translate_permission).collect::<Result<Vec<_>, _>>()?;
    Ok(Query::PermissionImpactAnalysis {
        role_id: dto.role_id,
        added_permissions,
        removed_permissions,
        max_depth: dto.max_depth,
    })
}

/// Classifies a domain command as `Mutation` (every `Command` variant
/// goes through C4) — kept as a free function rather than a method on
/// `Command` so C6 stays the single place that knows the classification
/// rule, per `spec.md` §4.6.
#[must_use]
pub fn classify_command() -> OpKind {
    OpKind::Mutation
}

#[must_use]
pub fn classify_query() -> OpKind {
    OpKind::Query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_kind() {
        let dto = CreateEntityDto {
            id: 1,
            kind: "widget".into(),
            name: "x".into(),
        };
        assert_eq!(translate_create_entity(dto).unwrap_err(), TranslationError::UnknownKind("widget".into()));
    }

    #[test]
    fn maps_lowercase_verb_and_effect() {
        let dto = PermissionDto {
            uri: "/api/x".into(),
            verb: "get".into(),
            effect: "GRANT".into(),
            scheme: "ApiUriAuthorization".into(),
            expires_at: None,
            metadata: serde_json::json!({}),
        };
        let p = translate_permission(dto).unwrap();
        assert_eq!(p.verb, Verb::Get);
        assert_eq!(p.effect, Effect::Grant);
    }
}
