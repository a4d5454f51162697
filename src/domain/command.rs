//! Strongly-typed domain commands and queries (`spec.md` §4.5).
//!
//! These are what the Translation layer (C6) produces and what the
//! handlers (C5) consume. Commands mutate through the Command Buffer
//! (C4); queries run directly against the graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{EntityId, EntityKind, Permission};

/// A single operation within a `BulkPermissionUpdate` (§4.5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BulkOp {
    Grant {
        entity_id: EntityId,
        permission: Permission,
    },
    Revoke {
        entity_id: EntityId,
        permission: Permission,
    },
    Update {
        entity_id: EntityId,
        old: Permission,
        new: Permission,
    },
}

impl BulkOp {
    #[must_use]
    pub fn entity_id(&self) -> EntityId {
        match self {
            Self::Grant { entity_id, .. }
            | Self::Revoke { entity_id, .. }
            | Self::Update { entity_id, .. } => *entity_id,
        }
    }
}

/// Severity of a security/access-violation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// State-mutating commands. Travel through the Command Buffer (C4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    CreateEntity {
        id: EntityId,
        kind: EntityKind,
        name: String,
    },
    DeleteEntity {
        id: EntityId,
    },
    AddEdge {
        parent_id: EntityId,
        child_id: EntityId,
    },
    RemoveEdge {
        parent_id: EntityId,
        child_id: EntityId,
    },
    GrantPermission {
        owner_id: EntityId,
        permission: Permission,
    },
    RevokePermission {
        owner_id: EntityId,
        permission: Permission,
        cascade: bool,
    },
    BulkPermissionUpdate {
        ops: Vec<BulkOp>,
        validate_before_execution: bool,
        stop_on_first_error: bool,
        execute_in_transaction: bool,
    },
    RecordAuditEvent {
        entity_type: String,
        entity_id: Option<EntityId>,
        change_type: String,
        changed_by: EntityId,
        change_details: serde_json::Value,
    },
    PurgeOldAuditData {
        older_than: DateTime<Utc>,
        except_change_types: Vec<String>,
    },
    AccessViolation {
        user_id: EntityId,
        resource_id: EntityId,
        severity: ViolationSeverity,
        action: String,
    },
    ValidatePermissionStructure {
        entity_id: EntityId,
        fix: bool,
    },
}

/// Read-only queries. Execute directly against the graph under a reader
/// lock, never entering the Command Buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Query {
    CheckPermission {
        entity_id: EntityId,
        uri: String,
        verb: super::entity::Verb,
        at: Option<DateTime<Utc>>,
    },
    GetEntityPermissions {
        entity_id: EntityId,
        include_inherited: bool,
    },
    GetEffectivePermissions {
        entity_id: EntityId,
        resource_ids: Vec<EntityId>,
        resolve_conflicts: bool,
    },
    GetAuditTrail {
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        entity_id: Option<EntityId>,
    },
    GetComplianceReport {
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    },
    ValidateAuditIntegrity {
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    },
    PermissionImpactAnalysis {
        role_id: EntityId,
        added_permissions: Vec<Permission>,
        removed_permissions: Vec<Permission>,
        max_depth: usize,
    },
}

/// Classification assigned by the Translation layer (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Mutation,
    Query,
}
