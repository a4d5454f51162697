//! Wire-shaped request DTOs (`spec.md` §4.6, §6): strings, numeric ids,
//! and enum *names* rather than the strongly-typed domain enums.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PermissionDto {
    #[validate(length(min = 1))]
    pub uri: String,
    pub verb: String,
    pub effect: String,
    #[validate(length(min = 1))]
    pub scheme: String,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateEntityDto {
    pub id: u64,
    pub kind: String,
    #[validate(length(min = 1))]
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteEntityDto {
    pub id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeDto {
    pub parent_id: u64,
    pub child_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantPermissionDto {
    pub owner_id: u64,
    pub permission: PermissionDto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokePermissionDto {
    pub owner_id: u64,
    pub permission: PermissionDto,
    #[serde(default)]
    pub cascade: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkOpDto {
    pub kind: String, // "Grant" | "Revoke" | "Update"
    pub entity_id: u64,
    pub permission: Option<PermissionDto>,
    pub old_permission: Option<PermissionDto>,
    pub new_permission: Option<PermissionDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkPermissionUpdateDto {
    pub ops: Vec<BulkOpDto>,
    #[serde(default)]
    pub validate_before_execution: bool,
    #[serde(default)]
    pub stop_on_first_error: bool,
    #[serde(default = "default_true")]
    pub execute_in_transaction: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckPermissionDto {
    pub entity_id: u64,
    pub uri: String,
    pub verb: String,
    pub at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The envelope every DTO travels in over the RPC edge (C9): carries the
/// idempotency key and request metadata alongside the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope<T> {
    pub correlation_id: String,
    pub requested_at: chrono::DateTime<chrono::Utc>,
    pub requested_by: u64,
    pub payload: T,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAuditEventDto {
    pub entity_type: String,
    pub entity_id: Option<u64>,
    pub change_type: String,
    pub changed_by: u64,
    #[serde(default)]
    pub change_details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeOldAuditDataDto {
    pub older_than: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub except_change_types: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessViolationDto {
    pub user_id: u64,
    pub resource_id: u64,
    pub severity: String,
    pub action: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatePermissionStructureDto {
    pub entity_id: u64,
    #[serde(default)]
    pub fix: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetEntityPermissionsDto {
    pub entity_id: u64,
    #[serde(default)]
    pub include_inherited: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetEffectivePermissionsDto {
    pub entity_id: u64,
    pub resource_ids: Vec<u64>,
    #[serde(default)]
    pub resolve_conflicts: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetAuditTrailDto {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
    pub entity_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetComplianceReportDto {
    pub since: chrono::DateTime<chrono::Utc>,
    pub until: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateAuditIntegrityDto {
    pub since: Option<chrono::DateTime<chrono::Utc>>,
    pub until: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionImpactAnalysisDto {
    pub role_id: u64,
    #[serde(default)]
    pub added_permissions: Vec<PermissionDto>,
    #[serde(default)]
    pub removed_permissions: Vec<PermissionDto>,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

fn default_max_depth() -> usize {
    32
}
