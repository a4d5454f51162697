//! RPC Edge (C9): a small typed surface plus a generic `Execute`
//! entrypoint (`spec.md` §4.9) — one JSON "kind" tag per command/query,
//! translated through C6 and routed through the supervisor (C8).
//! CorrelationId-based retries are de-duplicated within a configured
//! window.

pub mod dedup;
pub mod response;
pub mod router;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::handlers::CommandOutcome;
use crate::supervisor::{QueryOutcome, SupervisorError, TenantSupervisor};
use crate::telemetry::{names, MetricsRegistry};
use crate::translation::dto::{
    AccessViolationDto, BulkPermissionUpdateDto, CheckPermissionDto, CreateEntityDto, DeleteEntityDto, EdgeDto,
    GetAuditTrailDto, GetComplianceReportDto, GetEffectivePermissionsDto, GetEntityPermissionsDto, GrantPermissionDto,
    PermissionImpactAnalysisDto, PurgeOldAuditDataDto, RecordAuditEventDto, RevokePermissionDto, ValidateAuditIntegrityDto,
    ValidatePermissionStructureDto,
};
use crate::translation::{self, TranslationError};

pub use dedup::{DedupError, DedupWindow};
pub use response::RpcResponse;

/// Default correlationId de-duplication window. `spec.md` §4.9 leaves
/// the exact width to the implementation; five minutes covers typical
/// client retry backoff policies without growing unbounded.
pub const DEFAULT_DEDUP_WINDOW: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
    #[error("malformed request body: {0}")]
    MalformedBody(String),
    #[error("unknown command kind: {0}")]
    UnknownCommandKind(String),
    #[error("unknown query kind: {0}")]
    UnknownQueryKind(String),
}

impl RpcError {
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Translation(_) | Self::MalformedBody(_) | Self::UnknownCommandKind(_) | Self::UnknownQueryKind(_) => {
                "InvalidArgument"
            }
            Self::Supervisor(e) => response::from_supervisor_error(e).code,
        }
    }

    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }
}

/// The shared state backing every RPC handler: one supervisor, one
/// metrics registry, one dedup window per process.
pub struct RpcEdge {
    pub supervisor: Arc<TenantSupervisor>,
    pub metrics: Arc<MetricsRegistry>,
    pub dedup: DedupWindow,
}

impl RpcEdge {
    #[must_use]
    pub fn new(supervisor: Arc<TenantSupervisor>, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            supervisor,
            metrics,
            dedup: DedupWindow::new(DEFAULT_DEDUP_WINDOW),
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(payload: &Value) -> Result<T, RpcError> {
        serde_json::from_value(payload.clone()).map_err(|e| RpcError::MalformedBody(e.to_string()))
    }

    /// Executes one mutating command. `kind` is the tagged command name
    /// from the request envelope (`spec.md` §4.5 table); `correlation_id`
    /// keys the dedup window (`spec.md` §4.9).
    pub async fn execute_command(
        &self,
        tenant_id: &str,
        kind: &str,
        payload: Value,
        correlation_id: String,
    ) -> Result<CommandOutcome, RpcError> {
        self.metrics.incr_counter(names::API_REQUEST_COUNT, 1);
        let dedup_key = format!("{tenant_id}:{correlation_id}");
        if let Some(cached) = self.dedup.lookup(&dedup_key).await {
            return cached.map_err(|e| RpcError::MalformedBody(format!("{} ({})", e.message, e.code)));
        }

        let command = match kind {
            "CreateEntity" => translation::translate_create_entity(Self::parse::<CreateEntityDto>(&payload)?)?,
            "DeleteEntity" => translation::translate_delete_entity(Self::parse::<DeleteEntityDto>(&payload)?),
            "AddEdge" => translation::translate_add_edge(Self::parse::<EdgeDto>(&payload)?),
            "RemoveEdge" => translation::translate_remove_edge(Self::parse::<EdgeDto>(&payload)?),
            "GrantPermission" => translation::translate_grant_permission(Self::parse::<GrantPermissionDto>(&payload)?)?,
            "RevokePermission" => translation::translate_revoke_permission(Self::parse::<RevokePermissionDto>(&payload)?)?,
            "BulkPermissionUpdate" => {
                translation::translate_bulk_update(Self::parse::<BulkPermissionUpdateDto>(&payload)?)?
            }
            "RecordAuditEvent" => translation::translate_record_audit_event(Self::parse::<RecordAuditEventDto>(&payload)?),
            "PurgeOldAuditData" => {
                translation::translate_purge_old_audit_data(Self::parse::<PurgeOldAuditDataDto>(&payload)?)
            }
            "AccessViolation" => translation::translate_access_violation(Self::parse::<AccessViolationDto>(&payload)?)?,
            "ValidatePermissionStructure" => {
                translation::translate_validate_permission_structure(Self::parse::<ValidatePermissionStructureDto>(&payload)?)
            }
            other => return Err(RpcError::UnknownCommandKind(other.to_owned())),
        };

        let result = self.supervisor.route_command(tenant_id, command, correlation_id).await;
        let cached: Result<CommandOutcome, DedupError> = match &result {
            Ok(outcome) => Ok(outcome.clone()),
            Err(e) => Err(DedupError {
                code: response::from_supervisor_error(e).code,
                message: e.to_string(),
            }),
        };
        self.dedup.record(dedup_key, cached).await;

        match &result {
            Ok(_) => self.metrics.incr_counter(names::BUFFER_COMPLETED, 1),
            Err(_) => self.metrics.incr_counter(names::API_REQUEST_ERRORS, 1),
        }
        result.map_err(RpcError::from)
    }

    /// Executes one read-only query, bypassing the dedup window (queries
    /// are naturally idempotent).
    pub async fn execute_query(&self, tenant_id: &str, kind: &str, payload: Value) -> Result<QueryOutcome, RpcError> {
        self.metrics.incr_counter(names::API_REQUEST_COUNT, 1);
        let query = match kind {
            "CheckPermission" => translation::translate_check_permission(Self::parse::<CheckPermissionDto>(&payload)?)?,
            "GetEntityPermissions" => {
                translation::translate_get_entity_permissions(Self::parse::<GetEntityPermissionsDto>(&payload)?)
            }
            "GetEffectivePermissions" => {
                translation::translate_get_effective_permissions(Self::parse::<GetEffectivePermissionsDto>(&payload)?)
            }
            "GetAuditTrail" => translation::translate_get_audit_trail(Self::parse::<GetAuditTrailDto>(&payload)?),
            "GetComplianceReport" => {
                translation::translate_get_compliance_report(Self::parse::<GetComplianceReportDto>(&payload)?)
            }
            "ValidateAuditIntegrity" => {
                translation::translate_validate_audit_integrity(Self::parse::<ValidateAuditIntegrityDto>(&payload)?)
            }
            "PermissionImpactAnalysis" => {
                translation::translate_permission_impact_analysis(Self::parse::<PermissionImpactAnalysisDto>(&payload)?)?
            }
            other => return Err(RpcError::UnknownQueryKind(other.to_owned())),
        };

        let result = self.supervisor.route_query(tenant_id, query).await;
        if result.is_err() {
            self.metrics.incr_counter(names::API_REQUEST_ERRORS, 1);
        }
        result.map_err(RpcError::from)
    }
}
