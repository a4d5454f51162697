//! Query handlers (`spec.md` §4.5, "Query kinds"): pure reads over C2
//! and C3, executed directly under a reader lock — never through the
//! Command Buffer.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::instrument;

use crate::domain::entity::{Effect, EntityId, Permission, Verb};
use crate::domain::evaluation::{evaluate, Candidate, EvaluationOutcome};
use crate::persistence::{AuditRow, IntegrityReport};

use super::context::HandlerContext;
use super::error::HandlerError;

/// Summary view backing `GetComplianceReport` (grounded in teacher's
/// `system::models::GeneratedReport`).
#[derive(Debug, Clone, Serialize)]
pub struct ComplianceReport {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub total_events: u64,
    pub by_change_type: HashMap<String, u64>,
    pub violation_count: u64,
}

#[instrument(skip_all, fields(tenant_id = %ctx.tenant_id, entity_id))]
pub async fn check_permission(
    ctx: &HandlerContext,
    entity_id: EntityId,
    uri: &str,
    verb: Verb,
    at: Option<DateTime<Utc>>,
) -> Result<EvaluationOutcome, HandlerError> {
    let at = at.unwrap_or_else(|| ctx.clock.now());
    let graph = ctx.graph.read().await;
    graph.get(entity_id).ok_or(crate::domain::error::DomainError::NotFound(entity_id))?;
    let owned = graph.reachable_permissions(entity_id);
    let candidates: Vec<Candidate<'_>> = owned
        .iter()
        .map(|(owner, permission)| Candidate { owner: *owner, permission })
        .collect();
    Ok(evaluate(&candidates, uri, verb, at))
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityPermissionView {
    pub owner_id: EntityId,
    pub permission: Permission,
    pub inherited: bool,
}

pub async fn get_entity_permissions(
    ctx: &HandlerContext,
    entity_id: EntityId,
    include_inherited: bool,
) -> Result<Vec<EntityPermissionView>, HandlerError> {
    let graph = ctx.graph.read().await;
    let entity = graph.get(entity_id).ok_or(crate::domain::error::DomainError::NotFound(entity_id))?;

    let mut out: Vec<EntityPermissionView> = entity
        .permissions
        .iter()
        .map(|p| EntityPermissionView {
            owner_id: entity_id,
            permission: p.clone(),
            inherited: false,
        })
        .collect();

    if include_inherited {
        for ancestor in graph.ancestors(entity_id) {
            if let Some(e) = graph.get(ancestor) {
                out.extend(e.permissions.iter().map(|p| EntityPermissionView {
                    owner_id: ancestor,
                    permission: p.clone(),
                    inherited: true,
                }));
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone, Serialize)]
pub struct EffectivePermissionResult {
    pub resource_id: EntityId,
    pub allowed: bool,
    pub granting_owner: Option<EntityId>,
    pub denying_owner: Option<EntityId>,
}

/// Checks `GET` on every `resource_ids` entry's own URI-shaped name is
/// out of scope here (resources are modeled as URIs, not entities); this
/// evaluates each resource id as a URI path segment against `entity_id`'s
/// reachable permission set, optionally resolving same-specificity ties
/// by reporting both contributing owners.
pub async fn get_effective_permissions(
    ctx: &HandlerContext,
    entity_id: EntityId,
    resource_ids: &[EntityId],
    verb: Verb,
) -> Result<Vec<EffectivePermissionResult>, HandlerError> {
    let graph = ctx.graph.read().await;
    graph.get(entity_id).ok_or(crate::domain::error::DomainError::NotFound(entity_id))?;
    let owned = graph.reachable_permissions(entity_id);
    let candidates: Vec<Candidate<'_>> = owned
        .iter()
        .map(|(owner, permission)| Candidate { owner: *owner, permission })
        .collect();
    let now = ctx.clock.now();

    Ok(resource_ids
        .iter()
        .map(|resource_id| {
            let uri = format!("/resources/{resource_id}");
            let outcome = evaluate(&candidates, &uri, verb, now);
            EffectivePermissionResult {
                resource_id: *resource_id,
                allowed: outcome.allowed,
                granting_owner: outcome.granting_owner,
                denying_owner: outcome.denying_owner,
            }
        })
        .collect())
}

pub async fn get_audit_trail(
    ctx: &HandlerContext,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    entity_id: Option<EntityId>,
) -> Result<Vec<AuditRow>, HandlerError> {
    Ok(ctx.store.audit_trail(&ctx.tenant_id, since, until, entity_id).await?)
}

pub async fn get_compliance_report(
    ctx: &HandlerContext,
    since: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<ComplianceReport, HandlerError> {
    let rows = ctx.store.audit_trail(&ctx.tenant_id, Some(since), Some(until), None).await?;
    let mut by_change_type: HashMap<String, u64> = HashMap::new();
    let mut violations = 0u64;
    for row in &rows {
        *by_change_type.entry(row.change_type.as_str().to_owned()).or_insert(0) += 1;
        if matches!(row.change_type, crate::persistence::ChangeType::SecurityViolation) {
            violations += 1;
        }
    }
    Ok(ComplianceReport {
        since,
        until,
        total_events: rows.len() as u64,
        by_change_type,
        violation_count: violations,
    })
}

pub async fn validate_audit_integrity(
    ctx: &HandlerContext,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
) -> Result<IntegrityReport, HandlerError> {
    Ok(ctx.store.validate_integrity(&ctx.tenant_id, since, until).await?)
}

#[derive(Debug, Clone, Serialize)]
pub struct UserImpact {
    pub user_id: EntityId,
    pub gained: Vec<Permission>,
    pub lost: Vec<Permission>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImpactReport {
    pub role_id: EntityId,
    pub affected_users: Vec<UserImpact>,
}

/// Simulates adding/removing permissions on `role_id` and reports which
/// descendant users gain or lose access, per-user, accounting for
/// permissions reachable via other ancestors (grounded in teacher's
/// `ImpactService::simulate_role_change`).
pub async fn permission_impact_analysis(
    ctx: &HandlerContext,
    role_id: EntityId,
    added_permissions: &[Permission],
    removed_permissions: &[Permission],
    max_depth: usize,
) -> Result<ImpactReport, HandlerError> {
    let graph = ctx.graph.read().await;
    graph.get(role_id).ok_or(crate::domain::error::DomainError::NotFound(role_id))?;

    let affected_users: HashSet<EntityId> = graph
        .descendants(role_id)
        .into_iter()
        .filter(|id| matches!(graph.get(*id).map(|e| e.kind), Some(crate::domain::entity::EntityKind::User)))
        .collect();

    let now = ctx.clock.now();
    let mut affected = Vec::new();

    for user_id in affected_users {
        if max_depth == 0 {
            break;
        }
        let before: Vec<(EntityId, Permission)> = graph
            .reachable_permissions(user_id)
            .into_iter()
            .map(|(o, p)| (o, p.clone()))
            .collect();
        let mut after = before.clone();
        after.retain(|(owner, p)| !(*owner == role_id && removed_permissions.contains(p)));
        after.extend(added_permissions.iter().map(|p| (role_id, p.clone())));

        let mut gained = Vec::new();
        let mut lost = Vec::new();
        for verb in [Verb::Get, Verb::Post, Verb::Put, Verb::Patch, Verb::Delete] {
            for p in added_permissions.iter().chain(removed_permissions.iter()) {
                if p.verb != verb {
                    continue;
                }
                let before_candidates: Vec<Candidate<'_>> =
                    before.iter().map(|(o, perm)| Candidate { owner: *o, permission: perm }).collect();
                let after_candidates: Vec<Candidate<'_>> =
                    after.iter().map(|(o, perm)| Candidate { owner: *o, permission: perm }).collect();
                let before_outcome = evaluate(&before_candidates, &p.uri, verb, now);
                let after_outcome = evaluate(&after_candidates, &p.uri, verb, now);
                if !before_outcome.allowed && after_outcome.allowed && p.effect == Effect::Grant {
                    gained.push(p.clone());
                } else if before_outcome.allowed && !after_outcome.allowed {
                    lost.push(p.clone());
                }
            }
        }

        if !gained.is_empty() || !lost.is_empty() {
            affected.push(UserImpact { user_id, gained, lost });
        }
    }

    Ok(ImpactReport { role_id, affected_users: affected })
}
