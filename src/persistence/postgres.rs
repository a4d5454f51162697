//! Postgres-backed `Store` (`spec.md` §4.3, §6's persisted schema).
//!
//! Uses `sqlx`'s runtime-checked query API rather than the `query!`
//! compile-time macros teacher's handlers use elsewhere, so this crate
//! builds without a reachable `DATABASE_URL` (see `DESIGN.md`).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Postgres, Row, Transaction};

use crate::domain::entity::{Effect, Entity, EntityId, EntityKind, MetadataValue, Permission, Verb};
use crate::graph::snapshot::{Edge, Snapshot};

use super::audit::{chain_hash, AuditDraft, AuditRow, ChangeType, IntegrityReport, GENESIS_HASH};
use super::error::PersistenceError;
use super::mutation::{PersistedWrite, StagedWrites};
use super::store::Store;

pub struct PostgresStore {
    pool: PgPool,
    /// Whether new audit rows are chained onto the tenant's prior hash.
    pub integrity_chain_enabled: bool,
}

impl PostgresStore {
    #[must_use]
    pub fn new(pool: PgPool, integrity_chain_enabled: bool) -> Self {
        Self {
            pool,
            integrity_chain_enabled,
        }
    }

    async fn last_hash(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: &str,
    ) -> Result<[u8; 32], PersistenceError> {
        let row = sqlx::query("SELECT hash FROM audit_log WHERE tenant_id = $1 ORDER BY id DESC LIMIT 1")
            .bind(tenant_id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(match row {
            Some(r) => {
                let bytes: Option<Vec<u8>> = r.try_get("hash")?;
                bytes
                    .and_then(|b| <[u8; 32]>::try_from(b.as_slice()).ok())
                    .unwrap_or(GENESIS_HASH)
            }
            None => GENESIS_HASH,
        })
    }

    async fn apply_write(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: &str,
        write: &PersistedWrite,
    ) -> Result<(), PersistenceError> {
        match write {
            PersistedWrite::UpsertEntity { id, kind, name } => {
                sqlx::query(
                    "INSERT INTO entities (tenant_id, id, kind, name, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, now(), now())
                     ON CONFLICT (tenant_id, id)
                     DO UPDATE SET name = EXCLUDED.name, updated_at = now()",
                )
                .bind(tenant_id)
                .bind(*id as i64)
                .bind(kind.as_str())
                .bind(name)
                .execute(&mut **tx)
                .await?;
            }
            PersistedWrite::DeleteEntity { id } => {
                sqlx::query("DELETE FROM entities WHERE tenant_id = $1 AND id = $2")
                    .bind(tenant_id)
                    .bind(*id as i64)
                    .execute(&mut **tx)
                    .await?;
            }
            PersistedWrite::InsertEdge { parent_id, child_id } => {
                sqlx::query(
                    "INSERT INTO entity_edges (tenant_id, parent_id, child_id)
                     VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
                )
                .bind(tenant_id)
                .bind(*parent_id as i64)
                .bind(*child_id as i64)
                .execute(&mut **tx)
                .await?;
            }
            PersistedWrite::DeleteEdge { parent_id, child_id } => {
                sqlx::query(
                    "DELETE FROM entity_edges WHERE tenant_id = $1 AND parent_id = $2 AND child_id = $3",
                )
                .bind(tenant_id)
                .bind(*parent_id as i64)
                .bind(*child_id as i64)
                .execute(&mut **tx)
                .await?;
            }
            PersistedWrite::InsertPermission { owner_id, permission } => {
                let metadata = serde_json::to_value(&permission.metadata).unwrap_or_default();
                sqlx::query(
                    "INSERT INTO permissions (tenant_id, owner_entity_id, uri, verb, effect, scheme, expires_at, metadata_json)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
                )
                .bind(tenant_id)
                .bind(*owner_id as i64)
                .bind(&permission.uri)
                .bind(verb_str(permission.verb))
                .bind(effect_str(permission.effect))
                .bind(&permission.scheme)
                .bind(permission.expires_at)
                .bind(metadata)
                .execute(&mut **tx)
                .await?;
            }
            PersistedWrite::DeletePermission { owner_id, permission } => {
                sqlx::query(
                    "DELETE FROM permissions
                     WHERE tenant_id = $1 AND owner_entity_id = $2 AND uri = $3 AND verb = $4 AND effect = $5
                     AND ctid = (SELECT ctid FROM permissions
                                 WHERE tenant_id = $1 AND owner_entity_id = $2 AND uri = $3 AND verb = $4 AND effect = $5
                                 LIMIT 1)",
                )
                .bind(tenant_id)
                .bind(*owner_id as i64)
                .bind(&permission.uri)
                .bind(verb_str(permission.verb))
                .bind(effect_str(permission.effect))
                .execute(&mut **tx)
                .await?;
            }
            PersistedWrite::None => {}
        }
        Ok(())
    }
}

fn verb_str(v: Verb) -> &'static str {
    match v {
        Verb::Get => "GET",
        Verb::Post => "POST",
        Verb::Put => "PUT",
        Verb::Patch => "PATCH",
        Verb::Delete => "DELETE",
        Verb::Head => "HEAD",
        Verb::Options => "OPTIONS",
        Verb::Connect => "CONNECT",
        Verb::Trace => "TRACE",
    }
}

fn verb_from_str(s: &str) -> Verb {
    match s {
        "POST" => Verb::Post,
        "PUT" => Verb::Put,
        "PATCH" => Verb::Patch,
        "DELETE" => Verb::Delete,
        "HEAD" => Verb::Head,
        "OPTIONS" => Verb::Options,
        "CONNECT" => Verb::Connect,
        "TRACE" => Verb::Trace,
        _ => Verb::Get,
    }
}

fn effect_str(e: Effect) -> &'static str {
    match e {
        Effect::Grant => "grant",
        Effect::Deny => "deny",
    }
}

fn effect_from_str(s: &str) -> Effect {
    if s == "deny" {
        Effect::Deny
    } else {
        Effect::Grant
    }
}

fn kind_from_str(s: &str) -> EntityKind {
    match s {
        "group" => EntityKind::Group,
        "role" => EntityKind::Role,
        _ => EntityKind::User,
    }
}

fn change_type_from_str(s: &str) -> ChangeType {
    match s {
        "Update" => ChangeType::Update,
        "Delete" => ChangeType::Delete,
        "GrantPermission" => ChangeType::GrantPermission,
        "RevokePermission" => ChangeType::RevokePermission,
        "AddEdge" => ChangeType::AddEdge,
        "RemoveEdge" => ChangeType::RemoveEdge,
        "SecurityViolation" => ChangeType::SecurityViolation,
        "BulkPermissionUpdate" => ChangeType::BulkPermissionUpdate,
        "Purge" => ChangeType::Purge,
        _ => ChangeType::Create,
    }
}

fn row_to_audit(row: PgRow) -> Result<AuditRow, PersistenceError> {
    let hash_bytes: Option<Vec<u8>> = row.try_get("hash")?;
    let entity_id: Option<i64> = row.try_get("entity_id")?;
    Ok(AuditRow {
        id: row.try_get("id")?,
        entity_type: row.try_get("entity_type")?,
        entity_id: entity_id.map(|i| i as EntityId),
        change_type: change_type_from_str(row.try_get::<String, _>("change_type")?.as_str()),
        changed_by: row.try_get::<i64, _>("changed_by")? as EntityId,
        change_date: row.try_get("change_date")?,
        change_details: row.try_get("change_details")?,
        correlation_id: row.try_get("correlation_id")?,
        hash: hash_bytes.and_then(|b| <[u8; 32]>::try_from(b.as_slice()).ok()),
    })
}

#[async_trait]
impl Store for PostgresStore {
    async fn apply(
        &self,
        tenant_id: &str,
        writes: StagedWrites,
        audit: AuditDraft,
        extra_audits: Vec<AuditDraft>,
    ) -> Result<AuditRow, PersistenceError> {
        let mut tx = self.pool.begin().await?;

        for write in &writes.writes {
            Self::apply_write(&mut tx, tenant_id, write).await?;
        }

        let mut prev = if self.integrity_chain_enabled {
            Self::last_hash(&mut tx, tenant_id).await?
        } else {
            GENESIS_HASH
        };

        let mut primary_row = None;
        for draft in std::iter::once(audit).chain(extra_audits) {
            let hash = if self.integrity_chain_enabled {
                let draft_row = draft.clone().into_row(0, None);
                let h = chain_hash(&prev, &draft_row);
                prev = h;
                Some(h)
            } else {
                None
            };

            let id: i64 = sqlx::query_scalar(
                "INSERT INTO audit_log (tenant_id, entity_type, entity_id, change_type, changed_by, change_date, change_details, correlation_id, hash)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
            )
            .bind(tenant_id)
            .bind(&draft.entity_type)
            .bind(draft.entity_id.map(|i| i as i64))
            .bind(draft.change_type.as_str())
            .bind(draft.changed_by as i64)
            .bind(draft.change_date)
            .bind(&draft.change_details)
            .bind(&draft.correlation_id)
            .bind(hash.map(|h| h.to_vec()))
            .fetch_one(&mut *tx)
            .await?;

            if primary_row.is_none() {
                primary_row = Some(draft.into_row(id, hash));
            }
        }

        tx.commit().await?;

        Ok(primary_row.expect("at least the primary audit draft is always iterated"))
    }

    async fn load(&self, tenant_id: &str) -> Result<Snapshot, PersistenceError> {
        let entity_rows = sqlx::query("SELECT id, kind, name, created_at, updated_at FROM entities WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;

        let mut entities = Vec::with_capacity(entity_rows.len());
        for row in entity_rows {
            let id: i64 = row.try_get("id")?;
            let kind: String = row.try_get("kind")?;
            let name: String = row.try_get("name")?;
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

            let perm_rows = sqlx::query(
                "SELECT uri, verb, effect, scheme, expires_at, metadata_json FROM permissions
                 WHERE tenant_id = $1 AND owner_entity_id = $2",
            )
            .bind(tenant_id)
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

            let mut permissions = Vec::with_capacity(perm_rows.len());
            for p in perm_rows {
                let metadata_json: serde_json::Value = p.try_get("metadata_json")?;
                let metadata = serde_json::from_value(metadata_json).unwrap_or_default();
                permissions.push(Permission {
                    uri: p.try_get("uri")?,
                    verb: verb_from_str(p.try_get::<String, _>("verb")?.as_str()),
                    effect: effect_from_str(p.try_get::<String, _>("effect")?.as_str()),
                    scheme: p.try_get("scheme")?,
                    expires_at: p.try_get("expires_at")?,
                    metadata,
                });
            }

            entities.push(Entity {
                id: id as EntityId,
                kind: kind_from_str(&kind),
                name,
                permissions,
                created_at,
                updated_at,
            });
        }

        let edge_rows = sqlx::query("SELECT parent_id, child_id FROM entity_edges WHERE tenant_id = $1")
            .bind(tenant_id)
            .fetch_all(&self.pool)
            .await?;
        let mut edges = Vec::with_capacity(edge_rows.len());
        for row in edge_rows {
            edges.push(Edge {
                parent_id: row.try_get::<i64, _>("parent_id")? as EntityId,
                child_id: row.try_get::<i64, _>("child_id")? as EntityId,
            });
        }

        Ok(Snapshot { entities, edges })
    }

    async fn purge_audit_older_than(
        &self,
        tenant_id: &str,
        older_than: DateTime<Utc>,
        except_change_types: &[ChangeType],
    ) -> Result<u64, PersistenceError> {
        let except: Vec<&'static str> = except_change_types.iter().map(|c| c.as_str()).collect();
        let result = sqlx::query(
            "DELETE FROM audit_log WHERE tenant_id = $1 AND change_date < $2 AND NOT (change_type = ANY($3))",
        )
        .bind(tenant_id)
        .bind(older_than)
        .bind(&except as &[&str])
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn audit_trail(
        &self,
        tenant_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
        entity_id: Option<EntityId>,
    ) -> Result<Vec<AuditRow>, PersistenceError> {
        let rows = sqlx::query(
            "SELECT id, entity_type, entity_id, change_type, changed_by, change_date, change_details, correlation_id, hash
             FROM audit_log
             WHERE tenant_id = $1
               AND ($2::timestamptz IS NULL OR change_date >= $2)
               AND ($3::timestamptz IS NULL OR change_date <= $3)
               AND ($4::bigint IS NULL OR entity_id = $4)
             ORDER BY id ASC",
        )
        .bind(tenant_id)
        .bind(since)
        .bind(until)
        .bind(entity_id.map(|i| i as i64))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_audit).collect()
    }

    async fn validate_integrity(
        &self,
        tenant_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<IntegrityReport, PersistenceError> {
        let rows = self.audit_trail(tenant_id, since, until, None).await?;
        let prev = if let Some(first) = rows.first() {
            let preceding = sqlx::query(
                "SELECT hash FROM audit_log WHERE tenant_id = $1 AND id < $2 ORDER BY id DESC LIMIT 1",
            )
            .bind(tenant_id)
            .bind(first.id)
            .fetch_optional(&self.pool)
            .await?;
            preceding
                .and_then(|r| r.try_get::<Option<Vec<u8>>, _>("hash").ok().flatten())
                .and_then(|b| <[u8; 32]>::try_from(b.as_slice()).ok())
                .unwrap_or(GENESIS_HASH)
        } else {
            GENESIS_HASH
        };
        Ok(super::audit::validate_chain(&rows, prev))
    }
}
