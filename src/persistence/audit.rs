//! Append-only audit log rows and the optional SHA-256 hash chain
//! (`spec.md` §4.3, §8 property 10; `SPEC_FULL.md` §3.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::entity::EntityId;

pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// `changeType` values named in `spec.md` §4.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    GrantPermission,
    RevokePermission,
    AddEdge,
    RemoveEdge,
    SecurityViolation,
    BulkPermissionUpdate,
    Purge,
}

impl ChangeType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
            Self::GrantPermission => "GrantPermission",
            Self::RevokePermission => "RevokePermission",
            Self::AddEdge => "AddEdge",
            Self::RemoveEdge => "RemoveEdge",
            Self::SecurityViolation => "SecurityViolation",
            Self::BulkPermissionUpdate => "BulkPermissionUpdate",
            Self::Purge => "Purge",
        }
    }
}

/// One append-only audit log row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: Option<EntityId>,
    pub change_type: ChangeType,
    pub changed_by: EntityId,
    pub change_date: DateTime<Utc>,
    pub change_details: serde_json::Value,
    pub correlation_id: String,
    /// `h_i = H(h_{i-1} || canonicalize(row_i))`, present only when the
    /// tenant has hash-chain integrity enabled.
    pub hash: Option<[u8; 32]>,
}

/// Builds the canonical string hashed into the chain for one row.
///
/// `change_details` is re-serialized with sorted object keys so the
/// canonical form is stable regardless of the JSON value's original key
/// order (`serde_json::Value`'s `Map` is a `BTreeMap` under the
/// `preserve_order` feature being off, which this crate does not enable).
#[must_use]
pub fn canonicalize(row: &AuditRow) -> String {
    let details = serde_json::to_string(&row.change_details).unwrap_or_default();
    format!(
        "{}|{}|{}|{}|{}|{}|{}",
        row.entity_type,
        row.entity_id.map_or_else(String::new, |id| id.to_string()),
        row.change_type.as_str(),
        row.changed_by,
        row.change_date.to_rfc3339(),
        details,
        row.correlation_id,
    )
}

/// Computes `h_i = SHA256(h_{i-1} || "\n" || canonicalize(row_i))`.
#[must_use]
pub fn chain_hash(prev: &[u8; 32], row: &AuditRow) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev);
    hasher.update(b"\n");
    hasher.update(canonicalize(row).as_bytes());
    hasher.finalize().into()
}

/// An audit row not yet assigned a durable id or chain hash — what a
/// handler hands to `Store::apply`.
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub entity_type: String,
    pub entity_id: Option<EntityId>,
    pub change_type: ChangeType,
    pub changed_by: EntityId,
    pub change_date: DateTime<Utc>,
    pub change_details: serde_json::Value,
    pub correlation_id: String,
}

impl AuditDraft {
    #[must_use]
    pub fn into_row(self, id: i64, hash: Option<[u8; 32]>) -> AuditRow {
        AuditRow {
            id,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            change_type: self.change_type,
            changed_by: self.changed_by,
            change_date: self.change_date,
            change_details: self.change_details,
            correlation_id: self.correlation_id,
            hash,
        }
    }
}

/// One integrity problem found by `validate_chain`.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityIssue {
    pub row_id: i64,
    #[serde(serialize_with = "serialize_hash")]
    pub expected: [u8; 32],
    #[serde(serialize_with = "serialize_hash_opt")]
    pub found: Option<[u8; 32]>,
}

fn serialize_hash<S: serde::Serializer>(hash: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(hash))
}

fn serialize_hash_opt<S: serde::Serializer>(hash: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error> {
    match hash {
        Some(h) => serializer.serialize_str(&hex::encode(h)),
        None => serializer.serialize_none(),
    }
}

/// Result of recomputing a hash chain over a contiguous row range.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub checked: usize,
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Recomputes the hash chain over `rows` (assumed in ascending `id`
/// order) starting from `initial_prev` (the chain hash of the row
/// immediately preceding the range, or `GENESIS_HASH` at the start of
/// the log) and reports every mismatch found.
#[must_use]
pub fn validate_chain(rows: &[AuditRow], initial_prev: [u8; 32]) -> IntegrityReport {
    let mut prev = initial_prev;
    let mut issues = Vec::new();
    for row in rows {
        let expected = chain_hash(&prev, row);
        match row.hash {
            Some(found) if found == expected => {}
            Some(found) => issues.push(IntegrityIssue {
                row_id: row.id,
                expected,
                found: Some(found),
            }),
            None => issues.push(IntegrityIssue {
                row_id: row.id,
                expected,
                found: None,
            }),
        }
        prev = row.hash.unwrap_or(expected);
    }
    IntegrityReport {
        checked: rows.len(),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, prev_hash: Option<[u8; 32]>) -> AuditRow {
        let mut r = AuditRow {
            id,
            entity_type: "user".into(),
            entity_id: Some(1),
            change_type: ChangeType::Create,
            changed_by: 99,
            change_date: Utc::now(),
            change_details: serde_json::json!({"name": "alice"}),
            correlation_id: "corr-1".into(),
            hash: None,
        };
        let prev = prev_hash.unwrap_or(GENESIS_HASH);
        r.hash = Some(chain_hash(&prev, &r));
        r
    }

    #[test]
    fn untampered_chain_is_valid() {
        let r1 = row(1, None);
        let r2 = row(2, r1.hash);
        let report = validate_chain(&[r1, r2], GENESIS_HASH);
        assert!(report.is_valid());
        assert_eq!(report.checked, 2);
    }

    #[test]
    fn tampered_row_is_flagged() {
        let r1 = row(1, None);
        let mut r2 = row(2, r1.hash);
        r2.changed_by = 1; // tamper after hashing
        let report = validate_chain(&[r1, r2], GENESIS_HASH);
        assert!(!report.is_valid());
        assert_eq!(report.issues[0].row_id, 2);
    }
}
