//! Persistence-layer error kind (`spec.md` §7, "Durability").

use thiserror::Error;

use crate::domain::entity::EntityId;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("entity {0} not found in durable store")]
    NotFound(EntityId),

    #[error("audit integrity violation at row {row_id}: {reason}")]
    AuditIntegrityFailure { row_id: i64, reason: String },

    #[error("transaction rolled back: {0}")]
    RolledBack(String),
}
