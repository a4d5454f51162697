//! Persistence & Audit (C3): durable storage for entities, edges,
//! permissions, and the append-only audit log, plus an optional
//! SHA-256 hash chain for tamper detection (`spec.md` §4.3).

pub mod audit;
pub mod error;
pub mod mutation;
pub mod postgres;
pub mod store;

pub use audit::{AuditDraft, AuditRow, ChangeType, IntegrityReport};
pub use error::PersistenceError;
pub use mutation::{PersistedWrite, StagedWrites};
pub use postgres::PostgresStore;
pub use store::Store;
