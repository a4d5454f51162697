//! Handler-facing error kind (`spec.md` §7): the union of everything a
//! command or query can fail with, plus the codes the RPC edge (C9)
//! maps onto its external surface.

use thiserror::Error;

use crate::buffer::BufferError;
use crate::domain::error::DomainError;
use crate::persistence::PersistenceError;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error("audit event is not well-formed: {0}")]
    AuditInvalid(String),

    #[error("command deadline exceeded")]
    DeadlineExceeded,

    #[error("command cancelled")]
    Cancelled,

    #[error("command cancelled after its commit point")]
    CancelledAfterCommit,

    #[error("{successful} succeeded, {failed} failed")]
    BulkPartial { successful: usize, failed: usize },

    #[error("access denied: {0}")]
    AccessDenied(String),
}

impl HandlerError {
    /// The external error code family in `spec.md` §6.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Domain(DomainError::NameEmpty | DomainError::PermInvalid(_)) => "InvalidArgument",
            Self::Domain(DomainError::NotFound(_)) => "NotFound",
            Self::Domain(DomainError::IdConflict(_) | DomainError::AlreadyAssigned(_, _)) => "AlreadyExists",
            Self::Domain(DomainError::CycleError { .. } | DomainError::EdgeKind(_)) => "FailedPrecondition",
            Self::Persistence(_) => "Internal",
            Self::Buffer(BufferError::Full) => "Aborted",
            Self::Buffer(BufferError::ShuttingDown) => "Unavailable",
            Self::AuditInvalid(_) => "InvalidArgument",
            Self::DeadlineExceeded => "DeadlineExceeded",
            Self::Cancelled | Self::CancelledAfterCommit => "Cancelled",
            Self::BulkPartial { .. } => "Aborted",
            Self::AccessDenied(_) => "PermissionDenied",
        }
    }
}
