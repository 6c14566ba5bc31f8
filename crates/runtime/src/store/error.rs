//! Error types raised by entity store implementations.

use sheet_core::{EntityId, ErrorSeverity, SheetError, StateError};
use thiserror::Error;

use crate::guard::GovernanceViolation;

/// Errors surfaced by entity stores and the guard wrapping them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity store lock was poisoned")]
    LockPoisoned,

    #[error("entity {0} does not exist")]
    NotFound(EntityId),

    #[error("entity {0} already exists")]
    AlreadyExists(EntityId),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Governance(#[from] GovernanceViolation),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupted data: {0}")]
    CorruptedData(String),
}

impl SheetError for StoreError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NotFound(_) | Self::AlreadyExists(_) | Self::Governance(_) => {
                ErrorSeverity::Validation
            }
            Self::State(error) => error.severity(),
            Self::Io(_) => ErrorSeverity::Recoverable,
            Self::LockPoisoned => ErrorSeverity::Internal,
            Self::Serialization(_) | Self::CorruptedData(_) => ErrorSeverity::Fatal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::LockPoisoned => "STORE_LOCK_POISONED",
            Self::NotFound(_) => "STORE_NOT_FOUND",
            Self::AlreadyExists(_) => "STORE_ALREADY_EXISTS",
            Self::State(error) => error.error_code(),
            Self::Governance(_) => "GOVERNANCE_VIOLATION",
            Self::Io(_) => "STORE_IO",
            Self::Serialization(_) => "STORE_SERIALIZATION",
            Self::CorruptedData(_) => "STORE_CORRUPTED_DATA",
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
