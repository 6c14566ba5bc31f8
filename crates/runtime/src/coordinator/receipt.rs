//! Results of plan application.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sheet_core::{
    DerivationError, Diagnostic, EntityDelta, EntityId, ErrorSeverity, MutationPhase, PlanError,
    SheetError, TempId,
};
use thiserror::Error;

use crate::store::StoreError;

/// A derivation that did not complete cleanly. Reported, never rolled back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DerivationWarning {
    /// The resolver succeeded but flagged something.
    Diagnostic {
        entity: EntityId,
        diagnostic: Diagnostic,
    },
    /// The resolver failed; the previous `derived` set was kept.
    Failed {
        entity: EntityId,
        error: DerivationError,
    },
    /// The entity could not be read or its result could not be stored.
    Unavailable { entity: EntityId, reason: String },
    /// A pass for this entity was already unwinding.
    Reentrant { entity: EntityId },
}

impl DerivationWarning {
    pub fn entity(&self) -> EntityId {
        match self {
            Self::Diagnostic { entity, .. }
            | Self::Failed { entity, .. }
            | Self::Unavailable { entity, .. }
            | Self::Reentrant { entity } => *entity,
        }
    }
}

impl fmt::Display for DerivationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Diagnostic { entity, diagnostic } => write!(f, "{entity}: {diagnostic}"),
            Self::Failed { entity, error } => write!(f, "{entity}: derivation failed: {error}"),
            Self::Unavailable { entity, reason } => {
                write!(f, "{entity}: derivation skipped: {reason}")
            }
            Self::Reentrant { entity } => {
                write!(f, "{entity}: derivation already in progress")
            }
        }
    }
}

/// Summary of a successfully applied plan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MutationReceipt {
    /// Real ids allocated for the plan's temporaries.
    pub created: BTreeMap<TempId, EntityId>,
    /// Entities written by CREATE, DELETE, SET or ADD, ascending.
    pub touched: Vec<EntityId>,
    pub deleted: Vec<EntityId>,
    /// Entities that received a resolver pass, ascending.
    pub derived: Vec<EntityId>,
    /// Per-entity change summaries for every surviving touched or derived entity.
    pub deltas: Vec<EntityDelta>,
    pub warnings: Vec<DerivationWarning>,
}

impl MutationReceipt {
    /// Success with derivation warnings.
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn created_id(&self, temp: &str) -> Option<EntityId> {
        self.created.get(&TempId::new(temp)).copied()
    }

    pub fn delta(&self, entity: EntityId) -> Option<&EntityDelta> {
        self.deltas.iter().find(|delta| delta.entity == entity)
    }
}

/// Why a plan could not be applied.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("entity {entity} is busy with another plan")]
    Busy { entity: EntityId },

    #[error("plan was cancelled")]
    Cancelled,

    #[error("temporary reference '{temp}' was not created")]
    UnresolvedTemp { temp: TempId },
}

impl SheetError for MutationError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Plan(error) => error.severity(),
            Self::Store(error) => error.severity(),
            Self::Busy { .. } | Self::Cancelled => ErrorSeverity::Recoverable,
            Self::UnresolvedTemp { .. } => ErrorSeverity::Internal,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::Plan(error) => error.error_code(),
            Self::Store(error) => error.error_code(),
            Self::Busy { .. } => "MUTATION_BUSY",
            Self::Cancelled => "MUTATION_CANCELLED",
            Self::UnresolvedTemp { .. } => "MUTATION_UNRESOLVED_TEMP",
        }
    }
}

/// A failed plan: the phase that failed, the cause, and whether the
/// pre-apply snapshot was restored.
#[derive(Debug)]
pub struct MutationFailure {
    pub phase: MutationPhase,
    pub error: MutationError,
    pub rolled_back: bool,
}

impl MutationFailure {
    pub fn new(phase: MutationPhase, error: impl Into<MutationError>, rolled_back: bool) -> Self {
        Self {
            phase,
            error: error.into(),
            rolled_back,
        }
    }

    pub fn is_busy(&self) -> bool {
        matches!(self.error, MutationError::Busy { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.error, MutationError::Cancelled)
    }

    pub fn is_governance_violation(&self) -> bool {
        matches!(self.error, MutationError::Store(StoreError::Governance(_)))
    }
}

impl fmt::Display for MutationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.phase, self.error)?;
        if self.rolled_back {
            write!(f, " (rolled back)")?;
        }
        Ok(())
    }
}

impl std::error::Error for MutationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
