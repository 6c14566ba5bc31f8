//! Event types for different topics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sheet_core::{EntityId, MutationPhase, TempId};

use crate::guard::{CallerId, MutationKind};

/// Outcome of coordinated plan applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MutationEvent {
    /// A plan was applied; `warnings` counts derivation diagnostics and
    /// degraded derivations.
    Applied {
        touched: Vec<EntityId>,
        created: BTreeMap<TempId, EntityId>,
        warnings: usize,
    },

    /// A plan failed in the given phase.
    Failed {
        phase: MutationPhase,
        error: String,
        rolled_back: bool,
    },

    /// Snapshots were restored after a failure.
    RolledBack {
        restored: Vec<EntityId>,
        discarded: Vec<EntityId>,
    },
}

/// Governance findings raised by the mutation guard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GovernanceEvent {
    /// A write was attempted outside an authorization scope.
    Violation {
        entity: EntityId,
        kind: MutationKind,
        caller: CallerId,
        /// True when the write was rejected (strict mode).
        enforced: bool,
        timestamp: DateTime<Utc>,
    },
}
