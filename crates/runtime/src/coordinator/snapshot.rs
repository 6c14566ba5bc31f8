//! Pre-apply snapshots and rollback.

use std::collections::{BTreeMap, BTreeSet};

use sheet_core::{Entity, EntityId};

use crate::guard::{CallerId, MutationGuard};
use crate::store::{Result, StoreError};

/// What a rollback managed to undo.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    /// Snapshots written back.
    pub restored: Vec<EntityId>,
    /// Entities created by the failed plan and removed again.
    pub discarded: Vec<EntityId>,
    /// Entities that could not be brought back.
    pub failed: Vec<EntityId>,
}

impl RollbackReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Before-images of every stored entity a plan touches, plus the ids the plan
/// created along the way.
#[derive(Debug, Default)]
pub(crate) struct SnapshotSet {
    before: BTreeMap<EntityId, Entity>,
    created: Vec<EntityId>,
}

impl SnapshotSet {
    /// Captures the current record of each id. Ids with no stored entity are
    /// skipped; phases that need them fail on their own.
    pub(crate) fn capture(guard: &MutationGuard, ids: &BTreeSet<EntityId>) -> Result<Self> {
        let mut before = BTreeMap::new();
        for &id in ids {
            if let Some(entity) = guard.load(id)? {
                before.insert(id, entity);
            }
        }
        Ok(Self {
            before,
            created: Vec::new(),
        })
    }

    pub(crate) fn record_created(&mut self, id: EntityId) {
        self.created.push(id);
    }

    pub(crate) fn before(&self, id: EntityId) -> Option<&Entity> {
        self.before.get(&id)
    }

    pub(crate) fn was_created(&self, id: EntityId) -> bool {
        self.created.contains(&id)
    }

    /// Removes created entities and restores the snapshot of every id in
    /// `touched`. Untouched entities are left alone.
    ///
    /// Best effort: failures are logged and reported, never raised.
    pub(crate) fn rollback(
        &self,
        guard: &MutationGuard,
        caller: &CallerId,
        touched: &BTreeSet<EntityId>,
    ) -> RollbackReport {
        let mut report = RollbackReport::default();

        for &id in self.created.iter().rev() {
            match guard.delete(caller, id) {
                Ok(_) | Err(StoreError::NotFound(_)) => report.discarded.push(id),
                Err(error) => {
                    tracing::error!(entity = %id, %error, "failed to discard created entity");
                    report.failed.push(id);
                }
            }
        }

        for (id, snapshot) in self.before.iter().filter(|(id, _)| touched.contains(id)) {
            match guard.restore(caller, snapshot) {
                Ok(()) => report.restored.push(*id),
                Err(error) => {
                    tracing::error!(entity = %id, %error, "failed to restore snapshot");
                    report.failed.push(*id);
                }
            }
        }

        report
    }
}
