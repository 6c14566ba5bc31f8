//! Store handle for code outside the coordinator.

use std::sync::Arc;

use sheet_core::{AttributeSet, Entity, EntityId, OwnedRecord, RecordId};

use super::{CallerId, MutationGuard};
use crate::store::{EntityStore, Result};

/// [`EntityStore`] view of the runtime's storage with every write routed
/// through the [`MutationGuard`].
///
/// Reads pass straight through. Writes are audited under the handle's caller
/// id and, unless they run inside a coordinated apply, count as violations.
#[derive(Debug, Clone)]
pub struct GuardedStore {
    guard: Arc<MutationGuard>,
    caller: CallerId,
}

impl GuardedStore {
    pub(crate) fn new(guard: Arc<MutationGuard>) -> Self {
        Self {
            guard,
            caller: CallerId::direct(),
        }
    }

    /// Same handle, attributing writes to `caller` in the audit log.
    pub fn with_caller(mut self, caller: impl Into<CallerId>) -> Self {
        self.caller = caller.into();
        self
    }

    pub fn caller(&self) -> &CallerId {
        &self.caller
    }
}

impl EntityStore for GuardedStore {
    fn load(&self, id: EntityId) -> Result<Option<Entity>> {
        self.guard.load(id)
    }

    fn put(&self, entity: &Entity) -> Result<()> {
        self.guard.put(&self.caller, entity)
    }

    fn erase(&self, id: EntityId) -> Result<Option<Entity>> {
        self.guard.erase(&self.caller, id)
    }

    fn list_ids(&self) -> Result<Vec<EntityId>> {
        self.guard.list_ids()
    }

    fn allocate_id(&self) -> Result<EntityId> {
        self.guard.allocate_id()
    }

    fn exists(&self, id: EntityId) -> bool {
        self.guard.exists(id)
    }

    fn insert(&self, entity: &Entity) -> Result<()> {
        self.guard.create(&self.caller, entity)
    }

    fn update(&self, entity: &Entity) -> Result<()> {
        self.guard.update(&self.caller, entity)
    }

    fn remove(&self, id: EntityId) -> Result<Entity> {
        self.guard.delete(&self.caller, id)
    }

    fn upsert_owned(&self, id: EntityId, record: &OwnedRecord) -> Result<Option<OwnedRecord>> {
        self.guard.upsert_owned(&self.caller, id, record)
    }

    fn remove_owned(&self, id: EntityId, record: RecordId) -> Result<OwnedRecord> {
        self.guard.delete_owned(&self.caller, id, record)
    }

    fn write_derived(&self, id: EntityId, derived: &AttributeSet) -> Result<()> {
        self.guard.write_derived(&self.caller, id, derived)
    }

    fn restore(&self, snapshot: &Entity) -> Result<()> {
        self.guard.restore(&self.caller, snapshot)
    }

    fn require(&self, id: EntityId) -> Result<Entity> {
        self.guard.require(id)
    }
}
