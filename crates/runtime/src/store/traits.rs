//! Storage contract for entity records.

use sheet_core::{AttributeSet, Entity, EntityId, OwnedRecord, RecordId};

use super::error::{Result, StoreError};

/// Backend holding the authoritative entity records.
///
/// Implementations provide raw record access; the write primitives the rest
/// of the runtime uses are derived from it. The runtime takes ownership of
/// its store, and the handles it gives out
/// ([`MutationGuard`](crate::guard::MutationGuard),
/// [`GuardedStore`](crate::guard::GuardedStore)) route every primitive
/// through the guard.
pub trait EntityStore: Send + Sync {
    /// Load an entity by id.
    fn load(&self, id: EntityId) -> Result<Option<Entity>>;

    /// Write a full record, replacing whatever is stored under its id.
    fn put(&self, entity: &Entity) -> Result<()>;

    /// Remove a record, returning it if it existed.
    fn erase(&self, id: EntityId) -> Result<Option<Entity>>;

    /// List stored ids in ascending order.
    fn list_ids(&self) -> Result<Vec<EntityId>>;

    /// Reserve a fresh id. Ids are never handed out twice.
    fn allocate_id(&self) -> Result<EntityId>;

    fn exists(&self, id: EntityId) -> bool {
        matches!(self.load(id), Ok(Some(_)))
    }

    /// Store a new entity. Fails if the id is taken.
    fn insert(&self, entity: &Entity) -> Result<()> {
        if self.exists(entity.id) {
            return Err(StoreError::AlreadyExists(entity.id));
        }
        self.put(entity)
    }

    /// Replace the author-controlled fields of an existing entity.
    ///
    /// The stored `derived` set is kept; only the resolver writes it.
    fn update(&self, entity: &Entity) -> Result<()> {
        let stored = self.require(entity.id)?;
        let mut next = entity.clone();
        next.derived = stored.derived;
        self.put(&next)
    }

    fn remove(&self, id: EntityId) -> Result<Entity> {
        self.erase(id)?.ok_or(StoreError::NotFound(id))
    }

    /// Insert or replace one owned record, returning the replaced one.
    fn upsert_owned(&self, id: EntityId, record: &OwnedRecord) -> Result<Option<OwnedRecord>> {
        let mut entity = self.require(id)?;
        let previous = entity.upsert_record(record.clone());
        self.put(&entity)?;
        Ok(previous)
    }

    fn remove_owned(&self, id: EntityId, record: RecordId) -> Result<OwnedRecord> {
        let mut entity = self.require(id)?;
        let removed = entity.remove_record(record)?;
        self.put(&entity)?;
        Ok(removed)
    }

    /// Overwrite the derived attribute set.
    fn write_derived(&self, id: EntityId, derived: &AttributeSet) -> Result<()> {
        let mut entity = self.require(id)?;
        entity.derived = derived.clone();
        self.put(&entity)
    }

    /// Put a snapshot back exactly as captured, recreating it if needed.
    fn restore(&self, snapshot: &Entity) -> Result<()> {
        self.put(snapshot)
    }

    fn require(&self, id: EntityId) -> Result<Entity> {
        self.load(id)?.ok_or(StoreError::NotFound(id))
    }
}
