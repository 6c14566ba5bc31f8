//! In-memory EntityStore implementation for tests and local runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use sheet_core::{Entity, EntityId};

use super::error::{Result, StoreError};
use super::traits::EntityStore;

#[derive(Default)]
struct Records {
    entities: BTreeMap<EntityId, Entity>,
    next_id: u64,
}

/// In-memory implementation of EntityStore.
pub struct InMemoryEntityStore {
    records: RwLock<Records>,
}

impl InMemoryEntityStore {
    /// Create a new empty store. Ids start at 1.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(Records {
                entities: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }

    /// Create a store seeded with entities; allocation continues past the
    /// highest seeded id.
    pub fn with_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let entities: BTreeMap<EntityId, Entity> =
            entities.into_iter().map(|e| (e.id, e)).collect();
        let next_id = entities.keys().next_back().map_or(1, |id| id.0 + 1);
        Self {
            records: RwLock::new(Records { entities, next_id }),
        }
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .map(|records| records.entities.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryEntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore for InMemoryEntityStore {
    fn load(&self, id: EntityId) -> Result<Option<Entity>> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.entities.get(&id).cloned())
    }

    fn put(&self, entity: &Entity) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        records.next_id = records.next_id.max(entity.id.0 + 1);
        records.entities.insert(entity.id, entity.clone());
        Ok(())
    }

    fn erase(&self, id: EntityId) -> Result<Option<Entity>> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.entities.remove(&id))
    }

    fn list_ids(&self) -> Result<Vec<EntityId>> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::LockPoisoned)?;
        Ok(records.entities.keys().copied().collect())
    }

    fn allocate_id(&self) -> Result<EntityId> {
        let mut records = self
            .records
            .write()
            .map_err(|_| StoreError::LockPoisoned)?;
        let id = EntityId(records.next_id);
        records.next_id += 1;
        Ok(id)
    }

    fn exists(&self, id: EntityId) -> bool {
        self.records
            .read()
            .map(|records| records.entities.contains_key(&id))
            .unwrap_or(false)
    }
}
