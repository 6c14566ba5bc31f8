//! File-based EntityStore implementation.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use sheet_core::{Entity, EntityId};

use super::error::{Result, StoreError};
use super::traits::EntityStore;

/// File-based implementation of EntityStore.
///
/// Stores each entity as `entity_{id}.json` in the persisted shape
/// (`id, kind, name, base, owned, flags, derived`). Writes go to a temp file
/// first and are renamed into place.
pub struct FileEntityStore {
    base_dir: PathBuf,
    next_id: AtomicU64,
}

impl FileEntityStore {
    /// Open (or create) a store rooted at `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir).map_err(StoreError::Io)?;

        let store = Self {
            base_dir,
            next_id: AtomicU64::new(1),
        };
        let highest = store.list_ids()?.last().map_or(0, |id| id.0);
        store.next_id.store(highest + 1, Ordering::SeqCst);
        Ok(store)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn entity_path(&self, id: EntityId) -> PathBuf {
        self.base_dir.join(format!("entity_{}.json", id.0))
    }
}

impl EntityStore for FileEntityStore {
    fn load(&self, id: EntityId) -> Result<Option<Entity>> {
        let path = self.entity_path(id);

        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&path).map_err(StoreError::Io)?;
        let entity: Entity = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Serialization(format!("{}: {e}", path.display())))?;

        if entity.id != id {
            return Err(StoreError::CorruptedData(format!(
                "{} holds entity {}",
                path.display(),
                entity.id
            )));
        }

        Ok(Some(entity))
    }

    fn put(&self, entity: &Entity) -> Result<()> {
        let path = self.entity_path(entity.id);
        let temp_path = path.with_extension("json.tmp");

        let bytes = serde_json::to_vec_pretty(entity)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        fs::write(&temp_path, bytes).map_err(StoreError::Io)?;
        fs::rename(&temp_path, &path).map_err(StoreError::Io)?;

        self.next_id.fetch_max(entity.id.0 + 1, Ordering::SeqCst);
        tracing::debug!("Saved entity[{}] to {}", entity.id, path.display());

        Ok(())
    }

    fn erase(&self, id: EntityId) -> Result<Option<Entity>> {
        let existing = self.load(id)?;
        if existing.is_some() {
            fs::remove_file(self.entity_path(id)).map_err(StoreError::Io)?;
            tracing::debug!("Deleted entity[{}]", id);
        }
        Ok(existing)
    }

    fn list_ids(&self) -> Result<Vec<EntityId>> {
        let mut ids = Vec::new();

        let entries = fs::read_dir(&self.base_dir).map_err(StoreError::Io)?;

        for entry in entries {
            let entry = entry.map_err(StoreError::Io)?;
            let path = entry.path();

            if let Some(filename) = path.file_name().and_then(|s| s.to_str())
                && let Some(id_str) = filename
                    .strip_prefix("entity_")
                    .and_then(|s| s.strip_suffix(".json"))
                && let Ok(id) = id_str.parse::<u64>()
            {
                ids.push(EntityId(id));
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    fn allocate_id(&self) -> Result<EntityId> {
        Ok(EntityId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    fn exists(&self, id: EntityId) -> bool {
        self.entity_path(id).exists()
    }
}
