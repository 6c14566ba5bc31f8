//! Bounded audit trail of entity write attempts.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sheet_core::EntityId;

/// Who attempted a write.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallerId(String);

impl CallerId {
    pub const COORDINATOR: &'static str = "coordinator";
    /// Default caller of writes made through a [`GuardedStore`](super::GuardedStore).
    pub const DIRECT: &'static str = "direct";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn coordinator() -> Self {
        Self::new(Self::COORDINATOR)
    }

    pub fn direct() -> Self {
        Self::new(Self::DIRECT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallerId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Which write primitive was invoked.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationKind {
    Create,
    Delete,
    Update,
    OwnedUpsert,
    OwnedDelete,
    Derived,
    Restore,
}

/// One observed write attempt, authorized or not.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub entity_id: EntityId,
    pub mutation_kind: MutationKind,
    pub authorized: bool,
    pub caller_id: CallerId,
    pub change_count: usize,
}

/// Lifetime counters for one entity. Not affected by ring eviction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationStats {
    pub total: u64,
    pub authorized: u64,
    pub unauthorized: u64,
}

/// Fixed-capacity ring of audit entries plus per-entity counters.
///
/// The oldest entry is evicted first once capacity is reached. The counters
/// are not part of the ring: they hold one small record per entity ever
/// written, deleted ones included, for the life of the runtime. Entity ids
/// are never reused, so a deleted entity's history stays unambiguous.
#[derive(Debug)]
pub struct AuditLog {
    capacity: usize,
    entries: Mutex<VecDeque<AuditEntry>>,
    stats: Mutex<HashMap<EntityId, MutationStats>>,
}

impl AuditLog {
    pub const DEFAULT_CAPACITY: usize = 1024;

    /// Creates a log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            stats: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn record(&self, entry: AuditEntry) {
        {
            let mut stats = lock(&self.stats);
            let counters = stats.entry(entry.entity_id).or_default();
            counters.total += 1;
            if entry.authorized {
                counters.authorized += 1;
            } else {
                counters.unauthorized += 1;
            }
        }

        let mut entries = lock(&self.entries);
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        lock(&self.entries)
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Up to `limit` unauthorized entries still in the ring, newest first.
    pub fn recent_violations(&self, limit: usize) -> Vec<AuditEntry> {
        lock(&self.entries)
            .iter()
            .rev()
            .filter(|entry| !entry.authorized)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self, entity: EntityId) -> MutationStats {
        lock(&self.stats).get(&entity).copied().unwrap_or_default()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

// Entries are appended whole, so a poisoned lock never exposes a torn record.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
