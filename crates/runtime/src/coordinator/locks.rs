//! Per-entity serialization.

use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use sheet_core::EntityId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// What an apply does when one of its entities is held by another plan.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum BusyPolicy {
    /// Wait for the lock.
    #[default]
    Queue,
    /// Fail immediately with a busy error.
    Reject,
}

impl BusyPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        Self::from_str(raw.trim()).ok()
    }
}

/// Locks held by one apply. Released on drop.
#[derive(Default)]
pub(crate) struct LockSet {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    pub(crate) fn push(&mut self, guard: OwnedMutexGuard<()>) {
        self.guards.push(guard);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.guards.len()
    }
}

/// Lazily populated table of one async mutex per entity.
#[derive(Default)]
pub(crate) struct EntityLocks {
    table: Mutex<HashMap<EntityId, Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    fn table(&self) -> MutexGuard<'_, HashMap<EntityId, Arc<AsyncMutex<()>>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn slot(&self, id: EntityId) -> Arc<AsyncMutex<()>> {
        Arc::clone(self.table().entry(id).or_default())
    }

    /// Locks every id in ascending order.
    ///
    /// Under [`BusyPolicy::Reject`] the first held id aborts the attempt and
    /// everything acquired so far is released.
    pub(crate) async fn acquire(
        &self,
        ids: &BTreeSet<EntityId>,
        policy: BusyPolicy,
    ) -> Result<LockSet, EntityId> {
        let mut set = LockSet::default();
        for &id in ids {
            let slot = self.slot(id);
            let guard = match policy {
                BusyPolicy::Queue => slot.lock_owned().await,
                BusyPolicy::Reject => slot.try_lock_owned().map_err(|_| id)?,
            };
            set.push(guard);
        }
        Ok(set)
    }

    /// Waits for a single entity.
    pub(crate) async fn lock(&self, id: EntityId) -> OwnedMutexGuard<()> {
        self.slot(id).lock_owned().await
    }

    /// Takes the lock of a freshly allocated id, which nobody else can hold.
    pub(crate) fn claim(&self, id: EntityId) -> Option<OwnedMutexGuard<()>> {
        self.slot(id).try_lock_owned().ok()
    }

    /// Drops table entries nobody holds or waits on.
    pub(crate) fn prune(&self) {
        self.table().retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    #[cfg(test)]
    pub(crate) fn tracked(&self) -> usize {
        self.table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u64]) -> BTreeSet<EntityId> {
        raw.iter().copied().map(EntityId).collect()
    }

    #[tokio::test]
    async fn reject_policy_fails_fast_and_releases() {
        let locks = EntityLocks::default();
        let held = locks.acquire(&ids(&[2]), BusyPolicy::Queue).await.unwrap();

        let busy = locks.acquire(&ids(&[1, 2, 3]), BusyPolicy::Reject).await;
        assert_eq!(busy.err(), Some(EntityId(2)));

        // Entity 1 was released when the attempt failed.
        assert!(locks.claim(EntityId(1)).is_some());
        drop(held);
        assert_eq!(
            locks
                .acquire(&ids(&[1, 2, 3]), BusyPolicy::Reject)
                .await
                .map(|set| set.len())
                .ok(),
            Some(3)
        );
    }

    #[tokio::test]
    async fn prune_keeps_only_live_slots() {
        let locks = EntityLocks::default();
        let held = locks.lock(EntityId(1)).await;
        drop(locks.lock(EntityId(2)).await);

        locks.prune();
        assert_eq!(locks.tracked(), 1);
        drop(held);
        locks.prune();
        assert_eq!(locks.tracked(), 0);
    }
}
