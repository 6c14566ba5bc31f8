//! Recursion guard for resolver passes.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use sheet_core::EntityId;

/// Entities whose resolver pass is still unwinding.
#[derive(Debug, Default)]
pub(crate) struct RecomputeGuard {
    in_flight: Mutex<HashSet<EntityId>>,
}

impl RecomputeGuard {
    fn in_flight(&self) -> MutexGuard<'_, HashSet<EntityId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `id` as being resolved. Returns `None` if it already is.
    pub(crate) fn enter(&self, id: EntityId) -> Option<RecomputeTicket<'_>> {
        if self.in_flight().insert(id) {
            Some(RecomputeTicket { guard: self, id })
        } else {
            None
        }
    }
}

/// Held for the duration of one pass; releases the entity on drop.
pub(crate) struct RecomputeTicket<'a> {
    guard: &'a RecomputeGuard,
    id: EntityId,
}

impl Drop for RecomputeTicket<'_> {
    fn drop(&mut self) {
        self.guard.in_flight().remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refuses_reentry_until_ticket_drops() {
        let guard = RecomputeGuard::default();
        let ticket = guard.enter(EntityId(1));
        assert!(ticket.is_some());
        assert!(guard.enter(EntityId(1)).is_none());
        assert!(guard.enter(EntityId(2)).is_some());

        drop(ticket);
        assert!(guard.enter(EntityId(1)).is_some());
    }
}
