//! Mutation guard: the interception layer in front of the entity store.
//!
//! The runtime owns the backing store; the only handles it gives out are the
//! guard itself and [`GuardedStore`], so every write primitive goes through
//! [`MutationGuard`]. A write is authorized only when it runs inside an
//! authorization scope the coordinator opened for an apply and that is still
//! alive. Each attempt is appended to the audit log;
//! unauthorized ones are reported on the governance topic and, in strict
//! mode, rejected before the store is touched.

mod audit;
mod handle;
mod scope;

use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sheet_core::{AttributeSet, Entity, EntityDelta, EntityId, OwnedRecord, RecordId};

pub use audit::{AuditEntry, AuditLog, CallerId, MutationKind, MutationStats};
pub use handle::GuardedStore;
pub use scope::{TokenId, current_token};

pub(crate) use scope::AuthorizationScope;

use crate::events::{Event, EventBus, GovernanceEvent};
use crate::metrics::MutationMetrics;
use crate::store::{EntityStore, Result, StoreError};
use scope::TokenRegistry;

/// What the guard does with an unauthorized write.
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
pub enum GuardMode {
    /// Log and allow.
    #[default]
    Permissive,
    /// Log and reject.
    Strict,
}

impl GuardMode {
    pub fn parse(raw: &str) -> Option<Self> {
        Self::from_str(raw.trim()).ok()
    }
}

/// An unauthorized write rejected in strict mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("governance violation: unauthorized {kind} on entity {entity} by '{caller}'")]
pub struct GovernanceViolation {
    pub entity: EntityId,
    pub kind: MutationKind,
    pub caller: CallerId,
}

/// Guarded facade over an [`EntityStore`].
pub struct MutationGuard {
    store: Arc<dyn EntityStore>,
    mode: GuardMode,
    audit: AuditLog,
    tokens: Arc<TokenRegistry>,
    events: EventBus,
    metrics: Arc<MutationMetrics>,
}

impl MutationGuard {
    pub fn new(
        store: Arc<dyn EntityStore>,
        mode: GuardMode,
        audit_capacity: usize,
        events: EventBus,
        metrics: Arc<MutationMetrics>,
    ) -> Self {
        Self {
            store,
            mode,
            audit: AuditLog::new(audit_capacity),
            tokens: Arc::new(TokenRegistry::default()),
            events,
            metrics,
        }
    }

    pub fn mode(&self) -> GuardMode {
        self.mode
    }

    /// Issues a new authorization scope. The token is revoked when the scope
    /// is dropped. Only the coordinator opens scopes.
    pub(crate) fn authorize(&self) -> AuthorizationScope {
        self.tokens.issue()
    }

    /// True when the current task runs inside a live scope of this guard.
    pub fn is_authorized(&self) -> bool {
        current_token().is_some_and(|token| self.tokens.is_active(token))
    }

    /// Number of scopes currently alive.
    pub fn active_scopes(&self) -> usize {
        self.tokens.active_count()
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Up to `limit` unauthorized attempts still in the audit ring, newest first.
    pub fn recent_violations(&self, limit: usize) -> Vec<AuditEntry> {
        self.audit.recent_violations(limit)
    }

    pub fn mutation_stats(&self, entity: EntityId) -> MutationStats {
        self.audit.stats(entity)
    }

    // ------------------------------------------------------------------
    // Reads (never audited)
    // ------------------------------------------------------------------

    pub fn load(&self, id: EntityId) -> Result<Option<Entity>> {
        self.store.load(id)
    }

    pub fn require(&self, id: EntityId) -> Result<Entity> {
        self.store.require(id)
    }

    pub fn list_ids(&self) -> Result<Vec<EntityId>> {
        self.store.list_ids()
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.store.exists(id)
    }

    pub fn allocate_id(&self) -> Result<EntityId> {
        self.store.allocate_id()
    }

    // ------------------------------------------------------------------
    // Guarded writes
    // ------------------------------------------------------------------

    pub fn create(&self, caller: &CallerId, entity: &Entity) -> Result<()> {
        let changes = 1 + entity.base.len() + entity.flags.len() + entity.owned().len();
        self.admit(caller, entity.id, MutationKind::Create, changes)?;
        self.store.insert(entity)
    }

    pub fn update(&self, caller: &CallerId, entity: &Entity) -> Result<()> {
        let changes = match self.store.load(entity.id)? {
            Some(stored) => {
                let mut next = entity.clone();
                next.derived = stored.derived.clone();
                EntityDelta::from_states(&stored, &next).change_count()
            }
            None => 0,
        };
        self.admit(caller, entity.id, MutationKind::Update, changes)?;
        self.store.update(entity)
    }

    pub fn delete(&self, caller: &CallerId, id: EntityId) -> Result<Entity> {
        self.admit(caller, id, MutationKind::Delete, 1)?;
        self.store.remove(id)
    }

    pub fn upsert_owned(
        &self,
        caller: &CallerId,
        id: EntityId,
        record: &OwnedRecord,
    ) -> Result<Option<OwnedRecord>> {
        self.admit(caller, id, MutationKind::OwnedUpsert, 1)?;
        self.store.upsert_owned(id, record)
    }

    pub fn delete_owned(
        &self,
        caller: &CallerId,
        id: EntityId,
        record: RecordId,
    ) -> Result<OwnedRecord> {
        self.admit(caller, id, MutationKind::OwnedDelete, 1)?;
        self.store.remove_owned(id, record)
    }

    pub fn write_derived(
        &self,
        caller: &CallerId,
        id: EntityId,
        derived: &AttributeSet,
    ) -> Result<()> {
        let changes = match self.store.load(id)? {
            Some(stored) => stored.derived.changed_paths(derived).len(),
            None => 0,
        };
        self.admit(caller, id, MutationKind::Derived, changes)?;
        self.store.write_derived(id, derived)
    }

    pub fn restore(&self, caller: &CallerId, snapshot: &Entity) -> Result<()> {
        self.admit(caller, snapshot.id, MutationKind::Restore, 1)?;
        self.store.restore(snapshot)
    }

    /// Raw full-record write, audited as a create or an update.
    pub fn put(&self, caller: &CallerId, entity: &Entity) -> Result<()> {
        let (kind, changes) = match self.store.load(entity.id)? {
            Some(stored) => (
                MutationKind::Update,
                EntityDelta::from_states(&stored, entity).change_count(),
            ),
            None => (
                MutationKind::Create,
                1 + entity.base.len() + entity.flags.len() + entity.owned().len(),
            ),
        };
        self.admit(caller, entity.id, kind, changes)?;
        self.store.put(entity)
    }

    /// Raw record removal, audited as a delete.
    pub fn erase(&self, caller: &CallerId, id: EntityId) -> Result<Option<Entity>> {
        self.admit(caller, id, MutationKind::Delete, 1)?;
        self.store.erase(id)
    }

    /// Audits one attempt and decides whether it may proceed.
    fn admit(
        &self,
        caller: &CallerId,
        entity: EntityId,
        kind: MutationKind,
        change_count: usize,
    ) -> Result<()> {
        let authorized = self.is_authorized();
        let timestamp = Utc::now();
        self.audit.record(AuditEntry {
            timestamp,
            entity_id: entity,
            mutation_kind: kind,
            authorized,
            caller_id: caller.clone(),
            change_count,
        });

        if authorized {
            return Ok(());
        }

        let enforced = self.mode == GuardMode::Strict;
        self.metrics.record_violation();
        tracing::warn!(
            entity = %entity,
            kind = %kind,
            caller = %caller,
            enforced,
            "unauthorized entity write"
        );
        self.events
            .publish(Event::Governance(GovernanceEvent::Violation {
                entity,
                kind,
                caller: caller.clone(),
                enforced,
                timestamp,
            }));

        if enforced {
            return Err(StoreError::Governance(GovernanceViolation {
                entity,
                kind,
                caller: caller.clone(),
            }));
        }
        Ok(())
    }
}

impl std::fmt::Debug for MutationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationGuard")
            .field("mode", &self.mode)
            .field("audit_capacity", &self.audit.capacity())
            .field("active_scopes", &self.active_scopes())
            .finish()
    }
}
