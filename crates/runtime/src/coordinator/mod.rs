//! Mutation coordinator: the single entry point for changing entities.
//!
//! An apply runs in four steps:
//! 1. validate the plan (nothing is locked or read yet)
//! 2. lock every stored entity the plan names, in ascending id order
//! 3. snapshot those entities and run CREATE → DELETE → SET → ADD inside an
//!    authorization scope, unwinding on the first failure
//! 4. run exactly one resolver pass per affected entity (DERIVE), whose
//!    failures degrade the receipt but never roll back

mod locks;
mod receipt;
mod recompute;
mod snapshot;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use sheet_core::{
    DeleteTarget, Derivation, Entity, EntityDelta, EntityId, EntityRef, MutationPhase,
    MutationPlan, StateError, TempId, ValidatedPlan,
};
use tokio_util::sync::CancellationToken;

pub use locks::BusyPolicy;
pub use receipt::{DerivationWarning, MutationError, MutationFailure, MutationReceipt};
pub use snapshot::RollbackReport;

use crate::events::{Event, EventBus, MutationEvent};
use crate::guard::{CallerId, MutationGuard};
use crate::metrics::MutationMetrics;
use crate::store::{Result as StoreResult, StoreError};
use locks::{EntityLocks, LockSet};
use recompute::RecomputeGuard;
use snapshot::SnapshotSet;

/// Result of recomputing every stored entity at start-up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HydrationReport {
    pub recomputed: Vec<EntityId>,
    pub warnings: Vec<DerivationWarning>,
}

/// Per-apply bookkeeping.
struct ApplyState {
    created: BTreeMap<TempId, EntityId>,
    /// Entities a write was attempted on, including deleted ones.
    touched: BTreeSet<EntityId>,
    deleted: BTreeSet<EntityId>,
    snapshots: SnapshotSet,
    locks: LockSet,
}

impl ApplyState {
    fn resolve(&self, reference: &EntityRef) -> Result<EntityId, MutationError> {
        match reference {
            EntityRef::Real(id) => Ok(*id),
            EntityRef::Temp(temp) => {
                self.created
                    .get(temp)
                    .copied()
                    .ok_or_else(|| MutationError::UnresolvedTemp { temp: temp.clone() })
            }
        }
    }
}

pub struct MutationCoordinator {
    guard: Arc<MutationGuard>,
    derivation: Arc<dyn Derivation>,
    locks: EntityLocks,
    recompute: RecomputeGuard,
    busy_policy: BusyPolicy,
    caller: CallerId,
    events: EventBus,
    metrics: Arc<MutationMetrics>,
}

impl MutationCoordinator {
    pub fn new(
        guard: Arc<MutationGuard>,
        derivation: Arc<dyn Derivation>,
        busy_policy: BusyPolicy,
        events: EventBus,
        metrics: Arc<MutationMetrics>,
    ) -> Self {
        Self {
            guard,
            derivation,
            locks: EntityLocks::default(),
            recompute: RecomputeGuard::default(),
            busy_policy,
            caller: CallerId::coordinator(),
            events,
            metrics,
        }
    }

    /// Identity recorded in the audit log for this coordinator's writes.
    pub fn with_caller(mut self, caller: CallerId) -> Self {
        self.caller = caller;
        self
    }

    pub fn guard(&self) -> &Arc<MutationGuard> {
        &self.guard
    }

    pub fn busy_policy(&self) -> BusyPolicy {
        self.busy_policy
    }

    pub async fn apply(&self, plan: MutationPlan) -> Result<MutationReceipt, MutationFailure> {
        self.apply_with_cancel(plan, &CancellationToken::new())
            .await
    }

    /// Applies a plan, checking `cancel` before every phase.
    ///
    /// A cancelled plan is rolled back like any other pre-DERIVE failure.
    pub async fn apply_with_cancel(
        &self,
        plan: MutationPlan,
        cancel: &CancellationToken,
    ) -> Result<MutationReceipt, MutationFailure> {
        let started = Instant::now();
        let result = self.execute(plan, cancel).await;
        self.locks.prune();

        match &result {
            Ok(receipt) => {
                self.metrics
                    .record_applied(started.elapsed(), receipt.is_degraded());
                for warning in &receipt.warnings {
                    tracing::warn!(entity = %warning.entity(), "degraded derivation: {warning}");
                }
                tracing::info!(
                    touched = receipt.touched.len(),
                    created = receipt.created.len(),
                    warnings = receipt.warnings.len(),
                    "plan applied"
                );
                self.events.publish(Event::Mutation(MutationEvent::Applied {
                    touched: receipt.touched.clone(),
                    created: receipt.created.clone(),
                    warnings: receipt.warnings.len(),
                }));
            }
            Err(failure) => {
                self.metrics.record_failed(failure.rolled_back);
                if failure.is_busy() {
                    self.metrics.record_busy();
                }
                tracing::warn!(
                    phase = %failure.phase,
                    rolled_back = failure.rolled_back,
                    "plan failed: {}",
                    failure.error
                );
                self.events.publish(Event::Mutation(MutationEvent::Failed {
                    phase: failure.phase,
                    error: failure.error.to_string(),
                    rolled_back: failure.rolled_back,
                }));
            }
        }
        result
    }

    /// Reads an entity, waiting for any plan currently holding it.
    pub async fn read(&self, id: EntityId) -> StoreResult<Option<Entity>> {
        let _lock = self.locks.lock(id).await;
        self.guard.load(id)
    }

    /// Recomputes `derived` for every stored entity. Persisted derived values
    /// are never trusted as input.
    pub async fn hydrate(&self) -> StoreResult<HydrationReport> {
        let ids = self.guard.list_ids()?;
        let scope = self.guard.authorize();
        let mut report = HydrationReport::default();

        for id in ids {
            let _lock = self.locks.lock(id).await;
            let warnings = scope.run(async { self.derive_one(id) }).await;
            report.recomputed.push(id);
            report.warnings.extend(warnings);
        }

        drop(scope);
        self.locks.prune();
        tracing::info!(
            entities = report.recomputed.len(),
            warnings = report.warnings.len(),
            "hydrated derived state"
        );
        Ok(report)
    }

    async fn execute(
        &self,
        plan: MutationPlan,
        cancel: &CancellationToken,
    ) -> Result<MutationReceipt, MutationFailure> {
        let plan = plan
            .validate()
            .map_err(|error| MutationFailure::new(MutationPhase::Validate, error, false))?;

        let ids = plan.real_entities();
        let locks = self
            .locks
            .acquire(&ids, self.busy_policy)
            .await
            .map_err(|entity| {
                MutationFailure::new(MutationPhase::Validate, MutationError::Busy { entity }, false)
            })?;

        let snapshots = SnapshotSet::capture(&self.guard, &ids)
            .map_err(|error| MutationFailure::new(MutationPhase::Validate, error, false))?;

        let mut state = ApplyState {
            created: BTreeMap::new(),
            touched: BTreeSet::new(),
            deleted: BTreeSet::new(),
            snapshots,
            locks,
        };

        let scope = self.guard.authorize();
        tracing::debug!(token = %scope.token(), entities = ids.len(), "authorization scope opened");
        let result = scope
            .run(async { self.run_phases(&plan, &mut state, cancel) })
            .await;
        drop(scope);
        result
    }

    fn run_phases(
        &self,
        plan: &ValidatedPlan,
        state: &mut ApplyState,
        cancel: &CancellationToken,
    ) -> Result<MutationReceipt, MutationFailure> {
        for phase in [
            MutationPhase::Create,
            MutationPhase::Delete,
            MutationPhase::Set,
            MutationPhase::Add,
        ] {
            if cancel.is_cancelled() {
                return Err(self.unwind(phase, MutationError::Cancelled, state));
            }
            tracing::debug!(%phase, "applying phase");
            let outcome = match phase {
                MutationPhase::Create => self.apply_create(plan, state),
                MutationPhase::Delete => self.apply_delete(plan, state),
                MutationPhase::Set => self.apply_set(plan, state),
                _ => self.apply_add(plan, state),
            };
            if let Err(error) = outcome {
                return Err(self.unwind(phase, error, state));
            }
        }

        if cancel.is_cancelled() {
            return Err(self.unwind(MutationPhase::Derive, MutationError::Cancelled, state));
        }

        tracing::debug!(phase = %MutationPhase::Derive, "applying phase");
        let mut affected = state.touched.clone();
        affected.extend(plan.derive.iter().filter_map(|r| state.resolve(r).ok()));
        affected.retain(|id| !state.deleted.contains(id));

        let mut warnings = Vec::new();
        for &id in &affected {
            warnings.extend(self.derive_one(id));
        }

        let deltas = affected
            .iter()
            .filter_map(|&id| self.delta_for(id, state))
            .filter(|delta| !delta.is_empty())
            .collect();

        Ok(MutationReceipt {
            created: state.created.clone(),
            touched: state.touched.iter().copied().collect(),
            deleted: state.deleted.iter().copied().collect(),
            derived: affected.into_iter().collect(),
            deltas,
            warnings,
        })
    }

    fn apply_create(
        &self,
        plan: &ValidatedPlan,
        state: &mut ApplyState,
    ) -> Result<(), MutationError> {
        for spec in &plan.create {
            let id = self.guard.allocate_id()?;
            if let Some(lock) = self.locks.claim(id) {
                state.locks.push(lock);
            }

            let mut entity = Entity::new(id, spec.kind, spec.name.clone())
                .with_base(spec.base.clone())
                .with_flags(spec.flags.clone());
            for record in &spec.owned {
                let record_id = record.id.unwrap_or_else(|| entity.next_record_id());
                entity
                    .insert_record(record.clone().into_record(record_id))
                    .map_err(StoreError::from)?;
            }

            state.snapshots.record_created(id);
            state.touched.insert(id);
            self.guard.create(&self.caller, &entity)?;
            state.created.insert(spec.temp_id.clone(), id);
            tracing::debug!(temp = %spec.temp_id, entity = %id, "entity created");
        }
        Ok(())
    }

    fn apply_delete(
        &self,
        plan: &ValidatedPlan,
        state: &mut ApplyState,
    ) -> Result<(), MutationError> {
        for target in &plan.delete {
            match target {
                DeleteTarget::Entity { entity } => {
                    let id = state.resolve(entity)?;
                    state.touched.insert(id);
                    self.guard.delete(&self.caller, id)?;
                    state.deleted.insert(id);
                }
                DeleteTarget::Owned { entity, record } => {
                    let id = state.resolve(entity)?;
                    state.touched.insert(id);
                    self.guard.delete_owned(&self.caller, id, *record)?;
                }
            }
        }
        Ok(())
    }

    fn apply_set(&self, plan: &ValidatedPlan, state: &mut ApplyState) -> Result<(), MutationError> {
        for (reference, writes) in &plan.set {
            let id = state.resolve(reference)?;
            state.touched.insert(id);
            let mut entity = self.guard.require(id)?;
            for write in writes {
                entity
                    .write_field(&write.target, write.value.clone())
                    .map_err(StoreError::from)?;
            }
            self.guard.update(&self.caller, &entity)?;
        }
        Ok(())
    }

    fn apply_add(&self, plan: &ValidatedPlan, state: &mut ApplyState) -> Result<(), MutationError> {
        for op in &plan.add {
            let id = state.resolve(&op.entity)?;
            state.touched.insert(id);
            let entity = self.guard.require(id)?;
            let record_id = match op.record.id {
                Some(record) if entity.record(record).is_some() => {
                    return Err(StoreError::from(StateError::RecordExists { entity: id, record }).into());
                }
                Some(record) => record,
                None => entity.next_record_id(),
            };
            self.guard
                .upsert_owned(&self.caller, id, &op.record.clone().into_record(record_id))?;
        }
        Ok(())
    }

    /// One resolver pass for one entity. Never fails; problems become warnings.
    fn derive_one(&self, id: EntityId) -> Vec<DerivationWarning> {
        let Some(_ticket) = self.recompute.enter(id) else {
            return vec![DerivationWarning::Reentrant { entity: id }];
        };

        let entity = match self.guard.require(id) {
            Ok(entity) => entity,
            Err(error) => {
                return vec![DerivationWarning::Unavailable {
                    entity: id,
                    reason: error.to_string(),
                }];
            }
        };

        self.metrics.record_resolver_pass();
        match self.derivation.derive(&entity) {
            Ok(resolution) => {
                let mut warnings: Vec<_> = resolution
                    .diagnostics
                    .iter()
                    .cloned()
                    .map(|diagnostic| DerivationWarning::Diagnostic {
                        entity: id,
                        diagnostic,
                    })
                    .collect();
                if let Err(error) = self
                    .guard
                    .write_derived(&self.caller, id, &resolution.derived)
                {
                    warnings.push(DerivationWarning::Unavailable {
                        entity: id,
                        reason: error.to_string(),
                    });
                }
                warnings
            }
            Err(error) => vec![DerivationWarning::Failed { entity: id, error }],
        }
    }

    fn delta_for(&self, id: EntityId, state: &ApplyState) -> Option<EntityDelta> {
        let after = self.guard.load(id).ok()??;
        let delta = match state.snapshots.before(id) {
            Some(before) => EntityDelta::from_states(before, &after),
            None if state.snapshots.was_created(id) => {
                let blank = Entity::new(id, after.kind, after.name.clone());
                EntityDelta::from_states(&blank, &after)
            }
            None => return None,
        };
        Some(delta)
    }

    fn unwind(
        &self,
        phase: MutationPhase,
        error: MutationError,
        state: &ApplyState,
    ) -> MutationFailure {
        tracing::debug!(%phase, "unwinding plan: {error}");
        let report = state
            .snapshots
            .rollback(&self.guard, &self.caller, &state.touched);
        if !report.is_complete() {
            self.metrics.record_rollback_error();
        }
        self.events
            .publish(Event::Mutation(MutationEvent::RolledBack {
                restored: report.restored.clone(),
                discarded: report.discarded.clone(),
            }));
        MutationFailure::new(phase, error, report.is_complete())
    }
}

impl std::fmt::Debug for MutationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MutationCoordinator")
            .field("busy_policy", &self.busy_policy)
            .field("caller", &self.caller)
            .field("guard", &self.guard)
            .finish()
    }
}
