//! Runtime orchestration for character-sheet entities.
//!
//! This crate wires the pure rules in `sheet-core` to storage: plans are
//! applied atomically by the coordinator, every store write passes the
//! mutation guard, and derived attributes are recomputed exactly once per
//! affected entity. Consumers embed [`SheetRuntime`] and apply
//! [`sheet_core::MutationPlan`]s through its coordinator.
//!
//! Modules are organized by responsibility:
//! - [`runtime`] hosts the assembled runtime, its builder and configuration
//! - [`coordinator`] applies plans (phases, locks, snapshots, rollback)
//! - [`guard`] intercepts store writes and keeps the audit log
//! - [`store`] provides the entity store contract and its implementations
//! - [`events`] provides topic-based event bus for flexible event routing
pub mod coordinator;
pub mod events;
pub mod guard;
pub mod metrics;
pub mod runtime;
pub mod store;

pub use coordinator::{
    BusyPolicy, DerivationWarning, HydrationReport, MutationCoordinator, MutationError,
    MutationFailure, MutationReceipt, RollbackReport,
};
pub use events::{Event, EventBus, GovernanceEvent, MutationEvent, Topic};
pub use guard::{
    AuditEntry, AuditLog, CallerId, GovernanceViolation, GuardMode, GuardedStore, MutationGuard,
    MutationKind, MutationStats, TokenId,
};
pub use metrics::{MetricsSnapshot, MutationMetrics};
pub use runtime::{Result, RuntimeBuilder, RuntimeConfig, RuntimeError, SheetRuntime};
pub use store::{EntityStore, FileEntityStore, InMemoryEntityStore, StoreError};
