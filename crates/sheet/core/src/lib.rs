//! Deterministic character-sheet rules shared by the runtime and tools.
//!
//! `sheet-core` defines the entity model, mutation plans, modifier
//! aggregation and derived state resolution. Everything here is pure: the
//! same inputs always produce the same outputs, and nothing touches storage.
//! All entity changes are expressed as [`plan::MutationPlan`]s applied by the
//! runtime coordinator; `derived` attributes only come out of
//! [`resolve::Derivation`].
pub mod config;
pub mod error;
pub mod ledger;
pub mod modifiers;
pub mod plan;
pub mod resolve;
pub mod state;
pub use config::ResolverConfig;
pub use error::{ErrorSeverity, SheetError};
pub use ledger::{LedgerError, RESALE_MULTIPLIER};
pub use modifiers::{
    ActivationCondition, BonusType, Contribution, ContributionList, ExternalSource,
    ModifierAggregator, ModifierOperation, ModifierSource, RuleElement, SourceId, SourceProvider,
};
pub use plan::{
    AddOp, CreateSpec, DeleteTarget, EntityRef, FieldWrite, MergeConflict, MutationPhase,
    MutationPlan, PlanError, RecordSpec, TempId, ValidatedPlan,
};
pub use resolve::{
    ContributionStack, Derivation, DerivationError, DerivationPipeline, DerivedStateResolver,
    Diagnostic, Resolution,
};
pub use state::{
    AttrPath, AttributeSet, CollectionChanges, Entity, EntityDelta, EntityId, EntityKind,
    FieldTarget, OwnedRecord, PathError, RecordField, RecordId, RecordKind, StateError, Value,
};
