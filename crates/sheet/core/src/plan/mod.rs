//! Mutation plans: the only vocabulary for changing entities.
//!
//! A plan is built (or merged from fragments), validated into a
//! [`ValidatedPlan`], and handed to the runtime coordinator which applies it
//! phase by phase: CREATE → DELETE → SET → ADD → DERIVE.
pub mod merge;
pub mod model;
pub mod validate;

pub use merge::MergeConflict;
pub use model::{
    AddOp, CreateSpec, DeleteTarget, EntityRef, EntityRefParseError, MutationPhase, MutationPlan,
    RecordSpec, TempId,
};
pub use validate::{FieldWrite, PlanError, ValidatedPlan};
