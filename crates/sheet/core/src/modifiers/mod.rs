//! Modifier sources, activation conditions and contribution aggregation.
pub mod aggregate;
pub mod condition;
pub mod contribution;

pub use aggregate::{ExternalSource, ModifierAggregator, ModifierSource, SourceProvider};
pub use condition::{ActivationCondition, MAX_CONDITION_DEPTH};
pub use contribution::{
    BonusType, Contribution, ContributionList, ModifierOperation, RuleElement, SourceId,
};
