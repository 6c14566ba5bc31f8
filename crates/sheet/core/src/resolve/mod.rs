//! Derived state computation.
//!
//! [`DerivationPipeline`] chains the aggregator and the resolver; runtime
//! layers depend on the [`Derivation`] trait so alternative pipelines can be
//! substituted.
pub mod resolver;
pub mod stack;

pub use resolver::{DerivationError, DerivedStateResolver, Diagnostic, Resolution};
pub use stack::ContributionStack;

use crate::config::ResolverConfig;
use crate::modifiers::ModifierAggregator;
use crate::state::Entity;

/// Computes the derived attribute set of an entity from its current state.
pub trait Derivation: Send + Sync {
    fn derive(&self, entity: &Entity) -> Result<Resolution, DerivationError>;
}

/// Aggregate-then-resolve.
#[derive(Clone, Debug, Default)]
pub struct DerivationPipeline {
    aggregator: ModifierAggregator,
    resolver: DerivedStateResolver,
}

impl DerivationPipeline {
    pub fn new(aggregator: ModifierAggregator, config: ResolverConfig) -> Self {
        Self {
            aggregator,
            resolver: DerivedStateResolver::new(config),
        }
    }

    pub fn aggregator(&self) -> &ModifierAggregator {
        &self.aggregator
    }

    pub fn resolver(&self) -> &DerivedStateResolver {
        &self.resolver
    }
}

impl Derivation for DerivationPipeline {
    fn derive(&self, entity: &Entity) -> Result<Resolution, DerivationError> {
        let contributions = self.aggregator.collect(entity);
        self.resolver.resolve_entity(entity, &contributions)
    }
}
