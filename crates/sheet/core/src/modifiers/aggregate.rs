//! Collection of active contributions from every modifier source of an entity.

use std::collections::HashSet;
use std::sync::Arc;

use crate::state::{AttrPath, Entity, OwnedRecord, RecordKind};

use super::contribution::{Contribution, ContributionList, RuleElement, SourceId};

/// Anything that carries rule elements on behalf of an entity.
pub trait ModifierSource {
    fn source_id(&self) -> SourceId;

    fn source_kind(&self) -> RecordKind;

    fn rules(&self) -> &[RuleElement];

    /// Inactive sources emit nothing.
    fn is_active(&self) -> bool {
        true
    }
}

impl ModifierSource for OwnedRecord {
    fn source_id(&self) -> SourceId {
        SourceId::Owned(self.id)
    }

    fn source_kind(&self) -> RecordKind {
        self.kind
    }

    fn rules(&self) -> &[RuleElement] {
        &self.rules
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

/// A source declared outside the entity's owned records.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExternalSource {
    pub id: String,
    pub kind: RecordKind,
    pub rules: Vec<RuleElement>,
}

impl ExternalSource {
    pub fn new(id: impl Into<String>, rules: Vec<RuleElement>) -> Self {
        Self {
            id: id.into(),
            kind: RecordKind::External,
            rules,
        }
    }

    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }
}

impl ModifierSource for ExternalSource {
    fn source_id(&self) -> SourceId {
        SourceId::External(self.id.clone())
    }

    fn source_kind(&self) -> RecordKind {
        self.kind
    }

    fn rules(&self) -> &[RuleElement] {
        &self.rules
    }
}

/// Supplies sources that are not stored in `owned` (chosen abilities,
/// equipment tracked elsewhere, statuses applied by a scene).
///
/// Providers must be deterministic for a given entity state.
pub trait SourceProvider: Send + Sync {
    fn sources_for(&self, entity: &Entity) -> Vec<ExternalSource>;
}

/// Flattens modifier sources into a canonical contribution list.
#[derive(Clone, Default)]
pub struct ModifierAggregator {
    providers: Vec<Arc<dyn SourceProvider>>,
}

impl ModifierAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn SourceProvider>) {
        self.providers.push(provider);
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Collects every activated rule of every active source.
    ///
    /// The first rule per `(source_id, target_path)` wins. The result is
    /// sorted, so repeated calls on the same state are identical.
    pub fn collect(&self, entity: &Entity) -> ContributionList {
        let external: Vec<ExternalSource> = self
            .providers
            .iter()
            .flat_map(|provider| provider.sources_for(entity))
            .collect();

        let sources = entity
            .owned()
            .iter()
            .map(|record| record as &dyn ModifierSource)
            .chain(external.iter().map(|source| source as &dyn ModifierSource));

        let mut seen: HashSet<(SourceId, AttrPath)> = HashSet::new();
        let mut contributions = Vec::new();

        for source in sources.filter(|source| source.is_active()) {
            let source_id = source.source_id();
            for rule in source.rules() {
                if !rule.when.evaluate(entity) {
                    continue;
                }
                if !seen.insert((source_id.clone(), rule.target_path.clone())) {
                    continue;
                }
                contributions.push(Contribution::from_rule(
                    source_id.clone(),
                    source.source_kind(),
                    rule,
                ));
            }
        }

        ContributionList::new(contributions)
    }
}

impl std::fmt::Debug for ModifierAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModifierAggregator")
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::{ActivationCondition, ModifierOperation};
    use crate::state::{AttributeSet, EntityId, EntityKind, RecordId};

    fn p(raw: &str) -> AttrPath {
        AttrPath::parse(raw).unwrap()
    }

    struct ForceTraining;

    impl SourceProvider for ForceTraining {
        fn sources_for(&self, _entity: &Entity) -> Vec<ExternalSource> {
            vec![ExternalSource::new(
                "force-training",
                vec![RuleElement::add(p("defense.will"), 2.0, "insight")],
            )]
        }
    }

    fn jedi() -> Entity {
        Entity::new(EntityId(1), EntityKind::Character, "Jedi")
            .with_base(AttributeSet::new().with(p("level"), 3))
            .with_owned([
                OwnedRecord::new(RecordId(2), RecordKind::Equipment, "Robe")
                    .with_rule(RuleElement::add(p("defense.reflex"), 1.0, "armor"))
                    .with_rule(RuleElement::add(p("defense.reflex"), 9.0, "armor")),
                OwnedRecord::new(RecordId(1), RecordKind::Ability, "Dodge")
                    .with_rule(RuleElement::add(p("defense.reflex"), 1.0, "dodge"))
                    .with_rule(
                        RuleElement::add(p("defense.fort"), 5.0, "dodge")
                            .when(ActivationCondition::level_at_least(10)),
                    ),
                OwnedRecord::new(RecordId(3), RecordKind::Equipment, "Stowed shield")
                    .with_rule(RuleElement::add(p("defense.reflex"), 4.0, "shield"))
                    .inactive(),
            ])
    }

    #[test]
    fn collects_active_sources_in_canonical_order() {
        let aggregator = ModifierAggregator::new().with_provider(Arc::new(ForceTraining));
        let list = aggregator.collect(&jedi());

        let summary: Vec<_> = list
            .iter()
            .map(|c| (c.target_path.as_str().to_owned(), c.source_id.clone(), c.value))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("defense.reflex".into(), SourceId::Owned(RecordId(1)), 1.0),
                ("defense.reflex".into(), SourceId::Owned(RecordId(2)), 1.0),
                (
                    "defense.will".into(),
                    SourceId::External("force-training".into()),
                    2.0
                ),
            ]
        );
        assert!(
            list.iter()
                .all(|c| c.operation == ModifierOperation::Add)
        );
    }

    #[test]
    fn aggregation_is_idempotent() {
        let aggregator = ModifierAggregator::new().with_provider(Arc::new(ForceTraining));
        let entity = jedi();
        assert_eq!(aggregator.collect(&entity), aggregator.collect(&entity));
    }

    #[test]
    fn conditions_gate_contributions() {
        let mut entity = jedi();
        let aggregator = ModifierAggregator::new();
        assert!(
            !aggregator
                .collect(&entity)
                .iter()
                .any(|c| c.target_path == p("defense.fort"))
        );

        entity.base.insert(p("level"), 10);
        let fort: Vec<_> = aggregator
            .collect(&entity)
            .iter()
            .filter(|c| c.target_path == p("defense.fort"))
            .map(|c| c.value)
            .collect();
        assert_eq!(fort, vec![5.0]);
    }
}
