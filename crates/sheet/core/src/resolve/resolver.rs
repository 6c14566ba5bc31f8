//! Derived state resolution.
//!
//! The resolver is a pure function of `(base, contributions)`: it never reads
//! storage, never consults the previous `derived` snapshot and never looks at
//! the clock. Runtime layers decide when to call it and where to write the
//! result.

use std::fmt;

use crate::config::ResolverConfig;
use crate::error::{ErrorSeverity, SheetError};
use crate::modifiers::{ContributionList, SourceId};
use crate::state::{AttrPath, AttributeSet, Entity, Value};

use super::stack::ContributionStack;

/// Output of one resolver pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Resolution {
    pub derived: AttributeSet,
    pub diagnostics: Vec<Diagnostic>,
}

impl Resolution {
    pub fn has_warnings(&self) -> bool {
        !self.diagnostics.is_empty()
    }
}

/// Non-fatal observation made while resolving.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Diagnostic {
    /// More contributions than the configured threshold; usually a runaway
    /// provider.
    ContributionThreshold { count: usize, threshold: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ContributionThreshold { count, threshold } => write!(
                f,
                "{count} contributions exceed the warning threshold of {threshold}"
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DerivationError {
    #[error("contribution to '{path}' targets a {found} base value")]
    NonNumericTarget { path: AttrPath, found: String },

    #[error("contribution from {source_id} to '{path}' has non-finite value {value}")]
    NonFiniteContribution {
        source_id: SourceId,
        path: AttrPath,
        value: f64,
    },

    #[error("derived value at '{path}' is not finite")]
    NonFiniteResult { path: AttrPath },
}

impl SheetError for DerivationError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Recoverable
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NonNumericTarget { .. } => "DERIVATION_NON_NUMERIC_TARGET",
            Self::NonFiniteContribution { .. } => "DERIVATION_NON_FINITE_CONTRIBUTION",
            Self::NonFiniteResult { .. } => "DERIVATION_NON_FINITE_RESULT",
        }
    }
}

/// Folds contributions into a derived attribute set.
#[derive(Clone, Copy, Debug, Default)]
pub struct DerivedStateResolver {
    config: ResolverConfig,
}

impl DerivedStateResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves the entity's `base` against its contributions.
    pub fn resolve_entity(
        &self,
        entity: &Entity,
        contributions: &ContributionList,
    ) -> Result<Resolution, DerivationError> {
        self.resolve(&entity.base, contributions)
    }

    /// Starts from a copy of `base` and applies every target path's stack.
    ///
    /// A target missing from `base` (or explicitly null) starts at zero.
    pub fn resolve(
        &self,
        base: &AttributeSet,
        contributions: &ContributionList,
    ) -> Result<Resolution, DerivationError> {
        let mut diagnostics = Vec::new();
        let threshold = self.config.contribution_warn_threshold;
        if contributions.len() > threshold {
            tracing::warn!(
                count = contributions.len(),
                threshold,
                "contribution count exceeds warning threshold"
            );
            diagnostics.push(Diagnostic::ContributionThreshold {
                count: contributions.len(),
                threshold,
            });
        }

        let mut derived = base.clone();
        for (path, group) in contributions.by_target() {
            let mut stack = ContributionStack::new();
            for contribution in group {
                if !contribution.value.is_finite() {
                    return Err(DerivationError::NonFiniteContribution {
                        source_id: contribution.source_id.clone(),
                        path: path.clone(),
                        value: contribution.value,
                    });
                }
                stack.push_contribution(contribution);
            }

            let start = match base.get(path) {
                None | Some(Value::Null) => 0.0,
                Some(Value::Number(n)) => *n,
                Some(_) if stack.replaces_base() => 0.0,
                Some(other) => {
                    return Err(DerivationError::NonNumericTarget {
                        path: path.clone(),
                        found: value_kind(other).to_owned(),
                    });
                }
            };
            derived.insert(path.clone(), stack.apply(start));
        }

        if let Some((path, _)) = derived.iter().find(|(_, value)| value.is_non_finite()) {
            return Err(DerivationError::NonFiniteResult { path: path.clone() });
        }

        Ok(Resolution {
            derived,
            diagnostics,
        })
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "numeric",
        Value::Text(_) => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modifiers::{BonusType, Contribution, ModifierOperation};
    use crate::state::{RecordId, RecordKind};

    fn p(raw: &str) -> AttrPath {
        AttrPath::parse(raw).unwrap()
    }

    fn contribution(
        source: u64,
        path: &str,
        operation: ModifierOperation,
        value: f64,
        bonus: &str,
    ) -> Contribution {
        Contribution {
            source_id: SourceId::Owned(RecordId(source)),
            source_kind: RecordKind::Equipment,
            target_path: p(path),
            operation,
            value,
            bonus_type: BonusType::new(bonus),
            activation: Default::default(),
        }
    }

    #[test]
    fn stacking_law_holds_per_target() {
        let base = AttributeSet::new()
            .with(p("defense.reflex"), 10)
            .with(p("defense.fort"), 10);
        let list = ContributionList::new(vec![
            contribution(1, "defense.reflex", ModifierOperation::Add, 3.0, "armor"),
            contribution(2, "defense.reflex", ModifierOperation::Add, 5.0, "armor"),
            contribution(1, "defense.fort", ModifierOperation::Add, 3.0, "armor"),
            contribution(2, "defense.fort", ModifierOperation::Add, 5.0, "dodge"),
        ]);

        let resolution = DerivedStateResolver::default().resolve(&base, &list).unwrap();
        assert_eq!(resolution.derived.number(&p("defense.reflex")), Some(15.0));
        assert_eq!(resolution.derived.number(&p("defense.fort")), Some(18.0));
        assert!(!resolution.has_warnings());
    }

    #[test]
    fn resolution_is_pure() {
        let base = AttributeSet::new().with(p("hp.max"), 20);
        let list = ContributionList::new(vec![
            contribution(1, "hp.max", ModifierOperation::Set, 30.0, "untyped"),
            contribution(2, "hp.max", ModifierOperation::Add, 4.0, "feat"),
        ]);
        let resolver = DerivedStateResolver::default();

        let first = resolver.resolve(&base, &list).unwrap();
        let second = resolver.resolve(&base, &list).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.derived.number(&p("hp.max")), Some(34.0));
    }

    #[test]
    fn untargeted_base_values_are_copied() {
        let base = AttributeSet::new()
            .with(p("speed"), 6)
            .with(p("species"), "Wookiee");
        let resolution = DerivedStateResolver::default()
            .resolve(&base, &ContributionList::default())
            .unwrap();
        assert_eq!(resolution.derived, base);
    }

    #[test]
    fn rejects_non_numeric_targets_and_non_finite_values() {
        let base = AttributeSet::new().with(p("species"), "Human");
        let resolver = DerivedStateResolver::default();

        let text = ContributionList::new(vec![contribution(
            1,
            "species",
            ModifierOperation::Add,
            1.0,
            "untyped",
        )]);
        assert!(matches!(
            resolver.resolve(&base, &text),
            Err(DerivationError::NonNumericTarget { .. })
        ));

        let infinite = ContributionList::new(vec![contribution(
            1,
            "hp",
            ModifierOperation::Add,
            f64::INFINITY,
            "untyped",
        )]);
        assert!(matches!(
            resolver.resolve(&base, &infinite),
            Err(DerivationError::NonFiniteContribution { .. })
        ));

        let overflow = ContributionList::new(vec![
            contribution(1, "hp", ModifierOperation::Add, f64::MAX, "a"),
            contribution(2, "hp", ModifierOperation::Add, f64::MAX, "b"),
        ]);
        assert!(matches!(
            resolver.resolve(&base, &overflow),
            Err(DerivationError::NonFiniteResult { .. })
        ));
    }

    #[test]
    fn warns_when_contributions_exceed_threshold() {
        let resolver = DerivedStateResolver::new(ResolverConfig::new(2));
        let list = ContributionList::new(
            (1..=3)
                .map(|i| contribution(i, "hp", ModifierOperation::Add, 1.0, "untyped"))
                .collect(),
        );
        let resolution = resolver.resolve(&AttributeSet::new(), &list).unwrap();
        assert_eq!(
            resolution.diagnostics,
            vec![Diagnostic::ContributionThreshold {
                count: 3,
                threshold: 2
            }]
        );
        assert_eq!(resolution.derived.number(&p("hp")), Some(1.0));
    }
}
