//! Rule elements and the contributions they emit once activated.

use std::collections::BTreeMap;
use std::fmt;

use crate::state::{AttrPath, RecordId, RecordKind};

use super::condition::ActivationCondition;

/// How a contribution combines with the base value of its target.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[strum(serialize_all = "snake_case")]
pub enum ModifierOperation {
    /// Stacks on top of the current value.
    Add,
    /// Replaces the base value before `add` contributions stack.
    Set,
    /// Forces the final value, ignoring everything else.
    Override,
}

/// Stacking category of an `add` contribution.
///
/// Contributions of the same type do not stack with each other (only the
/// largest applies); different types sum.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct BonusType(String);

impl BonusType {
    pub const UNTYPED: &'static str = "untyped";

    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn untyped() -> Self {
        Self(Self::UNTYPED.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BonusType {
    fn default() -> Self {
        Self::untyped()
    }
}

impl fmt::Display for BonusType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BonusType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Declarative rule carried by a modifier source.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RuleElement {
    pub target_path: AttrPath,
    pub operation: ModifierOperation,
    pub value: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub bonus_type: BonusType,
    #[cfg_attr(feature = "serde", serde(default))]
    pub when: ActivationCondition,
}

impl RuleElement {
    pub fn new(target_path: AttrPath, operation: ModifierOperation, value: f64) -> Self {
        Self {
            target_path,
            operation,
            value,
            bonus_type: BonusType::default(),
            when: ActivationCondition::Always,
        }
    }

    pub fn add(target_path: AttrPath, value: f64, bonus_type: impl Into<BonusType>) -> Self {
        Self::new(target_path, ModifierOperation::Add, value).typed(bonus_type)
    }

    pub fn set(target_path: AttrPath, value: f64) -> Self {
        Self::new(target_path, ModifierOperation::Set, value)
    }

    pub fn force(target_path: AttrPath, value: f64) -> Self {
        Self::new(target_path, ModifierOperation::Override, value)
    }

    pub fn typed(mut self, bonus_type: impl Into<BonusType>) -> Self {
        self.bonus_type = bonus_type.into();
        self
    }

    pub fn when(mut self, condition: ActivationCondition) -> Self {
        self.when = condition;
        self
    }
}

/// Identity of a modifier source.
///
/// Owned records and externally declared sources live in separate namespaces.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "scope", content = "id", rename_all = "snake_case")
)]
pub enum SourceId {
    Owned(RecordId),
    External(String),
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceId::Owned(id) => write!(f, "owned:{id}"),
            SourceId::External(id) => write!(f, "external:{id}"),
        }
    }
}

/// A single activated effect on one target path.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Contribution {
    pub source_id: SourceId,
    pub source_kind: RecordKind,
    pub target_path: AttrPath,
    pub operation: ModifierOperation,
    pub value: f64,
    pub bonus_type: BonusType,
    pub activation: ActivationCondition,
}

impl Contribution {
    pub fn from_rule(source_id: SourceId, source_kind: RecordKind, rule: &RuleElement) -> Self {
        Self {
            source_id,
            source_kind,
            target_path: rule.target_path.clone(),
            operation: rule.operation,
            value: rule.value,
            bonus_type: rule.bonus_type.clone(),
            activation: rule.when.clone(),
        }
    }
}

/// Ordered contributions for one entity, sorted by `(target_path, source_id)`.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct ContributionList(Vec<Contribution>);

impl ContributionList {
    /// Sorts the given contributions into canonical order.
    pub fn new(mut contributions: Vec<Contribution>) -> Self {
        contributions.sort_by(|a, b| {
            (&a.target_path, &a.source_id).cmp(&(&b.target_path, &b.source_id))
        });
        Self(contributions)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Contribution> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Contribution] {
        &self.0
    }

    /// Groups contributions by target path, preserving canonical order.
    pub fn by_target(&self) -> BTreeMap<&AttrPath, Vec<&Contribution>> {
        let mut grouped: BTreeMap<&AttrPath, Vec<&Contribution>> = BTreeMap::new();
        for contribution in &self.0 {
            grouped
                .entry(&contribution.target_path)
                .or_default()
                .push(contribution);
        }
        grouped
    }
}

impl<'a> IntoIterator for &'a ContributionList {
    type Item = &'a Contribution;
    type IntoIter = std::slice::Iter<'a, Contribution>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
