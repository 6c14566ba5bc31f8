//! Contribution stacking for a single target path.
//!
//! Application order is fixed:
//! Set → Typed adds → Override
//!
//! Every derived attribute goes through the same stack so results do not
//! depend on the order contributions were declared in.

use std::collections::BTreeMap;

use crate::modifiers::{BonusType, Contribution, ModifierOperation};

/// The contributions affecting one target path, bucketed by operation.
///
/// # Example
/// ```
/// # use sheet_core::resolve::ContributionStack;
/// # use sheet_core::modifiers::{BonusType, ModifierOperation};
/// let mut stack = ContributionStack::new();
/// stack.push(ModifierOperation::Add, &BonusType::new("armor"), 3.0);
/// stack.push(ModifierOperation::Add, &BonusType::new("armor"), 5.0);  // same type: max
/// stack.push(ModifierOperation::Add, &BonusType::new("dodge"), 1.0);  // new type: sums
///
/// assert_eq!(stack.apply(10.0), 16.0);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContributionStack {
    set: Option<f64>,
    adds: BTreeMap<BonusType, f64>,
    force: Option<f64>,
    len: usize,
}

impl ContributionStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, operation: ModifierOperation, bonus_type: &BonusType, value: f64) {
        self.len += 1;
        match operation {
            ModifierOperation::Set => self.set = Some(max_of(self.set, value)),
            ModifierOperation::Override => self.force = Some(max_of(self.force, value)),
            ModifierOperation::Add => {
                self.adds
                    .entry(bonus_type.clone())
                    .and_modify(|current| *current = current.max(value))
                    .or_insert(value);
            }
        }
    }

    pub fn push_contribution(&mut self, contribution: &Contribution) {
        self.push(
            contribution.operation,
            &contribution.bonus_type,
            contribution.value,
        );
    }

    /// Final value for the given base.
    ///
    /// # Formula
    /// ```text
    /// result = override.unwrap_or( set.unwrap_or(base) + Σ_type max(adds[type]) )
    /// ```
    pub fn apply(&self, base: f64) -> f64 {
        if let Some(forced) = self.force {
            return forced;
        }
        let start = self.set.unwrap_or(base);
        start + self.adds.values().sum::<f64>()
    }

    /// True when a `set` or `override` fixes the start value, so a missing
    /// base is not an error.
    pub fn replaces_base(&self) -> bool {
        self.set.is_some() || self.force.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn len(&self) -> usize {
        self.len
    }
}

fn max_of(current: Option<f64>, value: f64) -> f64 {
    current.map_or(value, |current| current.max(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn armor() -> BonusType {
        BonusType::new("armor")
    }

    #[test]
    fn same_type_takes_maximum() {
        let mut stack = ContributionStack::new();
        stack.push(ModifierOperation::Add, &armor(), 3.0);
        stack.push(ModifierOperation::Add, &armor(), 5.0);
        assert_eq!(stack.apply(0.0), 5.0);
    }

    #[test]
    fn different_types_sum() {
        let mut stack = ContributionStack::new();
        stack.push(ModifierOperation::Add, &armor(), 3.0);
        stack.push(ModifierOperation::Add, &BonusType::new("dodge"), 5.0);
        assert_eq!(stack.apply(0.0), 8.0);
    }

    #[test]
    fn set_replaces_base_before_adds() {
        let mut stack = ContributionStack::new();
        stack.push(ModifierOperation::Set, &BonusType::untyped(), 12.0);
        stack.push(ModifierOperation::Set, &BonusType::untyped(), 14.0);
        stack.push(ModifierOperation::Add, &armor(), 2.0);
        assert_eq!(stack.apply(10.0), 16.0);
        assert!(stack.replaces_base());
    }

    #[test]
    fn override_wins_over_everything() {
        let mut stack = ContributionStack::new();
        stack.push(ModifierOperation::Add, &armor(), 7.0);
        stack.push(ModifierOperation::Override, &BonusType::untyped(), 1.0);
        stack.push(ModifierOperation::Override, &BonusType::untyped(), 3.0);
        assert_eq!(stack.apply(100.0), 3.0);
        assert_eq!(stack.len(), 3);
    }
}
