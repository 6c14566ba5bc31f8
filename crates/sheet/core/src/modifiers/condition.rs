//! Activation conditions and their interpreter.
//!
//! Conditions are structured data, never rule text. They read the entity's
//! current `base` attributes only, so evaluation is deterministic.

use crate::state::{AttrPath, Entity};

/// Maximum nesting accepted by the interpreter; deeper conditions are inactive.
pub const MAX_CONDITION_DEPTH: usize = 32;

/// When a rule element is active.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "type", rename_all = "snake_case")
)]
pub enum ActivationCondition {
    #[default]
    Always,
    /// `base.skills.<skill>.trained` is `true`.
    SkillTrained { skill: String },
    /// `base.level` is at least `level`.
    LevelAtLeast { level: u32 },
    /// Every branch holds (vacuously true when empty).
    All { conditions: Vec<ActivationCondition> },
    /// At least one branch holds (false when empty).
    Any { conditions: Vec<ActivationCondition> },
    Not { condition: Box<ActivationCondition> },
}

impl ActivationCondition {
    pub fn skill_trained(skill: impl Into<String>) -> Self {
        Self::SkillTrained {
            skill: skill.into(),
        }
    }

    pub fn level_at_least(level: u32) -> Self {
        Self::LevelAtLeast { level }
    }

    pub fn all(conditions: impl IntoIterator<Item = ActivationCondition>) -> Self {
        Self::All {
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn any(conditions: impl IntoIterator<Item = ActivationCondition>) -> Self {
        Self::Any {
            conditions: conditions.into_iter().collect(),
        }
    }

    pub fn negate(condition: ActivationCondition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// Evaluates the condition against the entity's current state.
    ///
    /// A condition nested deeper than [`MAX_CONDITION_DEPTH`] is inactive as a
    /// whole, whatever negations surround the overflowing branch.
    pub fn evaluate(&self, entity: &Entity) -> bool {
        self.evaluate_at(entity, 0).unwrap_or(false)
    }

    /// `None` once the depth limit is crossed anywhere below this node.
    fn evaluate_at(&self, entity: &Entity, depth: usize) -> Option<bool> {
        if depth > MAX_CONDITION_DEPTH {
            return None;
        }
        let holds = match self {
            Self::Always => true,
            Self::SkillTrained { skill } => skill_trained(entity, skill),
            Self::LevelAtLeast { level } => entity
                .base
                .number(&AttrPath::from_static("level"))
                .is_some_and(|current| current >= f64::from(*level)),
            Self::All { conditions } => {
                let mut holds = true;
                for condition in conditions {
                    holds &= condition.evaluate_at(entity, depth + 1)?;
                }
                holds
            }
            Self::Any { conditions } => {
                let mut holds = false;
                for condition in conditions {
                    holds |= condition.evaluate_at(entity, depth + 1)?;
                }
                holds
            }
            Self::Not { condition } => !condition.evaluate_at(entity, depth + 1)?,
        };
        Some(holds)
    }
}

fn skill_trained(entity: &Entity, skill: &str) -> bool {
    AttrPath::parse(&format!("skills.{skill}.trained"))
        .ok()
        .and_then(|path| entity.base.get(&path).and_then(|value| value.as_bool()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AttributeSet, EntityId, EntityKind};

    fn trooper(level: i32, trained: &[&str]) -> Entity {
        let mut base = AttributeSet::new().with(AttrPath::parse("level").unwrap(), level);
        for skill in trained {
            base.insert(
                AttrPath::parse(&format!("skills.{skill}.trained")).unwrap(),
                true,
            );
        }
        Entity::new(EntityId(1), EntityKind::Character, "Trooper").with_base(base)
    }

    #[test]
    fn leaf_conditions_read_base_attributes() {
        let entity = trooper(4, &["pilot"]);

        assert!(ActivationCondition::Always.evaluate(&entity));
        assert!(ActivationCondition::skill_trained("pilot").evaluate(&entity));
        assert!(!ActivationCondition::skill_trained("stealth").evaluate(&entity));
        assert!(ActivationCondition::level_at_least(4).evaluate(&entity));
        assert!(!ActivationCondition::level_at_least(5).evaluate(&entity));
    }

    #[test]
    fn composition_follows_boolean_logic() {
        let entity = trooper(6, &["mechanics"]);

        let both = ActivationCondition::all([
            ActivationCondition::skill_trained("mechanics"),
            ActivationCondition::level_at_least(6),
        ]);
        assert!(both.evaluate(&entity));

        let either = ActivationCondition::any([
            ActivationCondition::skill_trained("pilot"),
            ActivationCondition::level_at_least(10),
        ]);
        assert!(!either.evaluate(&entity));

        assert!(ActivationCondition::all([]).evaluate(&entity));
        assert!(!ActivationCondition::any([]).evaluate(&entity));
        assert!(ActivationCondition::negate(either).evaluate(&entity));
    }

    #[test]
    fn missing_level_never_satisfies_threshold() {
        let entity = Entity::new(EntityId(2), EntityKind::Droid, "Unit");
        assert!(!ActivationCondition::level_at_least(0).evaluate(&entity));
    }

    #[test]
    fn runaway_nesting_evaluates_false() {
        let entity = trooper(1, &[]);
        let mut condition = ActivationCondition::Always;
        for _ in 0..(MAX_CONDITION_DEPTH + 2) {
            condition = ActivationCondition::all([condition]);
        }
        assert!(!condition.evaluate(&entity));
    }

    #[test]
    fn negation_cannot_activate_runaway_nesting() {
        let entity = trooper(1, &[]);
        let mut always = ActivationCondition::Always;
        let mut empty_any = ActivationCondition::any([]);
        for _ in 0..(MAX_CONDITION_DEPTH + 8) {
            always = ActivationCondition::all([always]);
            empty_any = ActivationCondition::all([empty_any]);
        }

        assert!(!ActivationCondition::negate(always.clone()).evaluate(&entity));
        assert!(!ActivationCondition::negate(empty_any).evaluate(&entity));

        // An overflowing branch also disables its siblings.
        let mixed = ActivationCondition::any([
            ActivationCondition::Always,
            ActivationCondition::negate(always),
        ]);
        assert!(!mixed.evaluate(&entity));
    }
}
