//! Change summaries between two versions of an entity.
//!
//! Deltas carry paths and ids, never values: consumers that need values read
//! the before/after records they already hold.

use std::collections::HashMap;

use super::entity::{Entity, EntityId, OwnedRecord, RecordId};
use super::path::AttrPath;

/// Owned-record additions, removals and in-place modifications.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CollectionChanges {
    pub added: Vec<RecordId>,
    pub removed: Vec<RecordId>,
    pub modified: Vec<RecordId>,
}

impl CollectionChanges {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.modified.len()
    }
}

/// What changed on one entity.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EntityDelta {
    pub entity: EntityId,
    pub renamed: bool,
    pub base: Vec<AttrPath>,
    pub flags: Vec<AttrPath>,
    pub owned: CollectionChanges,
    pub derived: Vec<AttrPath>,
}

impl EntityDelta {
    /// Field-by-field comparison of two versions of the same entity.
    ///
    /// Complexity is linear in the number of attributes and records.
    pub fn from_states(before: &Entity, after: &Entity) -> Self {
        Self {
            entity: after.id,
            renamed: before.name != after.name,
            base: before.base.changed_paths(&after.base),
            flags: before.flags.changed_paths(&after.flags),
            owned: diff_records(before.owned(), after.owned()),
            derived: before.derived.changed_paths(&after.derived),
        }
    }

    /// Number of individual changes recorded.
    pub fn change_count(&self) -> usize {
        usize::from(self.renamed)
            + self.base.len()
            + self.flags.len()
            + self.owned.len()
            + self.derived.len()
    }

    pub fn is_empty(&self) -> bool {
        self.change_count() == 0
    }
}

fn diff_records(before: &[OwnedRecord], after: &[OwnedRecord]) -> CollectionChanges {
    let mut before_map: HashMap<RecordId, &OwnedRecord> =
        before.iter().map(|record| (record.id, record)).collect();
    let mut changes = CollectionChanges::default();

    for record in after {
        match before_map.remove(&record.id) {
            Some(previous) if previous != record => changes.modified.push(record.id),
            Some(_) => {}
            None => changes.added.push(record.id),
        }
    }

    changes.removed.extend(before_map.into_keys());
    changes.removed.sort();
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EntityKind, RecordKind, Value};

    #[test]
    fn summarizes_field_and_record_changes() {
        let hp = AttrPath::parse("hp").unwrap();
        let before = Entity::new(EntityId(1), EntityKind::Character, "Kira")
            .with_base(crate::state::AttributeSet::new().with(hp.clone(), 10))
            .with_owned([
                OwnedRecord::new(RecordId(1), RecordKind::Equipment, "Vest"),
                OwnedRecord::new(RecordId(2), RecordKind::Item, "Medpac"),
            ]);

        let mut after = before.clone();
        after.base.insert(hp.clone(), Value::Number(12.0));
        after.remove_record(RecordId(2)).unwrap();
        after
            .insert_record(OwnedRecord::new(RecordId(3), RecordKind::Ability, "Dodge"))
            .unwrap();

        let delta = EntityDelta::from_states(&before, &after);
        assert_eq!(delta.base, vec![hp]);
        assert_eq!(delta.owned.added, vec![RecordId(3)]);
        assert_eq!(delta.owned.removed, vec![RecordId(2)]);
        assert!(delta.owned.modified.is_empty());
        assert!(!delta.renamed);
        assert_eq!(delta.change_count(), 3);
    }

    #[test]
    fn identical_states_produce_empty_delta() {
        let entity = Entity::new(EntityId(4), EntityKind::Item, "Blaster");
        assert!(EntityDelta::from_states(&entity, &entity).is_empty());
    }
}
