//! Composition of independently built plans.

use crate::error::{ErrorSeverity, SheetError};
use crate::state::AttrPath;

use super::model::{EntityRef, MutationPlan, TempId};

/// Two plans cannot be merged without losing a write.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MergeConflict {
    #[error("both plans write '{path}' on entity {entity}")]
    SamePath { entity: EntityRef, path: AttrPath },

    #[error("both plans declare temporary id '{temp}'")]
    DuplicateTempId { temp: TempId },
}

impl SheetError for MergeConflict {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::SamePath { .. } => "MERGE_SAME_PATH",
            Self::DuplicateTempId { .. } => "MERGE_DUPLICATE_TEMP_ID",
        }
    }
}

impl MutationPlan {
    /// Merges two plans into one.
    ///
    /// Scalar writes to the same path and re-declared temporary ids conflict.
    /// Everything else concatenates; `delete` and `derive` drop duplicates.
    pub fn merge(a: MutationPlan, b: MutationPlan) -> Result<MutationPlan, MergeConflict> {
        a.merge_with(b)
    }

    pub fn merge_with(mut self, other: MutationPlan) -> Result<MutationPlan, MergeConflict> {
        for temp in other.temporary_ids.keys() {
            if self.temporary_ids.contains_key(temp) {
                return Err(MergeConflict::DuplicateTempId { temp: temp.clone() });
            }
        }
        for spec in &other.create {
            if self.create.iter().any(|own| own.temp_id == spec.temp_id) {
                return Err(MergeConflict::DuplicateTempId {
                    temp: spec.temp_id.clone(),
                });
            }
        }
        for (entity, writes) in &other.set {
            if let Some(own) = self.set.get(entity)
                && let Some(path) = writes.paths().find(|path| own.contains(path))
            {
                return Err(MergeConflict::SamePath {
                    entity: entity.clone(),
                    path: path.clone(),
                });
            }
        }

        self.temporary_ids.extend(other.temporary_ids);
        self.create.extend(other.create);
        for (entity, writes) in other.set {
            let own = self.set.entry(entity).or_default();
            for (path, value) in writes {
                own.insert(path, value);
            }
        }
        for target in other.delete {
            if !self.delete.contains(&target) {
                self.delete.push(target);
            }
        }
        self.add.extend(other.add);
        for entity in other.derive {
            if !self.derive.contains(&entity) {
                self.derive.push(entity);
            }
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::{CreateSpec, RecordSpec};
    use crate::state::{EntityId, EntityKind, RecordId, RecordKind};

    fn p(raw: &str) -> AttrPath {
        AttrPath::parse(raw).unwrap()
    }

    #[test]
    fn disjoint_plans_merge() {
        let a = MutationPlan::new()
            .with_set(EntityId(1), p("base.hp"), 10)
            .with_derive(EntityId(1))
            .with_delete_owned(EntityId(1), RecordId(4));
        let b = MutationPlan::new()
            .with_set(EntityId(1), p("base.credits"), 90)
            .with_set(EntityId(2), p("name"), "Han")
            .with_add(EntityId(1), RecordSpec::new(RecordKind::Item, "Medpac"))
            .with_derive(EntityId(1))
            .with_delete_owned(EntityId(1), RecordId(4));

        let merged = MutationPlan::merge(a, b).unwrap();
        assert_eq!(merged.set_count(), 3);
        assert_eq!(merged.derive, vec![EntityRef::Real(EntityId(1))]);
        assert_eq!(merged.delete.len(), 1);
        assert_eq!(merged.add.len(), 1);
    }

    #[test]
    fn same_scalar_path_conflicts() {
        let a = MutationPlan::new().with_set(EntityId(1), p("base.credits"), 100);
        let b = MutationPlan::new().with_set(EntityId(1), p("base.credits"), 100);
        assert_eq!(
            MutationPlan::merge(a, b),
            Err(MergeConflict::SamePath {
                entity: EntityRef::Real(EntityId(1)),
                path: p("base.credits"),
            })
        );
    }

    #[test]
    fn duplicate_temp_ids_conflict() {
        let a = MutationPlan::new().with_create(CreateSpec::new("x", EntityKind::Item, "A"));
        let b = MutationPlan::new().with_create(CreateSpec::new("x", EntityKind::Item, "B"));
        assert!(matches!(
            MutationPlan::merge(a, b),
            Err(MergeConflict::DuplicateTempId { .. })
        ));
    }
}
