//! Plan validation.
//!
//! Validation is pure and runs before any lock is taken or any record is
//! read. A plan that passes is turned into a [`ValidatedPlan`] whose SET
//! writes are already classified, so the application phases never re-parse
//! paths.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::error::{ErrorSeverity, SheetError};
use crate::state::{AttrPath, EntityId, EntityKind, FieldTarget, PathError, RecordId, Value};

use super::model::{
    AddOp, CreateSpec, DeleteTarget, EntityRef, MutationPhase, MutationPlan, TempId,
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PlanError {
    #[error("create spec has an empty temporary id")]
    EmptyTempId,

    #[error("create spec '{temp}' has an empty name")]
    EmptyName { temp: TempId },

    #[error("owned record on entity {entity} has an empty name")]
    EmptyRecordName { entity: EntityRef },

    #[error("temporary id '{temp}' is created more than once")]
    DuplicateTempId { temp: TempId },

    #[error("temporary id '{temp}' is referenced but never declared")]
    UndeclaredTempId { temp: TempId },

    #[error("temporary id '{temp}' is declared but no create spec produces it")]
    MissingCreate { temp: TempId },

    #[error("temporary id '{temp}' is declared as {declared} but created as {created}")]
    TempKindMismatch {
        temp: TempId,
        declared: EntityKind,
        created: EntityKind,
    },

    #[error("set on entity {entity}: {error}")]
    InvalidPath { entity: EntityRef, error: PathError },

    #[error("set on entity {entity} writes null to '{path}'")]
    NullValue { entity: EntityRef, path: AttrPath },

    #[error("{second} conflicts with {first} on entity {entity} ({target})")]
    WriteConflict {
        entity: EntityRef,
        target: String,
        first: MutationPhase,
        second: MutationPhase,
    },
}

impl SheetError for PlanError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        use PlanError::*;
        match self {
            EmptyTempId => "PLAN_EMPTY_TEMP_ID",
            EmptyName { .. } => "PLAN_EMPTY_NAME",
            EmptyRecordName { .. } => "PLAN_EMPTY_RECORD_NAME",
            DuplicateTempId { .. } => "PLAN_DUPLICATE_TEMP_ID",
            UndeclaredTempId { .. } => "PLAN_UNDECLARED_TEMP_ID",
            MissingCreate { .. } => "PLAN_MISSING_CREATE",
            TempKindMismatch { .. } => "PLAN_TEMP_KIND_MISMATCH",
            InvalidPath { .. } => "PLAN_INVALID_PATH",
            NullValue { .. } => "PLAN_NULL_VALUE",
            WriteConflict { .. } => "PLAN_WRITE_CONFLICT",
        }
    }
}

/// One classified scalar write.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldWrite {
    pub path: AttrPath,
    pub target: FieldTarget,
    pub value: Value,
}

/// A plan that passed validation, ready for phase application.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedPlan {
    pub create: Vec<CreateSpec>,
    pub delete: Vec<DeleteTarget>,
    pub set: BTreeMap<EntityRef, Vec<FieldWrite>>,
    pub add: Vec<AddOp>,
    pub derive: Vec<EntityRef>,
}

impl ValidatedPlan {
    /// Stored entities the plan reads or writes, in ascending id order.
    pub fn real_entities(&self) -> BTreeSet<EntityId> {
        self.delete
            .iter()
            .map(DeleteTarget::entity)
            .chain(self.set.keys())
            .chain(self.add.iter().map(|op| &op.entity))
            .chain(self.derive.iter())
            .filter_map(EntityRef::as_real)
            .collect()
    }

    pub fn deleted_entities(&self) -> impl Iterator<Item = &EntityRef> {
        self.delete.iter().filter_map(|target| match target {
            DeleteTarget::Entity { entity } => Some(entity),
            DeleteTarget::Owned { .. } => None,
        })
    }
}

impl MutationPlan {
    /// Checks every structural rule without touching storage.
    pub fn validate(&self) -> Result<ValidatedPlan, PlanError> {
        self.check_temporaries()?;
        let set = self.classify_writes()?;
        self.check_phase_conflicts(&set)?;

        for op in &self.add {
            if op.record.name.trim().is_empty() {
                return Err(PlanError::EmptyRecordName {
                    entity: op.entity.clone(),
                });
            }
        }

        Ok(ValidatedPlan {
            create: self.create.clone(),
            delete: self.delete.clone(),
            set,
            add: self.add.clone(),
            derive: self.derive.clone(),
        })
    }

    fn check_temporaries(&self) -> Result<(), PlanError> {
        let mut created: HashSet<&TempId> = HashSet::new();
        for spec in &self.create {
            if spec.temp_id.is_blank() {
                return Err(PlanError::EmptyTempId);
            }
            if spec.name.trim().is_empty() {
                return Err(PlanError::EmptyName {
                    temp: spec.temp_id.clone(),
                });
            }
            if spec.owned.iter().any(|r| r.name.trim().is_empty()) {
                return Err(PlanError::EmptyRecordName {
                    entity: EntityRef::Temp(spec.temp_id.clone()),
                });
            }
            if !created.insert(&spec.temp_id) {
                return Err(PlanError::DuplicateTempId {
                    temp: spec.temp_id.clone(),
                });
            }
            match self.temporary_ids.get(&spec.temp_id) {
                None => {
                    return Err(PlanError::UndeclaredTempId {
                        temp: spec.temp_id.clone(),
                    });
                }
                Some(declared) if *declared != spec.kind => {
                    return Err(PlanError::TempKindMismatch {
                        temp: spec.temp_id.clone(),
                        declared: *declared,
                        created: spec.kind,
                    });
                }
                Some(_) => {}
            }
        }

        if let Some(temp) = self.temporary_ids.keys().find(|temp| !created.contains(temp)) {
            return Err(PlanError::MissingCreate { temp: temp.clone() });
        }

        for reference in self.references() {
            if let EntityRef::Temp(temp) = reference
                && !self.temporary_ids.contains_key(temp)
            {
                return Err(PlanError::UndeclaredTempId { temp: temp.clone() });
            }
        }
        Ok(())
    }

    fn classify_writes(&self) -> Result<BTreeMap<EntityRef, Vec<FieldWrite>>, PlanError> {
        let mut classified = BTreeMap::new();
        for (entity, writes) in &self.set {
            let mut fields = Vec::with_capacity(writes.len());
            for (path, value) in writes.iter() {
                let target = FieldTarget::classify(path).map_err(|error| PlanError::InvalidPath {
                    entity: entity.clone(),
                    error,
                })?;
                if value.is_null() {
                    return Err(PlanError::NullValue {
                        entity: entity.clone(),
                        path: path.clone(),
                    });
                }
                fields.push(FieldWrite {
                    path: path.clone(),
                    target,
                    value: value.clone(),
                });
            }
            if !fields.is_empty() {
                classified.insert(entity.clone(), fields);
            }
        }
        Ok(classified)
    }

    fn check_phase_conflicts(
        &self,
        set: &BTreeMap<EntityRef, Vec<FieldWrite>>,
    ) -> Result<(), PlanError> {
        let conflict = |entity: &EntityRef, target: String, first, second| {
            Err(PlanError::WriteConflict {
                entity: entity.clone(),
                target,
                first,
                second,
            })
        };

        let mut deleted_entities: HashSet<&EntityRef> = HashSet::new();
        let mut deleted_records: HashSet<(&EntityRef, RecordId)> = HashSet::new();
        for target in &self.delete {
            match target {
                DeleteTarget::Entity { entity } => {
                    if let EntityRef::Temp(_) = entity {
                        return conflict(
                            entity,
                            "entity".into(),
                            MutationPhase::Create,
                            MutationPhase::Delete,
                        );
                    }
                    deleted_entities.insert(entity);
                }
                DeleteTarget::Owned { entity, record } => {
                    deleted_records.insert((entity, *record));
                }
            }
        }

        for (entity, writes) in set {
            if deleted_entities.contains(entity) {
                return conflict(
                    entity,
                    "entity".into(),
                    MutationPhase::Delete,
                    MutationPhase::Set,
                );
            }
            for write in writes {
                if let Some(record) = write.target.record()
                    && deleted_records.contains(&(entity, record))
                {
                    return conflict(
                        entity,
                        write.path.to_string(),
                        MutationPhase::Delete,
                        MutationPhase::Set,
                    );
                }
            }
        }

        // Explicit record ids are claimed by CREATE first, then by ADD.
        let mut claimed: HashMap<(EntityRef, RecordId), MutationPhase> = HashMap::new();
        for spec in &self.create {
            let entity = EntityRef::Temp(spec.temp_id.clone());
            for record in spec.owned.iter().filter_map(|record| record.id) {
                if claimed
                    .insert((entity.clone(), record), MutationPhase::Create)
                    .is_some()
                {
                    return conflict(
                        &entity,
                        format!("owned.{record}"),
                        MutationPhase::Create,
                        MutationPhase::Create,
                    );
                }
            }
        }

        for op in &self.add {
            if deleted_entities.contains(&op.entity) {
                return conflict(
                    &op.entity,
                    "entity".into(),
                    MutationPhase::Delete,
                    MutationPhase::Add,
                );
            }
            let Some(record) = op.record.id else {
                continue;
            };
            if deleted_records.contains(&(&op.entity, record)) {
                return conflict(
                    &op.entity,
                    format!("owned.{record}"),
                    MutationPhase::Delete,
                    MutationPhase::Add,
                );
            }
            if let Some(first) = claimed.insert((op.entity.clone(), record), MutationPhase::Add) {
                return conflict(
                    &op.entity,
                    format!("owned.{record}"),
                    first,
                    MutationPhase::Add,
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RecordSpec;
    use crate::state::RecordKind;

    fn p(raw: &str) -> AttrPath {
        AttrPath::parse(raw).unwrap()
    }

    #[test]
    fn accepts_well_formed_plan() {
        let plan = MutationPlan::new()
            .with_create(CreateSpec::new("r2", EntityKind::Droid, "R2-D2"))
            .with_set(EntityRef::temp("r2"), p("base.hp"), 12)
            .with_set(EntityId(3), p("owned.1.active"), false)
            .with_add(EntityId(3), RecordSpec::new(RecordKind::Item, "Medpac"))
            .with_derive(EntityId(5));

        let validated = plan.validate().unwrap();
        assert_eq!(
            validated.real_entities().into_iter().collect::<Vec<_>>(),
            vec![EntityId(3), EntityId(5)]
        );
        assert_eq!(validated.set[&EntityRef::Real(EntityId(3))][0].target.record(), Some(RecordId(1)));
    }

    #[test]
    fn rejects_derived_and_null_writes() {
        let derived = MutationPlan::new().with_set(EntityId(1), p("derived.hp"), 3);
        assert!(matches!(
            derived.validate(),
            Err(PlanError::InvalidPath {
                error: PathError::DerivedReadOnly { .. },
                ..
            })
        ));

        let null = MutationPlan::new().with_set(EntityId(1), p("base.hp"), Value::Null);
        assert!(matches!(null.validate(), Err(PlanError::NullValue { .. })));
    }

    #[test]
    fn rejects_bad_temporaries() {
        let undeclared = MutationPlan::new().with_set(EntityRef::temp("ghost"), p("name"), "Boo");
        assert!(matches!(
            undeclared.validate(),
            Err(PlanError::UndeclaredTempId { .. })
        ));

        let mut duplicate =
            MutationPlan::new().with_create(CreateSpec::new("a", EntityKind::Item, "One"));
        duplicate
            .create
            .push(CreateSpec::new("a", EntityKind::Item, "Two"));
        assert!(matches!(
            duplicate.validate(),
            Err(PlanError::DuplicateTempId { .. })
        ));

        let unnamed = MutationPlan::new().with_create(CreateSpec::new("b", EntityKind::Item, " "));
        assert!(matches!(unnamed.validate(), Err(PlanError::EmptyName { .. })));

        let blank = MutationPlan::new().with_create(CreateSpec::new("", EntityKind::Item, "x"));
        assert_eq!(blank.validate(), Err(PlanError::EmptyTempId));

        let mut orphan = MutationPlan::new();
        orphan
            .temporary_ids
            .insert(TempId::new("lonely"), EntityKind::Vehicle);
        assert!(matches!(
            orphan.validate(),
            Err(PlanError::MissingCreate { .. })
        ));
    }

    #[test]
    fn rejects_cross_phase_conflicts() {
        let set_after_delete = MutationPlan::new()
            .with_delete_entity(EntityId(1))
            .with_set(EntityId(1), p("base.hp"), 3);
        assert!(matches!(
            set_after_delete.validate(),
            Err(PlanError::WriteConflict {
                first: MutationPhase::Delete,
                second: MutationPhase::Set,
                ..
            })
        ));

        let set_on_deleted_record = MutationPlan::new()
            .with_delete_owned(EntityId(1), RecordId(2))
            .with_set(EntityId(1), p("owned.2.name"), "Gone");
        assert!(set_on_deleted_record.validate().is_err());

        let add_deleted_record = MutationPlan::new()
            .with_delete_owned(EntityId(1), RecordId(2))
            .with_add(
                EntityId(1),
                RecordSpec::new(RecordKind::Item, "Again").with_id(RecordId(2)),
            );
        assert!(add_deleted_record.validate().is_err());

        let duplicate_add = MutationPlan::new()
            .with_add(
                EntityId(1),
                RecordSpec::new(RecordKind::Item, "A").with_id(RecordId(9)),
            )
            .with_add(
                EntityId(1),
                RecordSpec::new(RecordKind::Item, "B").with_id(RecordId(9)),
            );
        assert!(matches!(
            duplicate_add.validate(),
            Err(PlanError::WriteConflict {
                first: MutationPhase::Add,
                second: MutationPhase::Add,
                ..
            })
        ));
    }

    #[test]
    fn rejects_duplicate_record_ids_on_created_entities() {
        let twice_in_create = MutationPlan::new().with_create(
            CreateSpec::new("mule", EntityKind::Droid, "Mule")
                .with_record(RecordSpec::new(RecordKind::Subsystem, "Arm").with_id(RecordId(1)))
                .with_record(RecordSpec::new(RecordKind::Subsystem, "Leg").with_id(RecordId(1))),
        );
        assert!(matches!(
            twice_in_create.validate(),
            Err(PlanError::WriteConflict {
                first: MutationPhase::Create,
                second: MutationPhase::Create,
                ..
            })
        ));

        let create_then_add = MutationPlan::new()
            .with_create(
                CreateSpec::new("mule", EntityKind::Droid, "Mule")
                    .with_record(RecordSpec::new(RecordKind::Subsystem, "Arm").with_id(RecordId(3))),
            )
            .with_add(
                EntityRef::temp("mule"),
                RecordSpec::new(RecordKind::Subsystem, "Spare").with_id(RecordId(3)),
            );
        assert!(matches!(
            create_then_add.validate(),
            Err(PlanError::WriteConflict {
                first: MutationPhase::Create,
                second: MutationPhase::Add,
                ..
            })
        ));

        // Records without explicit ids never collide.
        let implicit = MutationPlan::new()
            .with_create(
                CreateSpec::new("mule", EntityKind::Droid, "Mule")
                    .with_record(RecordSpec::new(RecordKind::Subsystem, "Arm"))
                    .with_record(RecordSpec::new(RecordKind::Subsystem, "Arm")),
            )
            .with_add(
                EntityRef::temp("mule"),
                RecordSpec::new(RecordKind::Subsystem, "Spare"),
            );
        assert!(implicit.validate().is_ok());
    }
}
