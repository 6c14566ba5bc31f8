//! Entity records: the persisted shape of characters, vehicles, droids and items.

use std::fmt;

use crate::error::{ErrorSeverity, SheetError};
use crate::modifiers::RuleElement;

use super::path::{FieldTarget, RecordField};
use super::value::{AttributeSet, Value};

/// Stable identifier of a stored entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of an owned sub-record, unique within its entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum EntityKind {
    #[default]
    Character,
    Vehicle,
    Droid,
    Item,
}

/// Category of an owned sub-record. Only used for bookkeeping and as the
/// `source_kind` of the contributions the record emits.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RecordKind {
    #[default]
    Equipment,
    Ability,
    Status,
    Subsystem,
    Item,
    /// Sources declared outside the entity (see `SourceProvider`).
    External,
}

/// Independently identified sub-record owned by an entity.
///
/// Inactive records (unequipped gear, suppressed statuses) stay attached but
/// emit no contributions.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OwnedRecord {
    pub id: RecordId,
    pub kind: RecordKind,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default = "default_active"))]
    pub active: bool,
    #[cfg_attr(feature = "serde", serde(default))]
    pub data: AttributeSet,
    #[cfg_attr(feature = "serde", serde(default))]
    pub rules: Vec<RuleElement>,
}

#[cfg(feature = "serde")]
fn default_active() -> bool {
    true
}

impl OwnedRecord {
    pub fn new(id: RecordId, kind: RecordKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            active: true,
            data: AttributeSet::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: RuleElement) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_data(mut self, data: AttributeSet) -> Self {
        self.data = data;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// A persisted game object.
///
/// `derived` is written only by the resolver; everything else changes only
/// through accepted mutation plans.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub base: AttributeSet,
    /// Sorted by record id.
    #[cfg_attr(
        feature = "serde",
        serde(default, deserialize_with = "deserialize_owned")
    )]
    owned: Vec<OwnedRecord>,
    /// Last computed snapshot. Display-only on load; always recomputed.
    #[cfg_attr(feature = "serde", serde(default))]
    pub derived: AttributeSet,
    #[cfg_attr(feature = "serde", serde(default))]
    pub flags: AttributeSet,
}

/// Persisted records may be hand-edited: restore the sorted order lookups
/// rely on and refuse duplicate ids.
#[cfg(feature = "serde")]
fn deserialize_owned<'de, D>(deserializer: D) -> Result<Vec<OwnedRecord>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    let mut records = Vec::<OwnedRecord>::deserialize(deserializer)?;
    records.sort_by_key(|record| record.id);
    if let Some(pair) = records.windows(2).find(|pair| pair[0].id == pair[1].id) {
        return Err(serde::de::Error::custom(format_args!(
            "duplicate owned record id {}",
            pair[0].id
        )));
    }
    Ok(records)
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            name: name.into(),
            base: AttributeSet::new(),
            owned: Vec::new(),
            derived: AttributeSet::new(),
            flags: AttributeSet::new(),
        }
    }

    pub fn with_base(mut self, base: AttributeSet) -> Self {
        self.base = base;
        self
    }

    pub fn with_flags(mut self, flags: AttributeSet) -> Self {
        self.flags = flags;
        self
    }

    /// Attaches records, replacing any with the same id.
    pub fn with_owned(mut self, records: impl IntoIterator<Item = OwnedRecord>) -> Self {
        for record in records {
            self.upsert_record(record);
        }
        self
    }

    pub fn owned(&self) -> &[OwnedRecord] {
        &self.owned
    }

    pub fn record(&self, id: RecordId) -> Option<&OwnedRecord> {
        self.owned
            .binary_search_by_key(&id, |r| r.id)
            .ok()
            .map(|index| &self.owned[index])
    }

    /// Next free record id (one past the highest in use).
    pub fn next_record_id(&self) -> RecordId {
        RecordId(self.owned.last().map_or(1, |r| r.id.0 + 1))
    }

    /// Attaches a new record. Fails if the id is already in use.
    pub fn insert_record(&mut self, record: OwnedRecord) -> Result<(), StateError> {
        match self.owned.binary_search_by_key(&record.id, |r| r.id) {
            Ok(_) => Err(StateError::RecordExists {
                entity: self.id,
                record: record.id,
            }),
            Err(index) => {
                self.owned.insert(index, record);
                Ok(())
            }
        }
    }

    /// Inserts or replaces a record, returning the replaced one.
    pub fn upsert_record(&mut self, record: OwnedRecord) -> Option<OwnedRecord> {
        match self.owned.binary_search_by_key(&record.id, |r| r.id) {
            Ok(index) => Some(std::mem::replace(&mut self.owned[index], record)),
            Err(index) => {
                self.owned.insert(index, record);
                None
            }
        }
    }

    pub fn remove_record(&mut self, id: RecordId) -> Result<OwnedRecord, StateError> {
        let index = self
            .owned
            .binary_search_by_key(&id, |r| r.id)
            .map_err(|_| StateError::RecordNotFound {
                entity: self.id,
                record: id,
            })?;
        Ok(self.owned.remove(index))
    }

    /// Writes a single classified field, returning the previous value.
    ///
    /// Type checks are minimal: `name` and record `name` take text, record
    /// `active` takes a bool. Everything else accepts any non-null value.
    pub fn write_field(
        &mut self,
        target: &FieldTarget,
        value: Value,
    ) -> Result<Option<Value>, StateError> {
        if value.is_null() {
            return Err(StateError::NullValue { entity: self.id });
        }
        let entity = self.id;
        match target {
            FieldTarget::Name => {
                let name = into_text(value, entity, "name")?;
                Ok(Some(Value::Text(std::mem::replace(&mut self.name, name))))
            }
            FieldTarget::Base(path) => Ok(self.base.insert(path.clone(), value)),
            FieldTarget::Flags(path) => Ok(self.flags.insert(path.clone(), value)),
            FieldTarget::Owned { record, field } => {
                let index = self
                    .owned
                    .binary_search_by_key(record, |r| r.id)
                    .map_err(|_| StateError::RecordNotFound {
                        entity,
                        record: *record,
                    })?;
                let owned = &mut self.owned[index];
                match field {
                    RecordField::Active => {
                        let active =
                            value.as_bool().ok_or_else(|| StateError::TypeMismatch {
                                entity,
                                field: "active".into(),
                            })?;
                        Ok(Some(Value::Bool(std::mem::replace(
                            &mut owned.active,
                            active,
                        ))))
                    }
                    RecordField::Name => {
                        let name = into_text(value, entity, "record name")?;
                        Ok(Some(Value::Text(std::mem::replace(&mut owned.name, name))))
                    }
                    RecordField::Data(path) => Ok(owned.data.insert(path.clone(), value)),
                }
            }
        }
    }
}

fn into_text(value: Value, entity: EntityId, field: &'static str) -> Result<String, StateError> {
    match value {
        Value::Text(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(StateError::TypeMismatch {
            entity,
            field: field.to_owned(),
        }),
    }
}

/// Errors raised when applying a write to an in-memory entity record.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StateError {
    #[error("entity {entity} has no owned record {record}")]
    RecordNotFound { entity: EntityId, record: RecordId },

    #[error("entity {entity} already owns a record with id {record}")]
    RecordExists { entity: EntityId, record: RecordId },

    #[error("entity {entity}: field '{field}' received a value of the wrong type")]
    TypeMismatch { entity: EntityId, field: String },

    #[error("entity {entity}: null is not a writable value")]
    NullValue { entity: EntityId },
}

impl SheetError for StateError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        use StateError::*;
        match self {
            RecordNotFound { .. } => "STATE_RECORD_NOT_FOUND",
            RecordExists { .. } => "STATE_RECORD_EXISTS",
            TypeMismatch { .. } => "STATE_TYPE_MISMATCH",
            NullValue { .. } => "STATE_NULL_VALUE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AttrPath;

    fn p(raw: &str) -> AttrPath {
        AttrPath::parse(raw).unwrap()
    }

    #[test]
    fn records_stay_sorted_and_ids_advance() {
        let mut entity = Entity::new(EntityId(1), EntityKind::Character, "Kira");
        entity
            .insert_record(OwnedRecord::new(RecordId(5), RecordKind::Equipment, "Vest"))
            .unwrap();
        entity
            .insert_record(OwnedRecord::new(RecordId(2), RecordKind::Ability, "Dodge"))
            .unwrap();

        let ids: Vec<_> = entity.owned().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![RecordId(2), RecordId(5)]);
        assert_eq!(entity.next_record_id(), RecordId(6));

        let dup = entity.insert_record(OwnedRecord::new(RecordId(2), RecordKind::Item, "x"));
        assert!(matches!(dup, Err(StateError::RecordExists { .. })));
    }

    #[test]
    fn write_field_reaches_owned_records() {
        let mut entity = Entity::new(EntityId(1), EntityKind::Droid, "R2")
            .with_owned([OwnedRecord::new(RecordId(1), RecordKind::Subsystem, "Arm")]);

        let target = FieldTarget::classify(&p("owned.1.active")).unwrap();
        let previous = entity.write_field(&target, Value::Bool(false)).unwrap();
        assert_eq!(previous, Some(Value::Bool(true)));
        assert!(!entity.record(RecordId(1)).unwrap().active);

        let missing = FieldTarget::classify(&p("owned.9.name")).unwrap();
        assert!(matches!(
            entity.write_field(&missing, Value::from("Leg")),
            Err(StateError::RecordNotFound { .. })
        ));
    }

    #[test]
    fn write_field_rejects_null_and_bad_names() {
        let mut entity = Entity::new(EntityId(3), EntityKind::Vehicle, "Speeder");
        let hp = FieldTarget::classify(&p("base.hp")).unwrap();
        assert!(matches!(
            entity.write_field(&hp, Value::Null),
            Err(StateError::NullValue { .. })
        ));
        assert!(matches!(
            entity.write_field(&FieldTarget::Name, Value::from("  ")),
            Err(StateError::TypeMismatch { .. })
        ));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn loaded_records_are_sorted_and_unique() {
        let entity = Entity::new(EntityId(4), EntityKind::Droid, "Mule").with_owned([
            OwnedRecord::new(RecordId(1), RecordKind::Subsystem, "Arm"),
            OwnedRecord::new(RecordId(4), RecordKind::Subsystem, "Leg"),
        ]);
        let mut raw = serde_json::to_value(&entity).unwrap();
        raw["owned"].as_array_mut().unwrap().reverse();

        let loaded: Entity = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(loaded, entity);
        assert_eq!(loaded.record(RecordId(1)).unwrap().name, "Arm");
        assert_eq!(loaded.next_record_id(), RecordId(5));

        let copy = raw["owned"][0].clone();
        raw["owned"].as_array_mut().unwrap().push(copy);
        let error = serde_json::from_value::<Entity>(raw).unwrap_err();
        assert!(error.to_string().contains("duplicate owned record id"));
    }
}
