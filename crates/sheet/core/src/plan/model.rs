//! Mutation plan data model.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::modifiers::RuleElement;
use crate::state::{
    AttrPath, AttributeSet, EntityId, EntityKind, OwnedRecord, RecordId, RecordKind, Value,
};

/// Stages of plan application, in execution order.
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
    strum::EnumIter,
)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "snake_case")
)]
#[strum(serialize_all = "snake_case")]
pub enum MutationPhase {
    Validate,
    Create,
    Delete,
    Set,
    Add,
    Derive,
}

impl MutationPhase {
    /// True for phases whose failure unwinds the plan.
    pub fn rolls_back(&self) -> bool {
        matches!(
            self,
            MutationPhase::Create | MutationPhase::Delete | MutationPhase::Set | MutationPhase::Add
        )
    }
}

/// Placeholder for an entity that a plan creates.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct TempId(String);

impl TempId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to an entity from inside a plan.
///
/// Textual form is the numeric id for stored entities and `$name` for
/// temporaries, which lets plans key JSON maps by entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub enum EntityRef {
    Real(EntityId),
    Temp(TempId),
}

impl EntityRef {
    pub fn temp(raw: impl Into<String>) -> Self {
        EntityRef::Temp(TempId::new(raw))
    }

    pub fn as_real(&self) -> Option<EntityId> {
        match self {
            EntityRef::Real(id) => Some(*id),
            EntityRef::Temp(_) => None,
        }
    }

    pub fn as_temp(&self) -> Option<&TempId> {
        match self {
            EntityRef::Real(_) => None,
            EntityRef::Temp(temp) => Some(temp),
        }
    }
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        EntityRef::Real(id)
    }
}

impl From<TempId> for EntityRef {
    fn from(temp: TempId) -> Self {
        EntityRef::Temp(temp)
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::Real(id) => write!(f, "{}", id.0),
            EntityRef::Temp(temp) => write!(f, "${temp}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is neither a numeric entity id nor a $temporary reference")]
pub struct EntityRefParseError(String);

impl FromStr for EntityRef {
    type Err = EntityRefParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(temp) = s.strip_prefix('$') {
            return Ok(EntityRef::temp(temp));
        }
        s.parse::<u64>()
            .map(|id| EntityRef::Real(EntityId(id)))
            .map_err(|_| EntityRefParseError(s.to_owned()))
    }
}

impl TryFrom<String> for EntityRef {
    type Error = EntityRefParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<EntityRef> for String {
    fn from(value: EntityRef) -> Self {
        value.to_string()
    }
}

/// Owned sub-record to attach, either at creation or through ADD.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RecordSpec {
    /// Explicit id; allocated from the entity when absent.
    #[cfg_attr(feature = "serde", serde(default))]
    pub id: Option<RecordId>,
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

impl RecordSpec {
    pub fn new(kind: RecordKind, name: impl Into<String>) -> Self {
        Self {
            id: None,
            kind,
            name: name.into(),
            active: true,
            data: AttributeSet::new(),
            rules: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_data(mut self, data: AttributeSet) -> Self {
        self.data = data;
        self
    }

    pub fn with_rule(mut self, rule: RuleElement) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Materializes the record under the given id.
    pub fn into_record(self, id: RecordId) -> OwnedRecord {
        OwnedRecord {
            id,
            kind: self.kind,
            name: self.name,
            active: self.active,
            data: self.data,
            rules: self.rules,
        }
    }
}

/// Entity to create in the CREATE phase.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CreateSpec {
    pub temp_id: TempId,
    pub kind: EntityKind,
    pub name: String,
    #[cfg_attr(feature = "serde", serde(default))]
    pub base: AttributeSet,
    #[cfg_attr(feature = "serde", serde(default))]
    pub owned: Vec<RecordSpec>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub flags: AttributeSet,
}

impl CreateSpec {
    pub fn new(temp_id: impl Into<String>, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            temp_id: TempId::new(temp_id),
            kind,
            name: name.into(),
            base: AttributeSet::new(),
            owned: Vec::new(),
            flags: AttributeSet::new(),
        }
    }

    pub fn with_base(mut self, base: AttributeSet) -> Self {
        self.base = base;
        self
    }

    pub fn with_record(mut self, record: RecordSpec) -> Self {
        self.owned.push(record);
        self
    }

    pub fn with_flags(mut self, flags: AttributeSet) -> Self {
        self.flags = flags;
        self
    }
}

/// What a DELETE entry removes.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(tag = "target", rename_all = "snake_case")
)]
pub enum DeleteTarget {
    Entity { entity: EntityRef },
    Owned { entity: EntityRef, record: RecordId },
}

impl DeleteTarget {
    pub fn entity(&self) -> &EntityRef {
        match self {
            DeleteTarget::Entity { entity } | DeleteTarget::Owned { entity, .. } => entity,
        }
    }
}

/// Sub-record attached in the ADD phase.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AddOp {
    pub entity: EntityRef,
    pub record: RecordSpec,
}

/// Declarative description of one atomic change across entities.
///
/// Buckets run in phase order regardless of the order they were filled in.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(default)
)]
pub struct MutationPlan {
    pub create: Vec<CreateSpec>,
    pub delete: Vec<DeleteTarget>,
    pub set: BTreeMap<EntityRef, AttributeSet>,
    pub add: Vec<AddOp>,
    pub derive: Vec<EntityRef>,
    pub temporary_ids: BTreeMap<TempId, EntityKind>,
}

impl MutationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a create spec and declares its temporary id.
    pub fn with_create(mut self, spec: CreateSpec) -> Self {
        self.temporary_ids.insert(spec.temp_id.clone(), spec.kind);
        self.create.push(spec);
        self
    }

    pub fn with_delete_entity(mut self, entity: impl Into<EntityRef>) -> Self {
        self.delete.push(DeleteTarget::Entity {
            entity: entity.into(),
        });
        self
    }

    pub fn with_delete_owned(mut self, entity: impl Into<EntityRef>, record: RecordId) -> Self {
        self.delete.push(DeleteTarget::Owned {
            entity: entity.into(),
            record,
        });
        self
    }

    pub fn with_set(
        mut self,
        entity: impl Into<EntityRef>,
        path: AttrPath,
        value: impl Into<Value>,
    ) -> Self {
        self.set.entry(entity.into()).or_default().insert(path, value);
        self
    }

    pub fn with_add(mut self, entity: impl Into<EntityRef>, record: RecordSpec) -> Self {
        self.add.push(AddOp {
            entity: entity.into(),
            record,
        });
        self
    }

    pub fn with_derive(mut self, entity: impl Into<EntityRef>) -> Self {
        self.derive.push(entity.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.create.is_empty()
            && self.delete.is_empty()
            && self.set.values().all(AttributeSet::is_empty)
            && self.add.is_empty()
            && self.derive.is_empty()
    }

    /// Number of scalar writes in the SET bucket.
    pub fn set_count(&self) -> usize {
        self.set.values().map(AttributeSet::len).sum()
    }

    /// Every entity reference mentioned outside CREATE.
    pub fn references(&self) -> impl Iterator<Item = &EntityRef> {
        self.delete
            .iter()
            .map(DeleteTarget::entity)
            .chain(self.set.keys())
            .chain(self.add.iter().map(|op| &op.entity))
            .chain(self.derive.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_refs_have_textual_form() {
        assert_eq!(EntityRef::Real(EntityId(12)).to_string(), "12");
        assert_eq!(EntityRef::temp("droid").to_string(), "$droid");
        assert_eq!("$droid".parse::<EntityRef>().unwrap(), EntityRef::temp("droid"));
        assert_eq!("7".parse::<EntityRef>().unwrap(), EntityRef::Real(EntityId(7)));
        assert!("droid".parse::<EntityRef>().is_err());
    }

    #[test]
    fn builder_declares_temporaries() {
        let plan = MutationPlan::new()
            .with_create(CreateSpec::new("r2", EntityKind::Droid, "R2"))
            .with_set(EntityRef::temp("r2"), AttrPath::parse("base.hp").unwrap(), 10);

        assert_eq!(plan.temporary_ids.get(&TempId::new("r2")), Some(&EntityKind::Droid));
        assert_eq!(plan.set_count(), 1);
        assert!(!plan.is_empty());
        assert!(MutationPlan::new().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn plan_reads_from_json() {
        let raw = r#"{
            "create": [{ "temp_id": "cargo", "kind": "item", "name": "Crate" }],
            "temporary_ids": { "cargo": "item" },
            "set": { "4": { "base.credits": 250 }, "$cargo": { "flags.sealed": true } },
            "delete": [{ "target": "owned", "entity": "4", "record": 2 }],
            "derive": ["9"]
        }"#;
        let plan: MutationPlan = serde_json::from_str(raw).unwrap();

        assert_eq!(plan.create[0].temp_id, TempId::new("cargo"));
        assert_eq!(plan.set_count(), 2);
        assert_eq!(
            plan.set[&EntityRef::Real(EntityId(4))].number(&AttrPath::parse("base.credits").unwrap()),
            Some(250.0)
        );
        assert_eq!(plan.derive, vec![EntityRef::Real(EntityId(9))]);
        assert!(plan.add.is_empty());
    }

    #[test]
    fn phases_are_ordered() {
        use strum::IntoEnumIterator;
        let phases: Vec<_> = MutationPhase::iter().collect();
        assert!(phases.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(!MutationPhase::Derive.rolls_back());
        assert_eq!(MutationPhase::Create.to_string(), "create");
    }
}
