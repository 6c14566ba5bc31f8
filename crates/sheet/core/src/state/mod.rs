//! Authoritative entity representation.
//!
//! This module owns the data structures persisted for every game entity:
//! identifiers, attribute paths and values, owned sub-records, and change
//! summaries. Runtime layers clone or query these records but mutate them
//! exclusively through accepted mutation plans.
pub mod delta;
pub mod entity;
pub mod path;
pub mod value;

pub use delta::{CollectionChanges, EntityDelta};
pub use entity::{Entity, EntityId, EntityKind, OwnedRecord, RecordId, RecordKind, StateError};
pub use path::{AttrPath, FieldTarget, PathError, RecordField};
pub use value::{AttributeSet, Value};
