//! Attribute values and flat attribute sets.

use std::collections::BTreeMap;
use std::fmt;

use super::path::AttrPath;

/// A single attribute value stored on an entity.
///
/// `Null` is the "undefined" marker: it can appear in persisted data coming
/// from older sheets but is never accepted as the value of a `set` write.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(untagged)
)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns true for numbers that are NaN or infinite.
    pub fn is_non_finite(&self) -> bool {
        matches!(self, Value::Number(n) if !n.is_finite())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(f64::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

/// Flat map of dotted attribute paths to values.
///
/// Ordered so that iteration, equality and serialization are deterministic.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(transparent)
)]
pub struct AttributeSet(BTreeMap<AttrPath, Value>);

impl AttributeSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, path: &AttrPath) -> Option<&Value> {
        self.0.get(path)
    }

    /// Numeric value at `path`, if present and numeric.
    pub fn number(&self, path: &AttrPath) -> Option<f64> {
        self.get(path).and_then(Value::as_number)
    }

    /// Inserts a value, returning the previous one.
    pub fn insert(&mut self, path: AttrPath, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(path, value.into())
    }

    pub fn remove(&mut self, path: &AttrPath) -> Option<Value> {
        self.0.remove(path)
    }

    pub fn contains(&self, path: &AttrPath) -> bool {
        self.0.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AttrPath, &Value)> {
        self.0.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &AttrPath> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Builder-style insert for tests and fixtures.
    pub fn with(mut self, path: AttrPath, value: impl Into<Value>) -> Self {
        self.insert(path, value);
        self
    }

    /// Paths whose value differs between `self` and `other` (added, removed or changed).
    pub fn changed_paths(&self, other: &AttributeSet) -> Vec<AttrPath> {
        let mut changed: Vec<AttrPath> = self
            .0
            .iter()
            .filter(|(path, value)| other.get(path) != Some(*value))
            .map(|(path, _)| path.clone())
            .collect();
        changed.extend(
            other
                .0
                .keys()
                .filter(|path| !self.0.contains_key(*path))
                .cloned(),
        );
        changed.sort();
        changed
    }
}

impl FromIterator<(AttrPath, Value)> for AttributeSet {
    fn from_iter<I: IntoIterator<Item = (AttrPath, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for AttributeSet {
    type Item = (AttrPath, Value);
    type IntoIter = std::collections::btree_map::IntoIter<AttrPath, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
