//! Dotted attribute paths and the writable targets they address.

use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorSeverity, SheetError};

use super::entity::RecordId;

/// A validated dotted path such as `defense.reflex` or `skills.pilot.trained`.
///
/// Segments are non-empty and consist of ASCII alphanumerics, `_` or `-`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "String", into = "String")
)]
pub struct AttrPath(String);

impl AttrPath {
    /// Parses and validates a dotted path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    path: raw.to_owned(),
                });
            }
            if let Some(ch) = segment
                .chars()
                .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
            {
                return Err(PathError::InvalidCharacter {
                    path: raw.to_owned(),
                    ch,
                });
            }
        }
        Ok(Self(raw.to_owned()))
    }

    /// Builds a path from a literal known to be valid (engine constants).
    pub(crate) fn from_static(raw: &'static str) -> Self {
        debug_assert!(AttrPath::parse(raw).is_ok(), "invalid path literal {raw}");
        Self(raw.to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }

    /// First segment of the path.
    pub fn root(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }

    /// The path with its first segment removed, if anything remains.
    pub fn tail(&self) -> Option<AttrPath> {
        self.0
            .split_once('.')
            .map(|(_, rest)| AttrPath(rest.to_owned()))
    }

    /// Appends a single segment, validating it.
    pub fn child(&self, segment: &str) -> Result<AttrPath, PathError> {
        AttrPath::parse(&format!("{}.{}", self.0, segment))
    }

    /// Appends another path.
    pub fn join(&self, other: &AttrPath) -> AttrPath {
        AttrPath(format!("{}.{}", self.0, other.0))
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AttrPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AttrPath::parse(s)
    }
}

impl TryFrom<String> for AttrPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        AttrPath::parse(&value)
    }
}

impl From<AttrPath> for String {
    fn from(value: AttrPath) -> Self {
        value.0
    }
}

/// Field of an owned sub-record addressable by a `set` write.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordField {
    Active,
    Name,
    Data(AttrPath),
}

/// Where a plan-level path lands on an entity.
///
/// Writable roots are `name`, `base.<…>`, `flags.<…>` and
/// `owned.<record>.(active|name|data.<…>)`. The `derived` root belongs to the
/// resolver and is rejected.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FieldTarget {
    Name,
    Base(AttrPath),
    Flags(AttrPath),
    Owned { record: RecordId, field: RecordField },
}

impl FieldTarget {
    pub fn classify(path: &AttrPath) -> Result<Self, PathError> {
        let tail = path.tail();
        match (path.root(), tail) {
            ("name", None) => Ok(FieldTarget::Name),
            ("base", Some(rest)) => Ok(FieldTarget::Base(rest)),
            ("flags", Some(rest)) => Ok(FieldTarget::Flags(rest)),
            ("owned", Some(rest)) => Self::classify_owned(path, &rest),
            ("derived", _) => Err(PathError::DerivedReadOnly {
                path: path.to_string(),
            }),
            ("base" | "flags" | "owned", None) => Err(PathError::MissingField {
                path: path.to_string(),
            }),
            _ => Err(PathError::UnknownRoot {
                path: path.to_string(),
            }),
        }
    }

    fn classify_owned(path: &AttrPath, rest: &AttrPath) -> Result<Self, PathError> {
        let record = rest
            .root()
            .parse::<u64>()
            .map(RecordId)
            .map_err(|_| PathError::InvalidRecordId {
                path: path.to_string(),
            })?;
        let field_path = rest.tail().ok_or_else(|| PathError::MissingField {
            path: path.to_string(),
        })?;
        let field = match (field_path.root(), field_path.tail()) {
            ("active", None) => RecordField::Active,
            ("name", None) => RecordField::Name,
            ("data", Some(data)) => RecordField::Data(data),
            _ => {
                return Err(PathError::UnknownRecordField {
                    path: path.to_string(),
                });
            }
        };
        Ok(FieldTarget::Owned { record, field })
    }

    /// Owned record addressed by this target, if any.
    pub fn record(&self) -> Option<RecordId> {
        match self {
            FieldTarget::Owned { record, .. } => Some(*record),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PathError {
    #[error("attribute path is empty")]
    Empty,

    #[error("attribute path '{path}' contains an empty segment")]
    EmptySegment { path: String },

    #[error("attribute path '{path}' contains invalid character {ch:?}")]
    InvalidCharacter { path: String, ch: char },

    #[error("attribute path '{path}' is rooted at derived, which only the resolver may write")]
    DerivedReadOnly { path: String },

    #[error("attribute path '{path}' has an unknown root")]
    UnknownRoot { path: String },

    #[error("attribute path '{path}' does not name a field")]
    MissingField { path: String },

    #[error("attribute path '{path}' does not start with a numeric record id")]
    InvalidRecordId { path: String },

    #[error("attribute path '{path}' addresses an unknown owned-record field")]
    UnknownRecordField { path: String },
}

impl SheetError for PathError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Validation
    }

    fn error_code(&self) -> &'static str {
        use PathError::*;
        match self {
            Empty => "PATH_EMPTY",
            EmptySegment { .. } => "PATH_EMPTY_SEGMENT",
            InvalidCharacter { .. } => "PATH_INVALID_CHARACTER",
            DerivedReadOnly { .. } => "PATH_DERIVED_READ_ONLY",
            UnknownRoot { .. } => "PATH_UNKNOWN_ROOT",
            MissingField { .. } => "PATH_MISSING_FIELD",
            InvalidRecordId { .. } => "PATH_INVALID_RECORD_ID",
            UnknownRecordField { .. } => "PATH_UNKNOWN_RECORD_FIELD",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_paths() {
        assert_eq!(AttrPath::parse(""), Err(PathError::Empty));
        assert!(matches!(
            AttrPath::parse("base..hp"),
            Err(PathError::EmptySegment { .. })
        ));
        assert!(matches!(
            AttrPath::parse("base.hp max"),
            Err(PathError::InvalidCharacter { ch: ' ', .. })
        ));
    }

    #[test]
    fn classifies_writable_roots() {
        let base = AttrPath::parse("base.defense.reflex").unwrap();
        assert_eq!(
            FieldTarget::classify(&base).unwrap(),
            FieldTarget::Base(AttrPath::parse("defense.reflex").unwrap())
        );

        let owned = AttrPath::parse("owned.7.data.cost").unwrap();
        assert_eq!(
            FieldTarget::classify(&owned).unwrap(),
            FieldTarget::Owned {
                record: RecordId(7),
                field: RecordField::Data(AttrPath::parse("cost").unwrap()),
            }
        );

        let name = AttrPath::parse("name").unwrap();
        assert_eq!(FieldTarget::classify(&name).unwrap(), FieldTarget::Name);
    }

    #[test]
    fn derived_and_unknown_roots_are_rejected() {
        let derived = AttrPath::parse("derived.hp.max").unwrap();
        assert!(matches!(
            FieldTarget::classify(&derived),
            Err(PathError::DerivedReadOnly { .. })
        ));

        let system = AttrPath::parse("system.hp").unwrap();
        assert!(matches!(
            FieldTarget::classify(&system),
            Err(PathError::UnknownRoot { .. })
        ));

        let bare = AttrPath::parse("base").unwrap();
        assert!(matches!(
            FieldTarget::classify(&bare),
            Err(PathError::MissingField { .. })
        ));

        let bad_record = AttrPath::parse("owned.blaster.active").unwrap();
        assert!(matches!(
            FieldTarget::classify(&bad_record),
            Err(PathError::InvalidRecordId { .. })
        ));
    }
}
