//! Stored record model.
//!
//! # Responsibility
//! - Define the canonical persisted shape: entity name, identifier and a bag
//!   of named, typed fields.
//! - Provide typed field accessors used by mapping implementations.
//!
//! # Invariants
//! - `(entity, id)` uniquely identifies a record inside one store.
//! - The field name `id` is reserved for the record identifier and never
//!   stored inside `fields`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier of a stored record.
pub type RecordId = Uuid;

/// Reserved field name resolving to the record identifier in queries.
pub const ID_FIELD: &str = "id";

/// Typed value of one stored field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Uuid(Uuid),
    /// Unix epoch milliseconds.
    Timestamp(i64),
}

impl FieldValue {
    /// Short type tag used in diagnostics and query validation messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Bool(_) => "bool",
            Self::Uuid(_) => "uuid",
            Self::Timestamp(_) => "timestamp",
        }
    }

    /// Compares two values of compatible types.
    ///
    /// Integer and real values compare numerically. Returns `None` for
    /// incompatible pairs.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Timestamp(a), Self::Timestamp(b)) => Some(a.cmp(b)),
            (Self::Real(a), Self::Real(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Real(b)) => (*a as f64).partial_cmp(b),
            (Self::Real(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::Uuid(a), Self::Uuid(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Whether the value survives persistence unchanged.
    ///
    /// NaN and infinite reals have no JSON representation.
    pub fn is_storable(&self) -> bool {
        match self {
            Self::Real(value) => value.is_finite(),
            _ => true,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Integer(_) | Self::Real(_) => 1,
            Self::Timestamp(_) => 2,
            Self::Text(_) => 3,
            Self::Uuid(_) => 4,
        }
    }

    /// Total order used for sorting heterogeneous values.
    ///
    /// Values of different kinds are grouped by kind; NaN sorts last among
    /// numbers.
    pub fn sort_cmp(&self, other: &Self) -> Ordering {
        match self.compare(other) {
            Some(ordering) => ordering,
            None if self.rank() == other.rank() => match (self, other) {
                (Self::Real(a), _) if a.is_nan() => Ordering::Greater,
                _ => Ordering::Less,
            },
            None => self.rank().cmp(&other.rank()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Real(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        Self::Uuid(value)
    }
}

/// Store-wide key of one record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub entity: String,
    pub id: RecordId,
}

impl RecordKey {
    pub fn new(entity: impl Into<String>, id: RecordId) -> Self {
        Self {
            entity: entity.into(),
            id,
        }
    }
}

impl Display for RecordKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity, self.id)
    }
}

/// Canonical persisted record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub entity: String,
    pub id: RecordId,
    pub fields: BTreeMap<String, FieldValue>,
}

impl StoredRecord {
    /// Creates an empty record bound to `(entity, id)`.
    pub fn new(entity: impl Into<String>, id: RecordId) -> Self {
        Self {
            entity: entity.into(),
            id,
            fields: BTreeMap::new(),
        }
    }

    /// Creates an empty record with a freshly generated identifier.
    pub fn with_new_id(entity: impl Into<String>) -> Self {
        Self::new(entity, Uuid::new_v4())
    }

    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.entity.clone(), self.id)
    }

    /// Builder-style setter.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    /// Sets one field. Writes to the reserved `id` field are ignored.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        let field = field.into();
        if field == ID_FIELD {
            return;
        }
        self.fields.insert(field, value.into());
    }

    /// Sets the field when `value` is present, removes it otherwise.
    pub fn set_opt<V: Into<FieldValue>>(&mut self, field: &str, value: Option<V>) {
        match value {
            Some(value) => self.set(field, value),
            None => {
                self.fields.remove(field);
            }
        }
    }

    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.remove(field)
    }

    /// Resolves a field for query evaluation, including the reserved `id`.
    pub fn value(&self, field: &str) -> Option<FieldValue> {
        if field == ID_FIELD {
            return Some(FieldValue::Uuid(self.id));
        }
        self.fields.get(field).cloned()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    pub fn text(&self, field: &str) -> Option<String> {
        match self.fields.get(field) {
            Some(FieldValue::Text(value)) => Some(value.clone()),
            _ => None,
        }
    }

    pub fn integer(&self, field: &str) -> Option<i64> {
        match self.fields.get(field) {
            Some(FieldValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn real(&self, field: &str) -> Option<f64> {
        match self.fields.get(field) {
            Some(FieldValue::Real(value)) => Some(*value),
            Some(FieldValue::Integer(value)) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn boolean(&self, field: &str) -> Option<bool> {
        match self.fields.get(field) {
            Some(FieldValue::Bool(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn uuid(&self, field: &str) -> Option<Uuid> {
        match self.fields.get(field) {
            Some(FieldValue::Uuid(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn timestamp(&self, field: &str) -> Option<i64> {
        match self.fields.get(field) {
            Some(FieldValue::Timestamp(value)) => Some(*value),
            _ => None,
        }
    }
}
