//! Fetch request, predicate and sort specifications.
//!
//! # Responsibility
//! - Describe which records of one entity a read wants and in what order.
//! - Validate request shapes before a backend evaluates them.
//! - Provide the shared in-process evaluator used by store backends.
//!
//! # Invariants
//! - Requests are opaque to the service layer; only stores evaluate them.
//! - Results without sort descriptors are ordered by record identifier.

use crate::model::record::{FieldValue, StoredRecord};
use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Reason a fetch request was rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    EmptyEntity,
    EmptyField,
    /// An `And`/`Or` node without operands.
    EmptyComposite(&'static str),
    UnsupportedOperand {
        op: &'static str,
        field: String,
        value_type: &'static str,
    },
    EntityMismatch {
        expected: String,
        actual: String,
    },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyEntity => write!(f, "fetch request has an empty entity name"),
            Self::EmptyField => write!(f, "predicate or sort descriptor has an empty field name"),
            Self::EmptyComposite(op) => write!(f, "`{op}` predicate needs at least one operand"),
            Self::UnsupportedOperand {
                op,
                field,
                value_type,
            } => write!(
                f,
                "`{op}` on field `{field}` does not support {value_type} operands"
            ),
            Self::EntityMismatch { expected, actual } => write!(
                f,
                "fetch request targets entity `{actual}`, expected `{expected}`"
            ),
        }
    }
}

impl Error for QueryError {}

/// Filter over stored record fields.
///
/// The reserved field `id` resolves to the record identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(String, FieldValue),
    Ne(String, FieldValue),
    Lt(String, FieldValue),
    Le(String, FieldValue),
    Gt(String, FieldValue),
    Ge(String, FieldValue),
    /// Case-sensitive substring match on text fields.
    Contains(String, FieldValue),
    /// Matches records where the field is absent.
    IsNull(String),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eq(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Ne(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Lt(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::Gt(field.into(), value.into())
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Self::Contains(field.into(), FieldValue::Text(needle.into()))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::IsNull(field.into())
    }

    pub fn and(operands: Vec<Predicate>) -> Self {
        Self::And(operands)
    }

    pub fn or(operands: Vec<Predicate>) -> Self {
        Self::Or(operands)
    }

    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Rejects shapes no backend can evaluate.
    pub fn validate(&self) -> Result<(), QueryError> {
        match self {
            Self::Eq(field, _) | Self::Ne(field, _) => check_field(field),
            Self::Lt(field, value)
            | Self::Le(field, value)
            | Self::Gt(field, value)
            | Self::Ge(field, value) => {
                check_field(field)?;
                if matches!(value, FieldValue::Bool(_)) {
                    return Err(QueryError::UnsupportedOperand {
                        op: self.op_name(),
                        field: field.clone(),
                        value_type: value.type_name(),
                    });
                }
                Ok(())
            }
            Self::Contains(field, value) => {
                check_field(field)?;
                if !matches!(value, FieldValue::Text(_)) {
                    return Err(QueryError::UnsupportedOperand {
                        op: self.op_name(),
                        field: field.clone(),
                        value_type: value.type_name(),
                    });
                }
                Ok(())
            }
            Self::IsNull(field) => check_field(field),
            Self::And(operands) | Self::Or(operands) => {
                if operands.is_empty() {
                    return Err(QueryError::EmptyComposite(self.op_name()));
                }
                operands.iter().try_for_each(Predicate::validate)
            }
            Self::Not(inner) => inner.validate(),
        }
    }

    /// Evaluates this predicate against one record.
    ///
    /// Comparisons against an absent field or an incompatible value type do
    /// not match (`Ne` matches instead).
    pub fn matches(&self, record: &StoredRecord) -> bool {
        match self {
            Self::Eq(field, value) => {
                compare_field(record, field, value) == Some(Ordering::Equal)
            }
            Self::Ne(field, value) => {
                compare_field(record, field, value) != Some(Ordering::Equal)
            }
            Self::Lt(field, value) => {
                compare_field(record, field, value) == Some(Ordering::Less)
            }
            Self::Le(field, value) => matches!(
                compare_field(record, field, value),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(field, value) => {
                compare_field(record, field, value) == Some(Ordering::Greater)
            }
            Self::Ge(field, value) => matches!(
                compare_field(record, field, value),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::Contains(field, FieldValue::Text(needle)) => matches!(
                record.value(field),
                Some(FieldValue::Text(haystack)) if haystack.contains(needle.as_str())
            ),
            Self::Contains(..) => false,
            Self::IsNull(field) => record.value(field).is_none(),
            Self::And(operands) => operands.iter().all(|operand| operand.matches(record)),
            Self::Or(operands) => operands.iter().any(|operand| operand.matches(record)),
            Self::Not(inner) => !inner.matches(record),
        }
    }

    fn op_name(&self) -> &'static str {
        match self {
            Self::Eq(..) => "eq",
            Self::Ne(..) => "ne",
            Self::Lt(..) => "lt",
            Self::Le(..) => "le",
            Self::Gt(..) => "gt",
            Self::Ge(..) => "ge",
            Self::Contains(..) => "contains",
            Self::IsNull(_) => "is_null",
            Self::And(_) => "and",
            Self::Or(_) => "or",
            Self::Not(_) => "not",
        }
    }
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDescriptor {
    pub field: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: true,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            ascending: false,
        }
    }

    /// Absent values sort before present ones in ascending order.
    fn compare(&self, left: &StoredRecord, right: &StoredRecord) -> Ordering {
        let ordering = match (left.value(&self.field), right.value(&self.field)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.sort_cmp(&b),
        };
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// Full read request for one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub entity: String,
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortDescriptor>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl FetchRequest {
    /// Creates an unfiltered, unsorted request for `entity`.
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            sort: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    pub fn with_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_sort(mut self, sort: Option<Vec<SortDescriptor>>) -> Self {
        self.sort = sort.unwrap_or_default();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn validate(&self) -> Result<(), QueryError> {
        if self.entity.trim().is_empty() {
            return Err(QueryError::EmptyEntity);
        }
        if let Some(predicate) = &self.predicate {
            predicate.validate()?;
        }
        self.sort
            .iter()
            .try_for_each(|descriptor| check_field(&descriptor.field))
    }

    /// Filters, sorts and pages `records` of this request's entity.
    ///
    /// Callers are expected to have validated the request.
    pub fn evaluate(&self, records: impl IntoIterator<Item = StoredRecord>) -> Vec<StoredRecord> {
        let mut matched: Vec<StoredRecord> = records
            .into_iter()
            .filter(|record| record.entity == self.entity)
            .filter(|record| {
                self.predicate
                    .as_ref()
                    .map_or(true, |predicate| predicate.matches(record))
            })
            .collect();

        matched.sort_by(|left, right| {
            self.sort
                .iter()
                .map(|descriptor| descriptor.compare(left, right))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or_else(|| left.id.cmp(&right.id))
        });

        let paged = matched.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => paged.take(limit).collect(),
            None => paged.collect(),
        }
    }
}

fn check_field(field: &str) -> Result<(), QueryError> {
    if field.trim().is_empty() {
        return Err(QueryError::EmptyField);
    }
    Ok(())
}

fn compare_field(record: &StoredRecord, field: &str, value: &FieldValue) -> Option<Ordering> {
    record.value(field).and_then(|actual| actual.compare(value))
}

#[cfg(test)]
mod tests {
    use super::{FetchRequest, Predicate, QueryError, SortDescriptor};
    use crate::model::record::{FieldValue, StoredRecord};

    fn users() -> Vec<StoredRecord> {
        vec![
            StoredRecord::with_new_id("User")
                .with("name", "John")
                .with("age", 31_i64),
            StoredRecord::with_new_id("User")
                .with("name", "Bill")
                .with("age", 25_i64),
            StoredRecord::with_new_id("User").with("name", "Fenix"),
            StoredRecord::with_new_id("Team").with("name", "Core"),
        ]
    }

    #[test]
    fn evaluate_filters_by_entity_and_predicate() {
        let request = FetchRequest::new("User").with_predicate(Some(Predicate::gt("age", 26_i64)));
        let result = request.evaluate(users());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text("name").as_deref(), Some("John"));
    }

    #[test]
    fn evaluate_sorts_with_absent_values_first() {
        let request =
            FetchRequest::new("User").with_sort(Some(vec![SortDescriptor::ascending("age")]));
        let names: Vec<String> = request
            .evaluate(users())
            .iter()
            .filter_map(|record| record.text("name"))
            .collect();

        assert_eq!(names, vec!["Fenix", "Bill", "John"]);
    }

    #[test]
    fn evaluate_applies_offset_then_limit() {
        let request = FetchRequest::new("User")
            .with_sort(Some(vec![SortDescriptor::descending("name")]))
            .with_offset(1)
            .with_limit(1);
        let result = request.evaluate(users());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text("name").as_deref(), Some("Fenix"));
    }

    #[test]
    fn composite_predicates_combine_operands() {
        let predicate = Predicate::or(vec![
            Predicate::contains("name", "ohn"),
            Predicate::is_null("age"),
        ]);
        let request = FetchRequest::new("User").with_predicate(Some(predicate.negate()));
        let result = request.evaluate(users());

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].text("name").as_deref(), Some("Bill"));
    }

    #[test]
    fn validate_rejects_unsupported_shapes() {
        assert_eq!(
            FetchRequest::new(" ").validate(),
            Err(QueryError::EmptyEntity)
        );
        assert_eq!(
            FetchRequest::new("User")
                .with_sort(Some(vec![SortDescriptor::ascending("")]))
                .validate(),
            Err(QueryError::EmptyField)
        );
        assert!(matches!(
            FetchRequest::new("User")
                .with_predicate(Some(Predicate::Contains("name".into(), FieldValue::Integer(1))))
                .validate(),
            Err(QueryError::UnsupportedOperand { op: "contains", .. })
        ));
        assert!(matches!(
            FetchRequest::new("User")
                .with_predicate(Some(Predicate::lt("active", true)))
                .validate(),
            Err(QueryError::UnsupportedOperand { op: "lt", .. })
        ));
        assert_eq!(
            FetchRequest::new("User")
                .with_predicate(Some(Predicate::and(Vec::new())))
                .validate(),
            Err(QueryError::EmptyComposite("and"))
        );
    }

    #[test]
    fn reserved_id_field_is_queryable() {
        let records = users();
        let target = records[1].id;
        let request = FetchRequest::new("User").with_predicate(Some(Predicate::eq("id", target)));

        let result = request.evaluate(records);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].id, target);
    }
}
