//! Record store contract and backends.
//!
//! # Responsibility
//! - Define the capability set every storage backend offers:
//!   query, insert-or-replace, delete and atomic batch commit.
//! - Translate backend failures into `StoreError`.
//!
//! # Invariants
//! - `commit` is all-or-nothing: on error the committed state is unchanged.
//! - Commits are serialized by the backend; concurrent callers never
//!   interleave partial batches.
//! - Deleting an absent record is a no-op, never an error.
//! - Batches carrying values that cannot be stored are rejected before any
//!   write, on every backend.

use crate::model::change_set::ChangeSet;
use crate::model::query::{FetchRequest, QueryError};
use crate::model::record::{RecordId, StoredRecord};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod sqlite;

pub use memory::MemoryRecordStore;
pub use sqlite::SqliteRecordStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Boxed backend cause carried by `StoreError::PersistenceFailure`.
pub type BackendError = Box<dyn Error + Send + Sync + 'static>;

/// Record store failure.
#[derive(Debug)]
pub enum StoreError {
    /// The fetch request has a shape the backend cannot evaluate.
    InvalidQuery(QueryError),
    /// The backend failed while reading or committing.
    PersistenceFailure {
        operation: &'static str,
        cause: BackendError,
    },
    /// A record cannot be persisted, or persisted data cannot be decoded.
    InvalidData(String),
}

impl StoreError {
    pub fn persistence(operation: &'static str, cause: impl Into<BackendError>) -> Self {
        Self::PersistenceFailure {
            operation,
            cause: cause.into(),
        }
    }

    /// Stable short code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidQuery(_) => "invalid_query",
            Self::PersistenceFailure { .. } => "persistence_failure",
            Self::InvalidData(_) => "invalid_data",
        }
    }
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidQuery(err) => write!(f, "invalid query: {err}"),
            Self::PersistenceFailure { operation, cause } => {
                write!(f, "store {operation} failed: {cause}")
            }
            Self::InvalidData(message) => write!(f, "invalid record data: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidQuery(err) => Some(err),
            Self::PersistenceFailure { cause, .. } => Some(cause.as_ref()),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<QueryError> for StoreError {
    fn from(value: QueryError) -> Self {
        Self::InvalidQuery(value)
    }
}

/// Rejects a batch holding a field value no backend can round-trip.
pub(crate) fn check_storable(batch: &ChangeSet) -> StoreResult<()> {
    for record in batch.upserts() {
        if let Some((field, value)) = record
            .fields
            .iter()
            .find(|(_, value)| !value.is_storable())
        {
            return Err(StoreError::InvalidData(format!(
                "field `{field}` of {} holds unstorable {} value",
                record.key(),
                value.type_name()
            )));
        }
    }
    Ok(())
}

/// Storage backend capability set.
pub trait RecordStore: Send + Sync {
    /// Short backend name for diagnostics (`memory`, `sqlite`, ...).
    fn backend_name(&self) -> &'static str;

    /// Returns committed records matching `request`.
    ///
    /// Returns an empty vector when nothing matches.
    fn query(&self, request: &FetchRequest) -> StoreResult<Vec<StoredRecord>>;

    /// Applies every change in `batch` atomically.
    fn commit(&self, batch: &ChangeSet) -> StoreResult<()>;

    /// Number of committed records of `entity`.
    fn count(&self, entity: &str) -> StoreResult<usize>;

    /// Upserts one record by identifier as its own commit.
    fn insert_or_replace(&self, record: StoredRecord) -> StoreResult<()> {
        let mut batch = ChangeSet::new();
        batch.upsert(record);
        self.commit(&batch)
    }

    /// Deletes one record as its own commit. Absent records are ignored.
    fn delete(&self, entity: &str, id: RecordId) -> StoreResult<()> {
        let mut batch = ChangeSet::new();
        batch.delete(entity, id);
        self.commit(&batch)
    }
}
