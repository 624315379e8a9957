//! Mapping between domain records and stored records.
//!
//! # Responsibility
//! - Let each domain type describe its own two-way conversion.
//! - Keep mapping total: absent or mistyped stored fields become `None`.
//!
//! # Invariants
//! - `from_stored(&to_stored(d, ctx)) == d` for a record with all fields set.
//! - `to_stored` reuses the record already staged in the target context for
//!   the same identifier, so untouched staged fields are preserved.

use crate::context::Context;
use crate::model::record::{RecordId, StoredRecord};

/// Domain type that can be projected from and written back to a stored record.
///
/// # Example
/// ```
/// use ctxstore_core::{Context, Representable, StoredRecord};
/// use uuid::Uuid;
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct User {
///     id: Option<Uuid>,
///     name: Option<String>,
/// }
///
/// impl Representable for User {
///     const ENTITY: &'static str = "User";
///
///     fn id(&self) -> Option<Uuid> {
///         self.id
///     }
///
///     fn from_stored(record: &StoredRecord) -> Self {
///         Self { id: Some(record.id), name: record.text("name") }
///     }
///
///     fn to_stored(&self, target: &mut Context) -> StoredRecord {
///         let mut record = target.record_for(Self::ENTITY, self.id);
///         record.set_opt("name", self.name.clone());
///         record
///     }
/// }
/// ```
pub trait Representable: Clone + Send + Sized + 'static {
    /// Stored entity name, used as the fetch target.
    const ENTITY: &'static str;

    /// Identifier mirrored from the stored record, if already assigned.
    fn id(&self) -> Option<RecordId>;

    /// Builds the domain value from a stored record.
    fn from_stored(record: &StoredRecord) -> Self;

    /// Creates or reuses the stored record bound to this value's identifier in
    /// `target`.
    fn to_stored(&self, target: &mut Context) -> StoredRecord;
}
