//! Pending change set shared by contexts and store commits.
//!
//! # Invariants
//! - A key is never in `upserts` and `deletes` at the same time; the most
//!   recent staging call wins.

use crate::model::record::{RecordId, RecordKey, StoredRecord};
use std::collections::{BTreeMap, BTreeSet};

/// Ordered set of upserts and deletes applied together by one commit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    upserts: BTreeMap<RecordKey, StoredRecord>,
    deletes: BTreeSet<RecordKey>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages an insert-or-replace, cancelling any pending delete of the key.
    pub fn upsert(&mut self, record: StoredRecord) {
        let key = record.key();
        self.deletes.remove(&key);
        self.upserts.insert(key, record);
    }

    /// Stages a delete, cancelling any pending upsert of the key.
    pub fn delete(&mut self, entity: impl Into<String>, id: RecordId) {
        let key = RecordKey::new(entity, id);
        self.upserts.remove(&key);
        self.deletes.insert(key);
    }

    /// Drops whatever is staged for `key`. Returns whether anything was dropped.
    pub fn discard(&mut self, key: &RecordKey) -> bool {
        let upsert = self.upserts.remove(key).is_some();
        let delete = self.deletes.remove(key);
        upsert || delete
    }

    pub fn upserts(&self) -> impl Iterator<Item = &StoredRecord> {
        self.upserts.values()
    }

    pub fn deletes(&self) -> impl Iterator<Item = &RecordKey> {
        self.deletes.iter()
    }

    pub fn upserted(&self, key: &RecordKey) -> Option<&StoredRecord> {
        self.upserts.get(key)
    }

    pub(crate) fn upserted_mut(&mut self, key: &RecordKey) -> Option<&mut StoredRecord> {
        self.upserts.get_mut(key)
    }

    pub fn is_deleted(&self, key: &RecordKey) -> bool {
        self.deletes.contains(key)
    }

    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}
