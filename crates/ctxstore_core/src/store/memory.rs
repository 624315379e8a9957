//! In-process record store.

use super::{check_storable, RecordStore, StoreError, StoreResult};
use crate::model::change_set::ChangeSet;
use crate::model::query::FetchRequest;
use crate::model::record::{RecordKey, StoredRecord};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Record store keeping committed state in an ordered map.
///
/// A single mutex doubles as the global write lock, so every commit is
/// observed either entirely or not at all.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<RecordKey, StoredRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
        operation: &'static str,
    ) -> StoreResult<MutexGuard<'_, BTreeMap<RecordKey, StoredRecord>>> {
        self.records
            .lock()
            .map_err(|_| StoreError::persistence(operation, "memory store lock poisoned"))
    }
}

impl RecordStore for MemoryRecordStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn query(&self, request: &FetchRequest) -> StoreResult<Vec<StoredRecord>> {
        request.validate()?;
        let records = self.lock("query")?;
        let candidates = records
            .range(entity_range(&request.entity))
            .map(|(_, record)| record.clone());
        Ok(request.evaluate(candidates))
    }

    fn commit(&self, batch: &ChangeSet) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        check_storable(batch)?;
        let mut records = self.lock("commit")?;
        for key in batch.deletes() {
            records.remove(key);
        }
        for record in batch.upserts() {
            records.insert(record.key(), record.clone());
        }
        Ok(())
    }

    fn count(&self, entity: &str) -> StoreResult<usize> {
        let records = self.lock("count")?;
        Ok(records.range(entity_range(entity)).count())
    }
}

fn entity_range(entity: &str) -> std::ops::RangeInclusive<RecordKey> {
    RecordKey::new(entity, uuid::Uuid::nil())..=RecordKey::new(entity, uuid::Uuid::max())
}
