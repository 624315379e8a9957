//! SQLite-backed record store.
//!
//! # Responsibility
//! - Persist records as `(entity, id, fields-json)` rows.
//! - Apply each change set inside one SQLite transaction.
//!
//! # Invariants
//! - A failed commit rolls the transaction back; no partial batch is visible.
//! - The connection mutex is the store-wide write lock.

use super::{check_storable, RecordStore, StoreError, StoreResult};
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::model::change_set::ChangeSet;
use crate::model::query::FetchRequest;
use crate::model::record::{FieldValue, StoredRecord};
use log::{debug, error};
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;
use uuid::Uuid;

/// Record store over one SQLite connection.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Opens (or creates) a file-backed store.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::from_connection(open_db(path)?))
    }

    /// Opens a private in-memory store.
    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already bootstrapped connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self, operation: &'static str) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::persistence(operation, "sqlite connection lock poisoned"))
    }
}

impl RecordStore for SqliteRecordStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn query(&self, request: &FetchRequest) -> StoreResult<Vec<StoredRecord>> {
        request.validate()?;
        let conn = self.lock("query")?;

        let mut stmt = conn
            .prepare_cached("SELECT id, fields FROM records WHERE entity = ?1 ORDER BY id ASC;")
            .map_err(|err| StoreError::persistence("query", err))?;
        let mut rows = stmt
            .query([request.entity.as_str()])
            .map_err(|err| StoreError::persistence("query", err))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .map_err(|err| StoreError::persistence("query", err))?
        {
            let id_text: String = row
                .get(0)
                .map_err(|err| StoreError::persistence("query", err))?;
            let fields_json: String = row
                .get(1)
                .map_err(|err| StoreError::persistence("query", err))?;
            records.push(decode_row(&request.entity, &id_text, &fields_json)?);
        }

        Ok(request.evaluate(records))
    }

    fn commit(&self, batch: &ChangeSet) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let started_at = Instant::now();
        let mut conn = self.lock("commit")?;

        let result = apply_batch(&mut conn, batch);
        match &result {
            Ok(()) => debug!(
                "event=store_commit module=store status=ok backend=sqlite changes={} duration_ms={}",
                batch.len(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=store_commit module=store status=error backend=sqlite changes={} duration_ms={} error_code={} error={}",
                batch.len(),
                started_at.elapsed().as_millis(),
                err.code(),
                err
            ),
        }
        result
    }

    fn count(&self, entity: &str) -> StoreResult<usize> {
        let conn = self.lock("count")?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM records WHERE entity = ?1;",
                [entity],
                |row| row.get(0),
            )
            .map_err(|err| StoreError::persistence("count", err))?;
        usize::try_from(count).map_err(|err| StoreError::persistence("count", err))
    }
}

fn apply_batch(conn: &mut Connection, batch: &ChangeSet) -> StoreResult<()> {
    check_storable(batch)?;
    let tx = conn
        .transaction()
        .map_err(|err| StoreError::persistence("commit", err))?;

    for key in batch.deletes() {
        tx.execute(
            "DELETE FROM records WHERE entity = ?1 AND id = ?2;",
            params![key.entity, key.id.to_string()],
        )
        .map_err(|err| StoreError::persistence("commit", err))?;
    }

    for record in batch.upserts() {
        let fields_json = serde_json::to_string(&record.fields)
            .map_err(|err| StoreError::persistence("commit", err))?;
        tx.execute(
            "INSERT INTO records (entity, id, fields)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (entity, id) DO UPDATE SET
                fields = excluded.fields,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![record.entity, record.id.to_string(), fields_json],
        )
        .map_err(|err| StoreError::persistence("commit", err))?;
    }

    tx.commit()
        .map_err(|err| StoreError::persistence("commit", err))
}

fn decode_row(entity: &str, id_text: &str, fields_json: &str) -> StoreResult<StoredRecord> {
    let id = Uuid::parse_str(id_text).map_err(|_| {
        StoreError::InvalidData(format!("invalid uuid value `{id_text}` in records.id"))
    })?;
    let fields: BTreeMap<String, FieldValue> =
        serde_json::from_str(fields_json).map_err(|err| {
            StoreError::InvalidData(format!(
                "undecodable fields for {entity}/{id_text}: {err}"
            ))
        })?;

    Ok(StoredRecord {
        entity: entity.to_string(),
        id,
        fields,
    })
}
