//! Read and mutation contexts.
//!
//! # Responsibility
//! - Stage inserts/deletes against a shared record store until commit.
//! - Track the commit lifecycle (`Idle` -> `Dirty` -> `Committing`).
//! - Read committed state through to the store.
//!
//! # Invariants
//! - A key is never pending as both upsert and delete; last staging wins.
//! - Pending changes are cleared only after the store accepted the commit.
//! - A failed commit leaves the context `Dirty` with every change retained.

use crate::model::change_set::ChangeSet;
use crate::model::query::FetchRequest;
use crate::model::record::{RecordId, RecordKey, StoredRecord};
use crate::store::{RecordStore, StoreResult};
use log::{debug, warn};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use uuid::Uuid;

pub mod merge;
pub mod queue;

/// Which role a context plays in the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKind {
    /// Long-lived context serving fetches and direct edits.
    Read,
    /// Context performing inserts and deletes.
    Mutation,
}

impl ContextKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Mutation => "mutation",
        }
    }
}

impl Display for ContextKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Commit lifecycle of one context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Idle,
    Dirty,
    Committing,
}

/// Staging scope bound to a record store.
pub struct Context {
    kind: ContextKind,
    store: Arc<dyn RecordStore>,
    pending: ChangeSet,
    state: ContextState,
}

impl Context {
    pub fn new(kind: ContextKind, store: Arc<dyn RecordStore>) -> Self {
        Self {
            kind,
            store,
            pending: ChangeSet::new(),
            state: ContextState::Idle,
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn has_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending(&self) -> &ChangeSet {
        &self.pending
    }

    /// Returns the staged upsert for `(entity, id)`, if any.
    pub fn pending_record(&self, entity: &str, id: RecordId) -> Option<&StoredRecord> {
        self.pending.upserted(&RecordKey::new(entity, id))
    }

    /// Returns the staged record for the identifier, or a fresh empty one.
    ///
    /// A missing identifier gets a newly generated one.
    pub fn record_for(&self, entity: &str, id: Option<RecordId>) -> StoredRecord {
        let id = id.unwrap_or_else(Uuid::new_v4);
        self.pending_record(entity, id)
            .cloned()
            .unwrap_or_else(|| StoredRecord::new(entity, id))
    }

    /// Stages an insert-or-replace.
    pub fn stage_upsert(&mut self, record: StoredRecord) {
        self.pending.upsert(record);
        self.state = ContextState::Dirty;
    }

    /// Stages a delete.
    pub fn stage_delete(&mut self, entity: &str, id: RecordId) {
        self.pending.delete(entity, id);
        self.state = ContextState::Dirty;
    }

    /// Pushes pending changes to the store as one atomic batch.
    ///
    /// Returns the committed change set so it can be merged elsewhere.
    /// Committing with nothing pending succeeds with an empty change set.
    ///
    /// # Errors
    /// - Returns the store error unchanged; pending changes are retained.
    pub fn commit(&mut self) -> StoreResult<ChangeSet> {
        if self.pending.is_empty() {
            self.state = ContextState::Idle;
            return Ok(ChangeSet::new());
        }

        self.state = ContextState::Committing;
        match self.store.commit(&self.pending) {
            Ok(()) => {
                self.state = ContextState::Idle;
                let committed = std::mem::take(&mut self.pending);
                debug!(
                    "event=context_commit module=context status=ok context={} changes={}",
                    self.kind,
                    committed.len()
                );
                Ok(committed)
            }
            Err(err) => {
                self.state = ContextState::Dirty;
                warn!(
                    "event=context_commit module=context status=error context={} changes={} error_code={}",
                    self.kind,
                    self.pending.len(),
                    err.code()
                );
                Err(err)
            }
        }
    }

    /// Discards every pending change.
    pub fn rollback(&mut self) {
        self.pending = ChangeSet::new();
        self.state = ContextState::Idle;
    }

    /// Reads committed records through to the store.
    pub fn read(&self, request: &FetchRequest) -> StoreResult<Vec<StoredRecord>> {
        self.store.query(request)
    }

    pub(crate) fn pending_mut(&mut self) -> &mut ChangeSet {
        &mut self.pending
    }

    /// Re-derives the lifecycle state after pending changes were edited
    /// from outside (merge).
    pub(crate) fn refresh_state(&mut self) {
        if self.state != ContextState::Committing {
            self.state = if self.pending.is_empty() {
                ContextState::Idle
            } else {
                ContextState::Dirty
            };
        }
    }
}
