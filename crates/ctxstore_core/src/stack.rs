//! Context stack: one store, one read scope, one mutation scope.
//!
//! # Responsibility
//! - Open the configured record store once and share it between contexts.
//! - Own the two serialized context queues and their lifecycle.
//! - Run mutation commits and merge the result into the read context.
//!
//! # Invariants
//! - Exactly one long-lived read context and one long-lived mutation context.
//! - The mutation context is flushed by a commit at the end of every write
//!   job; it never carries pending changes between jobs.
//! - A successful mutation commit is merged into the read context before the
//!   write job reports completion.

use crate::config::{ConfigError, StoreBackend, StoreConfiguration};
use crate::context::merge::{MergeCoordinator, MergeReport};
use crate::context::queue::{ContextQueue, QueueHandle};
use crate::context::{Context, ContextKind};
use crate::db::DbError;
use crate::model::change_set::ChangeSet;
use crate::store::{MemoryRecordStore, RecordStore, SqliteRecordStore, StoreResult};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Instant;

/// Failure while opening a context stack.
#[derive(Debug)]
pub enum StackError {
    Config(ConfigError),
    Db(DbError),
    Io(std::io::Error),
}

impl Display for StackError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Io(err) => write!(f, "context stack i/o failure: {err}"),
        }
    }
}

impl Error for StackError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Io(err) => Some(err),
        }
    }
}

impl From<ConfigError> for StackError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<DbError> for StackError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<std::io::Error> for StackError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Result of one mutation job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Number of changes the commit applied.
    pub committed: usize,
    /// What the merge into the read context changed.
    pub merge: MergeReport,
}

/// Owner of the shared store and both context scopes.
pub struct ContextStack {
    store: Arc<dyn RecordStore>,
    read: ContextQueue,
    mutation: ContextQueue,
}

impl ContextStack {
    /// Opens the configured store and starts both context workers.
    ///
    /// # Errors
    /// - Returns `StackError::Config` for invalid settings.
    /// - Returns `StackError::Db` when the SQLite backend cannot be opened.
    pub fn open(config: &StoreConfiguration) -> Result<Self, StackError> {
        let started_at = Instant::now();
        config.validate()?;

        let store: Arc<dyn RecordStore> = match (config.backend, config.database_path()) {
            (StoreBackend::Memory, _) => Arc::new(MemoryRecordStore::new()),
            (StoreBackend::Sqlite, None) => Arc::new(SqliteRecordStore::open_in_memory()?),
            (StoreBackend::Sqlite, Some(path)) => {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                Arc::new(SqliteRecordStore::open(&path).inspect_err(|err| {
                    error!(
                        "event=stack_open module=stack status=error model={} error_code=store_open_failed error={}",
                        config.model_name, err
                    );
                })?)
            }
        };

        let stack = Self::with_store(store)?;
        info!(
            "event=stack_open module=stack status=ok model={} backend={} in_memory={} duration_ms={}",
            config.model_name,
            stack.store.backend_name(),
            config.in_memory,
            started_at.elapsed().as_millis()
        );
        Ok(stack)
    }

    /// Builds a stack around an existing store.
    pub fn with_store(store: Arc<dyn RecordStore>) -> Result<Self, StackError> {
        let read = ContextQueue::spawn(Context::new(ContextKind::Read, Arc::clone(&store)))?;
        let mutation =
            ContextQueue::spawn(Context::new(ContextKind::Mutation, Arc::clone(&store)))?;
        Ok(Self {
            store,
            read,
            mutation,
        })
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Queue owning the read context.
    pub fn read_queue(&self) -> &ContextQueue {
        &self.read
    }

    /// Queue owning the mutation context.
    pub fn mutation_queue(&self) -> &ContextQueue {
        &self.mutation
    }

    /// Builds a mutation job: `stage` amends the mutation context, the job
    /// then commits and merges the committed changes into the read context.
    ///
    /// A failed commit is reported once and its changes are discarded, so the
    /// long-lived mutation context starts every job clean. The returned job
    /// is meant to run on the mutation queue.
    pub(crate) fn write_job<S, T>(
        &self,
        stage: S,
    ) -> impl FnOnce(&mut Context) -> StoreResult<(T, WriteOutcome)> + Send + 'static
    where
        S: FnOnce(&mut Context) -> T + Send + 'static,
        T: Send + 'static,
    {
        let read = self.read.handle().ok();
        move |ctx: &mut Context| {
            let staged = stage(ctx);
            let committed = match ctx.commit() {
                Ok(committed) => committed,
                Err(err) => {
                    ctx.rollback();
                    return Err(err);
                }
            };
            let merge = match read {
                Some(read) => merge_into(&read, committed.clone()),
                None => MergeReport::default(),
            };
            Ok((
                staged,
                WriteOutcome {
                    committed: committed.len(),
                    merge,
                },
            ))
        }
    }

    /// Stops both workers, mutation first so pending merges still land.
    pub fn shutdown(&self) {
        self.mutation.shutdown();
        self.read.shutdown();
        info!("event=stack_shutdown module=stack status=ok");
    }
}

impl Drop for ContextStack {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn merge_into(read: &QueueHandle, committed: ChangeSet) -> MergeReport {
    if committed.is_empty() {
        return MergeReport::default();
    }
    match read.perform_and_wait(move |ctx: &mut Context| {
        MergeCoordinator::new().merge(ctx, &committed)
    }) {
        Ok(report) => report,
        Err(err) => {
            warn!(
                "event=context_merge module=stack status=skipped context={} error={}",
                read.kind(),
                err
            );
            MergeReport::default()
        }
    }
}
