//! Record service facade.
//!
//! # Responsibility
//! - Offer fetch/insert/delete/save over typed models and raw records.
//! - Route reads to the read context and writes to the mutation context.
//! - Translate store and queue failures into `ServiceError`.
//!
//! # Invariants
//! - Every write commits immediately; there is no deferred batching.
//! - Each operation is attempted once; failures are never retried.
//! - Blocking and `*_async` variants share the same jobs and semantics.
//!
//! # See also
//! - `stack.rs` for the context ownership and merge wiring.

use crate::config::StoreConfiguration;
use crate::context::queue::QueueError;
use crate::context::Context;
use crate::model::query::{FetchRequest, Predicate, QueryError, SortDescriptor};
use crate::model::record::{RecordId, StoredRecord};
use crate::model::representable::Representable;
use crate::service::error::{ServiceError, ServiceResult};
use crate::stack::{ContextStack, StackError, WriteOutcome};
use crate::store::{StoreError, StoreResult};
use log::{debug, error};
use std::sync::Arc;
use std::time::Instant;

type WriteResult<T> = Result<StoreResult<(T, WriteOutcome)>, QueueError>;

/// Public operation surface over a context stack.
///
/// Cloning is cheap; clones share the same stack.
#[derive(Clone)]
pub struct RecordService {
    stack: Arc<ContextStack>,
}

impl RecordService {
    /// Wraps an already opened stack.
    pub fn new(stack: Arc<ContextStack>) -> Self {
        Self { stack }
    }

    /// Opens the configured store and starts its contexts.
    ///
    /// # Errors
    /// - Returns `ServiceError::LoadFailed` when configuration or the backend
    ///   is rejected.
    pub fn open(config: &StoreConfiguration) -> ServiceResult<Self> {
        let stack = ContextStack::open(config).map_err(|err: StackError| {
            error!(
                "event=service_open module=service status=error model={} error_code=load_failed error={}",
                config.model_name, err
            );
            ServiceError::LoadFailed(err)
        })?;
        Ok(Self::new(Arc::new(stack)))
    }

    pub fn stack(&self) -> &Arc<ContextStack> {
        &self.stack
    }

    // Fetch ------------------------------------------------------------------

    /// Fetches models of type `M` through the read context.
    pub fn fetch_models<M: Representable>(
        &self,
        predicate: Option<Predicate>,
        sort: Option<Vec<SortDescriptor>>,
    ) -> ServiceResult<Vec<M>> {
        self.fetch_models_with(model_request::<M>(predicate, sort))
    }

    /// Async variant of [`Self::fetch_models`].
    pub async fn fetch_models_async<M: Representable>(
        &self,
        predicate: Option<Predicate>,
        sort: Option<Vec<SortDescriptor>>,
    ) -> ServiceResult<Vec<M>> {
        self.fetch_models_with_async(model_request::<M>(predicate, sort))
            .await
    }

    /// Fetches models of type `M` with a caller-built request.
    ///
    /// The request must target `M::ENTITY`.
    pub fn fetch_models_with<M: Representable>(
        &self,
        request: FetchRequest,
    ) -> ServiceResult<Vec<M>> {
        check_model_entity::<M>(&request)?;
        let records = self.fetch_records_with(request)?;
        Ok(records.iter().map(M::from_stored).collect())
    }

    /// Async variant of [`Self::fetch_models_with`].
    pub async fn fetch_models_with_async<M: Representable>(
        &self,
        request: FetchRequest,
    ) -> ServiceResult<Vec<M>> {
        check_model_entity::<M>(&request)?;
        let records = self.fetch_records_with_async(request).await?;
        Ok(records.iter().map(M::from_stored).collect())
    }

    /// Fetches raw stored records of `entity`.
    pub fn fetch_records(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        sort: Option<Vec<SortDescriptor>>,
    ) -> ServiceResult<Vec<StoredRecord>> {
        self.fetch_records_with(
            FetchRequest::new(entity)
                .with_predicate(predicate)
                .with_sort(sort),
        )
    }

    /// Async variant of [`Self::fetch_records`].
    pub async fn fetch_records_async(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        sort: Option<Vec<SortDescriptor>>,
    ) -> ServiceResult<Vec<StoredRecord>> {
        self.fetch_records_with_async(
            FetchRequest::new(entity)
                .with_predicate(predicate)
                .with_sort(sort),
        )
        .await
    }

    /// Fetches raw stored records with a caller-built request.
    pub fn fetch_records_with(&self, request: FetchRequest) -> ServiceResult<Vec<StoredRecord>> {
        let started_at = Instant::now();
        let entity = request.entity.clone();
        let result = self
            .stack
            .read_queue()
            .perform_and_wait(move |ctx: &mut Context| ctx.read(&request));
        finish_fetch(&entity, started_at, result)
    }

    /// Async variant of [`Self::fetch_records_with`].
    pub async fn fetch_records_with_async(
        &self,
        request: FetchRequest,
    ) -> ServiceResult<Vec<StoredRecord>> {
        let started_at = Instant::now();
        let entity = request.entity.clone();
        let result = self
            .stack
            .read_queue()
            .perform(move |ctx: &mut Context| ctx.read(&request))
            .await;
        finish_fetch(&entity, started_at, result)
    }

    // Insert -----------------------------------------------------------------

    /// Maps `model`, stages it on the mutation context and commits.
    ///
    /// Returns the identifier the record was stored under.
    pub fn insert_model<M: Representable>(&self, model: &M) -> ServiceResult<RecordId> {
        let started_at = Instant::now();
        let job = self.stack.write_job(stage_model(model.clone()));
        let result = self.stack.mutation_queue().perform_and_wait(job);
        finish_write("insert", M::ENTITY, started_at, result, ServiceError::SaveFailed)
    }

    /// Async variant of [`Self::insert_model`].
    pub async fn insert_model_async<M: Representable>(&self, model: &M) -> ServiceResult<RecordId> {
        let started_at = Instant::now();
        let job = self.stack.write_job(stage_model(model.clone()));
        let result = self.stack.mutation_queue().perform(job).await;
        finish_write("insert", M::ENTITY, started_at, result, ServiceError::SaveFailed)
    }

    /// Stages a raw record on the mutation context and commits.
    pub fn insert_record(&self, record: StoredRecord) -> ServiceResult<RecordId> {
        let started_at = Instant::now();
        let entity = record.entity.clone();
        let job = self.stack.write_job(stage_record(record));
        let result = self.stack.mutation_queue().perform_and_wait(job);
        finish_write("insert", &entity, started_at, result, ServiceError::SaveFailed)
    }

    /// Async variant of [`Self::insert_record`].
    pub async fn insert_record_async(&self, record: StoredRecord) -> ServiceResult<RecordId> {
        let started_at = Instant::now();
        let entity = record.entity.clone();
        let job = self.stack.write_job(stage_record(record));
        let result = self.stack.mutation_queue().perform(job).await;
        finish_write("insert", &entity, started_at, result, ServiceError::SaveFailed)
    }

    // Delete -----------------------------------------------------------------

    /// Deletes the record mirrored by `model` and commits.
    ///
    /// A model without an identifier was never stored; this is a no-op.
    pub fn delete_model<M: Representable>(&self, model: &M) -> ServiceResult<()> {
        match model.id() {
            Some(id) => self.delete_record(M::ENTITY, id),
            None => {
                log_skipped_delete(M::ENTITY);
                Ok(())
            }
        }
    }

    /// Async variant of [`Self::delete_model`].
    pub async fn delete_model_async<M: Representable>(&self, model: &M) -> ServiceResult<()> {
        match model.id() {
            Some(id) => self.delete_record_async(M::ENTITY, id).await,
            None => {
                log_skipped_delete(M::ENTITY);
                Ok(())
            }
        }
    }

    /// Stages a delete of `(entity, id)` and commits. Absent records are a
    /// no-op.
    pub fn delete_record(&self, entity: &str, id: RecordId) -> ServiceResult<()> {
        let started_at = Instant::now();
        let job = self.stack.write_job(stage_delete(entity.to_string(), id));
        let result = self.stack.mutation_queue().perform_and_wait(job);
        finish_write("delete", entity, started_at, result, ServiceError::DeleteFailed)
    }

    /// Async variant of [`Self::delete_record`].
    pub async fn delete_record_async(&self, entity: &str, id: RecordId) -> ServiceResult<()> {
        let started_at = Instant::now();
        let job = self.stack.write_job(stage_delete(entity.to_string(), id));
        let result = self.stack.mutation_queue().perform(job).await;
        finish_write("delete", entity, started_at, result, ServiceError::DeleteFailed)
    }

    // Read-context edits -----------------------------------------------------

    /// Stages an edit of a fetched record directly on the read context.
    ///
    /// The edit stays pending until [`Self::save`]; later mutation commits of
    /// the same record are merged into it field-by-field.
    pub fn edit_record(&self, record: StoredRecord) -> ServiceResult<()> {
        self.stack
            .read_queue()
            .perform_and_wait(move |ctx: &mut Context| ctx.stage_upsert(record))
            .map_err(ServiceError::from)
    }

    /// Async variant of [`Self::edit_record`].
    pub async fn edit_record_async(&self, record: StoredRecord) -> ServiceResult<()> {
        self.stack
            .read_queue()
            .perform(move |ctx: &mut Context| ctx.stage_upsert(record))
            .await
            .map_err(ServiceError::from)
    }

    /// Returns the read context's pending edit of `(entity, id)`, if any.
    pub fn pending_edit(&self, entity: &str, id: RecordId) -> ServiceResult<Option<StoredRecord>> {
        let entity = entity.to_string();
        self.stack
            .read_queue()
            .perform_and_wait(move |ctx: &mut Context| ctx.pending_record(&entity, id).cloned())
            .map_err(ServiceError::from)
    }

    /// Commits the read context's pending edits.
    ///
    /// On failure the edits stay pending so the caller may save again.
    pub fn save(&self) -> ServiceResult<()> {
        let started_at = Instant::now();
        let result = self
            .stack
            .read_queue()
            .perform_and_wait(|ctx: &mut Context| ctx.commit().map(|committed| committed.len()));
        finish_save(started_at, result)
    }

    /// Async variant of [`Self::save`].
    pub async fn save_async(&self) -> ServiceResult<()> {
        let started_at = Instant::now();
        let result = self
            .stack
            .read_queue()
            .perform(|ctx: &mut Context| ctx.commit().map(|committed| committed.len()))
            .await;
        finish_save(started_at, result)
    }

    /// Stops both context workers. Later calls fail with `Unavailable`.
    pub fn shutdown(&self) {
        self.stack.shutdown();
    }
}

fn model_request<M: Representable>(
    predicate: Option<Predicate>,
    sort: Option<Vec<SortDescriptor>>,
) -> FetchRequest {
    FetchRequest::new(M::ENTITY)
        .with_predicate(predicate)
        .with_sort(sort)
}

fn check_model_entity<M: Representable>(request: &FetchRequest) -> ServiceResult<()> {
    if request.entity != M::ENTITY {
        return Err(ServiceError::FetchFailed(StoreError::InvalidQuery(
            QueryError::EntityMismatch {
                expected: M::ENTITY.to_string(),
                actual: request.entity.clone(),
            },
        )));
    }
    Ok(())
}

fn stage_model<M: Representable>(
    model: M,
) -> impl FnOnce(&mut Context) -> RecordId + Send + 'static {
    move |ctx: &mut Context| {
        let record = model.to_stored(ctx);
        let id = record.id;
        ctx.stage_upsert(record);
        id
    }
}

fn stage_record(record: StoredRecord) -> impl FnOnce(&mut Context) -> RecordId + Send + 'static {
    move |ctx: &mut Context| {
        let id = record.id;
        ctx.stage_upsert(record);
        id
    }
}

fn stage_delete(entity: String, id: RecordId) -> impl FnOnce(&mut Context) + Send + 'static {
    move |ctx: &mut Context| ctx.stage_delete(&entity, id)
}

fn finish_fetch(
    entity: &str,
    started_at: Instant,
    result: Result<StoreResult<Vec<StoredRecord>>, QueueError>,
) -> ServiceResult<Vec<StoredRecord>> {
    let outcome = match result {
        Ok(Ok(records)) => Ok(records),
        Ok(Err(err)) => Err(ServiceError::FetchFailed(err)),
        Err(err) => Err(ServiceError::Unavailable(err)),
    };
    match &outcome {
        Ok(records) => debug!(
            "event=record_fetch module=service status=ok entity={} count={} duration_ms={}",
            entity,
            records.len(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => log_failure("fetch", entity, started_at, err),
    }
    outcome
}

fn finish_write<T>(
    op: &'static str,
    entity: &str,
    started_at: Instant,
    result: WriteResult<T>,
    wrap: fn(StoreError) -> ServiceError,
) -> ServiceResult<T> {
    match result {
        Ok(Ok((value, outcome))) => {
            debug!(
                "event=record_{} module=service status=ok entity={} committed={} merged={} discarded={} duration_ms={}",
                op,
                entity,
                outcome.committed,
                outcome.merge.merged,
                outcome.merge.discarded,
                started_at.elapsed().as_millis()
            );
            Ok(value)
        }
        Ok(Err(err)) => {
            let err = wrap(err);
            log_failure(op, entity, started_at, &err);
            Err(err)
        }
        Err(err) => {
            let err = ServiceError::Unavailable(err);
            log_failure(op, entity, started_at, &err);
            Err(err)
        }
    }
}

fn finish_save(
    started_at: Instant,
    result: Result<StoreResult<usize>, QueueError>,
) -> ServiceResult<()> {
    match result {
        Ok(Ok(committed)) => {
            debug!(
                "event=context_save module=service status=ok context=read committed={} duration_ms={}",
                committed,
                started_at.elapsed().as_millis()
            );
            Ok(())
        }
        Ok(Err(err)) => {
            let err = ServiceError::SaveFailed(err);
            log_failure("save", "*", started_at, &err);
            Err(err)
        }
        Err(err) => {
            let err = ServiceError::Unavailable(err);
            log_failure("save", "*", started_at, &err);
            Err(err)
        }
    }
}

fn log_skipped_delete(entity: &str) {
    debug!(
        "event=record_delete module=service status=skipped entity={} reason=no_id",
        entity
    );
}

fn log_failure(op: &str, entity: &str, started_at: Instant, err: &ServiceError) {
    error!(
        "event=record_{} module=service status=error entity={} duration_ms={} error_code={} error={}",
        op,
        entity,
        started_at.elapsed().as_millis(),
        err.code(),
        err
    );
}
