//! Embedded record store with a read context, a mutation context and
//! merge-on-save propagation between them.

pub mod config;
pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod service;
pub mod stack;
pub mod store;

pub use config::{ConfigError, StoreBackend, StoreConfiguration};
pub use context::merge::{MergeCoordinator, MergeReport};
pub use context::queue::{ContextQueue, QueueError, QueueHandle};
pub use context::{Context, ContextKind, ContextState};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings};
pub use model::change_set::ChangeSet;
pub use model::query::{FetchRequest, Predicate, QueryError, SortDescriptor};
pub use model::record::{FieldValue, RecordId, RecordKey, StoredRecord, ID_FIELD};
pub use model::representable::Representable;
pub use service::error::{ServiceError, ServiceResult};
pub use service::record_service::RecordService;
pub use stack::{ContextStack, StackError, WriteOutcome};
pub use store::{
    BackendError, MemoryRecordStore, RecordStore, SqliteRecordStore, StoreError, StoreResult,
};

/// Minimal health-check API.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
