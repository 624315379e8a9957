//! Service-level error taxonomy.

use crate::context::queue::QueueError;
use crate::stack::StackError;
use crate::store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error returned by every `RecordService` operation.
///
/// Each variant wraps the underlying cause, reachable through `source()`.
#[derive(Debug)]
pub enum ServiceError {
    /// The record store could not be opened.
    LoadFailed(StackError),
    /// Fetch failed; no partial results are returned.
    FetchFailed(StoreError),
    /// Insert or save failed; committed state is unchanged.
    SaveFailed(StoreError),
    /// Delete failed; committed state is unchanged.
    DeleteFailed(StoreError),
    /// The target context queue is shut down or its job was interrupted.
    Unavailable(QueueError),
}

impl ServiceError {
    /// Stable short code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::LoadFailed(_) => "load_failed",
            Self::FetchFailed(_) => "fetch_failed",
            Self::SaveFailed(_) => "save_failed",
            Self::DeleteFailed(_) => "delete_failed",
            Self::Unavailable(_) => "unavailable",
        }
    }

    /// Underlying store error, when the failure came from the store.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::FetchFailed(err) | Self::SaveFailed(err) | Self::DeleteFailed(err) => Some(err),
            Self::LoadFailed(_) | Self::Unavailable(_) => None,
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::LoadFailed(err) => write!(f, "failed to load record store: {err}"),
            Self::FetchFailed(err) => write!(f, "failed to fetch records: {err}"),
            Self::SaveFailed(err) => write!(f, "failed to save context: {err}"),
            Self::DeleteFailed(err) => write!(f, "failed to delete record: {err}"),
            Self::Unavailable(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::LoadFailed(err) => Some(err),
            Self::FetchFailed(err) | Self::SaveFailed(err) | Self::DeleteFailed(err) => Some(err),
            Self::Unavailable(err) => Some(err),
        }
    }
}

impl From<StackError> for ServiceError {
    fn from(value: StackError) -> Self {
        Self::LoadFailed(value)
    }
}

impl From<QueueError> for ServiceError {
    fn from(value: QueueError) -> Self {
        Self::Unavailable(value)
    }
}
