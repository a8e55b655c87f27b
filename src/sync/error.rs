//! Sync error types.

use thiserror::Error;

use crate::db::StoreError;
use crate::remote::RemoteError;

/// Errors surfaced by the sync cycle and the conflict resolver.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local persistence failed. The change is not durable yet.
    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(#[from] StoreError),

    /// Network or backend failure. Nothing persisted was changed.
    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(#[from] RemoteError),

    /// The chosen resolution could not be persisted. The record stays conflicted.
    #[error("Could not apply resolution: {0}")]
    ApplyFailed(String),

    #[error("Diet record for '{0}' is not in conflict")]
    NotConflicted(String),

    /// A resolution for this record is open and must be completed first.
    #[error("A conflict resolution for '{0}' is in progress")]
    ResolutionPending(String),

    #[error("A sync for '{0}' is already running")]
    Busy(String),

    #[error("No diet record for '{0}'")]
    NoRecord(String),
}

impl SyncError {
    /// Failures that a later trigger may succeed at.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::StorageUnavailable(_)
                | SyncError::RemoteUnavailable(_)
                | SyncError::ApplyFailed(_)
                | SyncError::Busy(_)
        )
    }
}
