//! Session Error Types
//!
//! Errors surfaced by the editing session: rejected operations, failed saves and
//! misuse of the save cycle.

use crate::db::StoreError;
use crate::operations::TreeOperationError;
use thiserror::Error;

/// Editing session errors
///
/// Partial remote errors are not errors; they arrive as warnings in a
/// [`SaveReport`](crate::services::SaveReport).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// Local invariant violation; nothing was changed
    #[error(transparent)]
    Operation(#[from] TreeOperationError),

    /// Save failed; the ledger is intact and the save can be retried
    #[error("Save failed: {0}")]
    Store(#[from] StoreError),

    /// A save is already outstanding
    #[error("A save is already in progress")]
    SaveInProgress,

    /// `finish_save` called without a matching `begin_save`
    #[error("No save is in flight")]
    NoSaveInFlight,
}

impl SessionError {
    /// True when retrying the save may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_) | Self::SaveInProgress)
    }
}

/// `apply_all` stopped at a rejected operation
///
/// Operations before `applied` stay applied; the rejected one changed nothing.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Operation {applied} ({operation}) was rejected: {source}")]
pub struct PartialApply {
    /// Number of operations applied before the rejection
    pub applied: usize,
    pub operation: &'static str,
    #[source]
    pub source: SessionError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_error_is_transparent() {
        let err: SessionError = TreeOperationError::EmptyClipboard.into();
        assert_eq!(err.to_string(), "Nothing to paste: the clipboard is empty");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_store_error_is_retryable() {
        let err: SessionError = StoreError::transport("connection refused").into();
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Save failed: Document store unreachable: connection refused"
        );
    }
}
