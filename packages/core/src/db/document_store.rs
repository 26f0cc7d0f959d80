//! DocumentStore Trait - Remote Persistence Boundary
//!
//! The editing core talks to the remote store through exactly two calls: load the
//! whole document, and commit one batch of accumulated edits.
//!
//! # Design Decisions
//!
//! 1. **Async**: both calls cross the network in production
//! 2. **Dumb transport**: `save_batch` returns the decoded response even when it
//!    reports `success: false`; interpreting it is the reconciler's job
//! 3. **Typed errors**: failures surface as [`StoreError`] so callers can tell a
//!    rejected batch from an unreachable store
//!
//! # Examples
//!
//! ```rust
//! use cardtree_core::db::{DocumentStore, MemoryStore};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), cardtree_core::db::StoreError> {
//! let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
//! let document = store.load_document().await?;
//! assert!(document.is_empty());
//! # Ok(())
//! # }
//! ```

use crate::db::batch::{BatchRequest, BatchResponse};
use crate::db::error::StoreError;
use crate::models::DocumentSnapshot;
use async_trait::async_trait;

/// Remote document store
///
/// Implementations must be `Send + Sync` so a store can be shared across tasks
/// behind an `Arc`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch the full document: nodes, edges and cards
    async fn load_document(&self) -> Result<DocumentSnapshot, StoreError>;

    /// Commit one batch of edits
    ///
    /// # Errors
    ///
    /// Returns an error only when no decodable response was obtained. A response
    /// reporting `success: false` is returned as `Ok`.
    async fn save_batch(&self, request: &BatchRequest) -> Result<BatchResponse, StoreError>;
}
