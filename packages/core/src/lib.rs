//! CardTree Editing Core
//!
//! This crate holds the client-side editing state of a CardTree document: a tree of
//! nodes whose leaves are cards. Edits apply to the local tree immediately, are
//! recorded in a pending change ledger, and reach the remote document store as one
//! batch per save.
//!
//! # Architecture
//!
//! - **Optimistic local edits**: the tree is always the user's view; the store is
//!   told later
//! - **Temporary identifiers**: new entities get `tmp-` ids until the store answers
//!   with permanent ones, then every reference is rewritten in one pass
//! - **Single-flight saves**: at most one batch is outstanding; edits made while it
//!   is in flight are kept for the next save
//!
//! # Modules
//!
//! - [`models`] - Nodes, edges, cards and document snapshots
//! - [`operations`] - The closed set of edits and their errors
//! - [`services`] - Tree model, ledger, transfer engine, reconciliation and the session
//! - [`db`] - Batch wire format and document store implementations
//! - [`config`] - Environment-driven editor configuration

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::EditorConfig;
pub use db::{DocumentStore, HttpStore, MemoryStore, StoreError};
pub use models::*;
pub use operations::{Operation, OperationOutcome, TreeOperationError};
pub use services::*;

/// Install a `tracing` subscriber filtered by `RUST_LOG` (default `info`)
///
/// Safe to call more than once; only the first call installs anything.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
