//! Document Store Layer
//!
//! This module handles everything that crosses the network boundary:
//!
//! - Batch wire types (`BatchRequest` / `BatchResponse`)
//! - The `DocumentStore` trait the editing core is written against
//! - An HTTP implementation over `reqwest`
//! - An in-memory implementation for offline use and tests
//!
//! # Architecture
//!
//! The store is deliberately thin. It receives one batch per save and answers
//! with temp → permanent identifier maps; all interpretation of the answer
//! (failure policy, partial errors, identifier rewriting) lives in
//! [`services::reconciliation`](crate::services::reconciliation).

pub mod batch;
mod document_store;
mod error;
mod http_store;
mod memory_store;

pub use batch::{
    BatchRequest, BatchResponse, CardCreate, CardUpdate, EdgeCreate, NodeCreate, NodeUpdate,
};
pub use document_store::DocumentStore;
pub use error::StoreError;
pub use http_store::HttpStore;
pub use memory_store::MemoryStore;
