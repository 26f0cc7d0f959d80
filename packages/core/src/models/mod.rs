//! Data Models
//!
//! This module contains the entities of the document tree:
//!
//! - `Node` - container entity with sibling order and optional expand state
//! - `Edge` - single parent → child relation
//! - `Card` - leaf item owned by one node
//! - `EntityRef` - kind-tagged id used by the ledger, clipboard and selection
//! - `DocumentSnapshot` - a whole document as delivered by the store

mod card;
mod entity;
mod node;
mod snapshot;

pub use card::{Card, CardSeed};
pub use entity::{EntityKind, EntityRef};
pub use node::{Edge, Node, NodeSeed, Position};
pub use snapshot::DocumentSnapshot;
