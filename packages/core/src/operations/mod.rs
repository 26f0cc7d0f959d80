//! Editing Operations
//!
//! The closed set of edits an editing session accepts. Every variant is handled
//! exhaustively by [`EditorSession::apply`](crate::services::EditorSession::apply),
//! so adding an operation means adding a handler.
//!
//! Operations are serde-tagged, which lets externally generated edit lists (for
//! example from an assistant or a script) deserialize straight into them:
//!
//! ```rust
//! use cardtree_core::operations::Operation;
//!
//! let ops: Vec<Operation> = serde_json::from_str(r#"[
//!     {"type": "createNode", "parentId": null, "text": "Chapter 1"},
//!     {"type": "rename", "target": {"kind": "node", "id": "n1"}, "name": "Intro"}
//! ]"#).unwrap();
//! assert_eq!(ops[0].operation_type(), "createNode");
//! ```

pub mod error;

pub use error::TreeOperationError;

use crate::models::{EntityRef, Position};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single edit against the local document tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    /// New node as last child of `parent_id` (a root when absent)
    CreateNode {
        parent_id: Option<String>,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        position: Option<Position>,
    },

    /// New card as last child of `node_id`
    CreateCard {
        node_id: String,
        title: String,
        #[serde(default)]
        content: String,
    },

    /// Re-parent a node; `new_parent_id: null` makes it a root
    MoveNode {
        node_id: String,
        new_parent_id: Option<String>,
    },

    MoveCard {
        card_id: String,
        new_node_id: String,
    },

    /// Node text or card title
    Rename { target: EntityRef, name: String },

    UpdateContent { card_id: String, content: String },

    /// Cascading delete of a node, or delete of one card
    Delete { target: EntityRef },

    /// Append an opaque problem payload to a card
    CreateProblem { card_id: String, problem: Value },
}

impl Operation {
    /// Wire name of the operation
    pub fn operation_type(&self) -> &'static str {
        match self {
            Operation::CreateNode { .. } => "createNode",
            Operation::CreateCard { .. } => "createCard",
            Operation::MoveNode { .. } => "moveNode",
            Operation::MoveCard { .. } => "moveCard",
            Operation::Rename { .. } => "rename",
            Operation::UpdateContent { .. } => "updateContent",
            Operation::Delete { .. } => "delete",
            Operation::CreateProblem { .. } => "createProblem",
        }
    }
}

/// What an applied operation did
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome {
    /// A new entity with a temporary id
    Created(EntityRef),
    /// An existing entity changed
    Updated(EntityRef),
    /// Entities removed, the target first
    Deleted(Vec<EntityRef>),
}

impl OperationOutcome {
    /// Id of the created entity, if any
    pub fn created_id(&self) -> Option<&str> {
        match self {
            OperationOutcome::Created(entity) => Some(&entity.id),
            _ => None,
        }
    }
}
