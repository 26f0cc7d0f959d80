//! Card Data Structures
//!
//! Cards are the leaves of the document tree. A card is owned by exactly one node
//! through its `node_id` field (not through an edge) and shares its ordering space
//! with the owning node's child nodes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Leaf item owned by a node
///
/// `problems` is an opaque list of nested sub-items; the editing core only stores,
/// appends and forwards it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(rename = "docId")]
    pub id: String,

    /// Owning node
    pub node_id: String,

    pub title: String,

    pub content: String,

    /// Sibling order within the owning node (shared with child nodes)
    pub order: i64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<Value>,
}

impl Card {
    pub fn from_seed(id: String, node_id: String, seed: CardSeed, order: i64) -> Self {
        Self {
            id,
            node_id,
            title: seed.title,
            content: seed.content,
            order,
            problems: seed.problems,
        }
    }

    pub fn to_seed(&self) -> CardSeed {
        CardSeed {
            title: self.title.clone(),
            content: self.content.clone(),
            problems: self.problems.clone(),
        }
    }
}

/// User-supplied fields for a card that does not exist yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSeed {
    pub title: String,

    #[serde(default)]
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub problems: Vec<Value>,
}

impl CardSeed {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            problems: Vec::new(),
        }
    }
}
