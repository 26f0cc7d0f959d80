//! Document snapshot as loaded from the document store

use super::{Card, Edge, Node};
use serde::{Deserialize, Serialize};

/// Full content of one document: every node, edge and card
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSnapshot {
    #[serde(default)]
    pub nodes: Vec<Node>,

    #[serde(default)]
    pub edges: Vec<Edge>,

    #[serde(default)]
    pub cards: Vec<Card>,
}

impl DocumentSnapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.cards.is_empty()
    }
}
