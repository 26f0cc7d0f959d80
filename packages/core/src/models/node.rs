//! Node and Edge Data Structures
//!
//! This module defines the container entities of the document tree.
//!
//! # Architecture
//!
//! - **Node**: a container holding an ordered mix of child nodes and cards
//! - **Edge**: a directed `source → target` parent-child relation
//! - **Single parent**: every node has at most one incoming edge; a node without
//!   one is a root
//!
//! Nodes never point at each other directly. Parent/child structure lives in the
//! edge index owned by [`TreeModel`](crate::services::TreeModel), so a node can be
//! moved, renamed or remapped without chasing back-references.
//!
//! # Examples
//!
//! ```rust
//! use cardtree_core::models::{Edge, Node, NodeSeed};
//!
//! let seed = NodeSeed::new("Chapter 1");
//! let node = Node::from_seed("n1".to_string(), seed, 1);
//! assert_eq!(node.text, "Chapter 1");
//!
//! let edge = Edge::new("root".to_string(), node.id.clone());
//! assert_eq!(edge.target, "n1");
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canvas coordinates of a node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// Container entity of the document tree.
///
/// # Fields
///
/// - `id`: permanent store id or temporary `tmp-` id
/// - `text`: display name of the node
/// - `order`: position among siblings (nodes and cards share one ordering space)
/// - `expanded`: optional expand/collapse state, auto-saved
/// - `position`: optional canvas coordinates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,

    pub text: String,

    /// Sibling order, dense `1..n` after any reorder
    pub order: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    /// Build a node from creation seed fields
    pub fn from_seed(id: String, seed: NodeSeed, order: i64) -> Self {
        Self {
            id,
            text: seed.text,
            order,
            expanded: None,
            position: seed.position,
        }
    }

    /// Seed fields that reproduce this node's user-visible content
    pub fn to_seed(&self) -> NodeSeed {
        NodeSeed {
            text: self.text.clone(),
            position: self.position,
        }
    }
}

/// User-supplied fields for a node that does not exist yet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSeed {
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl NodeSeed {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            position: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Some(Position { x, y });
        self
    }
}

/// Directed parent → child relation between two nodes
///
/// Edge ids are never temporary: edges loaded from the store carry the store's id,
/// edges created locally get a client-minted UUID that the store adopts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,

    /// Parent node id
    pub source: String,

    /// Child node id
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Edge {
    /// Create an edge with a freshly minted UUID
    pub fn new(source: String, target: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            target,
            label: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_seed_round_trips_through_node() {
        let seed = NodeSeed::new("Intro").at(10.0, 20.0);
        let node = Node::from_seed("tmp-1".to_string(), seed.clone(), 3);

        assert_eq!(node.order, 3);
        assert_eq!(node.expanded, None);
        assert_eq!(node.to_seed(), seed);
    }

    #[test]
    fn test_edge_ids_are_unique_and_not_temporary() {
        let a = Edge::new("p".to_string(), "c1".to_string());
        let b = Edge::new("p".to_string(), "c2".to_string());

        assert_ne!(a.id, b.id);
        assert!(!crate::services::identifier::is_temporary(&a.id));
    }

    #[test]
    fn test_node_serializes_camel_case_and_skips_empty_optionals() {
        let node = Node::from_seed("n1".to_string(), NodeSeed::new("Root"), 1);
        let json = serde_json::to_value(&node).unwrap();

        assert_eq!(json["id"], "n1");
        assert_eq!(json["order"], 1);
        assert!(json.get("expanded").is_none());
        assert!(json.get("position").is_none());
    }
}
