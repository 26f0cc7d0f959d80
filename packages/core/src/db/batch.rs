//! Batch Wire Types
//!
//! One save is one `BatchRequest`: creates, updates and deletes for nodes, cards
//! and edges, serialized camelCase. The store answers with a `BatchResponse`
//! carrying temp → permanent identifier maps.
//!
//! Optional fields are omitted from the JSON when unset so an update only names
//! the fields that changed.

use crate::services::identifier::IdRemap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A node the store has never seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeCreate {
    pub temp_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
}

/// Changed fields of a persisted node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeUpdate {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expanded: Option<bool>,
}

/// A card the store has never seen
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardCreate {
    pub temp_id: String,
    pub node_id: String,
    pub title: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problems: Option<Vec<Value>>,
}

/// Changed fields of a persisted card; `node_id` is always the current owner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardUpdate {
    pub card_id: String,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problems: Option<Vec<Value>>,
}

/// A parent → child edge with its client-minted id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeCreate {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Everything one save sends
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    #[serde(default)]
    pub node_creates: Vec<NodeCreate>,
    #[serde(default)]
    pub node_updates: Vec<NodeUpdate>,
    #[serde(default)]
    pub node_deletes: Vec<String>,
    #[serde(default)]
    pub card_creates: Vec<CardCreate>,
    #[serde(default)]
    pub card_updates: Vec<CardUpdate>,
    #[serde(default)]
    pub card_deletes: Vec<String>,
    #[serde(default)]
    pub edge_creates: Vec<EdgeCreate>,
    #[serde(default)]
    pub edge_deletes: Vec<String>,
}

impl BatchRequest {
    pub fn is_empty(&self) -> bool {
        self.node_creates.is_empty()
            && self.node_updates.is_empty()
            && self.node_deletes.is_empty()
            && self.card_creates.is_empty()
            && self.card_updates.is_empty()
            && self.card_deletes.is_empty()
            && self.edge_creates.is_empty()
            && self.edge_deletes.is_empty()
    }

    /// Temporary node and card ids submitted as creates
    pub fn temp_ids(&self) -> impl Iterator<Item = &str> {
        self.node_creates
            .iter()
            .map(|c| c.temp_id.as_str())
            .chain(self.card_creates.iter().map(|c| c.temp_id.as_str()))
    }

    /// Total number of records across all lists
    pub fn len(&self) -> usize {
        self.node_creates.len()
            + self.node_updates.len()
            + self.node_deletes.len()
            + self.card_creates.len()
            + self.card_updates.len()
            + self.card_deletes.len()
            + self.edge_creates.len()
            + self.edge_deletes.len()
    }
}

/// Store answer to a [`BatchRequest`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id_map: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id_map: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

impl BatchResponse {
    /// Successful response with the given maps and no errors
    pub fn applied(nodes: HashMap<String, String>, cards: HashMap<String, String>) -> Self {
        Self {
            success: true,
            node_id_map: Some(nodes),
            card_id_map: Some(cards),
            errors: None,
        }
    }

    pub fn errors(&self) -> &[String] {
        self.errors.as_deref().unwrap_or_default()
    }

    /// Identifier maps as a remap table
    pub fn to_remap(&self) -> IdRemap {
        IdRemap::new(
            self.node_id_map.clone().unwrap_or_default(),
            self.card_id_map.clone().unwrap_or_default(),
        )
    }
}
