//! Entity references shared by the tree model, ledger, clipboard and selection

use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of entity that live in the document tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Node,
    Card,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Node => "node",
            EntityKind::Card => "card",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-tagged identifier of a node or card
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: String,
}

impl EntityRef {
    pub fn node(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Node,
            id: id.into(),
        }
    }

    pub fn card(id: impl Into<String>) -> Self {
        Self {
            kind: EntityKind::Card,
            id: id.into(),
        }
    }

    pub fn is_node(&self) -> bool {
        self.kind == EntityKind::Node
    }

    pub fn is_card(&self) -> bool {
        self.kind == EntityKind::Card
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.id)
    }
}
