//! Error types for tree editing operations
//!
//! These are the invariant violations caught client-side before anything reaches
//! the ledger or the network. Every variant renders a message suitable for showing
//! to the user as-is.

use crate::models::EntityKind;
use thiserror::Error;

/// Errors that can occur while editing the local document tree
///
/// A rejected operation never mutates the tree or the ledger.
///
/// # Examples
///
/// ```rust
/// use cardtree_core::operations::TreeOperationError;
///
/// let err = TreeOperationError::circular_move("a".to_string(), "b".to_string());
/// assert_eq!(
///     err.to_string(),
///     "Cannot move node 'a' under 'b': the target is the node itself or one of its descendants"
/// );
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TreeOperationError {
    /// Referenced node does not exist
    #[error("Node '{node_id}' does not exist")]
    NodeNotFound { node_id: String },

    /// Referenced card does not exist
    #[error("Card '{card_id}' does not exist")]
    CardNotFound { card_id: String },

    /// Moving a node under itself or one of its descendants
    #[error("Cannot move node '{node_id}' under '{target_id}': the target is the node itself or one of its descendants")]
    CircularMove { node_id: String, target_id: String },

    /// Rename to an empty or whitespace-only name
    #[error("Name of {kind} '{id}' cannot be empty")]
    EmptyName { kind: EntityKind, id: String },

    /// Reorder list is not a permutation of the sibling group
    #[error("Invalid reorder: {reason}")]
    MalformedReorder { reason: String },

    /// A card needs an owning node
    #[error("Card '{card_id}' must belong to a node")]
    CardRequiresNode { card_id: String },

    /// Paste with nothing copied or cut
    #[error("Nothing to paste: the clipboard is empty")]
    EmptyClipboard,

    /// Paste target cannot receive the clipboard contents
    #[error("Invalid paste target: {reason}")]
    InvalidPasteTarget { reason: String },

    /// Loaded document violates a tree invariant
    #[error("Invalid document: {reason}")]
    InvalidDocument { reason: String },
}

impl TreeOperationError {
    pub fn node_not_found(node_id: String) -> Self {
        Self::NodeNotFound { node_id }
    }

    pub fn card_not_found(card_id: String) -> Self {
        Self::CardNotFound { card_id }
    }

    pub fn circular_move(node_id: String, target_id: String) -> Self {
        Self::CircularMove { node_id, target_id }
    }

    pub fn empty_name(kind: EntityKind, id: String) -> Self {
        Self::EmptyName { kind, id }
    }

    pub fn malformed_reorder(reason: impl Into<String>) -> Self {
        Self::MalformedReorder {
            reason: reason.into(),
        }
    }

    pub fn card_requires_node(card_id: String) -> Self {
        Self::CardRequiresNode { card_id }
    }

    pub fn invalid_paste_target(reason: impl Into<String>) -> Self {
        Self::InvalidPasteTarget {
            reason: reason.into(),
        }
    }

    pub fn invalid_document(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }
}
