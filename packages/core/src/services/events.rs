//! Editor Events
//!
//! Notifications emitted by the editing session over a tokio broadcast channel,
//! so a UI layer can react to saves and rejected operations without polling.
//!
//! # Event Flow
//!
//! 1. The session starts a save, finishes one, or rejects an operation
//! 2. An [`EditorEvent`] is sent on the broadcast channel
//! 3. Every subscriber receives it; sending with no subscribers is not an error

use serde::{Deserialize, Serialize};

/// Events emitted by the editing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EditorEvent {
    /// A batch was compiled and is being sent
    SaveStarted { records: usize },

    /// The store accepted the batch
    SaveCompleted {
        /// Number of temporary ids replaced by permanent ones
        remapped: usize,
        /// Partial errors reported by the store
        warnings: Vec<String>,
    },

    /// The save failed; pending edits are kept for retry
    SaveFailed { message: String },

    /// An operation violated a tree invariant and was not applied
    OperationRejected { message: String },
}

impl EditorEvent {
    /// Get a string representation of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            EditorEvent::SaveStarted { .. } => "save_started",
            EditorEvent::SaveCompleted { .. } => "save_completed",
            EditorEvent::SaveFailed { .. } => "save_failed",
            EditorEvent::OperationRejected { .. } => "operation_rejected",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = EditorEvent::SaveCompleted {
            remapped: 2,
            warnings: vec!["edge skipped".into()],
        };
        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({"type": "saveCompleted", "remapped": 2, "warnings": ["edge skipped"]})
        );
        assert_eq!(event.event_type(), "save_completed");
    }
}
