//! Editing Services
//!
//! This module contains the editing core:
//!
//! - `TreeModel` - nodes, edges and cards with their structural invariants
//! - `PendingChangeLedger` - local edits not yet acknowledged by the store
//! - `IdentifierLifecycle` - temporary ids and their rewrite to permanent ones
//! - `TransferEngine` - copy, cut and paste of subtrees and cards
//! - `BatchReconciler` - single-flight save cycle against the document store
//! - `ExpansionAutosave` - debounced save of expand/collapse toggles
//! - `EditorSession` - the façade tying all of the above together
//!
//! Services never talk to the network directly; every save goes through a
//! [`DocumentStore`](crate::db::DocumentStore).

pub mod autosave;
pub mod card_repository;
pub mod editor_session;
pub mod error;
pub mod events;
pub mod identifier;
pub mod ledger;
pub mod reconciliation;
pub mod selection;
pub mod transfer;
pub mod tree_model;

pub use autosave::ExpansionAutosave;
pub use card_repository::CardRepository;
pub use editor_session::{EditorSession, SessionResult, SharedEditorSession};
pub use error::{PartialApply, SessionError};
pub use events::EditorEvent;
pub use identifier::{is_temporary, IdRemap, IdentifierLifecycle, Provenance, Remappable};
pub use ledger::{LedgerEffect, PendingChangeLedger};
pub use reconciliation::{BatchReconciler, SaveReport, SaveState, SaveTicket};
pub use selection::Selection;
pub use transfer::{Clipboard, ClipboardMode, PasteOutcome, TransferEngine};
pub use tree_model::{TreeModel, TreeResult};
