//! Editing Session
//!
//! One open document: the tree model, the pending change ledger, temporary id
//! bookkeeping, clipboard, selection and the save state machine, behind a single
//! façade. Every user edit goes through here so the tree and the ledger change
//! together or not at all.
//!
//! # Architecture
//!
//! - **Synchronous edits**: every mutation runs to completion inside one call; a
//!   rejected edit changes nothing and emits [`EditorEvent::OperationRejected`]
//! - **Explicit save**: [`EditorSession::begin_save`] freezes a request,
//!   [`EditorSession::finish_save`] applies the answer. Edits made in between
//!   belong to the next save.
//! - **Shared use**: [`SharedEditorSession`] wraps the session in a tokio mutex and
//!   releases it while the batch is on the network
//!
//! # Examples
//!
//! ```rust
//! use cardtree_core::db::MemoryStore;
//! use cardtree_core::models::{CardSeed, NodeSeed};
//! use cardtree_core::services::EditorSession;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), cardtree_core::services::SessionError> {
//! let store = MemoryStore::new();
//! let mut session = EditorSession::new();
//!
//! let chapter = session.create_node(None, NodeSeed::new("Chapter 1"))?;
//! session.create_card(&chapter, CardSeed::new("Question", "What is 2+2?"))?;
//!
//! let report = session.save(&store).await?;
//! assert_eq!(report.remap.node_count(), 1);
//! assert!(!session.has_unsaved_changes());
//! # Ok(())
//! # }
//! ```

use crate::config::EditorConfig;
use crate::db::batch::{BatchRequest, BatchResponse};
use crate::db::{DocumentStore, StoreError};
use crate::models::{CardSeed, DocumentSnapshot, EntityKind, EntityRef, NodeSeed};
use crate::operations::{Operation, OperationOutcome, TreeOperationError};
use crate::services::autosave::ExpansionAutosave;
use crate::services::error::{PartialApply, SessionError};
use crate::services::events::EditorEvent;
use crate::services::identifier::{is_temporary, IdentifierLifecycle, Provenance, Remappable};
use crate::services::ledger::{CreateSeed, DeleteRecord, LedgerEffect, PendingChangeLedger};
use crate::services::reconciliation::{BatchReconciler, SaveReport, SaveState, SaveTicket};
use crate::services::selection::Selection;
use crate::services::transfer::{Clipboard, PasteOutcome, TransferEngine};
use crate::services::tree_model::TreeModel;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex, MutexGuard};

pub type SessionResult<T> = Result<T, SessionError>;

/// Editing state of one open document
#[derive(Debug)]
pub struct EditorSession {
    tree: TreeModel,
    ledger: PendingChangeLedger,
    ids: IdentifierLifecycle,
    transfer: TransferEngine,
    selection: Selection,
    reconciler: BatchReconciler,
    autosave: Option<ExpansionAutosave>,
    events: broadcast::Sender<EditorEvent>,
}

impl Default for EditorSession {
    fn default() -> Self {
        Self::new()
    }
}

impl EditorSession {
    /// Empty session with default settings
    pub fn new() -> Self {
        Self::with_config(&EditorConfig::default())
    }

    pub fn with_config(config: &EditorConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_channel_capacity.max(1));
        Self {
            tree: TreeModel::default(),
            ledger: PendingChangeLedger::new(),
            ids: IdentifierLifecycle::new(),
            transfer: TransferEngine::new(),
            selection: Selection::new(),
            reconciler: BatchReconciler::with_events(events.clone()),
            autosave: None,
            events,
        }
    }

    /// Session seeded from a loaded document
    pub fn from_snapshot(snapshot: DocumentSnapshot) -> SessionResult<Self> {
        let mut session = Self::new();
        session.load(snapshot)?;
        Ok(session)
    }

    /// Replace the whole document
    ///
    /// Pending edits, clipboard and selection are discarded. Values loaded here
    /// are the baselines later edits are compared against.
    pub fn load(&mut self, snapshot: DocumentSnapshot) -> SessionResult<()> {
        if self.reconciler.is_in_flight() {
            return Err(SessionError::SaveInProgress);
        }
        self.tree = TreeModel::from_snapshot(snapshot)?;
        self.ledger = PendingChangeLedger::new();
        self.ids = IdentifierLifecycle::new();
        self.transfer.clear();
        self.selection.clear();
        tracing::info!(
            "Loaded document: {} nodes, {} cards",
            self.tree.node_count(),
            self.tree.cards().len()
        );
        Ok(())
    }

    /// Route expand/collapse toggles to a debounced auto-save
    pub fn attach_autosave(&mut self, autosave: ExpansionAutosave) {
        self.autosave = Some(autosave);
    }

    pub fn autosave(&self) -> Option<&ExpansionAutosave> {
        self.autosave.as_ref()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EditorEvent> {
        self.events.subscribe()
    }

    //
    // READ ACCESS
    //

    pub fn tree(&self) -> &TreeModel {
        &self.tree
    }

    pub fn ledger(&self) -> &PendingChangeLedger {
        &self.ledger
    }

    pub fn identifiers(&self) -> &IdentifierLifecycle {
        &self.ids
    }

    pub fn clipboard(&self) -> Option<&Clipboard> {
        self.transfer.clipboard()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn save_state(&self) -> SaveState {
        self.reconciler.state()
    }

    pub fn has_unsaved_changes(&self) -> bool {
        !self.ledger.is_empty()
    }

    /// The request the next save would send
    pub fn pending_request(&self) -> BatchRequest {
        self.ledger.snapshot(&self.tree)
    }

    fn rejected(&self, err: TreeOperationError) -> SessionError {
        tracing::info!("Operation rejected: {}", err);
        // No subscribers is fine.
        let _ = self.events.send(EditorEvent::OperationRejected {
            message: err.to_string(),
        });
        SessionError::Operation(err)
    }

    fn require(&self, entity: &EntityRef) -> SessionResult<()> {
        if self.tree.contains(entity) {
            return Ok(());
        }
        let err = match entity.kind {
            EntityKind::Node => TreeOperationError::node_not_found(entity.id.clone()),
            EntityKind::Card => TreeOperationError::card_not_found(entity.id.clone()),
        };
        Err(self.rejected(err))
    }

    //
    // EDITS
    //

    /// Create a node as last child of `parent` (a root when `None`); returns its temporary id
    pub fn create_node(&mut self, parent: Option<&str>, seed: NodeSeed) -> SessionResult<String> {
        if let Some(parent_id) = parent {
            self.require(&EntityRef::node(parent_id))?;
        }
        let id = self.ids.mint(EntityKind::Node, Provenance::Created);
        let edge = self
            .tree
            .create_node(id.clone(), parent, seed.clone())
            .map_err(|e| self.rejected(e))?;
        self.ledger.record_create(
            &id,
            EntityKind::Node,
            parent.map(str::to_string),
            CreateSeed::Node(seed),
        );
        if let Some(edge) = edge {
            self.ledger.record_edge_create(edge);
        }
        Ok(id)
    }

    /// Create a card as last child of `node_id`; returns its temporary id
    pub fn create_card(&mut self, node_id: &str, seed: CardSeed) -> SessionResult<String> {
        self.require(&EntityRef::node(node_id))?;
        let id = self.ids.mint(EntityKind::Card, Provenance::Created);
        self.tree
            .create_card(id.clone(), node_id, seed.clone())
            .map_err(|e| self.rejected(e))?;
        self.ledger.record_create(
            &id,
            EntityKind::Card,
            Some(node_id.to_string()),
            CreateSeed::Card(seed),
        );
        Ok(id)
    }

    /// Rename a node (its text) or a card (its title)
    pub fn rename(&mut self, target: &EntityRef, name: impl Into<String>) -> SessionResult<()> {
        let name = name.into();
        self.require(target)?;
        if name.trim().is_empty() {
            return Err(self.rejected(TreeOperationError::empty_name(
                target.kind,
                target.id.clone(),
            )));
        }
        let previous = match target.kind {
            EntityKind::Node => self.tree.set_node_text(&target.id, name.clone()),
            EntityKind::Card => self.tree.set_card_title(&target.id, name.clone()),
        }
        .map_err(|e| self.rejected(e))?;
        self.ledger
            .record_rename(&target.id, target.kind, name, &previous);
        Ok(())
    }

    pub fn update_content(&mut self, card_id: &str, content: impl Into<String>) -> SessionResult<()> {
        let content = content.into();
        let previous = self
            .tree
            .set_card_content(card_id, content.clone())
            .map_err(|e| self.rejected(e))?;
        self.ledger
            .record_content_change(card_id, content, &previous);
        Ok(())
    }

    /// Append an opaque problem payload to a card
    pub fn add_problem(&mut self, card_id: &str, problem: Value) -> SessionResult<()> {
        let previous = self
            .tree
            .push_problem(card_id, problem)
            .map_err(|e| self.rejected(e))?;
        let current = self
            .tree
            .card(card_id)
            .map(|c| c.problems.clone())
            .unwrap_or_default();
        self.ledger
            .record_problems_change(card_id, current, &previous);
        Ok(())
    }

    /// Re-parent a node; rejected when `new_parent` is the node or a descendant
    pub fn move_node(&mut self, node_id: &str, new_parent: Option<&str>) -> SessionResult<()> {
        let moved = self
            .tree
            .move_node(node_id, new_parent)
            .map_err(|e| self.rejected(e))?;
        if !moved.parent_changed() {
            return Ok(());
        }
        if let Some(edge) = &moved.removed_edge {
            self.ledger.record_edge_delete(&edge.id);
        }
        if let Some(edge) = moved.created_edge {
            self.ledger.record_edge_create(edge);
        }
        self.ledger.record_drag_change(node_id, EntityKind::Node);
        Ok(())
    }

    pub fn move_card(&mut self, card_id: &str, new_node_id: &str) -> SessionResult<()> {
        let previous = self
            .tree
            .move_card(card_id, new_node_id)
            .map_err(|e| self.rejected(e))?;
        if previous.is_some() {
            self.ledger.record_drag_change(card_id, EntityKind::Card);
        }
        Ok(())
    }

    /// Give the children of `parent` the dense orders `1..n` in the given sequence
    pub fn reorder(&mut self, parent: Option<&str>, ordered: &[EntityRef]) -> SessionResult<()> {
        let changed = self
            .tree
            .reorder_siblings(parent, ordered)
            .map_err(|e| self.rejected(e))?;
        for entity in changed {
            self.ledger.record_drag_change(&entity.id, entity.kind);
        }
        Ok(())
    }

    /// Drag and drop: move `item` under `new_parent` at position `index`
    ///
    /// Both the destination group and, when the parent changed, the source group
    /// end up with dense orders.
    pub fn reposition(
        &mut self,
        item: &EntityRef,
        new_parent: Option<&str>,
        index: usize,
    ) -> SessionResult<()> {
        self.require(item)?;
        let old_parent = self.tree.group_of(item).unwrap_or_default();
        let parent_changed = old_parent.as_deref() != new_parent;

        if parent_changed {
            match (item.kind, new_parent) {
                (EntityKind::Node, _) => self.move_node(&item.id, new_parent)?,
                (EntityKind::Card, Some(node_id)) => self.move_card(&item.id, node_id)?,
                (EntityKind::Card, None) => {
                    return Err(
                        self.rejected(TreeOperationError::card_requires_node(item.id.clone()))
                    );
                }
            }
        }

        let mut siblings: Vec<EntityRef> = self
            .tree
            .children_of(new_parent)
            .into_iter()
            .filter(|sibling| sibling != item)
            .collect();
        siblings.insert(index.min(siblings.len()), item.clone());
        self.reorder(new_parent, &siblings)?;
        self.ledger.record_drag_change(&item.id, item.kind);

        if parent_changed {
            let remaining = self.tree.children_of(old_parent.as_deref());
            self.reorder(old_parent.as_deref(), &remaining)?;
        }
        Ok(())
    }

    /// Delete a node with its whole subtree, or a single card
    ///
    /// Entities that only ever existed locally vanish without a trace in the next
    /// request. Returns everything removed, the target first.
    pub fn delete(&mut self, target: &EntityRef) -> SessionResult<Vec<EntityRef>> {
        self.require(target)?;
        let (removed, effect) = match target.kind {
            EntityKind::Node => {
                let parent = self.tree.parent_of(&target.id).map(str::to_string);
                let subtree = self
                    .tree
                    .delete_node(&target.id)
                    .map_err(|e| self.rejected(e))?;
                for edge in &subtree.edges {
                    self.ledger.record_edge_delete(&edge.id);
                }
                let record = DeleteRecord {
                    kind: EntityKind::Node,
                    parent,
                    cascade_nodes: subtree.node_ids().into_iter().skip(1).collect(),
                    cascade_cards: subtree.card_ids(),
                };
                let effect = self.ledger.record_delete(&target.id, record);
                let removed: Vec<EntityRef> = subtree
                    .node_ids()
                    .into_iter()
                    .map(EntityRef::node)
                    .chain(subtree.card_ids().into_iter().map(EntityRef::card))
                    .collect();
                (removed, effect)
            }
            EntityKind::Card => {
                let card = self
                    .tree
                    .delete_card(&target.id)
                    .map_err(|e| self.rejected(e))?;
                let effect = self
                    .ledger
                    .record_delete(&target.id, DeleteRecord::card(card.node_id));
                (vec![target.clone()], effect)
            }
        };

        if effect == LedgerEffect::Purged {
            tracing::debug!(
                "Discarded local-only {} and {} dependents",
                target,
                removed.len() - 1
            );
        }

        let gone: HashSet<String> = removed.iter().map(|e| e.id.clone()).collect();
        for id in gone.iter().filter(|id| is_temporary(id)) {
            self.ids.forget(id);
        }
        self.transfer.forget(&gone);
        self.selection.forget(&gone);
        if let Some(autosave) = &self.autosave {
            autosave.forget(&gone);
        }
        Ok(removed)
    }

    /// Set the expand state of a node; saved by the attached auto-save, if any
    pub fn set_expanded(&mut self, node_id: &str, expanded: bool) -> SessionResult<()> {
        let previous = self
            .tree
            .set_expanded(node_id, expanded)
            .map_err(|e| self.rejected(e))?;
        if previous == Some(expanded) {
            return Ok(());
        }
        if let Some(autosave) = &self.autosave {
            autosave.toggle(node_id, expanded);
        }
        Ok(())
    }

    //
    // CLIPBOARD & SELECTION
    //

    pub fn copy(&mut self, items: Vec<EntityRef>) {
        self.transfer.copy(items);
    }

    pub fn cut(&mut self, items: Vec<EntityRef>) {
        self.transfer.cut(items);
    }

    /// Paste the clipboard under `target` (the document root when `None`)
    ///
    /// A cut removes its originals only after every duplicate was created.
    pub fn paste(&mut self, target: Option<&str>) -> SessionResult<PasteOutcome> {
        let outcome = self
            .transfer
            .paste(target, &mut self.tree, &mut self.ledger, &mut self.ids)
            .map_err(|e| self.rejected(e))?;
        for original in &outcome.originals_to_remove {
            self.delete(original)?;
        }
        Ok(outcome)
    }

    pub fn select(&mut self, items: impl IntoIterator<Item = EntityRef>) {
        self.selection.select(items);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    //
    // OPERATIONS
    //

    /// Apply one closed-set operation
    pub fn apply(&mut self, operation: Operation) -> SessionResult<OperationOutcome> {
        tracing::debug!("Applying {}", operation.operation_type());
        match operation {
            Operation::CreateNode {
                parent_id,
                text,
                position,
            } => {
                let id = self.create_node(parent_id.as_deref(), NodeSeed { text, position })?;
                Ok(OperationOutcome::Created(EntityRef::node(id)))
            }
            Operation::CreateCard {
                node_id,
                title,
                content,
            } => {
                let id = self.create_card(&node_id, CardSeed::new(title, content))?;
                Ok(OperationOutcome::Created(EntityRef::card(id)))
            }
            Operation::MoveNode {
                node_id,
                new_parent_id,
            } => {
                self.move_node(&node_id, new_parent_id.as_deref())?;
                Ok(OperationOutcome::Updated(EntityRef::node(node_id)))
            }
            Operation::MoveCard {
                card_id,
                new_node_id,
            } => {
                self.move_card(&card_id, &new_node_id)?;
                Ok(OperationOutcome::Updated(EntityRef::card(card_id)))
            }
            Operation::Rename { target, name } => {
                self.rename(&target, name)?;
                Ok(OperationOutcome::Updated(target))
            }
            Operation::UpdateContent { card_id, content } => {
                self.update_content(&card_id, content)?;
                Ok(OperationOutcome::Updated(EntityRef::card(card_id)))
            }
            Operation::Delete { target } => Ok(OperationOutcome::Deleted(self.delete(&target)?)),
            Operation::CreateProblem { card_id, problem } => {
                self.add_problem(&card_id, problem)?;
                Ok(OperationOutcome::Updated(EntityRef::card(card_id)))
            }
        }
    }

    /// Apply operations in order, stopping at the first rejected one
    ///
    /// Returns how many were applied.
    pub fn apply_all(
        &mut self,
        operations: impl IntoIterator<Item = Operation>,
    ) -> Result<usize, PartialApply> {
        let mut applied = 0;
        for operation in operations {
            let name = operation.operation_type();
            self.apply(operation).map_err(|source| PartialApply {
                applied,
                operation: name,
                source,
            })?;
            applied += 1;
        }
        Ok(applied)
    }

    //
    // SAVE
    //

    /// Freeze the pending edits into a request; `None` when there is nothing to save
    pub fn begin_save(&mut self) -> SessionResult<Option<SaveTicket>> {
        self.reconciler.begin(&mut self.ledger, &self.tree)
    }

    /// Apply the store's answer to a request from [`begin_save`](Self::begin_save)
    pub fn finish_save(
        &mut self,
        ticket: SaveTicket,
        outcome: Result<BatchResponse, StoreError>,
    ) -> SessionResult<SaveReport> {
        let Self {
            tree,
            ledger,
            ids,
            transfer,
            selection,
            reconciler,
            autosave,
            ..
        } = self;

        let mut targets: Vec<&mut dyn Remappable> = vec![
            &mut *tree as &mut dyn Remappable,
            ids as &mut dyn Remappable,
            transfer as &mut dyn Remappable,
            selection as &mut dyn Remappable,
        ];
        if let Some(autosave) = autosave.as_mut() {
            targets.push(autosave);
        }
        let result = reconciler.apply(ticket, outcome, ledger, &mut targets);
        ledger.discard_orphans(tree);
        result
    }

    /// Save holding the session for the whole round trip
    ///
    /// Use [`SharedEditorSession::save`] to keep editing while the batch is on the
    /// network.
    pub async fn save(&mut self, store: &dyn DocumentStore) -> SessionResult<SaveReport> {
        let Some(ticket) = self.begin_save()? else {
            return Ok(SaveReport::nothing_to_save());
        };
        let outcome = store.save_batch(ticket.request()).await;
        self.finish_save(ticket, outcome)
    }
}

/// An editing session shared between tasks, plus the store it saves to
#[derive(Clone)]
pub struct SharedEditorSession {
    session: Arc<Mutex<EditorSession>>,
    store: Arc<dyn DocumentStore>,
}

impl SharedEditorSession {
    pub fn new(session: EditorSession, store: Arc<dyn DocumentStore>) -> Self {
        Self {
            session: Arc::new(Mutex::new(session)),
            store,
        }
    }

    /// Load the document from `store` and wire up expansion auto-save
    pub async fn open(store: Arc<dyn DocumentStore>, config: &EditorConfig) -> SessionResult<Self> {
        let snapshot = store.load_document().await?;
        let mut session = EditorSession::with_config(config);
        session.load(snapshot)?;
        session.attach_autosave(ExpansionAutosave::new(
            Arc::clone(&store),
            config.autosave_debounce(),
        ));
        Ok(Self::new(session, store))
    }

    /// Exclusive access for edits and queries
    pub async fn lock(&self) -> MutexGuard<'_, EditorSession> {
        self.session.lock().await
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Save without holding the session during the network call
    ///
    /// Edits made while the batch is in flight are kept for the next save. A second
    /// save while one is in flight fails with [`SessionError::SaveInProgress`].
    pub async fn save(&self) -> SessionResult<SaveReport> {
        let ticket = {
            let mut session = self.session.lock().await;
            match session.begin_save()? {
                Some(ticket) => ticket,
                None => return Ok(SaveReport::nothing_to_save()),
            }
        };
        let outcome = self.store.save_batch(ticket.request()).await;
        let mut session = self.session.lock().await;
        session.finish_save(ticket, outcome)
    }

    /// Flush pending expand toggles; call before dropping the session
    pub async fn shutdown(&self) -> Result<usize, StoreError> {
        let autosave = self.session.lock().await.autosave().cloned();
        match autosave {
            Some(autosave) => autosave.shutdown().await,
            None => Ok(0),
        }
    }
}
