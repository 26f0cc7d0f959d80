//! Batch Reconciliation
//!
//! Turns the ledger into one [`BatchRequest`], tracks the single outstanding save,
//! and applies the store's answer back onto the live model.
//!
//! # Save cycle
//!
//! ```text
//! Idle → Building → InFlight → Applying → Idle
//!                           ↘ Failed   → Idle
//! ```
//!
//! - **Building**: [`RequestCompiler`] projects ledger + tree into a request
//! - **InFlight**: exactly one request outstanding; a second `begin` is refused
//! - **Applying**: identifier maps are applied to every [`Remappable`] target in
//!   one pass, then the ledger is cleared up to the snapshot watermark
//! - **Failed**: transport errors and `success: false` leave the ledger and tree
//!   exactly as they were
//!
//! A `success: false` response is treated as "nothing was applied", even when it
//! carries identifier map fragments.

use crate::db::batch::{
    BatchRequest, BatchResponse, CardCreate, CardUpdate, EdgeCreate, NodeCreate, NodeUpdate,
};
use crate::db::StoreError;
use crate::models::{Card, EntityKind};
use crate::services::error::SessionError;
use crate::services::events::EditorEvent;
use crate::services::identifier::{is_temporary, IdRemap, Remappable};
use crate::services::ledger::PendingChangeLedger;
use crate::services::tree_model::TreeModel;
use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;

/// Phase of the save cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    Idle,
    Building,
    InFlight,
    Applying,
    Failed,
}

/// Read-only projection of ledger + tree into a batch request
pub struct RequestCompiler<'a> {
    ledger: &'a PendingChangeLedger,
    tree: &'a TreeModel,
}

impl<'a> RequestCompiler<'a> {
    pub fn new(ledger: &'a PendingChangeLedger, tree: &'a TreeModel) -> Self {
        Self { ledger, tree }
    }

    pub fn compile(&self) -> BatchRequest {
        let mut request = BatchRequest::default();
        self.compile_creates(&mut request);
        request.node_updates = self.compile_node_updates();
        request.card_updates = self.compile_card_updates();
        self.compile_deletes(&mut request);
        self.compile_edges(&mut request);
        request
    }

    /// Creates in tree pre-order so parents precede children and cards follow
    /// their node; live values fold in every edit made since creation.
    fn compile_creates(&self, request: &mut BatchRequest) {
        let creates = self.ledger.creates();
        let preorder = self.tree.preorder();

        for node_id in &preorder {
            if !creates.contains_key(node_id) {
                continue;
            }
            let Some(node) = self.tree.node(node_id) else {
                continue;
            };
            request.node_creates.push(NodeCreate {
                temp_id: node.id.clone(),
                text: node.text.clone(),
                parent_id: self.tree.parent_of(node_id).map(str::to_string),
                order: Some(node.order),
                x: node.position.map(|p| p.x),
                y: node.position.map(|p| p.y),
            });
        }

        for node_id in &preorder {
            for card in self.tree.sorted_cards_of(node_id) {
                if !creates.contains_key(&card.id) {
                    continue;
                }
                request.card_creates.push(CardCreate {
                    temp_id: card.id.clone(),
                    node_id: card.node_id.clone(),
                    title: card.title.clone(),
                    content: card.content.clone(),
                    order: Some(card.order),
                    problems: (!card.problems.is_empty()).then(|| card.problems.clone()),
                });
            }
        }
    }

    /// Entities the store knows about: permanent, still present, no pending create
    fn is_persisted(&self, id: &str) -> bool {
        !is_temporary(id) && !self.ledger.is_pending_create(id)
    }

    fn updatable_node(&self, id: &str) -> bool {
        self.is_persisted(id) && self.tree.contains_node(id)
    }

    fn updatable_card(&self, id: &str) -> Option<&'a Card> {
        if self.is_persisted(id) {
            self.tree.card(id)
        } else {
            None
        }
    }

    fn compile_node_updates(&self) -> Vec<NodeUpdate> {
        let mut updates: HashMap<String, (u64, NodeUpdate)> = HashMap::new();
        let blank = |id: &str| NodeUpdate {
            node_id: id.to_string(),
            ..NodeUpdate::default()
        };

        for (id, rename) in self.ledger.renames() {
            if rename.value.kind != EntityKind::Node || !self.updatable_node(id) {
                continue;
            }
            merge_slot(&mut updates, id, rename.revision, || blank(id)).text =
                Some(rename.value.name.clone());
        }
        for (id, drag) in self.ledger.drags() {
            if drag.value.kind != EntityKind::Node || !self.updatable_node(id) {
                continue;
            }
            let order = self.tree.node(id).map(|n| n.order);
            merge_slot(&mut updates, id, drag.revision, || blank(id)).order = order;
        }

        sorted_by_revision(updates)
    }

    fn compile_card_updates(&self) -> Vec<CardUpdate> {
        let mut updates: HashMap<String, (u64, CardUpdate)> = HashMap::new();
        let blank = |card: &Card| CardUpdate {
            card_id: card.id.clone(),
            node_id: card.node_id.clone(),
            ..CardUpdate::default()
        };

        for (id, change) in self.ledger.content_changes() {
            let Some(card) = self.updatable_card(id) else {
                continue;
            };
            merge_slot(&mut updates, id, change.revision, || blank(card)).content =
                Some(change.value.content.clone());
        }
        for (id, rename) in self.ledger.renames() {
            if rename.value.kind != EntityKind::Card {
                continue;
            }
            let Some(card) = self.updatable_card(id) else {
                continue;
            };
            merge_slot(&mut updates, id, rename.revision, || blank(card)).title =
                Some(rename.value.name.clone());
        }
        for (id, change) in self.ledger.problem_changes() {
            let Some(card) = self.updatable_card(id) else {
                continue;
            };
            merge_slot(&mut updates, id, change.revision, || blank(card)).problems =
                Some(change.value.problems.clone());
        }
        for (id, drag) in self.ledger.drags() {
            if drag.value.kind != EntityKind::Card {
                continue;
            }
            let Some(card) = self.updatable_card(id) else {
                continue;
            };
            merge_slot(&mut updates, id, drag.revision, || blank(card)).order = Some(card.order);
        }

        sorted_by_revision(updates)
    }

    /// Deletes expanded with their cascades; temporary ids never reach the store
    fn compile_deletes(&self, request: &mut BatchRequest) {
        let mut deletes: Vec<_> = self.ledger.deletes().iter().collect();
        deletes.sort_by(|(a_id, a), (b_id, b)| a.revision.cmp(&b.revision).then(a_id.cmp(b_id)));

        let mut seen_nodes: HashSet<&str> = HashSet::new();
        let mut seen_cards: HashSet<&str> = HashSet::new();
        for (id, delete) in deletes {
            let record = &delete.value;
            let (own_nodes, own_cards): (Vec<&String>, Vec<&String>) = match record.kind {
                EntityKind::Node => (vec![id], vec![]),
                EntityKind::Card => (vec![], vec![id]),
            };
            for node_id in own_nodes.into_iter().chain(&record.cascade_nodes) {
                if !is_temporary(node_id) && seen_nodes.insert(node_id.as_str()) {
                    request.node_deletes.push(node_id.clone());
                }
            }
            for card_id in own_cards.into_iter().chain(&record.cascade_cards) {
                if !is_temporary(card_id) && seen_cards.insert(card_id.as_str()) {
                    request.card_deletes.push(card_id.clone());
                }
            }
        }
    }

    /// An edge both created and deleted in the ledger cancels out
    fn compile_edges(&self, request: &mut BatchRequest) {
        let created = self.ledger.edge_creates();
        let deleted = self.ledger.edge_deletes();

        let mut creates: Vec<_> = created
            .iter()
            .filter(|(id, _)| !deleted.contains_key(*id))
            .collect();
        creates.sort_by(|(a_id, a), (b_id, b)| a.revision.cmp(&b.revision).then(a_id.cmp(b_id)));
        request.edge_creates = creates
            .into_iter()
            .map(|(_, edge)| EdgeCreate {
                id: edge.value.id.clone(),
                source: edge.value.source.clone(),
                target: edge.value.target.clone(),
                label: edge.value.label.clone(),
            })
            .collect();

        let mut deletes: Vec<_> = deleted
            .iter()
            .filter(|(id, _)| !created.contains_key(*id))
            .collect();
        deletes.sort_by(|(a_id, a), (b_id, b)| a.revision.cmp(&b.revision).then(a_id.cmp(b_id)));
        request.edge_deletes = deletes.into_iter().map(|(id, _)| id.clone()).collect();
    }
}

/// Entry for `id`, keeping the earliest revision that touched it
fn merge_slot<'m, T>(
    updates: &'m mut HashMap<String, (u64, T)>,
    id: &str,
    revision: u64,
    blank: impl FnOnce() -> T,
) -> &'m mut T {
    let slot = updates
        .entry(id.to_string())
        .or_insert_with(|| (revision, blank()));
    slot.0 = slot.0.min(revision);
    &mut slot.1
}

fn sorted_by_revision<T>(updates: HashMap<String, (u64, T)>) -> Vec<T> {
    let mut updates: Vec<(String, (u64, T))> = updates.into_iter().collect();
    updates.sort_by(|(a_id, (a, _)), (b_id, (b, _))| a.cmp(b).then(a_id.cmp(b_id)));
    updates.into_iter().map(|(_, (_, update))| update).collect()
}

/// A compiled request waiting to be sent
///
/// Produced by [`BatchReconciler::begin`] and handed back to
/// [`BatchReconciler::apply`] with the store's answer.
#[derive(Debug, Clone)]
pub struct SaveTicket {
    request: BatchRequest,
    watermark: u64,
}

impl SaveTicket {
    pub fn request(&self) -> &BatchRequest {
        &self.request
    }

    /// Highest ledger revision included in the request
    pub fn watermark(&self) -> u64 {
        self.watermark
    }
}

/// Result of a successful save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveReport {
    /// Records sent
    pub records: usize,
    /// Id occurrences rewritten across all targets
    pub remapped: usize,
    /// Temp → permanent maps applied
    pub remap: IdRemap,
    /// Partial errors reported by the store plus missing mappings
    pub warnings: Vec<String>,
}

impl SaveReport {
    /// Report for a save that found nothing to send
    pub fn nothing_to_save() -> Self {
        Self::default()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Single-flight save state machine
#[derive(Debug)]
pub struct BatchReconciler {
    state: SaveState,
    events: Option<broadcast::Sender<EditorEvent>>,
}

impl Default for BatchReconciler {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchReconciler {
    pub fn new() -> Self {
        Self {
            state: SaveState::Idle,
            events: None,
        }
    }

    /// Reconciler that announces save progress on `events`
    pub fn with_events(events: broadcast::Sender<EditorEvent>) -> Self {
        Self {
            state: SaveState::Idle,
            events: Some(events),
        }
    }

    pub fn state(&self) -> SaveState {
        self.state
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == SaveState::InFlight
    }

    fn emit(&self, event: EditorEvent) {
        if let Some(events) = &self.events {
            // No subscribers is fine.
            let _ = events.send(event);
        }
    }

    fn transition(&mut self, next: SaveState) {
        tracing::debug!("Save state {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Compile the ledger and enter `InFlight`
    ///
    /// Returns `Ok(None)` when there is nothing to send.
    pub fn begin(
        &mut self,
        ledger: &mut PendingChangeLedger,
        tree: &TreeModel,
    ) -> Result<Option<SaveTicket>, SessionError> {
        if self.state != SaveState::Idle {
            tracing::warn!("Save requested while {:?}; refusing", self.state);
            return Err(SessionError::SaveInProgress);
        }

        self.transition(SaveState::Building);
        let watermark = ledger.revision();
        let request = ledger.snapshot(tree);
        if request.is_empty() {
            self.transition(SaveState::Idle);
            return Ok(None);
        }

        ledger.mark_in_flight(
            watermark,
            request
                .temp_ids()
                .map(str::to_string)
                .chain(request.edge_creates.iter().map(|e| e.id.clone()))
                .collect::<Vec<_>>(),
        );
        self.transition(SaveState::InFlight);
        tracing::info!(
            "Saving batch: {} node creates, {} card creates, {} records total",
            request.node_creates.len(),
            request.card_creates.len(),
            request.len()
        );
        self.emit(EditorEvent::SaveStarted {
            records: request.len(),
        });
        Ok(Some(SaveTicket { request, watermark }))
    }

    /// Apply the store's answer to a ticket
    ///
    /// On success every target and the ledger are remapped in one pass, then the
    /// ledger is cleared through the ticket's watermark. On failure nothing but the
    /// in-flight markers changes.
    pub fn apply(
        &mut self,
        ticket: SaveTicket,
        outcome: Result<BatchResponse, StoreError>,
        ledger: &mut PendingChangeLedger,
        targets: &mut [&mut dyn Remappable],
    ) -> Result<SaveReport, SessionError> {
        if self.state != SaveState::InFlight {
            return Err(SessionError::NoSaveInFlight);
        }
        ledger.clear_in_flight();

        let response = match outcome {
            Ok(response) if response.success => response,
            Ok(response) => {
                if response.node_id_map.is_some() || response.card_id_map.is_some() {
                    tracing::warn!("Ignoring identifier maps in a response reporting success: false");
                }
                ledger.restore_unsent();
                return Err(self.fail(StoreError::rejected(response.errors().to_vec())));
            }
            Err(err) => {
                ledger.restore_unsent();
                return Err(self.fail(err));
            }
        };

        self.transition(SaveState::Applying);
        let remap = response.to_remap();
        let mut warnings: Vec<String> = response.errors().to_vec();
        let mut unacknowledged: HashSet<String> = HashSet::new();
        for temp_id in ticket.request.temp_ids() {
            if remap.resolve(temp_id).is_none() {
                warnings.push(format!(
                    "Store returned no permanent id for '{}'; it will be sent again",
                    temp_id
                ));
                unacknowledged.insert(temp_id.to_string());
            }
        }

        let mut remapped = ledger.remap_ids(&remap);
        for target in targets.iter_mut() {
            remapped += target.remap_ids(&remap);
        }
        ledger.clear_through(ticket.watermark, &unacknowledged);

        tracing::info!(
            "Save completed: {} node ids, {} card ids, {} rewrites, {} warnings",
            remap.node_count(),
            remap.card_count(),
            remapped,
            warnings.len()
        );
        for warning in &warnings {
            tracing::warn!("Store warning: {}", warning);
        }

        self.transition(SaveState::Idle);
        self.emit(EditorEvent::SaveCompleted {
            remapped,
            warnings: warnings.clone(),
        });
        Ok(SaveReport {
            records: ticket.request.len(),
            remapped,
            remap,
            warnings,
        })
    }

    fn fail(&mut self, err: StoreError) -> SessionError {
        self.transition(SaveState::Failed);
        tracing::error!("Save failed, pending edits kept: {}", err);
        self.emit(EditorEvent::SaveFailed {
            message: err.to_string(),
        });
        self.transition(SaveState::Idle);
        SessionError::Store(err)
    }
}
