//! Pending Change Ledger
//!
//! Records every outstanding local edit, keyed by entity id, one map per kind of
//! change. The ledger is the single source of what the next save must send.
//!
//! # Rules
//!
//! - **One entry per (entity, kind)**: a later edit of the same kind supersedes the
//!   earlier one; nothing is ever appended
//! - **No-op pruning**: when a value returns to the one captured at first edit, the
//!   entry is removed entirely
//! - **Local-only lifecycles leave no trace**: deleting an entity whose `Create` has
//!   not been sent purges every entry for it and its temporary descendants
//! - **Revisions**: every write stamps the entry with a fresh revision so a save can
//!   clear exactly what it sent, keeping edits made while it was in flight
//! - **In-flight baselines**: an edit that supersedes an entry the save in flight
//!   covers also remembers the value being written, and is never pruned against the
//!   load-time original until that save settles
//!
//! Order values are not stored: a [`DragChange`] only marks the entity, and the
//! order is read from the live tree when the request is built.

use crate::db::batch::BatchRequest;
use crate::models::{CardSeed, Edge, EntityKind, NodeSeed};
use crate::services::identifier::{is_temporary, remap_keys, IdRemap, Remappable};
use crate::services::reconciliation::RequestCompiler;
use crate::services::tree_model::TreeModel;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// A ledger entry stamped with the revision that last wrote it
#[derive(Debug, Clone, PartialEq)]
pub struct Tracked<T> {
    pub value: T,
    pub revision: u64,
    pub recorded_at: DateTime<Utc>,
}

/// New card content plus the content captured at first edit
#[derive(Debug, Clone, PartialEq)]
pub struct ContentChange {
    pub content: String,
    pub original: String,
    /// Content the save in flight is writing, when it superseded a sent entry
    pub sent: Option<String>,
}

/// New display name (node text or card title) plus the original
#[derive(Debug, Clone, PartialEq)]
pub struct Rename {
    pub kind: EntityKind,
    pub name: String,
    pub original: String,
    pub sent: Option<String>,
}

/// New problems list of a card plus the original
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemsChange {
    pub problems: Vec<Value>,
    pub original: Vec<Value>,
    pub sent: Option<Vec<Value>>,
}

/// Value edits that can return to a baseline
trait Revertible {
    type Value: Clone + PartialEq;

    fn value(&self) -> &Self::Value;
    fn original(&self) -> &Self::Value;
    fn sent(&self) -> Option<&Self::Value>;
    fn settle(&mut self, delivered: bool);

    /// Nothing left to send once the value sits at its baseline
    fn is_noop(&self) -> bool {
        self.sent().is_none() && self.value() == self.original()
    }
}

macro_rules! impl_revertible {
    ($ty:ty, $field:ident, $value:ty) => {
        impl Revertible for $ty {
            type Value = $value;

            fn value(&self) -> &$value {
                &self.$field
            }

            fn original(&self) -> &$value {
                &self.original
            }

            fn sent(&self) -> Option<&$value> {
                self.sent.as_ref()
            }

            /// The store now holds `sent` when it was delivered, `original` otherwise
            fn settle(&mut self, delivered: bool) {
                if let Some(sent) = self.sent.take() {
                    if delivered {
                        self.original = sent;
                    }
                }
            }
        }
    };
}

impl_revertible!(ContentChange, content, String);
impl_revertible!(Rename, name, String);
impl_revertible!(ProblemsChange, problems, Vec<Value>);

/// Seed fields of a created entity
#[derive(Debug, Clone, PartialEq)]
pub enum CreateSeed {
    Node(NodeSeed),
    Card(CardSeed),
}

/// Entity minted locally and not yet acknowledged by the store
#[derive(Debug, Clone, PartialEq)]
pub struct CreateRecord {
    pub kind: EntityKind,
    /// Parent node (or owning node for cards) at creation time
    pub parent: Option<String>,
    pub seed: CreateSeed,
}

/// Deleted entity plus the cascade computed by the tree model
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteRecord {
    pub kind: EntityKind,
    pub parent: Option<String>,
    /// Descendant nodes removed with it (excluding the entity itself)
    pub cascade_nodes: Vec<String>,
    /// Cards removed with it
    pub cascade_cards: Vec<String>,
}

impl DeleteRecord {
    pub fn card(parent: String) -> Self {
        Self {
            kind: EntityKind::Card,
            parent: Some(parent),
            cascade_nodes: Vec::new(),
            cascade_cards: Vec::new(),
        }
    }
}

/// Marks an entity whose order or parent changed
#[derive(Debug, Clone, PartialEq)]
pub struct DragChange {
    pub kind: EntityKind,
}

/// What a `record_*` call did to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEffect {
    /// Entry inserted or superseded
    Recorded,
    /// Value returned to its original; entry removed
    Pruned,
    /// Nothing pending and nothing changed
    Unchanged,
    /// Entity discarded without any network trace
    Purged,
}

/// Outstanding local edits, one map per change kind
#[derive(Debug, Default)]
pub struct PendingChangeLedger {
    revision: u64,
    content: HashMap<String, Tracked<ContentChange>>,
    renames: HashMap<String, Tracked<Rename>>,
    problems: HashMap<String, Tracked<ProblemsChange>>,
    creates: HashMap<String, Tracked<CreateRecord>>,
    deletes: HashMap<String, Tracked<DeleteRecord>>,
    drags: HashMap<String, Tracked<DragChange>>,
    edge_creates: HashMap<String, Tracked<Edge>>,
    edge_deletes: HashMap<String, Tracked<()>>,
    /// Temp entity ids and edge ids whose creates are part of the save in flight
    in_flight: HashSet<String>,
    /// Last revision the save in flight covers
    in_flight_watermark: Option<u64>,
}

impl PendingChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn stamp<T>(&mut self, value: T) -> Tracked<T> {
        self.revision += 1;
        Tracked {
            value,
            revision: self.revision,
            recorded_at: Utc::now(),
        }
    }

    fn covered_by_save(&self, revision: u64) -> bool {
        self.in_flight_watermark
            .is_some_and(|watermark| revision <= watermark)
    }

    /// Original and in-flight value a new edit is measured against
    fn baseline<T: Revertible>(
        &self,
        existing: Option<&Tracked<T>>,
        current: &T::Value,
    ) -> (T::Value, Option<T::Value>) {
        match existing {
            Some(entry) if self.covered_by_save(entry.revision) => (
                entry.value.original().clone(),
                Some(entry.value.value().clone()),
            ),
            Some(entry) => (
                entry.value.original().clone(),
                entry.value.sent().cloned(),
            ),
            None => (current.clone(), None),
        }
    }

    //
    // RECORDING
    //

    /// Record new card content
    ///
    /// `current` is the content before this edit; it becomes the original when no
    /// entry exists yet.
    pub fn record_content_change(
        &mut self,
        id: &str,
        content: String,
        current: &str,
    ) -> LedgerEffect {
        let (original, sent) = self.baseline(self.content.get(id), &current.to_string());
        let change = ContentChange {
            content,
            original,
            sent,
        };
        if change.is_noop() {
            return Self::prune(&mut self.content, id);
        }
        let entry = self.stamp(change);
        self.content.insert(id.to_string(), entry);
        LedgerEffect::Recorded
    }

    /// Record a new display name for a node or card
    pub fn record_rename(
        &mut self,
        id: &str,
        kind: EntityKind,
        name: String,
        current: &str,
    ) -> LedgerEffect {
        let (original, sent) = self.baseline(self.renames.get(id), &current.to_string());
        let change = Rename {
            kind,
            name,
            original,
            sent,
        };
        if change.is_noop() {
            return Self::prune(&mut self.renames, id);
        }
        let entry = self.stamp(change);
        self.renames.insert(id.to_string(), entry);
        LedgerEffect::Recorded
    }

    /// Record a new problems list for a card
    pub fn record_problems_change(
        &mut self,
        id: &str,
        problems: Vec<Value>,
        current: &[Value],
    ) -> LedgerEffect {
        let (original, sent) = self.baseline(self.problems.get(id), &current.to_vec());
        let change = ProblemsChange {
            problems,
            original,
            sent,
        };
        if change.is_noop() {
            return Self::prune(&mut self.problems, id);
        }
        let entry = self.stamp(change);
        self.problems.insert(id.to_string(), entry);
        LedgerEffect::Recorded
    }

    /// Record a locally minted entity
    pub fn record_create(
        &mut self,
        id: &str,
        kind: EntityKind,
        parent: Option<String>,
        seed: CreateSeed,
    ) -> LedgerEffect {
        let entry = self.stamp(CreateRecord { kind, parent, seed });
        self.creates.insert(id.to_string(), entry);
        LedgerEffect::Recorded
    }

    /// Mark an entity whose order or parent changed
    pub fn record_drag_change(&mut self, id: &str, kind: EntityKind) -> LedgerEffect {
        let entry = self.stamp(DragChange { kind });
        self.drags.insert(id.to_string(), entry);
        LedgerEffect::Recorded
    }

    /// Record a new edge
    pub fn record_edge_create(&mut self, edge: Edge) -> LedgerEffect {
        let id = edge.id.clone();
        let entry = self.stamp(edge);
        self.edge_creates.insert(id, entry);
        LedgerEffect::Recorded
    }

    /// Record removal of an edge
    ///
    /// An edge whose create has not been sent simply disappears from the ledger.
    pub fn record_edge_delete(&mut self, edge_id: &str) -> LedgerEffect {
        if self.edge_creates.contains_key(edge_id) && !self.in_flight.contains(edge_id) {
            self.edge_creates.remove(edge_id);
            return LedgerEffect::Purged;
        }
        let entry = self.stamp(());
        self.edge_deletes.insert(edge_id.to_string(), entry);
        LedgerEffect::Recorded
    }

    /// Record a cascading delete
    ///
    /// Entries for the entity and everything in its cascade become moot and are
    /// dropped. Temporary entities that were never sent are purged outright; if the
    /// entity itself is one of them, no `Delete` is recorded at all.
    pub fn record_delete(&mut self, id: &str, record: DeleteRecord) -> LedgerEffect {
        for cascaded in record.cascade_nodes.iter().chain(&record.cascade_cards) {
            self.discard_entity(cascaded);
        }
        if self.is_purgeable(id) {
            self.discard_entity(id);
            return LedgerEffect::Purged;
        }
        self.discard_entity(id);
        let entry = self.stamp(record);
        self.deletes.insert(id.to_string(), entry);
        LedgerEffect::Recorded
    }

    /// Remove every trace of a temporary entity that was never sent
    ///
    /// `descendants` are the entities it owned (nodes and cards); temporary ones are
    /// purged the same way. Returns `false` when `id` is not purgeable (permanent,
    /// unknown, or its create is in flight).
    pub fn purge_temporary(&mut self, id: &str, descendants: &[String]) -> bool {
        if !self.is_purgeable(id) {
            return false;
        }
        for descendant in descendants {
            self.discard_entity(descendant);
        }
        self.discard_entity(id);
        true
    }

    /// Temporary, pending create, and not part of the save in flight
    pub fn is_purgeable(&self, id: &str) -> bool {
        is_temporary(id) && self.creates.contains_key(id) && !self.in_flight.contains(id)
    }

    /// Drop per-entity entries; keep creates that are in flight
    fn discard_entity(&mut self, id: &str) {
        self.content.remove(id);
        self.renames.remove(id);
        self.problems.remove(id);
        self.drags.remove(id);
        if !self.in_flight.contains(id) {
            self.creates.remove(id);
        }
    }

    fn prune<T>(map: &mut HashMap<String, Tracked<T>>, id: &str) -> LedgerEffect {
        if map.remove(id).is_some() {
            LedgerEffect::Pruned
        } else {
            LedgerEffect::Unchanged
        }
    }

    //
    // READ ACCESS
    //

    /// Build the batch request this ledger would send right now
    pub fn snapshot(&self, tree: &TreeModel) -> BatchRequest {
        RequestCompiler::new(self, tree).compile()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn content_changes(&self) -> &HashMap<String, Tracked<ContentChange>> {
        &self.content
    }

    pub fn renames(&self) -> &HashMap<String, Tracked<Rename>> {
        &self.renames
    }

    pub fn problem_changes(&self) -> &HashMap<String, Tracked<ProblemsChange>> {
        &self.problems
    }

    pub fn creates(&self) -> &HashMap<String, Tracked<CreateRecord>> {
        &self.creates
    }

    pub fn deletes(&self) -> &HashMap<String, Tracked<DeleteRecord>> {
        &self.deletes
    }

    pub fn drags(&self) -> &HashMap<String, Tracked<DragChange>> {
        &self.drags
    }

    pub fn edge_creates(&self) -> &HashMap<String, Tracked<Edge>> {
        &self.edge_creates
    }

    pub fn edge_deletes(&self) -> &HashMap<String, Tracked<()>> {
        &self.edge_deletes
    }

    pub fn is_pending_create(&self, id: &str) -> bool {
        self.creates.contains_key(id)
    }

    pub fn is_in_flight(&self, id: &str) -> bool {
        self.in_flight.contains(id)
    }

    /// Total number of entries across all kinds
    pub fn len(&self) -> usize {
        self.content.len()
            + self.renames.len()
            + self.problems.len()
            + self.creates.len()
            + self.deletes.len()
            + self.drags.len()
            + self.edge_creates.len()
            + self.edge_deletes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every id referenced anywhere in the ledger, keys and values
    pub fn referenced_ids(&self) -> HashSet<String> {
        let mut ids: HashSet<String> = HashSet::new();
        ids.extend(self.content.keys().cloned());
        ids.extend(self.renames.keys().cloned());
        ids.extend(self.problems.keys().cloned());
        ids.extend(self.drags.keys().cloned());
        for (id, create) in &self.creates {
            ids.insert(id.clone());
            ids.extend(create.value.parent.clone());
        }
        for (id, delete) in &self.deletes {
            ids.insert(id.clone());
            ids.extend(delete.value.parent.clone());
            ids.extend(delete.value.cascade_nodes.iter().cloned());
            ids.extend(delete.value.cascade_cards.iter().cloned());
        }
        for (id, edge) in &self.edge_creates {
            ids.insert(id.clone());
            ids.insert(edge.value.source.clone());
            ids.insert(edge.value.target.clone());
        }
        ids.extend(self.edge_deletes.keys().cloned());
        ids.extend(self.in_flight.iter().cloned());
        ids
    }

    //
    // SAVE CYCLE
    //

    /// Mark the creates a save carries; entries up to `watermark` are what it sends
    pub(crate) fn mark_in_flight(
        &mut self,
        watermark: u64,
        ids: impl IntoIterator<Item = String>,
    ) {
        self.in_flight_watermark = Some(watermark);
        self.in_flight.extend(ids);
    }

    pub(crate) fn clear_in_flight(&mut self) {
        self.in_flight.clear();
        self.in_flight_watermark = None;
    }

    /// Settle value edits against the outcome of the save that just finished
    ///
    /// Delivered: baselines move to the values written. Not delivered: the store
    /// still holds the originals. Either way an edit now sitting at its baseline
    /// has nothing left to send.
    fn settle_values<T: Revertible>(map: &mut HashMap<String, Tracked<T>>, delivered: bool) {
        map.retain(|_, entry| {
            entry.value.settle(delivered);
            !entry.value.is_noop()
        });
    }

    /// Forget what a failed save was writing
    pub(crate) fn restore_unsent(&mut self) {
        Self::settle_values(&mut self.content, false);
        Self::settle_values(&mut self.renames, false);
        Self::settle_values(&mut self.problems, false);
    }

    /// Drop entries a finished save left without purpose
    ///
    /// Creates of entities deleted while their create was in flight (and never
    /// mapped), deletes of temporary ids with no create left, and edges both
    /// created and deleted without either having reached the store.
    pub(crate) fn discard_orphans(&mut self, tree: &TreeModel) -> usize {
        let before = self.len();
        let in_flight = &self.in_flight;
        self.creates.retain(|id, _| {
            in_flight.contains(id) || tree.contains_node(id) || tree.contains_card(id)
        });
        let creates = &self.creates;
        self.deletes
            .retain(|id, _| !is_temporary(id) || creates.contains_key(id));
        let cancelled: Vec<String> = self
            .edge_creates
            .keys()
            .filter(|id| self.edge_deletes.contains_key(*id) && !in_flight.contains(*id))
            .cloned()
            .collect();
        for id in &cancelled {
            self.edge_creates.remove(id);
            self.edge_deletes.remove(id);
        }
        let discarded = before - self.len();
        if discarded > 0 {
            tracing::debug!("Discarded {} orphaned ledger entries", discarded);
        }
        discarded
    }

    /// Drop every entry a successful save covered
    ///
    /// Entries written after `watermark` belong to the next save and survive, with
    /// their baselines moved to what was just written. Creates listed in
    /// `unacknowledged` (no permanent id came back for them) survive too, along with
    /// the edges that attach them.
    pub(crate) fn clear_through(&mut self, watermark: u64, unacknowledged: &HashSet<String>) {
        fn keep<T>(entry: &Tracked<T>, watermark: u64) -> bool {
            entry.revision > watermark
        }
        self.content.retain(|_, e| keep(e, watermark));
        self.renames.retain(|_, e| keep(e, watermark));
        self.problems.retain(|_, e| keep(e, watermark));
        Self::settle_values(&mut self.content, true);
        Self::settle_values(&mut self.renames, true);
        Self::settle_values(&mut self.problems, true);
        self.drags.retain(|_, e| keep(e, watermark));
        self.deletes.retain(|_, e| keep(e, watermark));
        self.edge_creates.retain(|_, e| {
            keep(e, watermark)
                || unacknowledged.contains(&e.value.source)
                || unacknowledged.contains(&e.value.target)
        });
        self.edge_deletes.retain(|_, e| keep(e, watermark));
        self.creates
            .retain(|id, e| keep(e, watermark) || unacknowledged.contains(id));
    }
}

impl Remappable for PendingChangeLedger {
    fn remap_ids(&mut self, remap: &IdRemap) -> usize {
        let mut rewritten = 0;
        rewritten += remap_keys(&mut self.content, remap);
        rewritten += remap_keys(&mut self.renames, remap);
        rewritten += remap_keys(&mut self.problems, remap);
        rewritten += remap_keys(&mut self.drags, remap);
        rewritten += remap_keys(&mut self.creates, remap);
        rewritten += remap_keys(&mut self.deletes, remap);

        for create in self.creates.values_mut() {
            if remap.rewrite_opt(&mut create.value.parent) {
                rewritten += 1;
            }
        }
        for delete in self.deletes.values_mut() {
            let record = &mut delete.value;
            if remap.rewrite_opt(&mut record.parent) {
                rewritten += 1;
            }
            for id in record
                .cascade_nodes
                .iter_mut()
                .chain(record.cascade_cards.iter_mut())
            {
                if remap.rewrite(id) {
                    rewritten += 1;
                }
            }
        }
        for edge in self.edge_creates.values_mut() {
            if remap.rewrite(&mut edge.value.source) {
                rewritten += 1;
            }
            if remap.rewrite(&mut edge.value.target) {
                rewritten += 1;
            }
        }

        let in_flight: HashSet<String> = self.in_flight.iter().map(|id| remap.apply(id)).collect();
        self.in_flight = in_flight;
        rewritten
    }
}
