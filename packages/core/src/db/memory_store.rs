//! In-Memory Document Store
//!
//! A complete store living in the process: it assigns permanent ids
//! (`node-N`, `card-N`), applies batches, and keeps a log of every request it
//! received. Used for offline sessions and throughout the test suite, where the
//! scripting hooks (`fail_next`, `reject_next`, ...) stand in for a misbehaving
//! remote.

use crate::db::batch::{BatchRequest, BatchResponse};
use crate::db::document_store::DocumentStore;
use crate::db::error::StoreError;
use crate::models::{Card, DocumentSnapshot, Edge, Node, Position};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

/// Scripted behaviour for the next `save_batch` call
#[derive(Debug, Clone)]
enum Scripted {
    /// Fail without touching state
    Fail(StoreError),
    /// Answer `success: false` with id maps that were never applied
    Reject(Vec<String>),
    /// Apply normally and report these errors alongside
    Warn(Vec<String>),
    /// Apply normally but leave card creates out of the id map
    OmitCardMappings,
}

#[derive(Debug, Default)]
struct MemoryState {
    nodes: HashMap<String, Node>,
    edges: HashMap<String, Edge>,
    cards: HashMap<String, Card>,
    next_node: u64,
    next_card: u64,
    requests: Vec<BatchRequest>,
    scripted: VecDeque<Scripted>,
}

/// Outcome of applying one batch to the state
#[derive(Debug, Default)]
struct Applied {
    node_ids: HashMap<String, String>,
    card_ids: HashMap<String, String>,
    errors: Vec<String>,
}

impl Applied {
    fn resolve(&self, id: &str) -> String {
        self.node_ids
            .get(id)
            .or_else(|| self.card_ids.get(id))
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }
}

impl MemoryState {
    fn mint_node(&mut self) -> String {
        self.next_node += 1;
        format!("node-{}", self.next_node)
    }

    fn mint_card(&mut self) -> String {
        self.next_card += 1;
        format!("card-{}", self.next_card)
    }

    fn snapshot(&self) -> DocumentSnapshot {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<Edge> = self.edges.values().cloned().collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        let mut cards: Vec<Card> = self.cards.values().cloned().collect();
        cards.sort_by(|a, b| a.id.cmp(&b.id));
        DocumentSnapshot {
            nodes,
            edges,
            cards,
        }
    }

    /// Mint the ids a batch would receive without applying anything
    fn preview_ids(&mut self, request: &BatchRequest) -> Applied {
        let mut applied = Applied::default();
        for create in &request.node_creates {
            let id = self.mint_node();
            applied.node_ids.insert(create.temp_id.clone(), id);
        }
        for create in &request.card_creates {
            let id = self.mint_card();
            applied.card_ids.insert(create.temp_id.clone(), id);
        }
        applied
    }

    fn apply(&mut self, request: &BatchRequest) -> Applied {
        let mut applied = Applied::default();

        for create in &request.node_creates {
            let id = self.mint_node();
            let position = match (create.x, create.y) {
                (Some(x), Some(y)) => Some(Position { x, y }),
                _ => None,
            };
            self.nodes.insert(
                id.clone(),
                Node {
                    id: id.clone(),
                    text: create.text.clone(),
                    order: create.order.unwrap_or_default(),
                    expanded: None,
                    position,
                },
            );
            applied.node_ids.insert(create.temp_id.clone(), id);
        }

        for create in &request.card_creates {
            let node_id = applied.resolve(&create.node_id);
            if !self.nodes.contains_key(&node_id) {
                applied.errors.push(format!(
                    "card '{}' references unknown node '{}'",
                    create.temp_id, create.node_id
                ));
                continue;
            }
            let id = self.mint_card();
            self.cards.insert(
                id.clone(),
                Card {
                    id: id.clone(),
                    node_id,
                    title: create.title.clone(),
                    content: create.content.clone(),
                    order: create.order.unwrap_or_default(),
                    problems: create.problems.clone().unwrap_or_default(),
                },
            );
            applied.card_ids.insert(create.temp_id.clone(), id);
        }

        for edge_id in &request.edge_deletes {
            if self.edges.remove(edge_id).is_none() {
                applied
                    .errors
                    .push(format!("edge '{}' does not exist", edge_id));
            }
        }

        for create in &request.edge_creates {
            let source = applied.resolve(&create.source);
            let target = applied.resolve(&create.target);
            if !self.nodes.contains_key(&source) || !self.nodes.contains_key(&target) {
                applied.errors.push(format!(
                    "edge '{}' references an unknown node",
                    create.id
                ));
                continue;
            }
            if self.edges.values().any(|e| e.target == target) {
                applied
                    .errors
                    .push(format!("node '{}' already has a parent", target));
                continue;
            }
            self.edges.insert(
                create.id.clone(),
                Edge {
                    id: create.id.clone(),
                    source,
                    target,
                    label: create.label.clone(),
                },
            );
        }

        for update in &request.node_updates {
            let Some(node) = self.nodes.get_mut(&update.node_id) else {
                applied
                    .errors
                    .push(format!("node '{}' does not exist", update.node_id));
                continue;
            };
            if let Some(text) = &update.text {
                node.text = text.clone();
            }
            if let Some(order) = update.order {
                node.order = order;
            }
            if let Some(expanded) = update.expanded {
                node.expanded = Some(expanded);
            }
        }

        for update in &request.card_updates {
            let owner = applied.resolve(&update.node_id);
            let Some(card) = self.cards.get_mut(&update.card_id) else {
                applied
                    .errors
                    .push(format!("card '{}' does not exist", update.card_id));
                continue;
            };
            card.node_id = owner;
            if let Some(title) = &update.title {
                card.title = title.clone();
            }
            if let Some(content) = &update.content {
                card.content = content.clone();
            }
            if let Some(order) = update.order {
                card.order = order;
            }
            if let Some(problems) = &update.problems {
                card.problems = problems.clone();
            }
        }

        for card_id in &request.card_deletes {
            if self.cards.remove(card_id).is_none() {
                applied
                    .errors
                    .push(format!("card '{}' does not exist", card_id));
            }
        }

        for node_id in &request.node_deletes {
            if self.nodes.remove(node_id).is_none() {
                applied
                    .errors
                    .push(format!("node '{}' does not exist", node_id));
                continue;
            }
            self.edges
                .retain(|_, e| &e.source != node_id && &e.target != node_id);
            self.cards.retain(|_, c| &c.node_id != node_id);
        }

        applied
    }
}

/// Document store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with a document
    pub fn with_document(document: DocumentSnapshot) -> Self {
        let state = MemoryState {
            nodes: document
                .nodes
                .into_iter()
                .map(|n| (n.id.clone(), n))
                .collect(),
            edges: document
                .edges
                .into_iter()
                .map(|e| (e.id.clone(), e))
                .collect(),
            cards: document
                .cards
                .into_iter()
                .map(|c| (c.id.clone(), c))
                .collect(),
            ..MemoryState::default()
        };
        Self {
            state: Mutex::new(state),
            latency: None,
        }
    }

    /// Delay every `save_batch` answer
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Current stored document
    pub async fn document(&self) -> DocumentSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Every request received so far, oldest first
    pub async fn requests(&self) -> Vec<BatchRequest> {
        self.state.lock().await.requests.clone()
    }

    /// Fail the next save with `error` and leave state untouched
    pub async fn fail_next(&self, error: StoreError) {
        self.state
            .lock()
            .await
            .scripted
            .push_back(Scripted::Fail(error));
    }

    /// Answer the next save with `success: false` plus map fragments that were never applied
    pub async fn reject_next(&self, errors: Vec<String>) {
        self.state
            .lock()
            .await
            .scripted
            .push_back(Scripted::Reject(errors));
    }

    /// Apply the next save and report `errors` alongside `success: true`
    pub async fn warn_next(&self, errors: Vec<String>) {
        self.state
            .lock()
            .await
            .scripted
            .push_back(Scripted::Warn(errors));
    }

    /// Apply the next save but leave card creates out of `cardIdMap`
    pub async fn omit_card_mappings_next(&self) {
        self.state
            .lock()
            .await
            .scripted
            .push_back(Scripted::OmitCardMappings);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load_document(&self) -> Result<DocumentSnapshot, StoreError> {
        Ok(self.state.lock().await.snapshot())
    }

    async fn save_batch(&self, request: &BatchRequest) -> Result<BatchResponse, StoreError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        state.requests.push(request.clone());

        let response = match state.scripted.pop_front() {
            Some(Scripted::Fail(error)) => return Err(error),
            Some(Scripted::Reject(errors)) => {
                let preview = state.preview_ids(request);
                BatchResponse {
                    success: false,
                    node_id_map: Some(preview.node_ids),
                    card_id_map: Some(preview.card_ids),
                    errors: Some(errors),
                }
            }
            Some(Scripted::Warn(extra)) => {
                let mut applied = state.apply(request);
                applied.errors.extend(extra);
                to_response(applied)
            }
            Some(Scripted::OmitCardMappings) => {
                let mut applied = state.apply(request);
                applied.card_ids.clear();
                to_response(applied)
            }
            None => to_response(state.apply(request)),
        };

        tracing::debug!(
            "Memory store applied batch: {} node ids, {} card ids, success={}",
            response.node_id_map.as_ref().map_or(0, HashMap::len),
            response.card_id_map.as_ref().map_or(0, HashMap::len),
            response.success
        );
        Ok(response)
    }
}

fn to_response(applied: Applied) -> BatchResponse {
    BatchResponse {
        success: true,
        node_id_map: Some(applied.node_ids),
        card_id_map: Some(applied.card_ids),
        errors: (!applied.errors.is_empty()).then_some(applied.errors),
    }
}
