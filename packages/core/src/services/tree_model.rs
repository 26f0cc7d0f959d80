//! Tree Model
//!
//! In-memory arena of the document tree: nodes addressed by id, a parent/child
//! index derived from edges, and an injected [`CardRepository`] for cards.
//!
//! # Invariants
//!
//! - Each node has at most one incoming edge; a node without one is a root
//! - Moves never introduce a cycle (checked by a descendant walk before mutating)
//! - Nodes and cards under one parent share a single ordering space; after any
//!   reorder the group's order values are exactly `1..n`
//! - Deleting a node removes its whole subtree, every card owned by it, and every
//!   edge touching it in one mutation
//!
//! The tree model never mints identifiers and never touches the ledger; callers
//! hand it ids and record the resulting changes themselves.

use crate::models::{
    Card, CardSeed, DocumentSnapshot, Edge, EntityKind, EntityRef, Node, NodeSeed,
};
use crate::operations::TreeOperationError;
use crate::services::card_repository::CardRepository;
use crate::services::identifier::{remap_keys, IdRemap, Remappable};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub type TreeResult<T> = Result<T, TreeOperationError>;

/// Edge changes produced by [`TreeModel::move_node`]
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMove {
    pub node_id: String,
    pub previous_parent: Option<String>,
    pub removed_edge: Option<Edge>,
    pub created_edge: Option<Edge>,
}

impl NodeMove {
    pub fn parent_changed(&self) -> bool {
        self.removed_edge.is_some() || self.created_edge.is_some()
    }
}

/// Everything removed by a cascading delete
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemovedSubtree {
    /// Removed nodes, subtree root first, in pre-order
    pub nodes: Vec<Node>,
    pub cards: Vec<Card>,
    pub edges: Vec<Edge>,
}

impl RemovedSubtree {
    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    pub fn card_ids(&self) -> Vec<String> {
        self.cards.iter().map(|c| c.id.clone()).collect()
    }
}

/// Arena of nodes and edges plus the card repository
#[derive(Debug, Clone, Default)]
pub struct TreeModel {
    nodes: HashMap<String, Node>,
    /// Incoming edge keyed by target node id
    incoming: HashMap<String, Edge>,
    /// Child node ids keyed by parent node id
    children: HashMap<String, HashSet<String>>,
    cards: CardRepository,
}

impl TreeModel {
    /// Create an empty tree around an existing card repository
    pub fn new(cards: CardRepository) -> Self {
        Self {
            cards,
            ..Self::default()
        }
    }

    /// Build a tree from a loaded document, validating tree invariants
    pub fn from_snapshot(snapshot: DocumentSnapshot) -> TreeResult<Self> {
        let mut tree = Self::default();

        for node in snapshot.nodes {
            if tree.nodes.contains_key(&node.id) {
                return Err(TreeOperationError::invalid_document(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
            tree.nodes.insert(node.id.clone(), node);
        }

        for edge in snapshot.edges {
            if edge.source == edge.target {
                return Err(TreeOperationError::invalid_document(format!(
                    "edge '{}' points node '{}' at itself",
                    edge.id, edge.source
                )));
            }
            for endpoint in [&edge.source, &edge.target] {
                if !tree.nodes.contains_key(endpoint) {
                    return Err(TreeOperationError::invalid_document(format!(
                        "edge '{}' references unknown node '{}'",
                        edge.id, endpoint
                    )));
                }
            }
            if tree.incoming.contains_key(&edge.target) {
                return Err(TreeOperationError::invalid_document(format!(
                    "node '{}' has more than one parent",
                    edge.target
                )));
            }
            tree.attach(edge);
        }

        for card in snapshot.cards {
            if !tree.nodes.contains_key(&card.node_id) {
                return Err(TreeOperationError::invalid_document(format!(
                    "card '{}' belongs to unknown node '{}'",
                    card.id, card.node_id
                )));
            }
            if tree.cards.contains(&card.id) {
                return Err(TreeOperationError::invalid_document(format!(
                    "duplicate card id '{}'",
                    card.id
                )));
            }
            tree.cards.insert(card);
        }

        tree.ensure_acyclic()?;
        Ok(tree)
    }

    /// Export the current tree as a document snapshot
    pub fn to_snapshot(&self) -> DocumentSnapshot {
        let order = self.preorder();
        DocumentSnapshot {
            nodes: order
                .iter()
                .filter_map(|id| self.nodes.get(id).cloned())
                .collect(),
            edges: order
                .iter()
                .filter_map(|id| self.incoming.get(id).cloned())
                .collect(),
            cards: order
                .iter()
                .flat_map(|id| self.sorted_cards_of(id))
                .cloned()
                .collect(),
        }
    }

    //
    // QUERIES
    //

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn card(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contains_card(&self, id: &str) -> bool {
        self.cards.contains(id)
    }

    pub fn contains(&self, entity: &EntityRef) -> bool {
        match entity.kind {
            EntityKind::Node => self.contains_node(&entity.id),
            EntityKind::Card => self.contains_card(&entity.id),
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.incoming.values()
    }

    pub fn cards(&self) -> &CardRepository {
        &self.cards
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn parent_of(&self, node_id: &str) -> Option<&str> {
        self.incoming.get(node_id).map(|e| e.source.as_str())
    }

    pub fn incoming_edge(&self, node_id: &str) -> Option<&Edge> {
        self.incoming.get(node_id)
    }

    /// Parent of the sibling group `entity` belongs to (`None` for root nodes)
    pub fn group_of(&self, entity: &EntityRef) -> Option<Option<String>> {
        match entity.kind {
            EntityKind::Node => self
                .nodes
                .contains_key(&entity.id)
                .then(|| self.parent_of(&entity.id).map(str::to_string)),
            EntityKind::Card => self.cards.get(&entity.id).map(|c| Some(c.node_id.clone())),
        }
    }

    pub fn order_of(&self, entity: &EntityRef) -> Option<i64> {
        match entity.kind {
            EntityKind::Node => self.nodes.get(&entity.id).map(|n| n.order),
            EntityKind::Card => self.cards.get(&entity.id).map(|c| c.order),
        }
    }

    /// Children of `parent` (roots when `None`), sorted for display
    ///
    /// Nodes and cards are interleaved by order; ties break nodes-first, then by id.
    pub fn children_of(&self, parent: Option<&str>) -> Vec<EntityRef> {
        let mut items: Vec<(i64, EntityRef)> = match parent {
            None => self
                .nodes
                .values()
                .filter(|n| !self.incoming.contains_key(&n.id))
                .map(|n| (n.order, EntityRef::node(n.id.clone())))
                .collect(),
            Some(parent_id) => {
                let mut items: Vec<(i64, EntityRef)> = self
                    .children
                    .get(parent_id)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| self.nodes.get(id))
                    .map(|n| (n.order, EntityRef::node(n.id.clone())))
                    .collect();
                items.extend(
                    self.cards
                        .cards_of(parent_id)
                        .into_iter()
                        .map(|c| (c.order, EntityRef::card(c.id.clone()))),
                );
                items
            }
        };
        items.sort_by(|(a_order, a), (b_order, b)| {
            a_order
                .cmp(b_order)
                .then_with(|| b.is_node().cmp(&a.is_node()))
                .then_with(|| a.id.cmp(&b.id))
        });
        items.into_iter().map(|(_, entity)| entity).collect()
    }

    /// Order value for a new last child of `parent`
    pub fn next_order(&self, parent: Option<&str>) -> i64 {
        self.children_of(parent)
            .iter()
            .filter_map(|entity| self.order_of(entity))
            .max()
            .unwrap_or(0)
            + 1
    }

    /// True when `candidate` is reachable from `ancestor` by following child edges
    pub fn is_descendant(&self, ancestor: &str, candidate: &str) -> bool {
        let mut stack: Vec<&str> = vec![ancestor];
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for child in self.children.get(current).into_iter().flatten() {
                if child == candidate {
                    return true;
                }
                stack.push(child.as_str());
            }
        }
        false
    }

    /// `node_id` and all of its descendant nodes, in display pre-order
    pub fn subtree_nodes(&self, node_id: &str) -> Vec<String> {
        let mut out = Vec::new();
        if self.nodes.contains_key(node_id) {
            self.collect_preorder(node_id, &mut out);
        }
        out
    }

    /// Every node of the document in display pre-order
    pub fn preorder(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for root in self.children_of(None) {
            self.collect_preorder(&root.id, &mut out);
        }
        out
    }

    /// Cards of `node_id` sorted by order
    pub fn sorted_cards_of(&self, node_id: &str) -> Vec<&Card> {
        let mut cards = self.cards.cards_of(node_id);
        cards.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        cards
    }

    /// Display name: node text or card title
    pub fn name_of(&self, entity: &EntityRef) -> Option<&str> {
        match entity.kind {
            EntityKind::Node => self.nodes.get(&entity.id).map(|n| n.text.as_str()),
            EntityKind::Card => self.cards.get(&entity.id).map(|c| c.title.as_str()),
        }
    }

    //
    // MUTATIONS
    //

    /// Create a node as the last child of `parent` (a root when `None`)
    ///
    /// Returns the edge linking it to its parent.
    pub fn create_node(
        &mut self,
        id: String,
        parent: Option<&str>,
        seed: NodeSeed,
    ) -> TreeResult<Option<Edge>> {
        if let Some(parent_id) = parent {
            self.require_node(parent_id)?;
        }
        let order = self.next_order(parent);
        self.nodes
            .insert(id.clone(), Node::from_seed(id.clone(), seed, order));

        let edge = parent.map(|parent_id| Edge::new(parent_id.to_string(), id));
        if let Some(edge) = &edge {
            self.attach(edge.clone());
        }
        Ok(edge)
    }

    /// Create a card as the last child of `node_id`
    pub fn create_card(&mut self, id: String, node_id: &str, seed: CardSeed) -> TreeResult<()> {
        self.require_node(node_id)?;
        let order = self.next_order(Some(node_id));
        self.cards
            .insert(Card::from_seed(id, node_id.to_string(), seed, order));
        Ok(())
    }

    /// Replace the incoming edge of `node_id`
    ///
    /// Rejects moves onto the node itself or any of its descendants. Moving within
    /// the same parent leaves edges and order untouched.
    pub fn move_node(&mut self, node_id: &str, new_parent: Option<&str>) -> TreeResult<NodeMove> {
        self.require_node(node_id)?;
        if let Some(parent_id) = new_parent {
            self.require_node(parent_id)?;
            if parent_id == node_id || self.is_descendant(node_id, parent_id) {
                return Err(TreeOperationError::circular_move(
                    node_id.to_string(),
                    parent_id.to_string(),
                ));
            }
        }

        let previous_parent = self.parent_of(node_id).map(str::to_string);
        if previous_parent.as_deref() == new_parent {
            return Ok(NodeMove {
                node_id: node_id.to_string(),
                previous_parent,
                removed_edge: None,
                created_edge: None,
            });
        }

        let order = self.next_order(new_parent);
        let removed_edge = self.detach(node_id);
        let created_edge =
            new_parent.map(|parent_id| Edge::new(parent_id.to_string(), node_id.to_string()));
        if let Some(edge) = &created_edge {
            self.attach(edge.clone());
        }
        if let Some(node) = self.nodes.get_mut(node_id) {
            node.order = order;
        }

        Ok(NodeMove {
            node_id: node_id.to_string(),
            previous_parent,
            removed_edge,
            created_edge,
        })
    }

    /// Hand a card to another node as its last child
    ///
    /// Returns the previous owner, or `None` when the owner did not change.
    pub fn move_card(&mut self, card_id: &str, new_node_id: &str) -> TreeResult<Option<String>> {
        let current_owner = self
            .cards
            .get(card_id)
            .map(|c| c.node_id.clone())
            .ok_or_else(|| TreeOperationError::card_not_found(card_id.to_string()))?;
        self.require_node(new_node_id)?;
        if current_owner == new_node_id {
            return Ok(None);
        }
        let order = self.next_order(Some(new_node_id));
        Ok(self.cards.reassign(card_id, new_node_id, order))
    }

    /// Assign dense order values `1..n` to the children of `parent` in the given sequence
    ///
    /// `ordered` must list every child exactly once. Returns the children whose order
    /// value changed.
    pub fn reorder_siblings(
        &mut self,
        parent: Option<&str>,
        ordered: &[EntityRef],
    ) -> TreeResult<Vec<EntityRef>> {
        if let Some(parent_id) = parent {
            self.require_node(parent_id)?;
        }
        let current = self.children_of(parent);
        if ordered.len() != current.len() {
            return Err(TreeOperationError::malformed_reorder(format!(
                "expected {} items, got {}",
                current.len(),
                ordered.len()
            )));
        }

        let members: HashSet<&EntityRef> = current.iter().collect();
        let mut seen: HashSet<&EntityRef> = HashSet::with_capacity(ordered.len());
        for item in ordered {
            if !members.contains(item) {
                return Err(TreeOperationError::malformed_reorder(format!(
                    "{} is not a child of {}",
                    item,
                    parent.unwrap_or("the document root")
                )));
            }
            if !seen.insert(item) {
                return Err(TreeOperationError::malformed_reorder(format!(
                    "{} listed more than once",
                    item
                )));
            }
        }

        let mut changed = Vec::new();
        for (index, item) in ordered.iter().enumerate() {
            let order = index as i64 + 1;
            if self.set_order(item, order) != Some(order) {
                changed.push(item.clone());
            }
        }
        Ok(changed)
    }

    /// Remove `node_id`, its descendants, their cards and every touching edge
    pub fn delete_node(&mut self, node_id: &str) -> TreeResult<RemovedSubtree> {
        self.require_node(node_id)?;
        let ids = self.subtree_nodes(node_id);
        let mut removed = RemovedSubtree::default();

        for id in &ids {
            let card_ids: Vec<String> = self
                .sorted_cards_of(id)
                .into_iter()
                .map(|c| c.id.clone())
                .collect();
            removed
                .cards
                .extend(card_ids.iter().filter_map(|card_id| self.cards.remove(card_id)));
        }
        // Every edge touching the subtree targets a subtree node.
        for id in &ids {
            if let Some(edge) = self.detach(id) {
                removed.edges.push(edge);
            }
        }
        for id in &ids {
            self.children.remove(id);
            if let Some(node) = self.nodes.remove(id) {
                removed.nodes.push(node);
            }
        }
        Ok(removed)
    }

    pub fn delete_card(&mut self, card_id: &str) -> TreeResult<Card> {
        self.cards
            .remove(card_id)
            .ok_or_else(|| TreeOperationError::card_not_found(card_id.to_string()))
    }

    /// Set node text, returning the previous text
    pub fn set_node_text(&mut self, node_id: &str, text: String) -> TreeResult<String> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| TreeOperationError::node_not_found(node_id.to_string()))?;
        Ok(std::mem::replace(&mut node.text, text))
    }

    pub fn set_card_title(&mut self, card_id: &str, title: String) -> TreeResult<String> {
        let card = self.card_mut(card_id)?;
        Ok(std::mem::replace(&mut card.title, title))
    }

    pub fn set_card_content(&mut self, card_id: &str, content: String) -> TreeResult<String> {
        let card = self.card_mut(card_id)?;
        Ok(std::mem::replace(&mut card.content, content))
    }

    /// Append an opaque problem to a card, returning the previous list
    pub fn push_problem(&mut self, card_id: &str, problem: Value) -> TreeResult<Vec<Value>> {
        let card = self.card_mut(card_id)?;
        let previous = card.problems.clone();
        card.problems.push(problem);
        Ok(previous)
    }

    pub fn set_expanded(&mut self, node_id: &str, expanded: bool) -> TreeResult<Option<bool>> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| TreeOperationError::node_not_found(node_id.to_string()))?;
        Ok(node.expanded.replace(expanded))
    }

    //
    // INTERNALS
    //

    fn require_node(&self, id: &str) -> TreeResult<()> {
        if self.nodes.contains_key(id) {
            Ok(())
        } else {
            Err(TreeOperationError::node_not_found(id.to_string()))
        }
    }

    fn card_mut(&mut self, card_id: &str) -> TreeResult<&mut Card> {
        self.cards
            .get_mut(card_id)
            .ok_or_else(|| TreeOperationError::card_not_found(card_id.to_string()))
    }

    fn set_order(&mut self, entity: &EntityRef, order: i64) -> Option<i64> {
        let slot = match entity.kind {
            EntityKind::Node => self.nodes.get_mut(&entity.id).map(|n| &mut n.order),
            EntityKind::Card => self.cards.get_mut(&entity.id).map(|c| &mut c.order),
        }?;
        Some(std::mem::replace(slot, order))
    }

    fn attach(&mut self, edge: Edge) {
        self.children
            .entry(edge.source.clone())
            .or_default()
            .insert(edge.target.clone());
        self.incoming.insert(edge.target.clone(), edge);
    }

    fn detach(&mut self, node_id: &str) -> Option<Edge> {
        let edge = self.incoming.remove(node_id)?;
        if let Some(siblings) = self.children.get_mut(&edge.source) {
            siblings.remove(node_id);
            if siblings.is_empty() {
                self.children.remove(&edge.source);
            }
        }
        Some(edge)
    }

    fn collect_preorder(&self, node_id: &str, out: &mut Vec<String>) {
        out.push(node_id.to_string());
        for child in self.children_of(Some(node_id)) {
            if child.is_node() {
                self.collect_preorder(&child.id, out);
            }
        }
    }

    fn ensure_acyclic(&self) -> TreeResult<()> {
        let mut reaches_root: HashSet<&str> = HashSet::new();
        for start in self.nodes.keys() {
            let mut path: HashSet<&str> = HashSet::new();
            let mut current = start.as_str();
            loop {
                if reaches_root.contains(current) {
                    break;
                }
                if !path.insert(current) {
                    return Err(TreeOperationError::invalid_document(format!(
                        "cycle through node '{}'",
                        current
                    )));
                }
                match self.parent_of(current) {
                    Some(parent) => current = parent,
                    None => break,
                }
            }
            reaches_root.extend(path);
        }
        Ok(())
    }
}

impl Remappable for TreeModel {
    fn remap_ids(&mut self, remap: &IdRemap) -> usize {
        let rewritten = remap_keys(&mut self.nodes, remap);
        for node in self.nodes.values_mut() {
            remap.rewrite(&mut node.id);
        }

        remap_keys(&mut self.incoming, remap);
        for edge in self.incoming.values_mut() {
            remap.rewrite(&mut edge.source);
            remap.rewrite(&mut edge.target);
        }

        remap_keys(&mut self.children, remap);
        for siblings in self.children.values_mut() {
            if siblings.iter().any(|id| remap.resolve(id).is_some()) {
                *siblings = siblings.iter().map(|id| remap.apply(id)).collect();
            }
        }

        rewritten + self.cards.remap_ids(remap)
    }
}
