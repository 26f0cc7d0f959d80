//! Card Repository
//!
//! Explicit owner of every card in the document, indexed by owning node. The tree
//! model receives a repository at construction and reaches cards only through it.

use crate::models::Card;
use crate::services::identifier::{remap_keys, IdRemap, Remappable};
use std::collections::{HashMap, HashSet};

/// Cards keyed by id plus a node → cards index
#[derive(Debug, Clone, Default)]
pub struct CardRepository {
    cards: HashMap<String, Card>,
    by_node: HashMap<String, HashSet<String>>,
}

impl CardRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a repository from loaded cards
    pub fn with_cards(cards: impl IntoIterator<Item = Card>) -> Self {
        let mut repo = Self::new();
        for card in cards {
            repo.insert(card);
        }
        repo
    }

    /// Insert or replace a card
    pub fn insert(&mut self, card: Card) {
        if let Some(previous) = self.cards.get(&card.id) {
            let previous_owner = previous.node_id.clone();
            self.unindex(&card.id, &previous_owner);
        }
        self.by_node
            .entry(card.node_id.clone())
            .or_default()
            .insert(card.id.clone());
        self.cards.insert(card.id.clone(), card);
    }

    pub fn get(&self, id: &str) -> Option<&Card> {
        self.cards.get(id)
    }

    /// Mutable access for field edits. Owner changes go through [`Self::reassign`].
    pub(crate) fn get_mut(&mut self, id: &str) -> Option<&mut Card> {
        self.cards.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Card> {
        let card = self.cards.remove(id)?;
        self.unindex(id, &card.node_id);
        Some(card)
    }

    /// Move a card to another node with a new order value
    pub fn reassign(&mut self, id: &str, node_id: &str, order: i64) -> Option<String> {
        let card = self.cards.get_mut(id)?;
        let previous = std::mem::replace(&mut card.node_id, node_id.to_string());
        card.order = order;
        self.unindex(id, &previous);
        self.by_node
            .entry(node_id.to_string())
            .or_default()
            .insert(id.to_string());
        Some(previous)
    }

    /// Cards owned by `node_id`, unordered
    pub fn cards_of(&self, node_id: &str) -> Vec<&Card> {
        self.by_node
            .get(node_id)
            .map(|ids| ids.iter().filter_map(|id| self.cards.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Card> {
        self.cards.values()
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    fn unindex(&mut self, id: &str, node_id: &str) {
        if let Some(ids) = self.by_node.get_mut(node_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_node.remove(node_id);
            }
        }
    }
}

impl Remappable for CardRepository {
    fn remap_ids(&mut self, remap: &IdRemap) -> usize {
        let mut rewritten = remap_keys(&mut self.cards, remap);
        for card in self.cards.values_mut() {
            // Counted once, by remap_keys.
            remap.rewrite(&mut card.id);
            if remap.rewrite(&mut card.node_id) {
                rewritten += 1;
            }
        }

        let mut by_node = HashMap::with_capacity(self.by_node.len());
        for card in self.cards.values() {
            by_node
                .entry(card.node_id.clone())
                .or_insert_with(HashSet::new)
                .insert(card.id.clone());
        }
        self.by_node = by_node;
        rewritten
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CardSeed;

    fn card(id: &str, node: &str, order: i64) -> Card {
        Card::from_seed(
            id.to_string(),
            node.to_string(),
            CardSeed::new(id, ""),
            order,
        )
    }

    #[test]
    fn test_reassign_updates_index() {
        let mut repo = CardRepository::with_cards([card("c1", "n1", 1), card("c2", "n1", 2)]);

        let previous = repo.reassign("c1", "n2", 5);

        assert_eq!(previous.as_deref(), Some("n1"));
        assert_eq!(repo.cards_of("n1").len(), 1);
        assert_eq!(repo.cards_of("n2")[0].order, 5);
    }

    #[test]
    fn test_remove_drops_empty_index_entry() {
        let mut repo = CardRepository::with_cards([card("c1", "n1", 1)]);
        assert!(repo.remove("c1").is_some());
        assert!(repo.cards_of("n1").is_empty());
        assert!(repo.is_empty());
    }

    #[test]
    fn test_remap_rewrites_card_and_owner_ids() {
        let mut repo = CardRepository::with_cards([card("tmp-c", "tmp-n", 1)]);
        let remap = IdRemap::new(
            [("tmp-n".to_string(), "n1".to_string())].into(),
            [("tmp-c".to_string(), "c1".to_string())].into(),
        );

        repo.remap_ids(&remap);

        let card = repo.get("c1").unwrap();
        assert_eq!(card.node_id, "n1");
        assert_eq!(repo.cards_of("n1").len(), 1);
        assert!(repo.get("tmp-c").is_none());
    }
}
