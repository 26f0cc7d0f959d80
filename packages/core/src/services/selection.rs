//! Current user selection

use crate::models::EntityRef;
use crate::services::identifier::{IdRemap, Remappable};
use std::collections::HashSet;

/// Ordered, duplicate-free list of selected entities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    items: Vec<EntityRef>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selection
    pub fn select(&mut self, items: impl IntoIterator<Item = EntityRef>) {
        self.items.clear();
        for item in items {
            self.add(item);
        }
    }

    pub fn add(&mut self, item: EntityRef) {
        if !self.items.contains(&item) {
            self.items.push(item);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[EntityRef] {
        &self.items
    }

    pub fn contains(&self, item: &EntityRef) -> bool {
        self.items.contains(item)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drop entities that no longer exist
    pub fn forget(&mut self, ids: &HashSet<String>) {
        self.items.retain(|item| !ids.contains(&item.id));
    }
}

impl Remappable for Selection {
    fn remap_ids(&mut self, remap: &IdRemap) -> usize {
        self.items
            .iter_mut()
            .map(|item| remap.rewrite(&mut item.id))
            .filter(|changed| *changed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_deduplicates_and_keeps_order() {
        let mut selection = Selection::new();
        selection.select([
            EntityRef::node("b"),
            EntityRef::card("c"),
            EntityRef::node("b"),
        ]);
        assert_eq!(
            selection.items(),
            &[EntityRef::node("b"), EntityRef::card("c")]
        );
    }

    #[test]
    fn test_remap_and_forget() {
        let mut selection = Selection::new();
        selection.select([EntityRef::node("tmp-x"), EntityRef::card("c1")]);

        let remap = IdRemap::new(
            [("tmp-x".to_string(), "n5".to_string())].into(),
            Default::default(),
        );
        assert_eq!(selection.remap_ids(&remap), 1);
        assert!(selection.contains(&EntityRef::node("n5")));

        selection.forget(&["c1".to_string()].into());
        assert_eq!(selection.items().len(), 1);
    }
}
