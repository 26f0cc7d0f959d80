//! Identifier Lifecycle
//!
//! Entities created locally get a temporary identifier (`tmp-` prefix plus a UUID
//! suffix) that is valid only until the next successful save. The store answers a
//! save with temp → permanent maps; [`IdRemap`] carries those maps and every live
//! structure implements [`Remappable`] so the substitution happens in one pass.
//!
//! # Invariant
//!
//! Once a permanent id is learned for a temporary one, every structure holding the
//! temporary id is rewritten in the same pass. No structure may keep a mix of the
//! old and the new id.

use crate::models::EntityKind;
use std::collections::HashMap;
use uuid::Uuid;

/// Prefix marking client-minted identifiers
pub const TEMP_ID_PREFIX: &str = "tmp-";

/// True when `id` was minted locally and has not been replaced yet
pub fn is_temporary(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Where a temporary identifier came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    /// Fresh entity created by a user action or operation
    Created,
    /// Duplicate of another entity produced by paste
    DuplicatedFrom(String),
}

/// Temporary identifier bookkeeping for one editing session
#[derive(Debug, Default)]
pub struct IdentifierLifecycle {
    minted: HashMap<String, (EntityKind, Provenance)>,
}

impl IdentifierLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh temporary identifier
    pub fn mint(&mut self, kind: EntityKind, provenance: Provenance) -> String {
        let id = format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4().simple());
        self.minted.insert(id.clone(), (kind, provenance));
        id
    }

    pub fn provenance(&self, id: &str) -> Option<&Provenance> {
        self.minted.get(id).map(|(_, provenance)| provenance)
    }

    pub fn kind_of(&self, id: &str) -> Option<EntityKind> {
        self.minted.get(id).map(|(kind, _)| *kind)
    }

    /// Number of temporary ids still awaiting a permanent id
    pub fn outstanding(&self) -> usize {
        self.minted.len()
    }

    /// Forget ids whose entities were discarded before ever being saved
    pub fn forget(&mut self, id: &str) {
        self.minted.remove(id);
    }
}

impl Remappable for IdentifierLifecycle {
    fn remap_ids(&mut self, remap: &IdRemap) -> usize {
        let before = self.minted.len();
        self.minted.retain(|id, _| remap.resolve(id).is_none());
        let resolved = before - self.minted.len();

        // Provenance pointing at a remapped original follows it.
        for (_, provenance) in self.minted.values_mut() {
            if let Provenance::DuplicatedFrom(source) = provenance {
                remap.rewrite(source);
            }
        }
        resolved
    }
}

/// Temp → permanent identifier maps learned from one save
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdRemap {
    nodes: HashMap<String, String>,
    cards: HashMap<String, String>,
}

impl IdRemap {
    pub fn new(nodes: HashMap<String, String>, cards: HashMap<String, String>) -> Self {
        Self { nodes, cards }
    }

    pub fn node(&self, temp_id: &str) -> Option<&str> {
        self.nodes.get(temp_id).map(String::as_str)
    }

    pub fn card(&self, temp_id: &str) -> Option<&str> {
        self.cards.get(temp_id).map(String::as_str)
    }

    /// Permanent id for `temp_id`, whichever kind it belongs to
    pub fn resolve(&self, temp_id: &str) -> Option<&str> {
        self.node(temp_id).or_else(|| self.card(temp_id))
    }

    /// Rewrite `id` in place; returns whether it changed
    pub fn rewrite(&self, id: &mut String) -> bool {
        if !is_temporary(id) {
            return false;
        }
        match self.resolve(id) {
            Some(permanent) => {
                *id = permanent.to_string();
                true
            }
            None => false,
        }
    }

    pub fn rewrite_opt(&self, id: &mut Option<String>) -> bool {
        match id {
            Some(inner) => self.rewrite(inner),
            None => false,
        }
    }

    /// Rewritten copy of `id`
    pub fn apply(&self, id: &str) -> String {
        self.resolve(id).unwrap_or(id).to_string()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn card_count(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.cards.is_empty()
    }
}

/// A live structure that can hold temporary identifiers
pub trait Remappable {
    /// Rewrite every temporary id found in `remap`; returns how many were rewritten
    fn remap_ids(&mut self, remap: &IdRemap) -> usize;
}

/// Rekey a map whose keys may be temporary ids
pub(crate) fn remap_keys<V>(map: &mut HashMap<String, V>, remap: &IdRemap) -> usize {
    let temps: Vec<String> = map
        .keys()
        .filter(|id| is_temporary(id) && remap.resolve(id).is_some())
        .cloned()
        .collect();
    for temp in &temps {
        if let Some(value) = map.remove(temp) {
            map.insert(remap.apply(temp), value);
        }
    }
    temps.len()
}
