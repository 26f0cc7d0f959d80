//! Transfer Engine
//!
//! Copy, cut and paste of nodes and cards. Paste always duplicates: every node and
//! card in a pasted subtree gets a fresh temporary id and a `Create` in the ledger,
//! and the edges among the duplicates are rebuilt between the new ids.
//!
//! Paste validates and plans everything against the unmodified tree before the
//! first mutation, so a rejected paste leaves tree, ledger and clipboard as they
//! were. For a cut, removing the originals is left to the caller and happens only
//! after duplication succeeded.

use crate::models::{CardSeed, EntityKind, EntityRef, NodeSeed};
use crate::operations::TreeOperationError;
use crate::services::identifier::{IdRemap, IdentifierLifecycle, Provenance, Remappable};
use crate::services::ledger::{CreateSeed, PendingChangeLedger};
use crate::services::tree_model::{TreeModel, TreeResult};
use std::collections::HashSet;

/// Whether paste removes the originals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardMode {
    Copy,
    Cut,
}

/// Items waiting to be pasted
#[derive(Debug, Clone, PartialEq)]
pub struct Clipboard {
    pub mode: ClipboardMode,
    pub items: Vec<EntityRef>,
}

/// One entity to create during paste
#[derive(Debug, Clone)]
enum PasteStep {
    Node {
        new_id: String,
        source_id: String,
        parent: Option<String>,
        seed: NodeSeed,
        expanded: Option<bool>,
    },
    Card {
        new_id: String,
        source_id: String,
        node_id: String,
        seed: CardSeed,
    },
}

/// What a paste created and what the caller must remove afterwards
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PasteOutcome {
    /// Duplicated top-level items, in clipboard order
    pub roots: Vec<EntityRef>,
    /// Every entity created, in creation order
    pub created: Vec<EntityRef>,
    /// Originals to delete (cut only)
    pub originals_to_remove: Vec<EntityRef>,
}

/// Clipboard owner and paste planner
#[derive(Debug, Default)]
pub struct TransferEngine {
    clipboard: Option<Clipboard>,
}

impl TransferEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `items` for a later paste; the tree is not touched
    pub fn copy(&mut self, items: Vec<EntityRef>) {
        self.set(ClipboardMode::Copy, items);
    }

    /// Like [`copy`](Self::copy), but paste also removes the originals
    pub fn cut(&mut self, items: Vec<EntityRef>) {
        self.set(ClipboardMode::Cut, items);
    }

    fn set(&mut self, mode: ClipboardMode, items: Vec<EntityRef>) {
        let mut seen = HashSet::new();
        let items: Vec<EntityRef> = items
            .into_iter()
            .filter(|item| seen.insert(item.clone()))
            .collect();
        self.clipboard = (!items.is_empty()).then_some(Clipboard { mode, items });
    }

    pub fn clipboard(&self) -> Option<&Clipboard> {
        self.clipboard.as_ref()
    }

    pub fn clear(&mut self) {
        self.clipboard = None;
    }

    /// Drop clipboard references to entities that no longer exist
    pub fn forget(&mut self, ids: &HashSet<String>) {
        if let Some(clipboard) = &mut self.clipboard {
            clipboard.items.retain(|item| !ids.contains(&item.id));
            if clipboard.items.is_empty() {
                self.clipboard = None;
            }
        }
    }

    /// Duplicate the clipboard under `target` (the document root when `None`)
    ///
    /// Each duplicate is created in `tree`, recorded as a `Create` (plus an edge
    /// create for every new parent → child link) in `ledger`, and registered in
    /// `ids` with its source as provenance. A cut clipboard is consumed.
    pub fn paste(
        &mut self,
        target: Option<&str>,
        tree: &mut TreeModel,
        ledger: &mut PendingChangeLedger,
        ids: &mut IdentifierLifecycle,
    ) -> TreeResult<PasteOutcome> {
        let clipboard = self
            .clipboard
            .clone()
            .ok_or(TreeOperationError::EmptyClipboard)?;
        let roots = Self::validate(&clipboard, target, tree)?;

        let mut steps = Vec::new();
        let mut outcome = PasteOutcome::default();
        for root in &roots {
            let new_id = match root.kind {
                EntityKind::Node => {
                    Self::plan_node(tree, &root.id, target.map(str::to_string), ids, &mut steps)
                }
                EntityKind::Card => {
                    // validate() guarantees a target for cards
                    let node_id = target.unwrap_or_default().to_string();
                    Self::plan_card(tree, &root.id, node_id, ids, &mut steps)
                }
            };
            if let Some(new_id) = new_id {
                outcome.roots.push(EntityRef {
                    kind: root.kind,
                    id: new_id,
                });
            }
        }

        for step in steps {
            outcome.created.push(Self::apply_step(step, tree, ledger)?);
        }

        if clipboard.mode == ClipboardMode::Cut {
            outcome.originals_to_remove = roots;
            self.clipboard = None;
        }
        tracing::debug!(
            "Pasted {} items ({} entities) under {:?}",
            outcome.roots.len(),
            outcome.created.len(),
            target
        );
        Ok(outcome)
    }

    /// Check every item and the target; returns the top-level items to duplicate
    fn validate(
        clipboard: &Clipboard,
        target: Option<&str>,
        tree: &TreeModel,
    ) -> TreeResult<Vec<EntityRef>> {
        if let Some(target_id) = target {
            if !tree.contains_node(target_id) {
                return Err(TreeOperationError::node_not_found(target_id.to_string()));
            }
        }

        for item in &clipboard.items {
            if !tree.contains(item) {
                return Err(match item.kind {
                    EntityKind::Node => TreeOperationError::node_not_found(item.id.clone()),
                    EntityKind::Card => TreeOperationError::card_not_found(item.id.clone()),
                });
            }
            if item.is_card() && target.is_none() {
                return Err(TreeOperationError::card_requires_node(item.id.clone()));
            }
        }

        // Items inside another copied subtree are duplicated with it.
        let copied_nodes: Vec<&str> = clipboard
            .items
            .iter()
            .filter(|item| item.is_node())
            .map(|item| item.id.as_str())
            .collect();
        let roots: Vec<EntityRef> = clipboard
            .items
            .iter()
            .filter(|item| {
                let anchor = match item.kind {
                    EntityKind::Node => Some(item.id.as_str()),
                    EntityKind::Card => tree.card(&item.id).map(|c| c.node_id.as_str()),
                };
                !copied_nodes.iter().any(|node| {
                    anchor.is_some_and(|anchor| {
                        (item.is_card() && *node == anchor) || tree.is_descendant(node, anchor)
                    })
                })
            })
            .cloned()
            .collect();

        if clipboard.mode == ClipboardMode::Cut {
            if let Some(target_id) = target {
                for root in roots.iter().filter(|r| r.is_node()) {
                    if root.id == target_id || tree.is_descendant(&root.id, target_id) {
                        return Err(TreeOperationError::invalid_paste_target(format!(
                            "cannot move node '{}' into its own subtree",
                            root.id
                        )));
                    }
                }
            }
        }
        Ok(roots)
    }

    fn plan_node(
        tree: &TreeModel,
        source_id: &str,
        parent: Option<String>,
        ids: &mut IdentifierLifecycle,
        steps: &mut Vec<PasteStep>,
    ) -> Option<String> {
        let node = tree.node(source_id)?;
        let new_id = ids.mint(
            EntityKind::Node,
            Provenance::DuplicatedFrom(source_id.to_string()),
        );
        steps.push(PasteStep::Node {
            new_id: new_id.clone(),
            source_id: source_id.to_string(),
            parent,
            seed: node.to_seed(),
            expanded: node.expanded,
        });
        for child in tree.children_of(Some(source_id)) {
            match child.kind {
                EntityKind::Node => {
                    Self::plan_node(tree, &child.id, Some(new_id.clone()), ids, steps);
                }
                EntityKind::Card => {
                    Self::plan_card(tree, &child.id, new_id.clone(), ids, steps);
                }
            }
        }
        Some(new_id)
    }

    fn plan_card(
        tree: &TreeModel,
        source_id: &str,
        node_id: String,
        ids: &mut IdentifierLifecycle,
        steps: &mut Vec<PasteStep>,
    ) -> Option<String> {
        let card = tree.card(source_id)?;
        let new_id = ids.mint(
            EntityKind::Card,
            Provenance::DuplicatedFrom(source_id.to_string()),
        );
        steps.push(PasteStep::Card {
            new_id: new_id.clone(),
            source_id: source_id.to_string(),
            node_id,
            seed: card.to_seed(),
        });
        Some(new_id)
    }

    fn apply_step(
        step: PasteStep,
        tree: &mut TreeModel,
        ledger: &mut PendingChangeLedger,
    ) -> TreeResult<EntityRef> {
        match step {
            PasteStep::Node {
                new_id,
                source_id,
                parent,
                seed,
                expanded,
            } => {
                let edge = tree.create_node(new_id.clone(), parent.as_deref(), seed.clone())?;
                if let Some(expanded) = expanded {
                    tree.set_expanded(&new_id, expanded)?;
                }
                ledger.record_create(&new_id, EntityKind::Node, parent, CreateSeed::Node(seed));
                if let Some(edge) = edge {
                    ledger.record_edge_create(edge);
                }
                tracing::trace!("Duplicated node {} as {}", source_id, new_id);
                Ok(EntityRef::node(new_id))
            }
            PasteStep::Card {
                new_id,
                source_id,
                node_id,
                seed,
            } => {
                tree.create_card(new_id.clone(), &node_id, seed.clone())?;
                ledger.record_create(
                    &new_id,
                    EntityKind::Card,
                    Some(node_id),
                    CreateSeed::Card(seed),
                );
                tracing::trace!("Duplicated card {} as {}", source_id, new_id);
                Ok(EntityRef::card(new_id))
            }
        }
    }
}

impl Remappable for TransferEngine {
    fn remap_ids(&mut self, remap: &IdRemap) -> usize {
        let Some(clipboard) = &mut self.clipboard else {
            return 0;
        };
        clipboard
            .items
            .iter_mut()
            .map(|item| remap.rewrite(&mut item.id))
            .filter(|changed| *changed)
            .count()
    }
}
