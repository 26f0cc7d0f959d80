//! Save Cycle Tests
//!
//! End-to-end behaviour of the editing session against the in-memory document
//! store: identifier remapping, ledger pruning, failures and partial errors.

#[cfg(test)]
mod save_cycle_tests {
    use anyhow::Result;
    use cardtree_core::db::{BatchResponse, MemoryStore, StoreError};
    use cardtree_core::models::{Card, CardSeed, DocumentSnapshot, Edge, EntityRef, Node, NodeSeed};
    use cardtree_core::operations::TreeOperationError;
    use cardtree_core::services::{
        is_temporary, EditorSession, Provenance, SaveState, SessionError,
    };
    use std::collections::HashMap;

    fn node(id: &str, text: &str, order: i64) -> Node {
        Node {
            id: id.to_string(),
            text: text.to_string(),
            order,
            expanded: None,
            position: None,
        }
    }

    fn card(id: &str, node_id: &str, title: &str, order: i64) -> Card {
        Card {
            id: id.to_string(),
            node_id: node_id.to_string(),
            title: title.to_string(),
            content: format!("{} body", title),
            order,
            problems: Vec::new(),
        }
    }

    /// `root` → `child`, with card `c1` on `root` and `c2` on `child`
    fn loaded_document() -> DocumentSnapshot {
        DocumentSnapshot {
            nodes: vec![node("root", "Root", 1), node("child", "Child", 2)],
            edges: vec![Edge {
                id: "e1".to_string(),
                source: "root".to_string(),
                target: "child".to_string(),
                label: None,
            }],
            cards: vec![card("c1", "root", "First", 1), card("c2", "child", "Second", 1)],
        }
    }

    /// Every id the session still holds anywhere
    fn all_ids(session: &EditorSession) -> Vec<String> {
        let mut ids: Vec<String> = session.tree().nodes().map(|n| n.id.clone()).collect();
        ids.extend(session.tree().cards().iter().map(|c| c.id.clone()));
        ids.extend(session.tree().cards().iter().map(|c| c.node_id.clone()));
        ids.extend(session.tree().edges().flat_map(|e| [e.source.clone(), e.target.clone()]));
        ids.extend(session.ledger().referenced_ids());
        ids.extend(session.selection().items().iter().map(|e| e.id.clone()));
        if let Some(clipboard) = session.clipboard() {
            ids.extend(clipboard.items.iter().map(|e| e.id.clone()));
        }
        ids
    }

    #[tokio::test]
    async fn test_created_entities_receive_permanent_ids() -> Result<()> {
        let store = MemoryStore::new();
        let mut session = EditorSession::new();

        let chapter = session.create_node(None, NodeSeed::new("Chapter"))?;
        let question = session.create_card(&chapter, CardSeed::new("Question", "2+2?"))?;
        assert!(is_temporary(&chapter));
        assert!(is_temporary(&question));

        let report = session.save(&store).await?;

        assert_eq!(report.remap.node(&chapter), Some("node-1"));
        assert_eq!(report.remap.card(&question), Some("card-1"));
        assert!(!report.has_warnings());
        assert!(session.ledger().is_empty());
        assert_eq!(session.tree().card("card-1").map(|c| c.node_id.as_str()), Some("node-1"));
        assert!(session.tree().node(&chapter).is_none());

        let requests = store.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].node_creates[0].temp_id, chapter);
        assert_eq!(requests[0].card_creates[0].node_id, chapter);
        Ok(())
    }

    #[tokio::test]
    async fn test_nested_creates_send_edges_and_leave_no_temporary_ids() -> Result<()> {
        let store = MemoryStore::new();
        let mut session = EditorSession::new();

        let parent = session.create_node(None, NodeSeed::new("Parent"))?;
        let child = session.create_node(Some(parent.as_str()), NodeSeed::new("Child"))?;
        let card = session.create_card(&child, CardSeed::new("Leaf", ""))?;
        session.select([EntityRef::card(card.as_str())]);
        session.copy(vec![EntityRef::node(child.as_str())]);

        let request = session.pending_request();
        assert_eq!(request.edge_creates.len(), 1);
        assert_eq!(request.edge_creates[0].source, parent);
        assert_eq!(request.edge_creates[0].target, child);

        session.save(&store).await?;

        assert!(all_ids(&session).iter().all(|id| !is_temporary(id)));
        assert_eq!(session.identifiers().outstanding(), 0);
        let stored = store.document().await;
        assert_eq!(stored.edges.len(), 1);
        assert_eq!(stored.edges[0].source, "node-1");
        assert_eq!(stored.edges[0].target, "node-2");
        Ok(())
    }

    #[tokio::test]
    async fn test_create_then_delete_leaves_no_trace() -> Result<()> {
        let store = MemoryStore::with_document(loaded_document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;

        let scratch = session.create_node(Some("root"), NodeSeed::new("Scratch"))?;
        session.create_card(&scratch, CardSeed::new("Draft", "..."))?;
        session.delete(&EntityRef::node(scratch.as_str()))?;

        assert!(session.pending_request().is_empty());
        let report = session.save(&store).await?;
        assert_eq!(report.records, 0);
        assert!(store.requests().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_edit_reverted_to_original_is_pruned() -> Result<()> {
        let mut session = EditorSession::from_snapshot(loaded_document())?;

        session.update_content("c1", "changed")?;
        session.rename(&EntityRef::node("child"), "Renamed")?;
        assert_eq!(session.ledger().len(), 2);

        session.update_content("c1", "First body")?;
        session.rename(&EntityRef::node("child"), "Child")?;

        assert!(session.ledger().is_empty());
        assert!(!session.has_unsaved_changes());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_of_persisted_node_cascades_in_request() -> Result<()> {
        let store = MemoryStore::with_document(loaded_document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;

        session.update_content("c2", "edited before delete")?;
        let removed = session.delete(&EntityRef::node("child"))?;
        assert_eq!(removed, vec![EntityRef::node("child"), EntityRef::card("c2")]);

        let request = session.pending_request();
        assert_eq!(request.node_deletes, vec!["child".to_string()]);
        assert_eq!(request.card_deletes, vec!["c2".to_string()]);
        assert_eq!(request.edge_deletes, vec!["e1".to_string()]);
        assert!(request.card_updates.is_empty());

        let report = session.save(&store).await?;
        assert!(!report.has_warnings(), "warnings: {:?}", report.warnings);
        let stored = store.document().await;
        assert_eq!(stored.nodes.len(), 1);
        assert!(stored.edges.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_move_under_own_descendant_is_rejected() -> Result<()> {
        let mut session = EditorSession::from_snapshot(loaded_document())?;

        let err = session.move_node("root", Some("child")).unwrap_err();

        assert!(matches!(
            err,
            SessionError::Operation(TreeOperationError::CircularMove { .. })
        ));
        assert_eq!(session.tree().parent_of("child"), Some("root"));
        assert!(session.ledger().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_move_node_replaces_edge() -> Result<()> {
        let store = MemoryStore::with_document(loaded_document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;

        session.move_node("child", None)?;
        let request = session.pending_request();
        assert_eq!(request.edge_deletes, vec!["e1".to_string()]);
        assert!(request.edge_creates.is_empty());
        assert_eq!(request.node_updates.len(), 1);
        assert_eq!(request.node_updates[0].node_id, "child");

        session.save(&store).await?;
        assert!(store.document().await.edges.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_save_keeps_ledger_and_retry_succeeds() -> Result<()> {
        let store = MemoryStore::new();
        let mut session = EditorSession::new();
        let chapter = session.create_node(None, NodeSeed::new("Chapter"))?;
        session.create_card(&chapter, CardSeed::new("Q", ""))?;
        let entries = session.ledger().len();

        store.fail_next(StoreError::transport("connection reset")).await;
        let err = session.save(&store).await.unwrap_err();

        assert!(err.is_retryable());
        assert_eq!(session.ledger().len(), entries);
        assert!(session.tree().contains_node(&chapter));
        assert_eq!(session.save_state(), SaveState::Idle);

        let report = session.save(&store).await?;
        assert_eq!(report.remap.node(&chapter), Some("node-1"));
        assert!(session.ledger().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unsuccessful_response_applies_no_mappings() -> Result<()> {
        let store = MemoryStore::new();
        let mut session = EditorSession::new();
        let chapter = session.create_node(None, NodeSeed::new("Chapter"))?;

        store.reject_next(vec!["quota exceeded".to_string()]).await;
        let err = session.save(&store).await.unwrap_err();

        assert!(matches!(
            err,
            SessionError::Store(StoreError::Rejected { .. })
        ));
        assert!(session.tree().contains_node(&chapter));
        assert!(session.tree().node("node-1").is_none());
        assert!(session.ledger().is_pending_create(&chapter));

        // The rejected attempt consumed node-1 on the store side.
        let report = session.save(&store).await?;
        assert_eq!(report.remap.node(&chapter), Some("node-2"));
        Ok(())
    }

    #[tokio::test]
    async fn test_partial_errors_become_warnings() -> Result<()> {
        let store = MemoryStore::with_document(loaded_document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;
        session.update_content("c1", "new body")?;

        store.warn_next(vec!["search index lagging".to_string()]).await;
        let report = session.save(&store).await?;

        assert_eq!(report.warnings, vec!["search index lagging".to_string()]);
        assert!(session.ledger().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_mapping_keeps_create_for_next_save() -> Result<()> {
        let store = MemoryStore::new();
        let mut session = EditorSession::new();
        let chapter = session.create_node(None, NodeSeed::new("Chapter"))?;
        let question = session.create_card(&chapter, CardSeed::new("Q", ""))?;

        store.omit_card_mappings_next().await;
        let report = session.save(&store).await?;

        assert!(report.has_warnings());
        assert!(report.warnings[0].contains(&question));
        assert!(session.ledger().is_pending_create(&question));
        assert_eq!(
            session.tree().card(&question).map(|c| c.node_id.as_str()),
            Some("node-1")
        );

        let request = session.pending_request();
        assert_eq!(request.card_creates.len(), 1);
        assert_eq!(request.card_creates[0].node_id, "node-1");
        assert!(request.node_creates.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unmapped_node_is_resent_with_its_edge() -> Result<()> {
        let store = MemoryStore::with_document(loaded_document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;
        let section = session.create_node(Some("root"), NodeSeed::new("Section"))?;

        let ticket = session.begin_save()?.expect("edits are pending");
        let report = session.finish_save(
            ticket,
            Ok(BatchResponse::applied(HashMap::new(), HashMap::new())),
        )?;
        assert!(report.warnings[0].contains(&section));

        let request = session.pending_request();
        assert_eq!(request.node_creates.len(), 1);
        assert_eq!(request.edge_creates.len(), 1);
        assert_eq!(request.edge_creates[0].source, "root");
        assert_eq!(request.edge_creates[0].target, section);

        let report = session.save(&store).await?;
        let permanent = report.remap.node(&section).expect("mapped on retry").to_string();
        let stored = store.document().await;
        assert!(stored
            .edges
            .iter()
            .any(|e| e.source == "root" && e.target == permanent));
        assert_eq!(session.tree().parent_of(&permanent), Some("root"));
        assert!(session.ledger().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_clipboard_and_selection_follow_permanent_ids() -> Result<()> {
        let store = MemoryStore::with_document(loaded_document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;
        let section = session.create_node(Some("child"), NodeSeed::new("Section"))?;
        let note = session.create_card(&section, CardSeed::new("Note", "draft"))?;
        session.copy(vec![EntityRef::node(section.as_str())]);
        session.select([EntityRef::card(note.as_str()), EntityRef::card("c1")]);

        let report = session.save(&store).await?;

        let section_id = report.remap.node(&section).expect("node mapped");
        let note_id = report.remap.card(&note).expect("card mapped");
        assert_eq!(
            session.clipboard().map(|c| c.items.clone()),
            Some(vec![EntityRef::node(section_id)])
        );
        assert_eq!(
            session.selection().items(),
            &[EntityRef::card(note_id), EntityRef::card("c1")]
        );
        assert!(all_ids(&session).iter().all(|id| !is_temporary(id)));

        let outcome = session.paste(Some("root"))?;
        assert_eq!(outcome.created.len(), 2);
        assert_eq!(
            session.identifiers().provenance(&outcome.roots[0].id),
            Some(&Provenance::DuplicatedFrom(section_id.to_string()))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_reorder_sends_dense_orders() -> Result<()> {
        let store = MemoryStore::with_document(loaded_document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;

        session.reorder(
            Some("root"),
            &[EntityRef::node("child"), EntityRef::card("c1")],
        )?;

        let request = session.pending_request();
        assert_eq!(request.node_updates[0].order, Some(1));
        assert_eq!(request.card_updates[0].order, Some(2));

        session.save(&store).await?;
        let stored = store.document().await;
        let c1 = stored.cards.iter().find(|c| c.id == "c1").map(|c| c.order);
        assert_eq!(c1, Some(2));
        Ok(())
    }

    #[test]
    fn test_drag_third_card_to_front() -> Result<()> {
        let mut session = EditorSession::new();
        let deck = session.create_node(None, NodeSeed::new("Deck"))?;
        let cards: Vec<String> = (1..=4)
            .map(|i| session.create_card(&deck, CardSeed::new(format!("C{}", i), "")))
            .collect::<Result<_, _>>()?;

        session.reposition(&EntityRef::card(cards[2].as_str()), Some(deck.as_str()), 0)?;

        let order = |id: &str| session.tree().card(id).map(|c| c.order);
        assert_eq!(order(&cards[2]), Some(1));
        assert_eq!(order(&cards[0]), Some(2));
        assert_eq!(order(&cards[1]), Some(3));
        assert_eq!(order(&cards[3]), Some(4));
        Ok(())
    }

    #[tokio::test]
    async fn test_load_refreshes_baselines() -> Result<()> {
        let mut session = EditorSession::from_snapshot(loaded_document())?;
        session.update_content("c1", "dirty")?;

        session.load(loaded_document())?;

        assert!(session.ledger().is_empty());
        assert_eq!(session.tree().card("c1").map(|c| c.content.as_str()), Some("First body"));
        Ok(())
    }
}
