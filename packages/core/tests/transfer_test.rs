//! Copy / Cut / Paste Tests
//!
//! Pasting duplicates entities under fresh temporary ids; those duplicates then go
//! through the normal save cycle like any other create.

#[cfg(test)]
mod transfer_tests {
    use anyhow::Result;
    use cardtree_core::db::MemoryStore;
    use cardtree_core::models::{Card, CardSeed, DocumentSnapshot, Edge, EntityRef, Node, NodeSeed};
    use cardtree_core::operations::TreeOperationError;
    use cardtree_core::services::{is_temporary, EditorSession, Provenance, SessionError};

    /// `root` → `child`, with card `c1` on `root` and `c2` on `child`
    fn document() -> DocumentSnapshot {
        let node = |id: &str, order| Node {
            id: id.to_string(),
            text: id.to_uppercase(),
            order,
            expanded: Some(true),
            position: None,
        };
        let card = |id: &str, node_id: &str| Card {
            id: id.to_string(),
            node_id: node_id.to_string(),
            title: format!("{} title", id),
            content: format!("{} content", id),
            order: 1,
            problems: Vec::new(),
        };
        DocumentSnapshot {
            nodes: vec![node("root", 1), node("child", 2)],
            edges: vec![Edge {
                id: "e1".to_string(),
                source: "root".to_string(),
                target: "child".to_string(),
                label: None,
            }],
            cards: vec![card("c1", "root"), card("c2", "child")],
        }
    }

    #[tokio::test]
    async fn test_copy_paste_duplicates_subtree_and_saves_it() -> Result<()> {
        let store = MemoryStore::with_document(document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;

        session.copy(vec![EntityRef::node("child")]);
        let outcome = session.paste(Some("root"))?;

        assert_eq!(outcome.roots.len(), 1);
        assert_eq!(outcome.created.len(), 2);
        assert!(outcome.originals_to_remove.is_empty());
        let copy = &outcome.roots[0].id;
        assert!(is_temporary(copy));
        assert_eq!(
            session.identifiers().provenance(copy),
            Some(&Provenance::DuplicatedFrom("child".to_string()))
        );
        assert_eq!(session.tree().node(copy).and_then(|n| n.expanded), Some(true));
        assert!(session.clipboard().is_some());

        let request = session.pending_request();
        assert_eq!(request.node_creates.len(), 1);
        assert_eq!(request.node_creates[0].parent_id.as_deref(), Some("root"));
        assert_eq!(request.card_creates.len(), 1);
        assert_eq!(request.card_creates[0].title, "c2 title");
        assert_eq!(request.edge_creates.len(), 1);

        session.save(&store).await?;

        let stored = store.document().await;
        assert_eq!(stored.nodes.len(), 3);
        assert_eq!(stored.edges.len(), 2);
        assert_eq!(stored.cards.len(), 3);
        assert_eq!(
            session.clipboard().map(|c| c.items.clone()),
            Some(vec![EntityRef::node("child")])
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_cut_paste_moves_card_by_duplicate_and_delete() -> Result<()> {
        let store = MemoryStore::with_document(document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;

        session.cut(vec![EntityRef::card("c1")]);
        let outcome = session.paste(Some("child"))?;

        assert_eq!(outcome.originals_to_remove, vec![EntityRef::card("c1")]);
        assert!(session.tree().card("c1").is_none());
        assert!(session.clipboard().is_none());

        let request = session.pending_request();
        assert_eq!(request.card_creates.len(), 1);
        assert_eq!(request.card_creates[0].node_id, "child");
        assert_eq!(request.card_deletes, vec!["c1".to_string()]);

        let report = session.save(&store).await?;
        assert!(!report.has_warnings());
        let stored = store.document().await;
        assert!(stored.cards.iter().all(|c| c.id != "c1"));
        assert!(stored
            .cards
            .iter()
            .any(|c| c.node_id == "child" && c.title == "c1 title"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cut_paste_of_unsaved_node_leaves_no_trace_of_source() -> Result<()> {
        let store = MemoryStore::with_document(document());
        let mut session = EditorSession::from_snapshot(store.document().await)?;
        let draft = session.create_node(Some("root"), NodeSeed::new("Draft"))?;
        let note = session.create_card(&draft, CardSeed::new("Note", "body"))?;

        session.cut(vec![EntityRef::node(draft.as_str())]);
        let outcome = session.paste(Some("child"))?;

        assert_eq!(outcome.originals_to_remove, vec![EntityRef::node(draft.as_str())]);
        assert!(session.tree().node(&draft).is_none());
        assert!(!session.ledger().is_pending_create(&draft));
        assert!(!session.ledger().is_pending_create(&note));
        assert!(session.identifiers().provenance(&draft).is_none());

        let request = session.pending_request();
        assert!(request.node_deletes.is_empty());
        assert!(request.card_deletes.is_empty());
        assert!(request.edge_deletes.is_empty());
        assert_eq!(request.node_creates.len(), 1);
        assert_ne!(request.node_creates[0].temp_id, draft);
        assert_eq!(request.node_creates[0].text, "Draft");
        assert_eq!(request.card_creates.len(), 1);
        assert_ne!(request.card_creates[0].temp_id, note);
        assert_eq!(request.edge_creates.len(), 1);
        assert_eq!(request.edge_creates[0].source, "child");

        session.save(&store).await?;
        let stored = store.document().await;
        assert_eq!(stored.nodes.len(), 3);
        assert_eq!(stored.cards.len(), 3);
        assert!(stored
            .edges
            .iter()
            .any(|e| e.source == "child" && e.target == "node-1"));
        Ok(())
    }

    #[test]
    fn test_cut_paste_of_unsaved_card_sends_only_the_duplicate() -> Result<()> {
        let mut session = EditorSession::from_snapshot(document())?;
        let note = session.create_card("root", CardSeed::new("Note", "body"))?;

        session.cut(vec![EntityRef::card(note.as_str())]);
        session.paste(Some("child"))?;

        let request = session.pending_request();
        assert!(request.card_deletes.is_empty());
        assert_eq!(request.card_creates.len(), 1);
        assert_eq!(request.card_creates[0].node_id, "child");
        assert_ne!(request.card_creates[0].temp_id, note);
        assert_eq!(session.ledger().creates().len(), 1);
        Ok(())
    }

    #[test]
    fn test_cut_into_own_subtree_is_rejected() -> Result<()> {
        let mut session = EditorSession::from_snapshot(document())?;

        session.cut(vec![EntityRef::node("root")]);
        let err = session.paste(Some("child")).unwrap_err();

        assert!(matches!(
            err,
            SessionError::Operation(TreeOperationError::InvalidPasteTarget { .. })
        ));
        assert!(session.ledger().is_empty());
        assert!(session.clipboard().is_some());
        Ok(())
    }

    #[test]
    fn test_copy_into_own_subtree_uses_snapshot_of_source() -> Result<()> {
        let mut session = EditorSession::from_snapshot(document())?;

        session.copy(vec![EntityRef::node("root")]);
        let outcome = session.paste(Some("child"))?;

        // root, c1, child, c2: the fresh copy is not copied again.
        assert_eq!(outcome.created.len(), 4);
        assert_eq!(session.tree().node_count(), 4);
        Ok(())
    }

    #[test]
    fn test_card_cannot_be_pasted_at_document_root() -> Result<()> {
        let mut session = EditorSession::from_snapshot(document())?;

        session.copy(vec![EntityRef::card("c1")]);
        let err = session.paste(None).unwrap_err();

        assert!(matches!(
            err,
            SessionError::Operation(TreeOperationError::CardRequiresNode { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_paste_with_empty_clipboard_is_rejected() -> Result<()> {
        let mut session = EditorSession::from_snapshot(document())?;

        let err = session.paste(Some("root")).unwrap_err();

        assert_eq!(
            err,
            SessionError::Operation(TreeOperationError::EmptyClipboard)
        );
        Ok(())
    }

    #[test]
    fn test_deleting_copied_source_drops_it_from_clipboard() -> Result<()> {
        let mut session = EditorSession::from_snapshot(document())?;

        session.copy(vec![EntityRef::node("child"), EntityRef::card("c1")]);
        session.delete(&EntityRef::node("child"))?;

        assert_eq!(
            session.clipboard().map(|c| c.items.clone()),
            Some(vec![EntityRef::card("c1")])
        );
        Ok(())
    }
}
