//! HTTP Document Store Tests
//!
//! Runs `HttpStore` against a small axum server bound to an ephemeral port.

#[cfg(test)]
mod http_store_tests {
    use anyhow::Result;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use cardtree_core::config::EditorConfig;
    use cardtree_core::db::{BatchRequest, BatchResponse, DocumentStore, HttpStore, StoreError};
    use cardtree_core::models::{DocumentSnapshot, Node, NodeSeed};
    use cardtree_core::services::{EditorSession, SessionError};
    use std::collections::HashMap;
    use std::net::SocketAddr;

    const TOKEN: &str = "test-token";

    fn authorized(headers: &HeaderMap) -> bool {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("Bearer {}", TOKEN))
    }

    async fn document(headers: HeaderMap) -> Result<Json<DocumentSnapshot>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        Ok(Json(DocumentSnapshot {
            nodes: vec![Node {
                id: "n1".to_string(),
                text: "Root".to_string(),
                order: 1,
                expanded: None,
                position: None,
            }],
            ..DocumentSnapshot::default()
        }))
    }

    /// Maps every temp id to `perm-<n>` in request order
    async fn batch(
        headers: HeaderMap,
        Json(request): Json<BatchRequest>,
    ) -> Result<Json<BatchResponse>, StatusCode> {
        if !authorized(&headers) {
            return Err(StatusCode::UNAUTHORIZED);
        }
        let nodes: HashMap<String, String> = request
            .node_creates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.temp_id.clone(), format!("perm-n{}", i + 1)))
            .collect();
        let cards: HashMap<String, String> = request
            .card_creates
            .iter()
            .enumerate()
            .map(|(i, c)| (c.temp_id.clone(), format!("perm-c{}", i + 1)))
            .collect();
        Ok(Json(BatchResponse::applied(nodes, cards)))
    }

    async fn spawn_server() -> Result<SocketAddr> {
        let app = Router::new()
            .route("/api/document", get(document))
            .route("/api/batch", post(batch))
            .route(
                "/broken/batch",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "database locked") }),
            )
            .route("/garbled/batch", post(|| async { "not json" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Ok(addr)
    }

    fn store(addr: SocketAddr, path: &str, token: Option<&str>) -> Result<HttpStore> {
        let config = EditorConfig {
            store_url: format!("http://{}/{}/", addr, path),
            auth_token: token.map(str::to_string),
            ..EditorConfig::default()
        };
        Ok(HttpStore::from_config(&config)?)
    }

    #[tokio::test]
    async fn test_load_and_save_round_trip() -> Result<()> {
        let addr = spawn_server().await?;
        let store = store(addr, "api", Some(TOKEN))?;

        let mut session = EditorSession::from_snapshot(store.load_document().await?)?;
        let chapter = session.create_node(Some("n1"), NodeSeed::new("Chapter"))?;
        let report = session.save(&store).await?;

        assert_eq!(report.remap.node(&chapter), Some("perm-n1"));
        assert_eq!(session.tree().parent_of("perm-n1"), Some("n1"));
        assert!(session.ledger().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() -> Result<()> {
        let addr = spawn_server().await?;
        let store = store(addr, "api", None)?;

        let err = store.load_document().await.unwrap_err();

        assert_eq!(err, StoreError::Unauthorized);
        Ok(())
    }

    #[tokio::test]
    async fn test_server_error_keeps_pending_edits() -> Result<()> {
        let addr = spawn_server().await?;
        let store = store(addr, "broken", Some(TOKEN))?;
        let mut session = EditorSession::new();
        session.create_node(None, NodeSeed::new("Chapter"))?;

        let err = session.save(&store).await.unwrap_err();

        assert_eq!(
            err,
            SessionError::Store(StoreError::Http {
                status: 500,
                body: "database locked".to_string()
            })
        );
        assert!(session.has_unsaved_changes());
        Ok(())
    }

    #[tokio::test]
    async fn test_unparseable_response_is_decode_error() -> Result<()> {
        let addr = spawn_server().await?;
        let store = store(addr, "garbled", Some(TOKEN))?;

        let err = store.save_batch(&BatchRequest::default()).await.unwrap_err();

        assert!(matches!(err, StoreError::Decode { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_store_is_transport_error() -> Result<()> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);
        let store = store(addr, "api", Some(TOKEN))?;

        let err = store.load_document().await.unwrap_err();

        assert!(matches!(err, StoreError::Transport { .. }));
        Ok(())
    }
}
