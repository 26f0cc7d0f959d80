//! HTTP Document Store
//!
//! `reqwest` client for a store exposing `GET {base}/document` and
//! `POST {base}/batch`, both JSON, with an optional bearer token.

use crate::config::EditorConfig;
use crate::db::batch::{BatchRequest, BatchResponse};
use crate::db::document_store::DocumentStore;
use crate::db::error::StoreError;
use crate::models::DocumentSnapshot;
use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

/// Document store reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpStore {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpStore {
    /// Build a client from validated configuration
    pub fn from_config(config: &EditorConfig) -> Result<Self, StoreError> {
        config
            .validate()
            .map_err(|e| StoreError::config(e.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url().to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn with_auth(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, StoreError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(StoreError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::http(status.as_u16(), body));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::decode(e.to_string()))
    }
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn load_document(&self) -> Result<DocumentSnapshot, StoreError> {
        let url = format!("{}/document", self.base_url);
        tracing::debug!("Loading document from {}", url);
        let response = self.with_auth(self.client.get(url)).send().await?;
        Self::decode(response).await
    }

    async fn save_batch(&self, request: &BatchRequest) -> Result<BatchResponse, StoreError> {
        let url = format!("{}/batch", self.base_url);
        tracing::debug!("Posting batch of {} records to {}", request.len(), url);
        let response = self
            .with_auth(self.client.post(url))
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }
}
