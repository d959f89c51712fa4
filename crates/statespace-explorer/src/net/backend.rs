//! HTTP client for the graph/attribute service.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use statespace_core::{GraphPayload, NodeId, ProjectInfo, StatusResponse};
use std::time::Duration;

use crate::error::ExploreError;
use crate::graph::Backend;

#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    /// `base_url` is the project root, e.g. `http://localhost:8080/dice`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExploreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ExploreError::network(format!("client setup: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ExploreError> {
        let response = self
            .client
            .get(self.url(endpoint))
            .query(query)
            .send()
            .await
            .map_err(|e| ExploreError::network(format!("GET /{endpoint}: {e}")))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ExploreError::Status { status, body });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExploreError::network(format!("GET /{endpoint}: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ExploreError::Decode(format!("/{endpoint}: {e}")))
    }
}

/// Repeated `key=<id>` query pairs.
fn id_pairs<'a>(key: &'a str, ids: &'a [NodeId]) -> impl Iterator<Item = (&'a str, &'a str)> {
    ids.iter().map(move |id| (key, id.0.as_str()))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn initial(&self) -> Result<GraphPayload, ExploreError> {
        self.get_json("initial", &[]).await
    }

    async fn status(&self) -> Result<ProjectInfo, ExploreError> {
        let status: StatusResponse = self.get_json("status", &[]).await?;
        Ok(status.info)
    }

    async fn outgoing(&self, ids: &[NodeId]) -> Result<GraphPayload, ExploreError> {
        let query: Vec<(&str, &str)> = id_pairs("id", ids).collect();
        let payload: GraphPayload = self.get_json("outgoing", &query).await?;
        tracing::debug!(
            requested = ids.len(),
            nodes = payload.nodes.len(),
            "outgoing answered"
        );
        Ok(payload)
    }

    async fn reset(&self, open: &[NodeId], closed: &[NodeId]) -> Result<GraphPayload, ExploreError> {
        let query: Vec<(&str, &str)> = id_pairs("id", open).chain(id_pairs("idu", closed)).collect();
        self.get_json("reset", &query).await
    }
}
