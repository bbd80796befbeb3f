//! Embedding provider client, consumed as `embed(text) -> vector[D]` per
//! §6, configured from [`kg_core::config::EmbeddingSettings`].

use serde::Deserialize;

use kg_core::config::EmbeddingSettings;

use crate::error::{GraphError, GraphResult};

#[derive(Debug, Clone)]
pub struct EmbeddingClient {
    base_url: String,
    model: String,
    dimension: usize,
    client: reqwest::Client,
}

impl EmbeddingClient {
    pub fn new(settings: &EmbeddingSettings) -> Self {
        Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            dimension: settings.dimension,
            client: reqwest::Client::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed one piece of text (C16/C17/C18/C20 all embed exactly one
    /// string per call).
    pub async fn embed(&self, text: &str) -> GraphResult<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch.pop().ok_or_else(|| GraphError::Embedding("empty embedding response".to_string()))
    }

    pub async fn embed_batch(&self, inputs: &[String]) -> GraphResult<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/api/embed", self.base_url);
        let body = EmbedRequest { model: self.model.clone(), input: inputs.to_vec() };

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| GraphError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GraphError::Embedding(format!("embedding request failed: {status} {text}")));
        }

        let payload: EmbedResponse =
            response.json().await.map_err(|e| GraphError::Embedding(e.to_string()))?;

        if let Some(embeddings) = payload.embeddings {
            return Ok(embeddings);
        }
        if let Some(embedding) = payload.embedding {
            return Ok(vec![embedding]);
        }

        Err(GraphError::Embedding("embedding response missing vectors".to_string()))
    }
}

#[derive(Debug, Clone, serde::Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmbedResponse {
    embeddings: Option<Vec<Vec<f32>>>,
    embedding: Option<Vec<f32>>,
}
