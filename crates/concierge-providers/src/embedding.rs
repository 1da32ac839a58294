use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::provider::{EmbeddingProvider, ProviderError};

/// Embedding client for an OpenAI-compatible `/v1/embeddings` endpoint — the
/// provider used for both query embedding (retrieval step 9) and chunk
/// embedding (ingestion).
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiEmbeddingProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn name(&self) -> &str {
        "openai-embeddings"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        debug!(model = %self.model, count = texts.len(), "requesting embeddings");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        // The API is not guaranteed to return embeddings in request order —
        // sort on the index field it echoes back per item.
        let mut items = api_resp.data;
        items.sort_by_key(|item| item.index);

        if items.len() != texts.len() {
            return Err(ProviderError::Parse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                items.len()
            )));
        }

        Ok(items.into_iter().map(|item| item.embedding).collect())
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorders_out_of_order_response() {
        let resp = ApiResponse {
            data: vec![
                EmbeddingItem {
                    embedding: vec![1.0],
                    index: 1,
                },
                EmbeddingItem {
                    embedding: vec![0.0],
                    index: 0,
                },
            ],
        };
        let mut items = resp.data;
        items.sort_by_key(|item| item.index);
        assert_eq!(items[0].embedding, vec![0.0]);
        assert_eq!(items[1].embedding, vec![1.0]);
    }
}
