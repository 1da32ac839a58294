use concierge_providers::provider::EmbeddingProvider;
use tracing::instrument;

use crate::error::Result;
use crate::store::VectorStore;
use crate::types::{ChunkVector, SearchResult};

/// Combines an embedding provider with the vector store to implement the
/// retriever's public contract: `search(tenantId, query, K)` (§4.4).
pub struct Retriever<E: EmbeddingProvider> {
    store: VectorStore,
    embeddings: E,
}

impl<E: EmbeddingProvider> Retriever<E> {
    pub fn new(store: VectorStore, embeddings: E) -> Self {
        Self { store, embeddings }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, k))]
    pub async fn search(&self, tenant_id: &str, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embed_query(query).await?;
        self.search_with_embedding(tenant_id, &query_embedding, k)
    }

    /// Embed a single query string. Exposed separately from [`Self::search`]
    /// so callers that also need the raw embedding (the semantic cache
    /// lookup that precedes retrieval, pipeline step 8) don't pay for it
    /// twice.
    pub async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let mut embeddings = self.embeddings.embed(&[query.to_string()]).await?;
        Ok(embeddings.pop().unwrap_or_default())
    }

    pub fn search_with_embedding(&self, tenant_id: &str, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        self.store.search(tenant_id, query_embedding, k)
    }

    #[instrument(skip(self, chunks), fields(tenant_id = %tenant_id, source_id = %source_id, chunk_count = chunks.len()))]
    pub async fn ingest(
        &self,
        tenant_id: &str,
        source_id: &str,
        version: Option<u32>,
        chunks: Vec<(usize, String, serde_json::Value)>,
    ) -> Result<()> {
        let texts: Vec<String> = chunks.iter().map(|(_, text, _)| text.clone()).collect();
        let embeddings = self.embeddings.embed(&texts).await?;
        if embeddings.len() != chunks.len() {
            return Err(crate::error::RetrievalError::DimensionMismatch {
                expected: chunks.len(),
                got: embeddings.len(),
            });
        }
        let source = concierge_core::types::SourceId::from(source_id.to_string());
        for ((chunk_index, text, metadata), embedding) in chunks.into_iter().zip(embeddings) {
            let id = concierge_core::types::vector_id(&source, version, chunk_index);
            let chunk = ChunkVector {
                id,
                tenant_id: tenant_id.to_string(),
                source_id: source_id.to_string(),
                chunk_index,
                text,
                embedding,
                metadata,
            };
            self.store.insert(&chunk)?;
        }
        Ok(())
    }

    pub fn delete_by_source(&self, tenant_id: &str, source_id: &str) -> Result<usize> {
        self.store.delete_by_source(tenant_id, source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_providers::provider::ProviderError;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn name(&self) -> &str {
            "fake"
        }

        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 0.0]).collect())
        }
    }

    #[tokio::test]
    async fn ingest_then_search_roundtrips() {
        let store = VectorStore::in_memory().unwrap();
        let retriever = Retriever::new(store, FakeEmbedder);
        retriever
            .ingest(
                "acme",
                "doc1",
                None,
                vec![(0, "hi".to_string(), serde_json::json!({}))],
            )
            .await
            .unwrap();
        let results = retriever.search("acme", "hi", 5).await.unwrap();
        assert_eq!(results.len(), 1);
    }

    #[tokio::test]
    async fn ingest_with_version_tags_the_vector_id() {
        let store = VectorStore::in_memory().unwrap();
        let retriever = Retriever::new(store, FakeEmbedder);
        retriever
            .ingest(
                "acme",
                "doc1",
                Some(2),
                vec![(0, "hi".to_string(), serde_json::json!({}))],
            )
            .await
            .unwrap();
        let results = retriever.search("acme", "hi", 5).await.unwrap();
        assert_eq!(results[0].chunk.id, "doc1#v2#chunk-0");
    }
}
