use std::sync::Arc;

use concierge_persistence::AuditStore;
use concierge_providers::provider::EmbeddingProvider;
use concierge_retriever::Retriever;
use concierge_cache::CacheStore;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::chunker::{chunk_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use crate::db::KnowledgeSourceStore;
use crate::error::{IngestError, Result};
use crate::extractor::Extractor;
use crate::types::{IngestionEvent, IngestionResult};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 250;
const EMBED_BATCH_SIZE: usize = 20;
const MAX_CONCURRENT_INGESTIONS: usize = 5;

/// Drives the six-step ingestion pipeline (§4.6): extract, chunk, drop the
/// source's stale vectors, embed-and-upsert in batches, mark the source
/// ready, then invalidate the tenant's semantic cache.
pub struct IngestionEngine<E: EmbeddingProvider> {
    sources: KnowledgeSourceStore,
    retriever: Retriever<E>,
    cache: CacheStore,
    audit: AuditStore,
    extractor: Extractor,
    permits: Arc<Semaphore>,
}

impl<E: EmbeddingProvider> IngestionEngine<E> {
    pub fn new(
        sources: KnowledgeSourceStore,
        retriever: Retriever<E>,
        cache: CacheStore,
        audit: AuditStore,
        http: reqwest::Client,
    ) -> Self {
        Self {
            sources,
            retriever,
            cache,
            audit,
            extractor: Extractor::new(http),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_INGESTIONS)),
        }
    }

    /// Run the pipeline for one event, bounded by the shared concurrency
    /// permit pool. Never panics: every step failure is captured and
    /// reflected both in the returned result and the source's persisted
    /// status.
    pub async fn ingest(&self, event: IngestionEvent) -> IngestionResult {
        let _permit = self.permits.acquire().await.expect("semaphore closed");

        if let Err(e) = self.sources.upsert_processing(
            &event.tenant_id,
            &event.source_id,
            event.kind,
            event.url.as_deref().or(event.file_id.as_deref()).unwrap_or(""),
            event.version.unwrap_or(1),
        ) {
            return failed(&event.source_id, e.into());
        }

        match self.run_pipeline(&event).await {
            Ok((chunks_count, vectors_count)) => {
                info!(source_id = %event.source_id, tenant_id = %event.tenant_id, chunks_count, vectors_count, "knowledge.processed");
                self.audit.record_best_effort(
                    &event.tenant_id,
                    "knowledge.processed",
                    serde_json::json!({
                        "source_id": event.source_id,
                        "chunks_count": chunks_count,
                        "vectors_count": vectors_count,
                    }),
                );
                IngestionResult {
                    source_id: event.source_id,
                    success: true,
                    chunks_count,
                    vectors_count,
                    error: None,
                }
            }
            Err(e) => {
                error!(source_id = %event.source_id, error = %e, "ingestion failed after retries");
                let _ = self.sources.mark_failed(&event.source_id, &e.to_string());
                failed(&event.source_id, e)
            }
        }
    }

    async fn run_pipeline(&self, event: &IngestionEvent) -> Result<(usize, usize)> {
        let text = retry("extract", || self.extractor.extract(event)).await?;
        let chunks = chunk_text(&text, DEFAULT_CHUNK_SIZE, DEFAULT_CHUNK_OVERLAP)?;

        self.retriever.delete_by_source(&event.tenant_id, &event.source_id)?;

        let mut vectors_count = 0;
        for batch in chunks.chunks(EMBED_BATCH_SIZE) {
            let offset = vectors_count;
            let payload: Vec<(usize, String, serde_json::Value)> = batch
                .iter()
                .enumerate()
                .map(|(i, text)| (offset + i, text.clone(), serde_json::json!({})))
                .collect();
            retry("embed_and_upsert", || async {
                self.retriever
                    .ingest(&event.tenant_id, &event.source_id, event.version, payload.clone())
                    .await
                    .map_err(IngestError::from)
            })
            .await?;
            vectors_count += batch.len();
        }

        self.sources.mark_ready(
            &event.source_id,
            serde_json::json!({"title": event.title, "chunks": chunks.len()}),
        )?;

        self.cache.invalidate_tenant(&event.tenant_id);

        Ok((chunks.len(), vectors_count))
    }
}

fn failed(source_id: &str, error: IngestError) -> IngestionResult {
    IngestionResult {
        source_id: source_id.to_string(),
        success: false,
        chunks_count: 0,
        vectors_count: 0,
        error: Some(error.to_string()),
    }
}

/// Retries a fallible async step up to [`MAX_ATTEMPTS`] times with a fixed
/// backoff, logging each failed attempt. The last error is returned once
/// attempts are exhausted.
async fn retry<T, F, Fut>(step: &str, mut f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < MAX_ATTEMPTS => {
                warn!(step, attempt, error = %e, "ingestion step failed, retrying");
                tokio::time::sleep(std::time::Duration::from_millis(RETRY_BACKOFF_MS)).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use concierge_providers::provider::ProviderError;
    use concierge_retriever::VectorStore;
    use crate::types::SourceKind;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        fn name(&self) -> &str {
            "fake"
        }

        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    fn engine() -> IngestionEngine<FakeEmbedder> {
        let sources = KnowledgeSourceStore::in_memory().unwrap();
        let retriever = Retriever::new(VectorStore::in_memory().unwrap(), FakeEmbedder);
        let cache = CacheStore::in_memory().unwrap();
        let audit = AuditStore::in_memory().unwrap();
        IngestionEngine::new(sources, retriever, cache, audit, reqwest::Client::new())
    }

    #[tokio::test]
    async fn manual_event_ingests_and_marks_ready() {
        let engine = engine();
        let event = IngestionEvent {
            source_id: "src-1".into(),
            tenant_id: "tenant-a".into(),
            kind: SourceKind::Manual,
            url: None,
            file_id: None,
            content: Some("Refunds are processed within 5 business days.\n\nContact support for exceptions.".into()),
            title: Some("Refund policy".into()),
            version: Some(1),
        };
        let result = engine.ingest(event).await;
        assert!(result.success);
        assert_eq!(result.chunks_count, 2);
        assert_eq!(result.vectors_count, 2);

        let source = engine.sources.get("src-1").unwrap().unwrap();
        assert_eq!(source.status, concierge_core::types::SourceStatus::Ready);

        let events = engine.audit.list_for_tenant("tenant-a", None, 10).unwrap();
        assert!(events.iter().any(|e| e.event_type == "knowledge.processed"));
    }

    #[tokio::test]
    async fn missing_content_marks_source_failed() {
        let engine = engine();
        let event = IngestionEvent {
            source_id: "src-2".into(),
            tenant_id: "tenant-a".into(),
            kind: SourceKind::Manual,
            url: None,
            file_id: None,
            content: None,
            title: None,
            version: Some(1),
        };
        let result = engine.ingest(event).await;
        assert!(!result.success);
        let source = engine.sources.get("src-2").unwrap().unwrap();
        assert_eq!(source.status, concierge_core::types::SourceStatus::Failed);
    }
}
