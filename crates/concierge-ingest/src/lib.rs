//! Ingestion pipeline: turns a knowledge source (URL, uploaded file, or
//! manual text) into searchable vectors.
//!
//! # Pipeline
//!
//! [`engine::IngestionEngine::ingest`] runs six steps per source: extract
//! raw text, split it into overlapping chunks, drop the source's previous
//! vectors, embed and upsert the new chunks in batches, mark the source
//! `ready`, then invalidate the tenant's semantic cache so future queries
//! see the refreshed knowledge. Each step is retried with a fixed backoff
//! before the source is marked `failed`. Concurrent ingestions across
//! tenants are capped by a shared semaphore.

pub mod chunker;
pub mod db;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod types;

pub use engine::IngestionEngine;
pub use error::{IngestError, Result};
pub use types::{IngestionEvent, IngestionResult, KnowledgeSource, SourceKind};
