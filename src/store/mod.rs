pub mod db;
pub mod sqlite;

pub use db::Db;
pub use sqlite::SqliteStore;

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A stored chunk: the indexed unit of text.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub content: String,
}

/// A stored source document that chunks belong to.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Source identifier of the form `<project>-<kind>` (e.g. `etcd-issues`)
    pub source_id: String,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Metadata store consumed by the retrieval runtime.
///
/// The store is an external collaborator: ingestion writes it, retrieval
/// only reads. Implementations must be safe for concurrent readers.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch chunks by id, in one batch. Missing ids are simply absent from
    /// the result (races with ingest deletion are expected).
    async fn get_chunks_by_ids(&self, ids: &[String]) -> Result<Vec<ChunkRecord>>;

    /// Fetch a single document, or `None` if it no longer exists.
    async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentRecord>>;

    /// All `(chunk_id, content)` pairs, in stable insertion order.
    /// Used by the index builder only.
    async fn get_all_chunks(&self) -> Result<Vec<(String, String)>>;
}
