//! SQLite-backed metadata store.

use crate::error::{OpsearchError, Result};
use crate::store::{ChunkRecord, Db, DocumentRecord, MetadataStore};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

/// SQLite implementation of [`MetadataStore`].
pub struct SqliteStore {
    db: Db,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db: Db::new(db_path),
        }
    }

    /// Create the documents/chunks tables if they do not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        self.db
            .with_connection(|conn| {
                conn.execute_batch(
                    "CREATE TABLE IF NOT EXISTS documents ( \
                         doc_id TEXT PRIMARY KEY, \
                         title TEXT NOT NULL, \
                         url TEXT NOT NULL, \
                         source_id TEXT NOT NULL, \
                         updated_at TEXT \
                     ); \
                     CREATE TABLE IF NOT EXISTS chunks ( \
                         chunk_id TEXT PRIMARY KEY, \
                         doc_id TEXT NOT NULL REFERENCES documents(doc_id) ON DELETE CASCADE, \
                         content TEXT NOT NULL, \
                         position INTEGER NOT NULL DEFAULT 0 \
                     ); \
                     CREATE INDEX IF NOT EXISTS idx_chunks_doc ON chunks(doc_id);",
                )?;
                Ok(())
            })
            .await
    }

    /// Insert or replace a document row.
    pub async fn upsert_document(&self, doc: DocumentRecord) -> Result<()> {
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO documents (doc_id, title, url, source_id, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        doc.id,
                        doc.title,
                        doc.url,
                        doc.source_id,
                        doc.updated_at.map(|t| t.to_rfc3339()),
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Insert or replace a chunk row.
    pub async fn upsert_chunk(&self, chunk: ChunkRecord, position: usize) -> Result<()> {
        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO chunks (chunk_id, doc_id, content, position) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![chunk.id, chunk.document_id, chunk.content, position as i64],
                )?;
                Ok(())
            })
            .await
    }
}

fn parse_updated_at(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    })
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn get_chunks_by_ids(&self, ids: &[String]) -> Result<Vec<ChunkRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<String> = ids.to_vec();
        self.db
            .with_connection(move |conn| {
                let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!(
                    "SELECT chunk_id, doc_id, content FROM chunks WHERE chunk_id IN ({})",
                    placeholders
                );
                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(rusqlite::params_from_iter(ids.iter()))?;

                let mut results = Vec::new();
                while let Some(row) = rows.next()? {
                    results.push(ChunkRecord {
                        id: row.get(0)?,
                        document_id: row.get(1)?,
                        content: row.get(2)?,
                    });
                }
                Ok::<Vec<ChunkRecord>, OpsearchError>(results)
            })
            .await
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        let doc_id = doc_id.to_string();
        self.db
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT doc_id, title, url, source_id, updated_at \
                     FROM documents WHERE doc_id = ?1",
                )?;
                let mut rows = stmt.query(rusqlite::params![doc_id])?;

                match rows.next()? {
                    Some(row) => Ok(Some(DocumentRecord {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        url: row.get(2)?,
                        source_id: row.get(3)?,
                        updated_at: parse_updated_at(row.get(4)?),
                    })),
                    None => Ok(None),
                }
            })
            .await
    }

    async fn get_all_chunks(&self) -> Result<Vec<(String, String)>> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT chunk_id, content FROM chunks ORDER BY doc_id, position, chunk_id",
                )?;
                let mut rows = stmt.query([])?;

                let mut results = Vec::new();
                while let Some(row) = rows.next()? {
                    results.push((row.get::<_, String>(0)?, row.get::<_, String>(1)?));
                }
                Ok::<Vec<(String, String)>, OpsearchError>(results)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_store() -> (SqliteStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SqliteStore::new(temp_dir.path().join("test.db"));
        store.ensure_schema().await.unwrap();
        (store, temp_dir)
    }

    fn doc(id: &str, source_id: &str) -> DocumentRecord {
        DocumentRecord {
            id: id.to_string(),
            title: format!("Title of {}", id),
            url: format!("https://example.com/{}", id),
            source_id: source_id.to_string(),
            updated_at: Some(Utc::now()),
        }
    }

    fn chunk(id: &str, doc_id: &str, content: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            document_id: doc_id.to_string(),
            content: content.to_string(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_document_and_chunks() {
        let (store, _temp_dir) = setup_store().await;

        store.upsert_document(doc("d1", "etcd-docs")).await.unwrap();
        store
            .upsert_chunk(chunk("c1", "d1", "first chunk"), 0)
            .await
            .unwrap();
        store
            .upsert_chunk(chunk("c2", "d1", "second chunk"), 1)
            .await
            .unwrap();

        let fetched = store.get_document("d1").await.unwrap().unwrap();
        assert_eq!(fetched.source_id, "etcd-docs");
        assert!(fetched.updated_at.is_some());

        let chunks = store
            .get_chunks_by_ids(&["c1".to_string(), "c2".to_string()])
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_ids_are_absent_not_errors() {
        let (store, _temp_dir) = setup_store().await;

        store.upsert_document(doc("d1", "etcd-docs")).await.unwrap();
        store
            .upsert_chunk(chunk("c1", "d1", "content"), 0)
            .await
            .unwrap();

        let chunks = store
            .get_chunks_by_ids(&["c1".to_string(), "ghost".to_string()])
            .await
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "c1");

        assert!(store.get_document("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_chunks_stable_order() {
        let (store, _temp_dir) = setup_store().await;

        store.upsert_document(doc("d1", "etcd-docs")).await.unwrap();
        for (i, id) in ["c1", "c2", "c3"].iter().enumerate() {
            store
                .upsert_chunk(chunk(id, "d1", &format!("content {}", id)), i)
                .await
                .unwrap();
        }

        let first = store.get_all_chunks().await.unwrap();
        let second = store.get_all_chunks().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].0, "c1");
        assert_eq!(first[2].0, "c3");
    }

    #[tokio::test]
    async fn test_empty_id_batch() {
        let (store, _temp_dir) = setup_store().await;
        assert!(store.get_chunks_by_ids(&[]).await.unwrap().is_empty());
    }
}
