//! Versioned index lifecycle: build, persist, atomically activate, load.
//!
//! Each build writes a fully-formed `v<YYYYMMDD_HHMMSS>` directory and only
//! then repoints the `current` pointer, so an observer of `current` sees
//! either the prior version or the new one, never a half-written directory.
//! Loads swap the in-memory handles; in-flight searches keep the index they
//! started with.

use crate::embeddings::Embedder;
use crate::error::{OpsearchError, Result};
use crate::index::{Bm25Index, DenseIndex, SharedIndex};
use crate::store::MetadataStore;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const BM25_FILENAME: &str = "bm25_index.json";
pub const VECTORS_FILENAME: &str = "vectors.faiss";
pub const ID_MAP_FILENAME: &str = "chunk_id_map.json";

/// Pointer file naming the active version directory. Written via temp file
/// + rename so activation is atomic for readers on every platform, unlike
/// symlink replacement.
const CURRENT_POINTER: &str = "current.txt";

/// Readiness and version snapshot for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub bm25_ready: bool,
    pub bm25_chunks: usize,
    pub vector_ready: bool,
    pub vector_chunks: usize,
    pub current_version: Option<String>,
}

/// Owns the index directory and the shared retriever handles.
pub struct IndexManager {
    index_dir: PathBuf,
    indexes_url: Option<String>,
    bm25_k1: f32,
    bm25_b: f32,
    bm25: Arc<SharedIndex<Bm25Index>>,
    dense: Arc<SharedIndex<DenseIndex>>,
    store: Arc<dyn MetadataStore>,
    embedder: Arc<dyn Embedder>,
}

impl IndexManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index_dir: PathBuf,
        indexes_url: Option<String>,
        bm25_k1: f32,
        bm25_b: f32,
        bm25: Arc<SharedIndex<Bm25Index>>,
        dense: Arc<SharedIndex<DenseIndex>>,
        store: Arc<dyn MetadataStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            index_dir,
            indexes_url,
            bm25_k1,
            bm25_b,
            bm25,
            dense,
            store,
            embedder,
        }
    }

    /// Build new indexes from all chunks in the metadata store.
    ///
    /// Writes a fresh timestamped version directory and atomically activates
    /// it. When the store has no chunks the (empty) version directory is
    /// still written but activation is skipped and any prior version stays
    /// current; use [`IndexManager::activate_version`] to force it.
    ///
    /// Concurrent builds are not supported; callers must serialize.
    ///
    /// Returns the new version name.
    pub async fn build_indexes(&self, include_vectors: bool) -> Result<String> {
        let version = chrono::Utc::now().format("v%Y%m%d_%H%M%S").to_string();
        let version_dir = self.index_dir.join(&version);
        std::fs::create_dir_all(&version_dir)?;

        let chunks = self.store.get_all_chunks().await?;
        log::info!(
            "Building indexes: version={} chunks={}",
            version,
            chunks.len()
        );

        let bm25 = Bm25Index::build(&chunks, self.bm25_k1, self.bm25_b);
        bm25.save(&version_dir.join(BM25_FILENAME))?;
        log::info!("BM25 index built: chunks={}", bm25.chunk_count());

        if include_vectors {
            let dense = DenseIndex::build(&chunks, self.embedder.as_ref()).await?;
            dense.save(
                &version_dir.join(VECTORS_FILENAME),
                &version_dir.join(ID_MAP_FILENAME),
            )?;
            log::info!("Dense index built: chunks={}", dense.chunk_count());
        }

        if chunks.is_empty() {
            log::warn!(
                "No chunks in store; version {} written but not activated",
                version
            );
            return Ok(version);
        }

        self.activate_version(&version)?;

        Ok(version)
    }

    /// Atomically activate a version directory.
    ///
    /// The version directory must already be fully written. The pointer file
    /// is replaced in one rename; readers resolve either the old target or
    /// the new one.
    pub fn activate_version(&self, version: &str) -> Result<()> {
        let version_dir = self.index_dir.join(version);
        if !version_dir.is_dir() {
            return Err(OpsearchError::Config(format!(
                "version directory does not exist: {}",
                version_dir.display()
            )));
        }

        let pointer = self.index_dir.join(CURRENT_POINTER);
        let staging = self.index_dir.join(format!("{}.tmp", CURRENT_POINTER));
        std::fs::write(&staging, version)?;
        std::fs::rename(&staging, &pointer)?;

        log::info!("Index version activated: {}", version);
        Ok(())
    }

    /// Resolve the active version directory, if any.
    fn current_version_dir(&self) -> Option<PathBuf> {
        let pointer = self.index_dir.join(CURRENT_POINTER);
        let name = std::fs::read_to_string(pointer).ok()?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        let dir = self.index_dir.join(name);
        dir.is_dir().then_some(dir)
    }

    /// Name of the active version, if any.
    pub fn current_version(&self) -> Option<String> {
        self.current_version_dir()
            .and_then(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
    }

    /// Load indexes from the active version into the shared handles.
    ///
    /// Returns false when no version is active or a present index file fails
    /// to load; the cause is logged. A dense index whose dimension does not
    /// match the configured embedding model is skipped with a warning
    /// (BM25-only mode), which does not fail the load.
    pub fn load_indexes(&self) -> bool {
        let Some(current_dir) = self.current_version_dir() else {
            log::warn!("No active index version under {}", self.index_dir.display());
            return false;
        };

        let bm25_path = current_dir.join(BM25_FILENAME);
        if bm25_path.exists() {
            match Bm25Index::load(&bm25_path) {
                Ok(index) => {
                    log::info!("BM25 index loaded: chunks={}", index.chunk_count());
                    self.bm25.install(index);
                }
                Err(e) => {
                    log::error!("BM25 index load failed: {}", e);
                    return false;
                }
            }
        }

        let vectors_path = current_dir.join(VECTORS_FILENAME);
        let id_map_path = current_dir.join(ID_MAP_FILENAME);
        if vectors_path.exists() && id_map_path.exists() {
            match DenseIndex::load(&vectors_path, &id_map_path, self.embedder.dimension()) {
                Ok(index) => {
                    log::info!("Dense index loaded: chunks={}", index.chunk_count());
                    self.dense.install(index);
                }
                Err(e @ OpsearchError::DimensionMismatch { .. }) => {
                    log::warn!("Dense index skipped, engaging BM25-only mode: {}", e);
                    self.dense.clear();
                }
                Err(e) => {
                    log::error!("Dense index load failed: {}", e);
                    return false;
                }
            }
        }

        true
    }

    /// Ensure index files exist locally, downloading a zip archive from the
    /// configured URL when nothing is active yet.
    pub async fn ensure_indexes_present(&self) -> Result<bool> {
        if let Some(current_dir) = self.current_version_dir() {
            if current_dir.join(BM25_FILENAME).exists() {
                return Ok(true);
            }
        }

        let Some(url) = self.indexes_url.as_deref() else {
            log::warn!("Indexes missing and no indexes URL configured");
            return Ok(false);
        };

        std::fs::create_dir_all(&self.index_dir)?;
        let zip_path = self.index_dir.join("indexes.zip");

        log::info!("Downloading indexes from {}", url);
        let bytes = reqwest::get(url)
            .await
            .map_err(|e| std::io::Error::other(format!("index download failed: {}", e)))?
            .bytes()
            .await
            .map_err(|e| std::io::Error::other(format!("index download failed: {}", e)))?;
        std::fs::write(&zip_path, &bytes)?;

        log::info!("Extracting {}", zip_path.display());
        let file = std::fs::File::open(&zip_path)?;
        let mut archive = zip::ZipArchive::new(file)
            .map_err(|e| OpsearchError::IndexCorrupt(format!("index archive: {}", e)))?;
        archive
            .extract(&self.index_dir)
            .map_err(|e| OpsearchError::IndexCorrupt(format!("index archive: {}", e)))?;

        let _ = std::fs::remove_file(&zip_path);

        let ok = self
            .current_version_dir()
            .map(|dir| dir.join(BM25_FILENAME).exists())
            .unwrap_or(false);
        log::info!("Indexes ready after download: {}", ok);
        Ok(ok)
    }

    /// Current readiness and chunk counts.
    pub fn get_status(&self) -> IndexStatus {
        IndexStatus {
            bm25_ready: self.bm25.is_ready(),
            bm25_chunks: self
                .bm25
                .get()
                .map(|index| index.chunk_count())
                .unwrap_or(0),
            vector_ready: self.dense.is_ready(),
            vector_chunks: self
                .dense
                .get()
                .map(|index| index.chunk_count())
                .unwrap_or(0),
            current_version: self.current_version(),
        }
    }

    pub fn index_dir(&self) -> &Path {
        &self.index_dir
    }
}
