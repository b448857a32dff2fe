use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable prefix for all settings
const ENV_PREFIX: &str = "OPSEARCH_";

/// Main configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    pub search: SearchConfig,
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub embeddings: EmbeddingsConfig,
    pub store: StoreConfig,
}

/// Retrieval tuning configuration
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// BM25 term-frequency saturation parameter
    pub bm25_k1: f32,
    /// BM25 document length normalization
    pub bm25_b: f32,
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Candidates requested from each retriever before fusion
    pub fetch_k: usize,
    pub bm25_weight: f32,
    pub vector_weight: f32,
    /// RRF rank constant (higher = flatter rank contribution)
    pub rrf_k: f32,
}

/// Query cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size: usize,
    pub ttl_seconds: u64,
}

/// Index storage configuration
#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub index_dir: PathBuf,
    /// Optional URL of a zip archive to bootstrap index_dir from
    pub indexes_url: Option<String>,
}

/// Embedding model configuration
#[derive(Debug, Clone)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
    pub api_url: String,
    pub api_key_env: String,
}

/// Metadata store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub db_path: PathBuf,
}

/// Read a prefixed environment variable, parsing it into `T` or falling
/// back to `default` when unset.
fn env_or<T: FromStr>(key: &str, default: T) -> Result<T>
where
    <T as FromStr>::Err: std::fmt::Display,
{
    let full_key = format!("{}{}", ENV_PREFIX, key);
    match std::env::var(&full_key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", full_key, e)),
        Err(_) => Ok(default),
    }
}

/// Read an optional prefixed environment variable as a string.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key))
        .ok()
        .filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from `OPSEARCH_*` environment variables.
    ///
    /// Loads variables from a `.env` file (if present) first, so local
    /// development setups work without exporting anything. All settings are
    /// optional and fall back to defaults; validation fails fast on
    /// out-of-range values.
    pub fn load() -> Result<Self> {
        // Load .env file if it exists (ignore errors - file is optional)
        let _ = dotenv::dotenv();

        let config = Config {
            search: SearchConfig {
                bm25_k1: env_or("BM25_K1", 1.5)?,
                bm25_b: env_or("BM25_B", 0.75)?,
                default_top_k: env_or("DEFAULT_TOP_K", 10)?,
                max_top_k: env_or("MAX_TOP_K", 50)?,
                fetch_k: env_or("FETCH_K", 100)?,
                bm25_weight: env_or("BM25_WEIGHT", 0.5)?,
                vector_weight: env_or("VECTOR_WEIGHT", 0.5)?,
                rrf_k: env_or("RRF_K", 60.0)?,
            },
            cache: CacheConfig {
                max_size: env_or("CACHE_MAX_SIZE", 1000)?,
                ttl_seconds: env_or("CACHE_TTL_SECONDS", 3600)?,
            },
            index: IndexConfig {
                index_dir: env_or("INDEX_DIR", PathBuf::from("data/indexes"))?,
                indexes_url: env_opt("INDEXES_URL"),
            },
            embeddings: EmbeddingsConfig {
                model: env_or("EMBEDDING_MODEL", "text-embedding-3-small".to_string())?,
                dimensions: env_or("EMBEDDING_DIMENSIONS", 1536)?,
                batch_size: env_or("EMBEDDING_BATCH_SIZE", 32)?,
                api_url: env_or(
                    "EMBEDDING_API_URL",
                    "https://api.openai.com/v1/embeddings".to_string(),
                )?,
                api_key_env: env_or("EMBEDDING_API_KEY_ENV", "OPENAI_API_KEY".to_string())?,
            },
            store: StoreConfig {
                db_path: env_or("DB_PATH", PathBuf::from("data/opsearch.db"))?,
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.search.bm25_k1 <= 0.0 {
            anyhow::bail!("OPSEARCH_BM25_K1 must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.search.bm25_b) {
            anyhow::bail!("OPSEARCH_BM25_B must be between 0.0 and 1.0");
        }

        if self.search.default_top_k == 0 {
            anyhow::bail!("OPSEARCH_DEFAULT_TOP_K must be greater than 0");
        }

        if self.search.default_top_k > self.search.max_top_k {
            anyhow::bail!(
                "OPSEARCH_DEFAULT_TOP_K ({}) must not exceed OPSEARCH_MAX_TOP_K ({})",
                self.search.default_top_k,
                self.search.max_top_k
            );
        }

        if self.search.fetch_k < self.search.max_top_k {
            anyhow::bail!(
                "OPSEARCH_FETCH_K ({}) must be at least OPSEARCH_MAX_TOP_K ({})",
                self.search.fetch_k,
                self.search.max_top_k
            );
        }

        if self.search.bm25_weight < 0.0 || self.search.vector_weight < 0.0 {
            anyhow::bail!("Fusion weights must be non-negative");
        }

        if self.search.bm25_weight + self.search.vector_weight <= 0.0 {
            anyhow::bail!("At least one fusion weight must be positive");
        }

        if self.search.rrf_k <= 0.0 {
            anyhow::bail!("OPSEARCH_RRF_K must be greater than 0");
        }

        if self.cache.max_size == 0 {
            anyhow::bail!("OPSEARCH_CACHE_MAX_SIZE must be greater than 0");
        }

        if self.embeddings.dimensions == 0 {
            anyhow::bail!("OPSEARCH_EMBEDDING_DIMENSIONS must be greater than 0");
        }

        if self.embeddings.batch_size == 0 {
            anyhow::bail!("OPSEARCH_EMBEDDING_BATCH_SIZE must be greater than 0");
        }

        Ok(())
    }

    /// Look up the embedding API key from the configured environment variable.
    pub fn embedding_api_key(&self) -> Result<String> {
        std::env::var(&self.embeddings.api_key_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable.",
                self.embeddings.api_key_env
            )
        })
    }
}
