use thiserror::Error;

/// Main error type for opsearch
#[derive(Error, Debug)]
pub enum OpsearchError {
    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata store errors
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// Serialization errors (index files, cache keys)
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding API errors (covers dense-search runtime failures)
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// No index loaded and none available
    #[error("Retrieval not ready: {0}")]
    NotReady(String),

    /// Index file present but schema/shape invalid
    #[error("Corrupt index: {0}")]
    IndexCorrupt(String),

    /// Dense index dimension disagrees with the configured embedding model
    #[error("Embedding dimension mismatch: index has {index_dim}, model produces {model_dim}")]
    DimensionMismatch { index_dim: usize, model_dim: usize },

    /// Invalid search input (empty query, over-long query, bad top_k)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Search errors
    #[error("Search error: {0}")]
    Search(String),
}

/// Convenient Result type using OpsearchError
pub type Result<T> = std::result::Result<T, OpsearchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OpsearchError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = OpsearchError::DimensionMismatch {
            index_dim: 384,
            model_dim: 1536,
        };
        let msg = err.to_string();
        assert!(msg.contains("384"));
        assert!(msg.contains("1536"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: OpsearchError = io_err.into();
        assert!(matches!(err, OpsearchError::Io(_)));
    }

    #[test]
    fn test_error_from_rusqlite() {
        let sql_err = rusqlite::Error::InvalidQuery;
        let err: OpsearchError = sql_err.into();
        assert!(matches!(err, OpsearchError::Store(_)));
    }
}
