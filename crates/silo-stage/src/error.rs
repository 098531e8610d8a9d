//! Error types for the staging layer

use thiserror::Error;

/// Result type alias for staging operations
pub type Result<T> = std::result::Result<T, StageError>;

/// Error type for staging, schema evolution, loading, and auditing
#[derive(Error, Debug)]
pub enum StageError {
    /// Lake write/normalization failed
    #[error("Staging error: {0}")]
    Staging(String),

    /// A staged file disappeared before it could be loaded
    #[error("Parquet file not found: {0}")]
    FileNotFound(String),

    /// Target-table DDL failed
    #[error("Schema evolution failed: {0}")]
    SchemaEvolution(String),

    /// Warehouse insert failed
    #[error("Load failed: {0}")]
    Load(String),

    /// Audit trail write failed; must never mask the error it reports on
    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    /// File system operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Columnar conversion failed
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet encode/decode failed
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),
}

impl StageError {
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    pub fn schema_evolution(msg: impl Into<String>) -> Self {
        Self::SchemaEvolution(msg.into())
    }

    pub fn load(msg: impl Into<String>) -> Self {
        Self::Load(msg.into())
    }

    pub fn audit_write(msg: impl Into<String>) -> Self {
        Self::AuditWrite(msg.into())
    }
}
