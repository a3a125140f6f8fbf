//! Storage layer for the CV intake and matching pipeline.
//!
//! Three tiers, mirroring the upstream Python system's `storage/` package:
//! - **Object storage** (S3/MinIO): original uploads, extracted text,
//!   extraction/structurer metadata, unmatched-item dumps (§6 object layout).
//! - **Relational storage** (`PostgreSQL`): the candidate aggregate, its
//!   eight history/proficiency tables, consent records, quality warnings,
//!   and the query cache (§4.7).
//! - **Vector + text search** (Qdrant + Postgres trigram/tsvector): the
//!   hybrid search indexer (§4.8). OpenSearch, which the original system
//!   used for this tier, has no equivalent crate in this workspace; the
//!   substitution is recorded in `DESIGN.md`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod layout;
pub mod metadata_storage;
pub mod object_storage;
pub mod search_indexer;
pub mod vector_storage;

pub use metadata_storage::{
    CountCheck, MetadataStorage, PostgresConfig, PostgresMetadataStorage, WriteVerification,
};
pub use object_storage::{ObjectStorage, S3Config, S3ObjectStorage};
pub use search_indexer::{build_index_text, HybridSearchResult, SearchIndexer};
pub use vector_storage::{CandidateEmbedding, QdrantConfig, QdrantVectorStorage, VectorStorage};

/// Storage layer errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 error: {0}")]
    S3Error(String),

    #[error("Qdrant error: {0}")]
    QdrantError(String),

    #[error("PostgreSQL error: {0}")]
    PostgresError(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("write failed at step '{step}': {message}")]
    WriteStepFailed { step: String, message: String },

    #[error("other error: {0}")]
    Other(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Complete storage configuration for all backends.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub s3: S3Config,
    #[serde(default)]
    pub qdrant: QdrantConfig,
    #[serde(default)]
    pub postgres: PostgresConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_config_default_points_at_cv_intake() {
        let config = StorageConfig::default();
        assert_eq!(config.s3.bucket, "cv-intake");
        assert_eq!(config.qdrant.collection, "cv_embeddings");
        assert_eq!(config.postgres.database, "cv_intake");
    }
}
