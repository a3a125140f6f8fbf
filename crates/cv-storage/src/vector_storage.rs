//! Vector storage implementation using Qdrant
//!
//! This module provides k-NN search over the dense CV embedding produced by
//! the search indexer (§4.8): one vector per candidate, built from name,
//! skills, experience, education, languages, certifications, and training.

use crate::{StorageError, StorageResult};
use qdrant_client::{
    qdrant::{
        vectors_config::Config, CreateCollectionBuilder, DeletePointsBuilder, Distance,
        GetPointsBuilder, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, VectorParams,
        VectorsConfig,
    },
    Qdrant,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// One candidate's dense embedding plus the metadata carried alongside it
/// for filterable k-NN search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEmbedding {
    pub candidate_id: Uuid,
    pub vector: Vec<f32>,
    pub metadata: HashMap<String, String>,
}

/// Qdrant configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QdrantConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub collection: String,
    /// The embedding provider's output dimension (§4.8 defines it at 1024).
    pub vector_dim: u64,
    pub distance: VectorDistance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VectorDistance {
    Cosine,
    Euclidean,
    Dot,
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("QDRANT_URL")
                .unwrap_or_else(|_| "http://localhost:6334".to_string()),
            api_key: std::env::var("QDRANT_API_KEY").ok(),
            collection: "cv_embeddings".to_string(),
            vector_dim: 1024,
            distance: VectorDistance::Cosine,
        }
    }
}

impl VectorDistance {
    fn to_qdrant_distance(&self) -> Distance {
        match self {
            VectorDistance::Cosine => Distance::Cosine,
            VectorDistance::Euclidean => Distance::Euclid,
            VectorDistance::Dot => Distance::Dot,
        }
    }
}

/// Vector storage trait.
#[async_trait::async_trait]
pub trait VectorStorage: Send + Sync {
    async fn init_collection(&self) -> StorageResult<()>;

    async fn store_embedding(&self, embedding: &CandidateEmbedding) -> StorageResult<()>;

    async fn store_embeddings(&self, embeddings: &[CandidateEmbedding]) -> StorageResult<usize>;

    async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<HashMap<String, String>>,
    ) -> StorageResult<Vec<SimilarityResult>>;

    async fn get_embedding(&self, candidate_id: Uuid) -> StorageResult<CandidateEmbedding>;

    async fn delete_embedding(&self, candidate_id: Uuid) -> StorageResult<()>;
}

/// Similarity search result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub candidate_id: Uuid,
    /// Higher is more similar.
    pub score: f32,
    pub metadata: HashMap<String, String>,
}

/// Qdrant vector storage implementation.
pub struct QdrantVectorStorage {
    client: Qdrant,
    collection: String,
    vector_dim: u64,
    distance: VectorDistance,
}

impl QdrantVectorStorage {
    pub async fn new(config: QdrantConfig) -> StorageResult<Self> {
        let client = if let Some(api_key) = &config.api_key {
            Qdrant::from_url(&config.url)
                .api_key(api_key.clone())
                .build()
                .map_err(|e| StorageError::QdrantError(e.to_string()))?
        } else {
            Qdrant::from_url(&config.url)
                .build()
                .map_err(|e| StorageError::QdrantError(e.to_string()))?
        };

        Ok(Self {
            client,
            collection: config.collection,
            vector_dim: config.vector_dim,
            distance: config.distance,
        })
    }

    /// Candidate UUIDs are 128-bit; Qdrant point ids accept them directly.
    fn point_id(candidate_id: Uuid) -> qdrant_client::qdrant::PointId {
        candidate_id.to_string().into()
    }

    fn payload(embedding: &CandidateEmbedding) -> HashMap<String, qdrant_client::qdrant::Value> {
        let mut payload = HashMap::with_capacity(1 + embedding.metadata.len());
        payload.insert(
            "candidate_id".to_string(),
            embedding.candidate_id.to_string().into(),
        );
        for (k, v) in &embedding.metadata {
            payload.insert(k.clone(), v.clone().into());
        }
        payload
    }
}

#[async_trait::async_trait]
impl VectorStorage for QdrantVectorStorage {
    async fn init_collection(&self) -> StorageResult<()> {
        let collections = self
            .client
            .list_collections()
            .await
            .map_err(|e| StorageError::QdrantError(e.to_string()))?;

        let exists = collections
            .collections
            .iter()
            .any(|c| c.name == self.collection);

        if !exists {
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection).vectors_config(VectorsConfig {
                        config: Some(Config::Params(VectorParams {
                            size: self.vector_dim,
                            distance: self.distance.to_qdrant_distance().into(),
                            ..Default::default()
                        })),
                    }),
                )
                .await
                .map_err(|e| StorageError::QdrantError(e.to_string()))?;

            tracing::info!("created Qdrant collection: {}", self.collection);
        }

        Ok(())
    }

    async fn store_embedding(&self, embedding: &CandidateEmbedding) -> StorageResult<()> {
        let point = PointStruct::new(
            Self::point_id(embedding.candidate_id),
            embedding.vector.clone(),
            Self::payload(embedding),
        );

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, vec![point]))
            .await
            .map_err(|e| StorageError::QdrantError(e.to_string()))?;

        Ok(())
    }

    async fn store_embeddings(&self, embeddings: &[CandidateEmbedding]) -> StorageResult<usize> {
        let mut points = Vec::with_capacity(embeddings.len());
        points.extend(embeddings.iter().map(|embedding| {
            PointStruct::new(
                Self::point_id(embedding.candidate_id),
                embedding.vector.clone(),
                Self::payload(embedding),
            )
        }));

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
            .await
            .map_err(|e| StorageError::QdrantError(e.to_string()))?;

        Ok(embeddings.len())
    }

    async fn search_similar(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<HashMap<String, String>>,
    ) -> StorageResult<Vec<SimilarityResult>> {
        let mut search_builder =
            SearchPointsBuilder::new(&self.collection, query_vector, limit as u64)
                .with_payload(true);

        if let Some(filter_map) = filter {
            use qdrant_client::qdrant::{Condition, Filter};

            let mut conditions = Vec::with_capacity(filter_map.len());
            conditions.extend(
                filter_map
                    .iter()
                    .map(|(key, value)| Condition::matches(key.clone(), value.clone())),
            );

            search_builder = search_builder.filter(Filter {
                must: conditions,
                ..Default::default()
            });
        }

        let search_result = self
            .client
            .search_points(search_builder)
            .await
            .map_err(|e| StorageError::QdrantError(e.to_string()))?;

        let mut results = Vec::with_capacity(search_result.result.len());
        for scored_point in search_result.result {
            let mut metadata = HashMap::with_capacity(scored_point.payload.len());
            let mut candidate_id = None;
            for (key, value) in scored_point.payload {
                if let Some(qdrant_client::qdrant::value::Kind::StringValue(s)) = value.kind {
                    if key == "candidate_id" {
                        candidate_id = Uuid::parse_str(&s).ok();
                    } else {
                        metadata.insert(key, s);
                    }
                }
            }
            let Some(candidate_id) = candidate_id else {
                continue;
            };
            results.push(SimilarityResult {
                candidate_id,
                score: scored_point.score,
                metadata,
            });
        }

        Ok(results)
    }

    async fn get_embedding(&self, candidate_id: Uuid) -> StorageResult<CandidateEmbedding> {
        let points = self
            .client
            .get_points(
                GetPointsBuilder::new(&self.collection, vec![Self::point_id(candidate_id)])
                    .with_payload(true)
                    .with_vectors(true),
            )
            .await
            .map_err(|e| StorageError::QdrantError(e.to_string()))?;

        let point = points
            .result
            .first()
            .ok_or_else(|| StorageError::NotFound(candidate_id.to_string()))?;

        let mut metadata = HashMap::with_capacity(point.payload.len());
        for (key, value) in &point.payload {
            if key == "candidate_id" {
                continue;
            }
            if let Some(qdrant_client::qdrant::value::Kind::StringValue(s)) = &value.kind {
                metadata.insert(key.clone(), s.clone());
            }
        }

        let vector = point
            .vectors
            .as_ref()
            .and_then(|v| v.vectors_options.as_ref())
            .and_then(|opts| match opts {
                qdrant_client::qdrant::vectors_output::VectorsOptions::Vector(v) => {
                    Some(v.data.clone())
                }
                _ => None,
            })
            .ok_or_else(|| StorageError::QdrantError("no vector data found".to_string()))?;

        Ok(CandidateEmbedding {
            candidate_id,
            vector,
            metadata,
        })
    }

    async fn delete_embedding(&self, candidate_id: Uuid) -> StorageResult<()> {
        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection).points(vec![Self::point_id(candidate_id)]),
            )
            .await
            .map_err(|e| StorageError::QdrantError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qdrant_config_default_matches_embedding_dimension() {
        let config = QdrantConfig::default();
        assert_eq!(config.collection, "cv_embeddings");
        assert_eq!(config.vector_dim, 1024);
    }

    #[test]
    fn vector_distance_conversion() {
        assert_eq!(VectorDistance::Cosine.to_qdrant_distance(), Distance::Cosine);
        assert_eq!(VectorDistance::Euclidean.to_qdrant_distance(), Distance::Euclid);
        assert_eq!(VectorDistance::Dot.to_qdrant_distance(), Distance::Dot);
    }

    #[test]
    fn point_id_is_stable_per_candidate() {
        let id = Uuid::new_v4();
        assert_eq!(QdrantVectorStorage::point_id(id), QdrantVectorStorage::point_id(id));
    }

    #[test]
    fn similarity_result_construction() {
        let result = SimilarityResult {
            candidate_id: Uuid::new_v4(),
            score: 0.95,
            metadata: HashMap::new(),
        };
        assert_eq!(result.score, 0.95);
    }
}
