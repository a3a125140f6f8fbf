//! Search Indexer (§4.8): builds the embedding-friendly payload, maintains a
//! Qdrant k-NN index and a Postgres trigram/tsvector text index, and fuses
//! the two via reciprocal-rank fusion.
//!
//! Grounding note: the original system backs this component with
//! OpenSearch (`search/client.py`, `search/mappings.py`). This workspace
//! carries no OpenSearch client crate, so k-NN stays on the teacher's
//! Qdrant store and BM25/trigram text search is layered in-process over
//! Postgres using the trigram/Greek-text extensions already required by
//! the relational schema (§6). Recorded in `DESIGN.md`.

use std::collections::HashMap;

use cv_common::CandidateProfile;
use cv_llm::LlmClient;
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use crate::vector_storage::{CandidateEmbedding, VectorStorage};
use crate::{StorageError, StorageResult};

const MAX_SKILLS: usize = 20;
const MAX_EXPERIENCE: usize = 5;
const MAX_EDUCATION: usize = 3;
const MAX_LANGUAGES: usize = 5;
const MAX_CERTIFICATIONS: usize = 5;
const MAX_TRAINING: usize = 5;
const DESCRIPTION_TRUNCATE_CHARS: usize = 200;

const RRF_VECTOR_WEIGHT: f64 = 0.6;
const RRF_TEXT_WEIGHT: f64 = 0.4;
const RRF_CONSTANT: f64 = 60.0;

/// Build the embedding-friendly payload for a candidate (§4.8): name, up to
/// 20 skills, up to 5 experience items (title + company + truncated
/// description), up to 3 education items, up to 5 languages with levels, up
/// to 5 certifications, up to 5 training names.
#[must_use]
pub fn build_index_text(profile: &CandidateProfile) -> String {
    let mut parts = vec![profile.identity.full_name.clone()];

    let skills: Vec<String> = profile
        .skills
        .iter()
        .take(MAX_SKILLS)
        .map(|s| s.name.clone())
        .collect();
    if !skills.is_empty() {
        parts.push(skills.join(", "));
    }

    for exp in profile.experience.iter().take(MAX_EXPERIENCE) {
        let description: String = exp
            .description
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(DESCRIPTION_TRUNCATE_CHARS)
            .collect();
        parts.push(format!("{} at {}. {}", exp.title, exp.company, description).trim().to_string());
    }

    for edu in profile.education.iter().take(MAX_EDUCATION) {
        parts.push(format!("{} {}", edu.degree, edu.institution));
    }

    let languages: Vec<String> = profile
        .languages
        .iter()
        .take(MAX_LANGUAGES)
        .map(|l| match l.level {
            Some(level) => format!("{} ({level:?})", l.name),
            None => l.name.clone(),
        })
        .collect();
    if !languages.is_empty() {
        parts.push(languages.join(", "));
    }

    let certifications: Vec<String> = profile
        .certifications
        .iter()
        .take(MAX_CERTIFICATIONS)
        .map(|c| c.name.clone())
        .collect();
    if !certifications.is_empty() {
        parts.push(certifications.join(", "));
    }

    let training: Vec<String> = profile
        .training
        .iter()
        .take(MAX_TRAINING)
        .map(|t| t.name.clone())
        .collect();
    if !training.is_empty() {
        parts.push(training.join(", "));
    }

    parts.join(". ")
}

#[derive(Debug, Clone)]
pub struct HybridSearchResult {
    pub candidate_id: Uuid,
    pub rrf_score: f64,
    pub vector_rank: Option<usize>,
    pub text_rank: Option<usize>,
}

/// Text search backed by Postgres trigram + tsvector. The Greek-aware
/// analyzer the original OpenSearch mapping used (character mapping to
/// strip accents, Greek stemmer, Greek stopwords) is approximated here with
/// `unaccent` feeding the `simple` text-search configuration, since
/// PostgreSQL ships no Greek snowball stemmer.
pub struct PostgresTextSearch {
    client: Client,
}

impl PostgresTextSearch {
    pub async fn new(connection_string: &str) -> StorageResult<Self> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("postgres text-search connection error: {e}");
            }
        });

        Ok(Self { client })
    }

    pub async fn init_schema(&self) -> StorageResult<()> {
        self.client
            .batch_execute(
                r"
                CREATE EXTENSION IF NOT EXISTS pg_trgm;
                CREATE EXTENSION IF NOT EXISTS unaccent;
                CREATE TABLE IF NOT EXISTS candidate_search_text (
                    candidate_id UUID PRIMARY KEY,
                    index_text TEXT NOT NULL,
                    search_vector tsvector GENERATED ALWAYS AS
                        (to_tsvector('simple', unaccent(index_text))) STORED
                );
                CREATE INDEX IF NOT EXISTS idx_candidate_search_vector
                    ON candidate_search_text USING GIN (search_vector);
                CREATE INDEX IF NOT EXISTS idx_candidate_search_trgm
                    ON candidate_search_text USING GIN (index_text gin_trgm_ops);
                ",
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;
        Ok(())
    }

    pub async fn index(&self, candidate_id: Uuid, index_text: &str) -> StorageResult<()> {
        self.client
            .execute(
                r"
                INSERT INTO candidate_search_text (candidate_id, index_text)
                VALUES ($1, $2)
                ON CONFLICT (candidate_id) DO UPDATE SET index_text = EXCLUDED.index_text
                ",
                &[&candidate_id, &index_text],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;
        Ok(())
    }

    /// BM25-flavored ranking via `ts_rank`, descending.
    pub async fn search(&self, query: &str, limit: usize) -> StorageResult<Vec<(Uuid, f64)>> {
        let rows = self
            .client
            .query(
                r"
                SELECT candidate_id, ts_rank(search_vector, plainto_tsquery('simple', unaccent($1))) AS rank
                FROM candidate_search_text
                WHERE search_vector @@ plainto_tsquery('simple', unaccent($1))
                ORDER BY rank DESC
                LIMIT $2
                ",
                &[&query, &(limit as i64)],
            )
            .await
            .map_err(|e| StorageError::PostgresError(e.to_string()))?;

        Ok(rows.into_iter().map(|row| (row.get(0), row.get(1))).collect())
    }
}

/// Combines vector k-NN and text search with reciprocal-rank fusion
/// (weights 0.6 vector / 0.4 text, constant 60; §4.8).
pub struct SearchIndexer<V: VectorStorage> {
    vectors: V,
    text: PostgresTextSearch,
}

impl<V: VectorStorage> SearchIndexer<V> {
    pub fn new(vectors: V, text: PostgresTextSearch) -> Self {
        Self { vectors, text }
    }

    pub async fn index_candidate(
        &self,
        profile: &CandidateProfile,
        llm: &dyn LlmClient,
    ) -> StorageResult<()> {
        let index_text = build_index_text(profile);
        let vector = llm
            .embed(&[index_text.clone()])
            .await
            .map_err(|e| StorageError::Other(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| StorageError::Other("embedding provider returned no vectors".into()))?;

        self.vectors
            .store_embedding(&CandidateEmbedding {
                candidate_id: profile.id,
                vector,
                metadata: HashMap::new(),
            })
            .await?;
        self.text.index(profile.id, &index_text).await?;
        Ok(())
    }

    /// Bulk variant for reindexing: batches embeddings through the provider.
    pub async fn index_candidates(
        &self,
        profiles: &[CandidateProfile],
        llm: &dyn LlmClient,
        batch_size: usize,
    ) -> StorageResult<usize> {
        let mut indexed = 0;
        for chunk in profiles.chunks(batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(build_index_text).collect();
            let vectors = llm
                .embed(&texts)
                .await
                .map_err(|e| StorageError::Other(e.to_string()))?;

            let embeddings: Vec<CandidateEmbedding> = chunk
                .iter()
                .zip(vectors)
                .map(|(profile, vector)| CandidateEmbedding {
                    candidate_id: profile.id,
                    vector,
                    metadata: HashMap::new(),
                })
                .collect();
            self.vectors.store_embeddings(&embeddings).await?;

            for (profile, text) in chunk.iter().zip(texts.iter()) {
                self.text.index(profile.id, text).await?;
            }
            indexed += chunk.len();
        }
        Ok(indexed)
    }

    pub async fn search_vector(&self, query_vector: &[f32], limit: usize) -> StorageResult<Vec<Uuid>> {
        Ok(self
            .vectors
            .search_similar(query_vector, limit, None)
            .await?
            .into_iter()
            .map(|r| r.candidate_id)
            .collect())
    }

    pub async fn search_text(&self, query: &str, limit: usize) -> StorageResult<Vec<Uuid>> {
        Ok(self
            .text
            .search(query, limit)
            .await?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    /// Hybrid search (§4.8): fuse vector and text rankings via RRF.
    pub async fn search_hybrid(
        &self,
        query_vector: &[f32],
        query_text: &str,
        limit: usize,
    ) -> StorageResult<Vec<HybridSearchResult>> {
        let vector_ranked = self.search_vector(query_vector, limit.max(50)).await?;
        let text_ranked = self.search_text(query_text, limit.max(50)).await?;
        Ok(reciprocal_rank_fusion(&vector_ranked, &text_ranked, limit))
    }
}

/// Reciprocal-rank fusion with weights 0.6 vector / 0.4 text, constant 60 (§4.8).
fn reciprocal_rank_fusion(
    vector_ranked: &[Uuid],
    text_ranked: &[Uuid],
    limit: usize,
) -> Vec<HybridSearchResult> {
    let mut scores: HashMap<Uuid, (f64, Option<usize>, Option<usize>)> = HashMap::new();

    for (rank, id) in vector_ranked.iter().enumerate() {
        let entry = scores.entry(*id).or_insert((0.0, None, None));
        entry.0 += RRF_VECTOR_WEIGHT / (RRF_CONSTANT + rank as f64 + 1.0);
        entry.1 = Some(rank);
    }
    for (rank, id) in text_ranked.iter().enumerate() {
        let entry = scores.entry(*id).or_insert((0.0, None, None));
        entry.0 += RRF_TEXT_WEIGHT / (RRF_CONSTANT + rank as f64 + 1.0);
        entry.2 = Some(rank);
    }

    let mut results: Vec<HybridSearchResult> = scores
        .into_iter()
        .map(|(candidate_id, (rrf_score, vector_rank, text_rank))| HybridSearchResult {
            candidate_id,
            rrf_score,
            vector_rank,
            text_rank,
        })
        .collect();

    results.sort_by(|a, b| b.rrf_score.total_cmp(&a.rrf_score));
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_common::model::{DateRange, Experience, Identity, Skill, TaxonomyLink};
    use chrono::NaiveDate;

    fn profile_with_skills(names: &[&str]) -> CandidateProfile {
        let mut profile = CandidateProfile::new(Identity::new("Maria Papadopoulou"));
        for name in names {
            profile.skills.push(Skill {
                name: (*name).to_string(),
                level: None,
                taxonomy: TaxonomyLink::none(),
            });
        }
        profile
    }

    #[test]
    fn index_text_includes_name_and_skills() {
        let profile = profile_with_skills(&["Rust", "PostgreSQL"]);
        let text = build_index_text(&profile);
        assert!(text.contains("Maria Papadopoulou"));
        assert!(text.contains("Rust"));
        assert!(text.contains("PostgreSQL"));
    }

    #[test]
    fn index_text_caps_skills_at_twenty() {
        let names: Vec<String> = (0..30).map(|i| format!("skill{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let profile = profile_with_skills(&refs);
        let text = build_index_text(&profile);
        assert!(text.contains("skill19"));
        assert!(!text.contains("skill20"));
    }

    #[test]
    fn index_text_truncates_long_descriptions() {
        let mut profile = CandidateProfile::new(Identity::new("Name"));
        profile.experience.push(Experience {
            title: "Engineer".into(),
            company: "Acme".into(),
            location: None,
            description: Some("x".repeat(500)),
            range: DateRange {
                start: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
                end: None,
            },
            is_current: true,
            role_taxonomy: TaxonomyLink::none(),
        });
        let text = build_index_text(&profile);
        assert!(text.len() < 500 + 100);
    }

    #[test]
    fn rrf_favors_items_ranked_highly_on_both_sides() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let vector_ranked = vec![a, b, c];
        let text_ranked = vec![b, a, c];

        let fused = reciprocal_rank_fusion(&vector_ranked, &text_ranked, 3);
        assert_eq!(fused.len(), 3);
        // a and b, each top-2 on both lists, should outrank c (last on both).
        assert!(fused.iter().position(|r| r.candidate_id == c) == Some(2));
    }

    #[test]
    fn rrf_includes_items_present_in_only_one_list() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let fused = reciprocal_rank_fusion(&[a], &[b], 10);
        assert_eq!(fused.len(), 2);
        assert!(fused.iter().any(|r| r.candidate_id == a && r.text_rank.is_none()));
        assert!(fused.iter().any(|r| r.candidate_id == b && r.vector_rank.is_none()));
    }
}
