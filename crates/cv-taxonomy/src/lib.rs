//! Taxonomy Mapper (§4.5) and Dynamic Alias Loader (§4.15): maps raw
//! skill/certification/role/software terms to canonical taxonomy ids
//! through an exact -> substring -> fuzzy -> semantic cascade, backed by an
//! in-memory alias index that self-refreshes on a TTL.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;

use cv_common::text::{normalize, trigram_similarity};
use cv_common::{MatchMethod, TaxonomyLink};
use cv_llm::{cosine_similarity, LlmClient};

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("alias source error: {0}")]
    Source(String),

    #[error("llm error: {0}")]
    Llm(#[from] cv_llm::LlmError),
}

pub type Result<T> = std::result::Result<T, TaxonomyError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaxonomyCategory {
    Skill,
    Certification,
    Role,
    Software,
}

/// One row from a taxonomy table's name/alias/abbreviation columns (§4.15).
#[derive(Debug, Clone)]
pub struct AliasEntry {
    pub canonical_id: String,
    pub alias: String,
}

#[async_trait]
pub trait AliasSource: Send + Sync {
    async fn load_aliases(&self, category: TaxonomyCategory) -> Result<Vec<AliasEntry>>;
}

/// Deterministic in-memory source used by tests and local development.
pub struct StaticAliasSource {
    pub entries: HashMap<TaxonomyCategory, Vec<AliasEntry>>,
}

#[async_trait]
impl AliasSource for StaticAliasSource {
    async fn load_aliases(&self, category: TaxonomyCategory) -> Result<Vec<AliasEntry>> {
        Ok(self.entries.get(&category).cloned().unwrap_or_default())
    }
}

struct CategorySnapshot {
    /// normalized alias -> canonical id, for exact lookup.
    exact: HashMap<String, String>,
    /// all (normalized alias, canonical id) pairs, for substring/fuzzy/semantic.
    all: Vec<(String, String)>,
    loaded_at: Instant,
}

const SEMANTIC_THRESHOLD: f32 = 0.85;
const SEMANTIC_SUGGESTED_THRESHOLD: f32 = 0.60;
const FUZZY_THRESHOLD: f64 = 0.75;
const FUZZY_SUGGESTED_THRESHOLD: f64 = 0.60;
const SUBSTRING_SCORE: f32 = 0.9;
const EMBEDDING_BATCH_SIZE: usize = 96;

/// Warms and serves the alias index for all four taxonomy categories,
/// refreshing on a TTL (§4.15). Concurrent refreshes are tolerated;
/// readers may use a stale snapshot until a refresh completes.
pub struct AliasIndex {
    source: Arc<dyn AliasSource>,
    ttl: Duration,
    snapshots: RwLock<HashMap<TaxonomyCategory, CategorySnapshot>>,
}

impl AliasIndex {
    #[must_use]
    pub fn new(source: Arc<dyn AliasSource>) -> Self {
        Self {
            source,
            ttl: Duration::from_secs(60 * 60),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_ttl(source: Arc<dyn AliasSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    async fn is_stale(&self, category: TaxonomyCategory) -> bool {
        let snapshots = self.snapshots.read().await;
        match snapshots.get(&category) {
            Some(s) => s.loaded_at.elapsed() > self.ttl,
            None => true,
        }
    }

    async fn refresh(&self, category: TaxonomyCategory) -> Result<()> {
        let entries = self.source.load_aliases(category).await?;
        let mut exact = HashMap::with_capacity(entries.len());
        let mut all = Vec::with_capacity(entries.len());
        for e in entries {
            let norm = normalize(&e.alias);
            exact.entry(norm.clone()).or_insert_with(|| e.canonical_id.clone());
            all.push((norm, e.canonical_id));
        }
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(
            category,
            CategorySnapshot {
                exact,
                all,
                loaded_at: Instant::now(),
            },
        );
        debug!(?category, "taxonomy alias index refreshed");
        Ok(())
    }

    async fn ensure_loaded(&self, category: TaxonomyCategory) -> Result<()> {
        if self.is_stale(category).await {
            self.refresh(category).await?;
        }
        Ok(())
    }

    /// Scans `text` for any loaded alias of `category`, returning the
    /// distinct canonical ids whose alias occurs as a substring. Exact and
    /// substring only, deliberately skipping the fuzzy/semantic stages
    /// `map_term` runs for single-term lookups -- callers use this to scan a
    /// whole free-text query without another LLM round trip (§4.10's regex
    /// fallback, which must stand on its own when the LLM path has failed).
    pub async fn find_in_text(&self, category: TaxonomyCategory, text: &str) -> Result<Vec<String>> {
        self.ensure_loaded(category).await?;
        let snapshots = self.snapshots.read().await;
        let Some(snapshot) = snapshots.get(&category) else {
            return Ok(Vec::new());
        };

        let normalized = normalize(text);
        let mut ids = Vec::new();
        for (alias, id) in &snapshot.all {
            if !alias.is_empty() && normalized.contains(alias.as_str()) && !ids.contains(id) {
                ids.push(id.clone());
            }
        }
        Ok(ids)
    }
}

/// Run the full exact -> substring -> fuzzy -> semantic cascade for a
/// single raw term (§4.5).
pub async fn map_term(
    index: &AliasIndex,
    llm: &dyn LlmClient,
    category: TaxonomyCategory,
    raw_term: &str,
) -> Result<TaxonomyLink> {
    index.ensure_loaded(category).await?;
    let snapshots = index.snapshots.read().await;
    let Some(snapshot) = snapshots.get(&category) else {
        return Ok(TaxonomyLink::none());
    };

    let normalized = normalize(raw_term);

    if let Some(id) = snapshot.exact.get(&normalized) {
        return Ok(TaxonomyLink {
            canonical_id: Some(id.clone()),
            suggested_id: None,
            similarity: 1.0,
            match_method: MatchMethod::Exact,
        });
    }

    if let Some((_, id)) = snapshot
        .all
        .iter()
        .find(|(alias, _)| alias.contains(&normalized) || normalized.contains(alias.as_str()))
    {
        return Ok(TaxonomyLink {
            canonical_id: Some(id.clone()),
            suggested_id: None,
            similarity: SUBSTRING_SCORE,
            match_method: MatchMethod::Substring,
        });
    }

    if let Some((alias, id, score)) = best_trigram_match(&normalized, &snapshot.all) {
        let _ = alias;
        if score >= FUZZY_THRESHOLD {
            return Ok(TaxonomyLink {
                canonical_id: Some(id),
                suggested_id: None,
                similarity: score as f32,
                match_method: MatchMethod::Fuzzy,
            });
        }
        if score >= FUZZY_SUGGESTED_THRESHOLD {
            return Ok(TaxonomyLink {
                canonical_id: None,
                suggested_id: Some(id),
                similarity: score as f32,
                match_method: MatchMethod::FuzzySuggested,
            });
        }
    }

    if let Some((id, score)) = best_semantic_match(llm, &normalized, &snapshot.all).await? {
        if score >= SEMANTIC_THRESHOLD {
            return Ok(TaxonomyLink {
                canonical_id: Some(id),
                suggested_id: None,
                similarity: score,
                match_method: MatchMethod::Semantic,
            });
        }
        if score >= SEMANTIC_SUGGESTED_THRESHOLD {
            return Ok(TaxonomyLink {
                canonical_id: None,
                suggested_id: Some(id),
                similarity: score,
                match_method: MatchMethod::Suggested,
            });
        }
    }

    Ok(TaxonomyLink::none())
}

fn best_trigram_match(normalized: &str, all: &[(String, String)]) -> Option<(String, String, f64)> {
    all.iter()
        .map(|(alias, id)| (alias.clone(), id.clone(), trigram_similarity(normalized, alias)))
        .max_by(|a, b| a.2.total_cmp(&b.2))
}

async fn best_semantic_match(
    llm: &dyn LlmClient,
    normalized: &str,
    all: &[(String, String)],
) -> Result<Option<(String, f32)>> {
    if all.is_empty() {
        return Ok(None);
    }

    let query_embedding = llm.embed(&[normalized.to_string()]).await?;
    let Some(query_vec) = query_embedding.into_iter().next() else {
        return Ok(None);
    };

    let mut best: Option<(String, f32)> = None;
    for chunk in all.chunks(EMBEDDING_BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(|(alias, _)| alias.clone()).collect();
        let vectors = llm.embed(&texts).await?;
        for ((_, id), vec) in chunk.iter().zip(vectors.iter()) {
            let score = cosine_similarity(&query_vec, vec);
            if best.as_ref().map(|(_, best_score)| score > *best_score).unwrap_or(true) {
                best = Some((id.clone(), score));
            }
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_llm::FakeLlmClient;

    fn fixture_source() -> Arc<dyn AliasSource> {
        let mut entries = HashMap::new();
        entries.insert(
            TaxonomyCategory::Skill,
            vec![
                AliasEntry { canonical_id: "skill.rust".into(), alias: "Rust".into() },
                AliasEntry { canonical_id: "skill.rust".into(), alias: "Rust programming".into() },
                AliasEntry { canonical_id: "skill.python".into(), alias: "Python".into() },
                AliasEntry {
                    canonical_id: "skill.accounting".into(),
                    alias: "λογιστική".into(),
                },
            ],
        );
        Arc::new(StaticAliasSource { entries })
    }

    #[tokio::test]
    async fn exact_match_scores_one() {
        let index = AliasIndex::new(fixture_source());
        let llm = FakeLlmClient::new(vec![]);
        let link = map_term(&index, &llm, TaxonomyCategory::Skill, "rust").await.unwrap();
        assert_eq!(link.match_method, MatchMethod::Exact);
        assert_eq!(link.canonical_id.as_deref(), Some("skill.rust"));
        assert_eq!(link.similarity, 1.0);
    }

    #[tokio::test]
    async fn substring_match_scores_point_nine() {
        let index = AliasIndex::new(fixture_source());
        let llm = FakeLlmClient::new(vec![]);
        let link = map_term(&index, &llm, TaxonomyCategory::Skill, "Rust programming language")
            .await
            .unwrap();
        assert_eq!(link.match_method, MatchMethod::Substring);
        assert_eq!(link.similarity, 0.9);
    }

    #[tokio::test]
    async fn fuzzy_match_accepts_close_misspelling() {
        let index = AliasIndex::new(fixture_source());
        let llm = FakeLlmClient::new(vec![]);
        let link = map_term(&index, &llm, TaxonomyCategory::Skill, "Pythom").await.unwrap();
        assert!(matches!(
            link.match_method,
            MatchMethod::Fuzzy | MatchMethod::FuzzySuggested
        ));
    }

    #[tokio::test]
    async fn unmatched_term_returns_none_method() {
        let index = AliasIndex::new(fixture_source());
        let llm = FakeLlmClient::new(vec![]);
        let link = map_term(&index, &llm, TaxonomyCategory::Skill, "deep sea fishing")
            .await
            .unwrap();
        assert_eq!(link.match_method, MatchMethod::None);
        assert!(link.canonical_id.is_none());
    }

    #[tokio::test]
    async fn find_in_text_matches_substring_within_sentence() {
        let index = AliasIndex::new(fixture_source());
        let ids = index.find_in_text(TaxonomyCategory::Skill, "looking for a Rust developer").await.unwrap();
        assert_eq!(ids, vec!["skill.rust".to_string()]);
    }

    #[tokio::test]
    async fn find_in_text_returns_empty_for_no_match() {
        let index = AliasIndex::new(fixture_source());
        let ids = index.find_in_text(TaxonomyCategory::Skill, "deep sea fishing").await.unwrap();
        assert!(ids.is_empty());
    }

    #[tokio::test]
    async fn stale_snapshot_triggers_refresh() {
        let index = AliasIndex::with_ttl(fixture_source(), Duration::from_millis(0));
        let llm = FakeLlmClient::new(vec![]);
        let first = map_term(&index, &llm, TaxonomyCategory::Skill, "rust").await.unwrap();
        let second = map_term(&index, &llm, TaxonomyCategory::Skill, "rust").await.unwrap();
        assert_eq!(first.canonical_id, second.canonical_id);
    }
}
