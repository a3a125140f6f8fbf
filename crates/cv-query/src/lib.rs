//! HR Intelligence query pipeline (§4.10-4.11, §4.14): translates natural
//! language into a filter tree (C10), compiles it to a parameterized SQL
//! statement (C11), and caches translations (C14). Execution is delegated
//! to a `tokio_postgres` client the way `cv-storage`'s readers do it.

pub mod cache;
pub mod sql_generator;
pub mod translator;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};
use tracing::{info, warn};
use uuid::Uuid;

pub use cache::QueryCache;
pub use sql_generator::{generate_sql, GeneratedSql, SqlValue};
pub use translator::{translate, translate_llm, translate_regex, Filter, Operator, QueryType, Translation};

use cv_llm::LlmClient;
use cv_storage::PostgresConfig;
use cv_taxonomy::AliasIndex;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("llm error: {0}")]
    Llm(#[from] cv_llm::LlmError),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("sql generation error: {0}")]
    Generation(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

pub type Result<T> = std::result::Result<T, QueryError>;

/// Request-level limit ceiling (§8 boundary behavior): anything higher is
/// clamped here, independent of the generator's own 100-row clamp on the
/// translation's suggested limit.
pub const MAX_REQUEST_LIMIT: u32 = 500;

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub execute: bool,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub include_hr_analysis: bool,
    #[serde(default)]
    pub async_hr: bool,
    #[serde(default)]
    pub use_job_matching: bool,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateRow {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub location: Option<String>,
    pub updated_at: DateTime<Utc>,
}

fn row_to_candidate(row: &Row) -> CandidateRow {
    CandidateRow {
        id: row.get(0),
        full_name: row.get(1),
        email: row.get(2),
        location: row.get(3),
        updated_at: row.get(4),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub request_id: Uuid,
    pub cached: bool,
    pub query_type: QueryType,
    pub translation: Translation,
    pub sql: String,
    pub filter_summary: String,
    pub results: Option<Vec<CandidateRow>>,
    pub result_count: Option<usize>,
    pub fallback_used: bool,
    pub latency_ms: u64,
}

/// Ties the translator, SQL generator, and cache together against a live
/// Postgres connection (§4.11's executor half; the relaxed matcher and HR
/// analyzer in `cv-matching` consume this engine's output for their own
/// downstream steps).
pub struct QueryEngine {
    llm: std::sync::Arc<dyn LlmClient>,
    alias_index: std::sync::Arc<AliasIndex>,
    cache: QueryCache,
    postgres: PostgresConfig,
}

impl QueryEngine {
    #[must_use]
    pub fn new(
        llm: std::sync::Arc<dyn LlmClient>,
        alias_index: std::sync::Arc<AliasIndex>,
        postgres: PostgresConfig,
    ) -> Self {
        Self { llm, alias_index, cache: QueryCache::new(), postgres }
    }

    /// Handle one query request end to end (§6 query request/response
    /// shape). `execute = true` always re-runs translation and SQL
    /// generation even on a cache hit for the translation step — an
    /// explicit, documented choice (§4.14), not an oversight.
    pub async fn handle(&self, request: QueryRequest) -> Result<QueryResponse> {
        let started = Utc::now();
        let request_id = Uuid::new_v4();
        let requested_limit = request.limit.min(MAX_REQUEST_LIMIT);

        let (mut translation, cached) = if !request.execute {
            if let Some(cached_translation) = self.cache.get(&request.query).await {
                (cached_translation, true)
            } else {
                let translation = translate(self.llm.as_ref(), &self.alias_index, &request.query).await;
                self.cache.put(&request.query, translation.clone()).await;
                (translation, false)
            }
        } else {
            (translate(self.llm.as_ref(), &self.alias_index, &request.query).await, false)
        };

        translation.limit = translation.limit.min(requested_limit);

        let generated = generate_sql(&translation)?;

        let (results, result_count) = if request.execute && translation.query_type != QueryType::Clarification {
            let rows = self.execute_sql(&generated).await?;
            let count = rows.len();
            (Some(rows), Some(count))
        } else {
            (None, None)
        };

        if translation.needs_warning() {
            warn!(confidence = translation.confidence, query = %request.query, "low-confidence translation");
        }
        info!(%request_id, cached, query_type = ?translation.query_type, "query handled");

        let latency_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;

        Ok(QueryResponse {
            request_id,
            cached,
            query_type: translation.query_type,
            fallback_used: translation.fallback_used,
            filter_summary: generated.summary.clone(),
            sql: generated.sql,
            translation,
            results,
            result_count,
            latency_ms,
        })
    }

    async fn execute_sql(&self, generated: &GeneratedSql) -> Result<Vec<CandidateRow>> {
        let (client, connection) = tokio_postgres::connect(&self.postgres.connection_string(), NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(error = %e, "postgres connection closed with error");
            }
        });

        let params: Vec<&(dyn ToSql + Sync)> = generated
            .params
            .iter()
            .map(|p| match p {
                SqlValue::Str(s) => s as &(dyn ToSql + Sync),
                SqlValue::I64(i) => i as &(dyn ToSql + Sync),
                SqlValue::F64(f) => f as &(dyn ToSql + Sync),
                SqlValue::Bool(b) => b as &(dyn ToSql + Sync),
            })
            .collect();

        let rows = client.query(&generated.sql, &params).await?;
        Ok(rows.iter().map(row_to_candidate).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_limit_clamps_to_500() {
        let limit = 10_000u32.min(MAX_REQUEST_LIMIT);
        assert_eq!(limit, 500);
    }
}
