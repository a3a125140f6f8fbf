//! Relaxed Matcher (C12, §4.12): invoked when the strict SQL search (§4.11)
//! returns zero rows or errors and the caller set `use_job_matching`.

use serde::{Deserialize, Serialize};
use tokio_postgres::{NoTls, Row};
use uuid::Uuid;

use cv_llm::{models, CompletionRequest, LlmClient};
use cv_storage::PostgresConfig;

use crate::requirements::JobRequirements;
use crate::MatchingError;

/// Candidates evaluated by the cheap per-candidate LLM pass (§4.12: "top 5").
const LLM_EVAL_TOP_N: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchLevel {
    High,
    Medium,
    Low,
}

impl MatchLevel {
    fn from_percentage(pct: f64) -> Self {
        if pct >= 80.0 {
            Self::High
        } else if pct >= 50.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Interview,
    Consider,
    Skip,
}

impl Recommendation {
    fn from_percentage(pct: f64) -> Self {
        if pct >= 70.0 {
            Self::Interview
        } else if pct >= 40.0 {
            Self::Consider
        } else {
            Self::Skip
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateMatch {
    pub candidate_id: Uuid,
    pub match_level: MatchLevel,
    pub match_percentage: f64,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub comment: String,
    pub recommendation: Recommendation,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResult {
    pub matches: Vec<CandidateMatch>,
    pub fallback_used: bool,
}

struct PartialScore {
    candidate_id: Uuid,
    percentage: f64,
    matched: Vec<String>,
    missing: Vec<String>,
}

fn row_to_partial_score(row: &Row) -> PartialScore {
    PartialScore {
        candidate_id: row.get(0),
        percentage: row.get(1),
        matched: row.get(2),
        missing: row.get(3),
    }
}

/// Runs `score_candidates(requirements)`, a `PostgreSQL` function that scores
/// every active candidate against the subset of criteria it can satisfy
/// without a join fan-out, returning `{candidate_id, percentage, matched[],
/// missing[]}` ordered best-first.
async fn score_candidates(
    postgres: &PostgresConfig,
    requirements: &JobRequirements,
) -> Result<Vec<PartialScore>, MatchingError> {
    let (client, connection) = tokio_postgres::connect(&postgres.connection_string(), NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "postgres connection closed with error");
        }
    });

    let requirements_json = serde_json::to_value(requirements)
        .map_err(|e| MatchingError::Parse(format!("requirements serialization failed: {e}")))?;
    let rows = client
        .query(
            "SELECT candidate_id, percentage, matched, missing FROM score_candidates($1) \
             WHERE is_active = true ORDER BY percentage DESC LIMIT 50",
            &[&requirements_json],
        )
        .await?;

    Ok(rows.iter().map(row_to_partial_score).collect())
}

fn eval_prompt(requirements: &JobRequirements, matched: &[String], missing: &[String]) -> String {
    format!(
        "Requirements: {:?}\nCandidate satisfies: {matched:?}\nCandidate is missing: {missing:?}\n\
         In one or two sentences, comment on fit and recommend interview, consider, or skip. \
         Respond as JSON: {{\"comment\": <string>, \"recommendation\": \"interview|consider|skip\"}}",
        requirements.must_have
    )
}

#[derive(Debug, serde::Deserialize)]
struct EvalResponse {
    comment: String,
    recommendation: String,
}

fn parse_recommendation(raw: &str) -> Recommendation {
    match raw.to_lowercase().as_str() {
        "interview" => Recommendation::Interview,
        "skip" => Recommendation::Skip,
        _ => Recommendation::Consider,
    }
}

/// Evaluates the top 5 partial matches with a cheap LLM pass; remaining
/// candidates keep only their SQL-derived partial match (§4.12).
async fn evaluate_top_candidates(
    llm: &dyn LlmClient,
    requirements: &JobRequirements,
    scores: Vec<PartialScore>,
) -> Vec<CandidateMatch> {
    let mut matches = Vec::with_capacity(scores.len());
    for (rank, score) in scores.into_iter().enumerate() {
        if rank < LLM_EVAL_TOP_N {
            let request = CompletionRequest::new(
                eval_prompt(requirements, &score.matched, &score.missing),
                models::ARBITRATION,
            );
            let evaluated = match llm.complete(request).await {
                Ok(response) => serde_json::from_str::<EvalResponse>(response.text.trim()).ok(),
                Err(e) => {
                    tracing::warn!(error = %e, "per-candidate llm evaluation failed");
                    None
                }
            };
            let (comment, recommendation) = evaluated
                .map(|r| (r.comment, parse_recommendation(&r.recommendation)))
                .unwrap_or_else(|| {
                    (
                        format!("Matches {}/{} requirements.", score.matched.len(), score.matched.len() + score.missing.len()),
                        Recommendation::from_percentage(score.percentage),
                    )
                });
            matches.push(CandidateMatch {
                candidate_id: score.candidate_id,
                match_level: MatchLevel::from_percentage(score.percentage),
                match_percentage: score.percentage,
                matched: score.matched,
                missing: score.missing,
                comment,
                recommendation,
            });
        } else {
            matches.push(CandidateMatch {
                candidate_id: score.candidate_id,
                match_level: MatchLevel::from_percentage(score.percentage),
                match_percentage: score.percentage,
                comment: format!("Partial match: {:.0}% of requirements satisfied.", score.percentage),
                recommendation: Recommendation::from_percentage(score.percentage),
                matched: score.matched,
                missing: score.missing,
            });
        }
    }
    matches
}

/// Entry point for C12: extract requirements are assumed already extracted
/// by the caller (shared with C13); this runs the SQL partial-scoring pass
/// then the top-5 LLM evaluation.
pub async fn relaxed_match(
    llm: &dyn LlmClient,
    postgres: &PostgresConfig,
    requirements: &JobRequirements,
) -> Result<MatchResult, MatchingError> {
    let scores = score_candidates(postgres, requirements).await?;
    let matches = evaluate_top_candidates(llm, requirements, scores).await;
    Ok(MatchResult { matches, fallback_used: true })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_level_thresholds() {
        assert_eq!(MatchLevel::from_percentage(85.0), MatchLevel::High);
        assert_eq!(MatchLevel::from_percentage(60.0), MatchLevel::Medium);
        assert_eq!(MatchLevel::from_percentage(20.0), MatchLevel::Low);
    }

    #[test]
    fn recommendation_thresholds() {
        assert_eq!(Recommendation::from_percentage(75.0), Recommendation::Interview);
        assert_eq!(Recommendation::from_percentage(50.0), Recommendation::Consider);
        assert_eq!(Recommendation::from_percentage(10.0), Recommendation::Skip);
    }

    #[test]
    fn parse_recommendation_defaults_to_consider() {
        assert_eq!(parse_recommendation("garbage"), Recommendation::Consider);
        assert_eq!(parse_recommendation("SKIP"), Recommendation::Skip);
    }
}
