//! HR Intelligence Analyzer (C13, §4.13): synchronous and asynchronous
//! report generation over a bounded pool of enriched candidate profiles.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_postgres::NoTls;
use uuid::Uuid;

use cv_common::model::CandidateProfile;
use cv_llm::{models, CompletionRequest, LlmClient};
use cv_storage::PostgresConfig;

use crate::hr_report::{detect_language, HrAnalysisReport, PromptLanguage, RankedCandidate, RequestAnalysis};
use crate::requirements::JobRequirements;
use crate::MatchingError;

/// Enriched profiles fetched for the synchronous HR prompt (§4.13: "up to 10").
const MAX_ENRICHED_PROFILES: i64 = 10;

fn hr_prompt(language: PromptLanguage, requirements: &JobRequirements, profiles: &[CandidateProfile]) -> String {
    let profiles_json = serde_json::to_string(profiles).unwrap_or_default();
    let requirements_json = serde_json::to_string(requirements).unwrap_or_default();
    match language {
        PromptLanguage::Greek => format!(
            "Είσαι ειδικός ανθρώπινου δυναμικού. Αξιολόγησε τους παρακάτω υποψηφίους \
             έναντι των απαιτήσεων της θέσης και επίστρεψε JSON αναφορά.\n\
             Απαιτήσεις: {requirements_json}\nΥποψήφιοι: {profiles_json}\n\n\
             Απάντησε αποκλειστικά με JSON τύπου RequestAnalysis/candidates/recommendation."
        ),
        PromptLanguage::English => format!(
            "You are an HR analyst. Evaluate the following candidates against the job \
             requirements and return a JSON report.\n\
             Requirements: {requirements_json}\nCandidates: {profiles_json}\n\n\
             Respond with exactly a RequestAnalysis/candidates/recommendation JSON report."
        ),
    }
}

async fn fetch_enriched_profiles(postgres: &PostgresConfig) -> Result<Vec<CandidateProfile>, MatchingError> {
    let (client, connection) = tokio_postgres::connect(&postgres.connection_string(), NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::warn!(error = %e, "postgres connection closed with error");
        }
    });

    let rows = client
        .query(
            "SELECT profile FROM get_enriched_candidate_profiles($1)",
            &[&MAX_ENRICHED_PROFILES],
        )
        .await?;

    rows.iter()
        .map(|row| {
            let value: serde_json::Value = row.get(0);
            serde_json::from_value(value)
                .map_err(|e| MatchingError::Parse(format!("enriched profile JSON malformed: {e}")))
        })
        .collect()
}

/// Synchronous HR analysis (§4.13). On LLM JSON parse failure, produces the
/// documented fallback report rather than surfacing an error.
pub async fn analyze_sync(
    llm: &dyn LlmClient,
    postgres: &PostgresConfig,
    original_query: &str,
    requirements: JobRequirements,
) -> Result<HrAnalysisReport, MatchingError> {
    let profiles = fetch_enriched_profiles(postgres).await?;
    if profiles.is_empty() {
        return Ok(HrAnalysisReport::empty(requirements));
    }

    let language = detect_language(original_query);
    let prompt = hr_prompt(language, &requirements, &profiles);
    let request = CompletionRequest::new(prompt, models::STRUCTURER)
        .with_system("You are a precise HR analyst. Output JSON only.");

    let report = match llm.complete(request).await {
        Ok(response) => parse_report(&response.text, &requirements),
        Err(e) => {
            tracing::warn!(error = %e, "hr analyzer llm call failed");
            None
        }
    };

    Ok(report.unwrap_or_else(|| {
        let fallback_candidates = profiles
            .iter()
            .take(5)
            .map(|p| (p.id, p.identity.full_name.clone()))
            .collect();
        HrAnalysisReport::fallback(requirements, fallback_candidates)
    }))
}

fn parse_report(raw: &str, requirements: &JobRequirements) -> Option<HrAnalysisReport> {
    #[derive(serde::Deserialize)]
    struct RawReport {
        summary: String,
        candidates: Vec<RankedCandidateRaw>,
        recommendation: String,
    }
    #[derive(serde::Deserialize)]
    struct RankedCandidateRaw {
        candidate_id: Uuid,
        full_name: String,
        #[serde(default)]
        evidence: Vec<String>,
        #[serde(default)]
        gaps: Vec<String>,
        #[serde(default)]
        risks: Vec<String>,
        #[serde(default)]
        interview_focus: Vec<String>,
        overall_suitability: crate::matcher::MatchLevel,
        match_percentage: f64,
    }

    let raw_report: RawReport = serde_json::from_str(raw.trim()).ok()?;
    let candidates = raw_report
        .candidates
        .into_iter()
        .enumerate()
        .map(|(rank, c)| RankedCandidate {
            category: crate::hr_report::categorize(rank, c.overall_suitability, c.match_percentage),
            candidate_id: c.candidate_id,
            full_name: c.full_name,
            evidence: c.evidence,
            gaps: c.gaps,
            risks: c.risks,
            interview_focus: c.interview_focus,
            overall_suitability: c.overall_suitability,
            match_percentage: c.match_percentage,
        })
        .collect();

    Some(HrAnalysisReport {
        request_analysis: RequestAnalysis { summary: raw_report.summary, requirements: requirements.clone() },
        candidates,
        recommendation: raw_report.recommendation,
        fallback_note: None,
    })
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HrJobStatus {
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct HrJobRecord {
    pub status: HrJobStatus,
    pub hr_analysis: Option<HrAnalysisReport>,
    pub error: Option<String>,
}

/// Async-mode job store (§4.13): the caller gets `hr_job_id` immediately,
/// a separately invoked worker runs the synchronous analysis and stores the
/// result back under that id, and a polling endpoint reads it out.
pub struct HrJobStore {
    jobs: RwLock<HashMap<Uuid, HrJobRecord>>,
}

impl HrJobStore {
    #[must_use]
    pub fn new() -> Self {
        Self { jobs: RwLock::new(HashMap::new()) }
    }

    /// Starts the analysis in a background task and returns the job id
    /// immediately; mirrors the orchestrator's `tokio::spawn`-per-unit-of-work
    /// pattern (`cv-orchestrator::Orchestrator::execute`).
    pub async fn submit(
        self: &Arc<Self>,
        llm: Arc<dyn LlmClient>,
        postgres: PostgresConfig,
        original_query: String,
        requirements: JobRequirements,
    ) -> Uuid {
        let job_id = Uuid::new_v4();
        {
            let mut jobs = self.jobs.write().await;
            jobs.insert(job_id, HrJobRecord { status: HrJobStatus::Processing, hr_analysis: None, error: None });
        }

        let store = self.clone();
        tokio::spawn(async move {
            let outcome = analyze_sync(llm.as_ref(), &postgres, &original_query, requirements).await;
            let mut jobs = store.jobs.write().await;
            match outcome {
                Ok(report) => {
                    jobs.insert(
                        job_id,
                        HrJobRecord { status: HrJobStatus::Completed, hr_analysis: Some(report), error: None },
                    );
                }
                Err(e) => {
                    jobs.insert(
                        job_id,
                        HrJobRecord { status: HrJobStatus::Failed, hr_analysis: None, error: Some(e.to_string()) },
                    );
                }
            }
        });

        job_id
    }

    pub async fn poll(&self, job_id: Uuid) -> Option<HrJobRecord> {
        self.jobs.read().await.get(&job_id).cloned()
    }
}

impl Default for HrJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_report_round_trips_minimal_shape() {
        let raw = serde_json::json!({
            "summary": "Looking for a senior accountant",
            "candidates": [{
                "candidate_id": Uuid::nil(),
                "full_name": "Maria Papadopoulou",
                "evidence": ["5 years experience"],
                "gaps": [],
                "risks": [],
                "interview_focus": ["softone depth"],
                "overall_suitability": "high",
                "match_percentage": 85.0
            }],
            "recommendation": "Proceed to interview"
        })
        .to_string();

        let report = parse_report(&raw, &JobRequirements::default()).unwrap();
        assert_eq!(report.candidates.len(), 1);
        assert_eq!(report.candidates[0].category, crate::hr_report::Category::Interview);
    }

    #[test]
    fn malformed_report_returns_none() {
        assert!(parse_report("not json", &JobRequirements::default()).is_none());
    }
}
