//! HR Intelligence report schema (§3 "HR-analyzer output") and the
//! frontend categorization rule (§4.13).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matcher::MatchLevel;
use crate::requirements::JobRequirements;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptLanguage {
    Greek,
    English,
}

/// Greek/English prompt selection (§4.13): counts characters in the Greek
/// Unicode blocks across the original query, threshold 30%.
#[must_use]
pub fn detect_language(original_query: &str) -> PromptLanguage {
    if cv_common::text::greek_fraction(original_query) >= 0.30 {
        PromptLanguage::Greek
    } else {
        PromptLanguage::English
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Interview,
    Consider,
}

/// Frontend categorization rule (§4.13): top-5 ranks and/or
/// `overall_suitability = High` or `match_percentage >= 70` -> interview.
#[must_use]
pub fn categorize(rank: usize, suitability: MatchLevel, match_percentage: f64) -> Category {
    if rank < 5 || suitability == MatchLevel::High || match_percentage >= 70.0 {
        Category::Interview
    } else {
        Category::Consider
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate_id: Uuid,
    pub full_name: String,
    pub evidence: Vec<String>,
    pub gaps: Vec<String>,
    pub risks: Vec<String>,
    pub interview_focus: Vec<String>,
    pub overall_suitability: MatchLevel,
    pub match_percentage: f64,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAnalysis {
    pub summary: String,
    pub requirements: JobRequirements,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrAnalysisReport {
    pub request_analysis: RequestAnalysis,
    pub candidates: Vec<RankedCandidate>,
    pub recommendation: String,
    /// Present only on the fallback path (§4.13: LLM parse failure).
    pub fallback_note: Option<String>,
}

impl HrAnalysisReport {
    /// Well-formed "no candidates" report (§8 boundary behavior): never an
    /// error, just an empty ranked list.
    #[must_use]
    pub fn empty(requirements: JobRequirements) -> Self {
        Self {
            request_analysis: RequestAnalysis {
                summary: "No candidates matched the supplied criteria.".to_string(),
                requirements,
            },
            candidates: Vec::new(),
            recommendation: "No viable candidates were found; consider broadening the search.".to_string(),
            fallback_note: None,
        }
    }

    /// Minimal fallback report (§4.13): LLM JSON parse failed.
    #[must_use]
    pub fn fallback(requirements: JobRequirements, top_candidates: Vec<(Uuid, String)>) -> Self {
        let candidates = top_candidates
            .into_iter()
            .enumerate()
            .map(|(rank, (candidate_id, full_name))| RankedCandidate {
                candidate_id,
                full_name,
                evidence: Vec::new(),
                gaps: Vec::new(),
                risks: Vec::new(),
                interview_focus: Vec::new(),
                overall_suitability: MatchLevel::Medium,
                match_percentage: 50.0,
                category: categorize(rank, MatchLevel::Medium, 50.0),
            })
            .collect();
        Self {
            request_analysis: RequestAnalysis {
                summary: "Automated analysis of the supplied requirements.".to_string(),
                requirements,
            },
            candidates,
            recommendation: "Detailed analysis was unavailable; candidates are listed with default medium suitability.".to_string(),
            fallback_note: Some("hr analysis LLM response could not be parsed".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greek_heavy_query_selects_greek_prompt() {
        assert_eq!(detect_language("λογιστής με Softone, 5+ χρόνια, Αθήνα"), PromptLanguage::Greek);
    }

    #[test]
    fn english_query_selects_english_prompt() {
        assert_eq!(detect_language("accountant with softone, 5+ years, athens"), PromptLanguage::English);
    }

    #[test]
    fn top_five_rank_always_interview() {
        assert_eq!(categorize(4, MatchLevel::Low, 10.0), Category::Interview);
    }

    #[test]
    fn high_suitability_outside_top_five_is_still_interview() {
        assert_eq!(categorize(10, MatchLevel::High, 10.0), Category::Interview);
    }

    #[test]
    fn low_rank_low_suitability_low_percentage_is_consider() {
        assert_eq!(categorize(10, MatchLevel::Medium, 40.0), Category::Consider);
    }

    #[test]
    fn empty_report_is_well_formed_not_an_error() {
        let report = HrAnalysisReport::empty(JobRequirements::default());
        assert!(report.candidates.is_empty());
        assert!(report.fallback_note.is_none());
    }
}
