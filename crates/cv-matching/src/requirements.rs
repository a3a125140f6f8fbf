//! Requirements extraction: the first step of the relaxed matcher (§4.12)
//! and the sync/async HR analyzer (§4.13) both start from a compact
//! requirements structure pulled out of free-text job criteria.

use serde::{Deserialize, Serialize};

use cv_llm::{models, CompletionRequest, LlmClient};

use crate::MatchingError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobRequirements {
    #[serde(default)]
    pub must_have: Vec<String>,
    #[serde(default)]
    pub nice_to_have: Vec<String>,
    #[serde(default)]
    pub min_experience_years: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

fn extraction_prompt(criteria_text: &str) -> String {
    format!(
        "Extract a compact hiring-requirements structure from this text.\n\
         Text: \"{criteria_text}\"\n\n\
         Respond with exactly this JSON shape (no prose):\n\
         {{\"must_have\": [<string>...], \"nice_to_have\": [<string>...], \
         \"min_experience_years\": <int or null>, \"location\": <string or null>, \
         \"role\": <string or null>}}"
    )
}

/// Asks the LLM to extract `JobRequirements` from free-text job criteria
/// (§4.12: "asks the LLM to extract a compact requirements structure").
pub async fn extract_requirements(
    llm: &dyn LlmClient,
    criteria_text: &str,
) -> Result<JobRequirements, MatchingError> {
    let request = CompletionRequest::new(extraction_prompt(criteria_text), models::STRUCTURER)
        .with_system("You extract structured hiring requirements. Output JSON only.");
    let response = llm.complete(request).await?;
    serde_json::from_str(response.text.trim())
        .map_err(|e| MatchingError::Parse(format!("malformed requirements JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_round_trip_through_json() {
        let reqs = JobRequirements {
            must_have: vec!["softone".into()],
            nice_to_have: vec!["sap".into()],
            min_experience_years: Some(5),
            location: Some("Athens".into()),
            role: Some("accountant".into()),
        };
        let json = serde_json::to_string(&reqs).unwrap();
        let round_tripped: JobRequirements = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped.min_experience_years, Some(5));
    }
}
