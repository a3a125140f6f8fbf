//! API request and response types (§4.18, §6 wire formats).

use serde::{Deserialize, Serialize};

/// `POST /intake` request body: the upload event that kicks off C9/C17.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRequest {
    /// Source bucket the document was uploaded to.
    pub bucket: String,
    /// Object key within the bucket.
    pub object_key: String,
    /// Caller-supplied correlation id; generated if omitted.
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeResponse {
    pub correlation_id: String,
    pub status: String,
}

/// `GET /status/:correlation_id` response: progress plus per-stage detail
/// (§4.9 "Status endpoint").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub correlation_id: String,
    pub status: String,
    pub progress: f32,
    #[serde(default)]
    pub candidate_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// `POST /query` response (§4.10-4.14): the translation/execution result
/// plus whichever of the relaxed-match and HR-analysis stages ran.
#[derive(Debug, Clone, Serialize)]
pub struct QueryApiResponse {
    #[serde(flatten)]
    pub query: cv_query::QueryResponse,
    #[serde(default)]
    pub job_matches: Option<cv_matching::MatchResult>,
    #[serde(default)]
    pub hr_job_id: Option<String>,
    #[serde(default)]
    pub hr_analysis: Option<cv_matching::HrAnalysisReport>,
}

/// `/hr/:job_id` polling response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HrJobResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub hr_analysis: Option<cv_matching::HrAnalysisReport>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intake_request_allows_missing_correlation_id() {
        let json = r#"{"bucket": "cv-uploads", "object_key": "incoming/resume.pdf"}"#;
        let req: IntakeRequest = serde_json::from_str(json).unwrap();
        assert!(req.correlation_id.is_none());
        assert_eq!(req.bucket, "cv-uploads");
    }

    #[test]
    fn status_response_round_trips() {
        let resp = StatusResponse {
            correlation_id: "abc".to_string(),
            status: "mapping".to_string(),
            progress: 0.5,
            candidate_id: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: StatusResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, "mapping");
    }
}
