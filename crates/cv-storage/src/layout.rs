//! Content-addressed object store key layout (§6).

use cv_common::CorrelationId;

#[must_use]
pub fn upload_key(correlation_id: &CorrelationId, filename: &str) -> String {
    format!("uploads/{filename}-{correlation_id}")
}

#[must_use]
pub fn extracted_text_key(correlation_id: &CorrelationId) -> String {
    format!("extracted/{correlation_id}.txt")
}

#[must_use]
pub fn extraction_metadata_key(correlation_id: &CorrelationId) -> String {
    format!("metadata/{correlation_id}.json")
}

#[must_use]
pub fn parsed_json_key(correlation_id: &CorrelationId) -> String {
    format!("parsed/{correlation_id}.json")
}

#[must_use]
pub fn unmatched_json_key(correlation_id: &CorrelationId) -> String {
    format!("unmatched/{correlation_id}.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_by_stage() {
        let id = CorrelationId::new();
        assert!(upload_key(&id, "cv.pdf").starts_with("uploads/"));
        assert!(extracted_text_key(&id).starts_with("extracted/"));
        assert!(extraction_metadata_key(&id).starts_with("metadata/"));
        assert!(parsed_json_key(&id).starts_with("parsed/"));
        assert!(unmatched_json_key(&id).ends_with(".json"));
    }
}
