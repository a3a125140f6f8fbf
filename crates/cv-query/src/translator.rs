//! Natural-language query translator (§4.10): an LLM call with a versioned
//! prompt is the primary path; a regex-based parser is the fallback when
//! the LLM call fails or returns unparsable JSON.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use cv_llm::{CompletionRequest, LlmClient};
use cv_taxonomy::{AliasIndex, TaxonomyCategory};

use crate::QueryError;

pub const TRANSLATOR_MODEL: &str = "eu.anthropic.claude-sonnet-4-5-20250929-v1:0";

/// Confidence below which the router must switch to a clarification
/// response instead of proceeding with a (possibly wrong) filter tree.
pub const CONFIDENCE_CLARIFY: f64 = 0.5;
/// Confidence below which the router proceeds but flags a warning.
pub const CONFIDENCE_WARN: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Structured,
    Semantic,
    Hybrid,
    Clarification,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    Contains,
    Exists,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub operator: Operator,
    pub value: serde_json::Value,
}

/// Translator output (§4.10): the filter tree consumed by the SQL generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Translation {
    pub query_type: QueryType,
    pub confidence: f64,
    pub filters: HashMap<String, Filter>,
    pub sort: Option<String>,
    pub limit: u32,
    pub offset: u32,
    pub semantic_query: Option<String>,
    pub clarification_question: Option<String>,
    pub unknown_terms: Vec<String>,
    /// True when the regex fallback produced this translation rather than the LLM.
    pub fallback_used: bool,
}

impl Translation {
    fn clarification(question: impl Into<String>) -> Self {
        Self {
            query_type: QueryType::Clarification,
            confidence: 0.0,
            filters: HashMap::new(),
            sort: None,
            limit: 20,
            offset: 0,
            semantic_query: None,
            clarification_question: Some(question.into()),
            unknown_terms: Vec::new(),
            fallback_used: false,
        }
    }

    /// Confidence gating (§4.10): `< 0.5` forces a clarification response
    /// regardless of what the LLM or regex fallback produced.
    fn apply_confidence_gate(mut self) -> Self {
        if self.confidence < CONFIDENCE_CLARIFY && self.query_type != QueryType::Clarification {
            self.query_type = QueryType::Clarification;
            self.clarification_question.get_or_insert_with(|| {
                "Could you rephrase your search with more specific criteria?".to_string()
            });
        }
        self
    }

    #[must_use]
    pub fn needs_warning(&self) -> bool {
        self.confidence >= CONFIDENCE_CLARIFY && self.confidence < CONFIDENCE_WARN
    }
}

fn translation_prompt(query: &str) -> String {
    format!(
        "Translate this candidate-search query into a JSON filter tree.\n\
         Query: \"{query}\"\n\n\
         Respond with exactly this JSON shape (no prose):\n\
         {{\"query_type\": \"structured|semantic|hybrid\", \"confidence\": 0.0-1.0, \
         \"filters\": {{\"<field>\": {{\"operator\": \"eq|gt|gte|lt|lte|between|contains|exists\", \"value\": <any>}}}}, \
         \"sort\": \"<field> asc|desc\" or null, \"limit\": <int>, \"offset\": <int>, \
         \"semantic_query\": <string or null>, \"unknown_terms\": [<string>...]}}\n\n\
         Known fields: location, nationality, experience_years, age, role, skill, software, \
         certification, education_level, language, driving_license."
    )
}

pub async fn translate_llm(llm: &dyn LlmClient, query: &str) -> Result<Translation, QueryError> {
    let request = CompletionRequest::new(translation_prompt(query), TRANSLATOR_MODEL)
        .with_system("You are a precise query-to-filter translator. Output JSON only.");
    let response = llm.complete(request).await?;
    let parsed: RawTranslation = serde_json::from_str(response.text.trim())
        .map_err(|e| QueryError::Translation(format!("malformed translator JSON: {e}")))?;
    Ok(parsed.into_translation(false))
}

/// Regex-based fallback (§4.10): extracts experience-year thresholds,
/// locations, roles/skills/software/certifications (by alias lookup against
/// `alias_index`), driving licenses, and language tokens, assembling a
/// lower-confidence filter tree without any further LLM call.
pub async fn translate_regex(alias_index: &AliasIndex, query: &str) -> Translation {
    let normalized = cv_common::text::normalize(query);
    let mut filters = HashMap::new();
    let mut unknown_terms = Vec::new();

    if let Some(years) = extract_experience_years(&normalized) {
        filters.insert(
            "experience_years".to_string(),
            Filter { operator: Operator::Gte, value: serde_json::json!(years) },
        );
    }

    if let Some(location) = extract_location(&normalized) {
        filters.insert(
            "location".to_string(),
            Filter { operator: Operator::Contains, value: serde_json::json!(location) },
        );
    } else {
        unknown_terms.push("location".to_string());
    }

    if let Some(license) = extract_driving_license(&normalized) {
        filters.insert(
            "driving_license".to_string(),
            Filter { operator: Operator::Contains, value: serde_json::json!(license) },
        );
    }

    if let Some(language) = extract_language(&normalized) {
        filters.insert(
            "language".to_string(),
            Filter { operator: Operator::Contains, value: serde_json::json!(language) },
        );
    }

    for (field, category) in TAXONOMY_FIELDS {
        match alias_index.find_in_text(*category, &normalized).await {
            Ok(ids) => {
                if let Some(id) = ids.into_iter().next() {
                    filters.insert(
                        (*field).to_string(),
                        Filter { operator: Operator::Contains, value: serde_json::json!(id) },
                    );
                }
            }
            Err(e) => tracing::warn!(error = %e, field = %field, "alias lookup failed during regex fallback"),
        }
    }

    let confidence = if filters.is_empty() { 0.3 } else { (0.3 + 0.1 * filters.len() as f64).min(0.7) };

    Translation {
        query_type: if filters.is_empty() { QueryType::Semantic } else { QueryType::Structured },
        confidence,
        filters,
        sort: None,
        limit: 20,
        offset: 0,
        semantic_query: Some(query.to_string()),
        clarification_question: None,
        unknown_terms,
        fallback_used: true,
    }
    .apply_confidence_gate()
}

const TAXONOMY_FIELDS: &[(&str, TaxonomyCategory)] = &[
    ("role", TaxonomyCategory::Role),
    ("skill", TaxonomyCategory::Skill),
    ("software", TaxonomyCategory::Software),
    ("certification", TaxonomyCategory::Certification),
];

static EXPERIENCE_YEARS_RE: once_cell::sync::Lazy<Regex> =
    once_cell::sync::Lazy::new(|| Regex::new(r"(\d+)\s*\+?\s*(?:years?|χρον\w*)").unwrap());

fn extract_experience_years(normalized: &str) -> Option<u32> {
    EXPERIENCE_YEARS_RE.captures(normalized)?.get(1)?.as_str().parse().ok()
}

const KNOWN_LOCATIONS: &[&str] = &["αθηνα", "athens", "θεσσαλονικη", "thessaloniki"];

fn extract_location(normalized: &str) -> Option<String> {
    KNOWN_LOCATIONS.iter().find(|loc| normalized.contains(*loc)).map(|s| (*s).to_string())
}

/// Matches "license"/"άδεια"/"δίπλωμα" (diacritics stripped by `normalize`)
/// followed by a category token (§4.10: `A`/`B`/`C`/`D`, forklift, crane).
static DRIVING_LICENSE_RE: once_cell::sync::Lazy<Regex> = once_cell::sync::Lazy::new(|| {
    Regex::new(r"(?:διπλωμα|αδεια|license).*?(forklift|κλαρκ|γερανος|crane|[abcd]'?)").unwrap()
});

fn extract_driving_license(normalized: &str) -> Option<String> {
    let raw = DRIVING_LICENSE_RE.captures(normalized)?.get(1)?.as_str();
    Some(match raw.trim_end_matches('\'') {
        "κλαρκ" | "forklift" => "forklift".to_string(),
        "γερανος" | "crane" => "crane".to_string(),
        category => category.to_uppercase(),
    })
}

const KNOWN_LANGUAGES: &[(&str, &str)] = &[
    ("αγγλικα", "english"),
    ("english", "english"),
    ("γαλλικα", "french"),
    ("french", "french"),
    ("γερμανικα", "german"),
    ("german", "german"),
    ("ελληνικα", "greek"),
    ("greek", "greek"),
    ("ισπανικα", "spanish"),
    ("spanish", "spanish"),
];

fn extract_language(normalized: &str) -> Option<String> {
    KNOWN_LANGUAGES.iter().find(|(alias, _)| normalized.contains(alias)).map(|(_, canonical)| (*canonical).to_string())
}

/// Raw wire shape returned by the LLM before confidence gating is applied.
#[derive(Debug, Deserialize)]
struct RawTranslation {
    query_type: QueryType,
    confidence: f64,
    #[serde(default)]
    filters: HashMap<String, Filter>,
    #[serde(default)]
    sort: Option<String>,
    #[serde(default = "default_limit")]
    limit: u32,
    #[serde(default)]
    offset: u32,
    #[serde(default)]
    semantic_query: Option<String>,
    #[serde(default)]
    unknown_terms: Vec<String>,
}

fn default_limit() -> u32 {
    20
}

impl RawTranslation {
    fn into_translation(self, fallback_used: bool) -> Translation {
        Translation {
            query_type: self.query_type,
            confidence: self.confidence,
            filters: self.filters,
            sort: self.sort,
            limit: self.limit,
            offset: self.offset,
            semantic_query: self.semantic_query,
            clarification_question: None,
            unknown_terms: self.unknown_terms,
            fallback_used,
        }
        .apply_confidence_gate()
    }
}

/// Primary path: LLM translation. Falls back to the regex parser on any LLM
/// or parse failure rather than surfacing an error to the caller (§4.10).
pub async fn translate(llm: &dyn LlmClient, alias_index: &AliasIndex, query: &str) -> Translation {
    match translate_llm(llm, query).await {
        Ok(translation) => translation,
        Err(e) => {
            tracing::warn!(error = %e, "llm translation failed, falling back to regex parser");
            translate_regex(alias_index, query).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_taxonomy::{AliasEntry, StaticAliasSource};
    use std::sync::Arc;

    fn fixture_alias_index() -> AliasIndex {
        let mut entries = HashMap::new();
        entries.insert(
            TaxonomyCategory::Software,
            vec![AliasEntry { canonical_id: "software.softone".into(), alias: "softone".into() }],
        );
        entries.insert(
            TaxonomyCategory::Role,
            vec![AliasEntry { canonical_id: "role.accountant".into(), alias: "λογιστης".into() }],
        );
        entries.insert(TaxonomyCategory::Skill, vec![]);
        entries.insert(TaxonomyCategory::Certification, vec![]);
        AliasIndex::new(Arc::new(StaticAliasSource { entries }))
    }

    #[tokio::test]
    async fn regex_fallback_extracts_experience_years() {
        let index = fixture_alias_index();
        let t = translate_regex(&index, "λογιστής με 5+ χρόνια εμπειρία στην Αθήνα").await;
        let years = t.filters.get("experience_years").unwrap();
        assert_eq!(years.value, serde_json::json!(5));
    }

    #[tokio::test]
    async fn regex_fallback_extracts_location_and_software_by_alias() {
        let index = fixture_alias_index();
        let t = translate_regex(&index, "accountant in athens with softone").await;
        assert!(t.filters.contains_key("location"));
        let software = t.filters.get("software").unwrap();
        assert_eq!(software.value, serde_json::json!("software.softone"));
    }

    #[tokio::test]
    async fn regex_fallback_extracts_role_by_greek_alias() {
        let index = fixture_alias_index();
        let t = translate_regex(&index, "λογιστής με 5+ χρόνια").await;
        let role = t.filters.get("role").unwrap();
        assert_eq!(role.value, serde_json::json!("role.accountant"));
    }

    #[tokio::test]
    async fn regex_fallback_extracts_driving_license() {
        let index = fixture_alias_index();
        let t = translate_regex(&index, "χρειάζεται δίπλωμα οδήγησης κατηγορίας B").await;
        let license = t.filters.get("driving_license").unwrap();
        assert_eq!(license.value, serde_json::json!("B"));
    }

    #[tokio::test]
    async fn regex_fallback_extracts_forklift_license() {
        let index = fixture_alias_index();
        let t = translate_regex(&index, "άδεια χειριστή κλαρκ").await;
        let license = t.filters.get("driving_license").unwrap();
        assert_eq!(license.value, serde_json::json!("forklift"));
    }

    #[tokio::test]
    async fn regex_fallback_extracts_language() {
        let index = fixture_alias_index();
        let t = translate_regex(&index, "fluent in english and french").await;
        let language = t.filters.get("language").unwrap();
        assert_eq!(language.value, serde_json::json!("english"));
    }

    #[tokio::test]
    async fn low_confidence_forces_clarification() {
        let index = fixture_alias_index();
        let t = translate_regex(&index, "asdkjasdk").await;
        assert_eq!(t.query_type, QueryType::Clarification);
    }

    #[tokio::test]
    async fn needs_warning_only_in_mid_band() {
        let index = fixture_alias_index();
        let mut t = translate_regex(&index, "accountant in athens").await;
        t.confidence = 0.6;
        assert!(t.needs_warning());
        t.confidence = 0.9;
        assert!(!t.needs_warning());
    }
}
