//! CV Structurer (§4.4): turns raw extracted/OCR'd text into the candidate
//! data model via a single LLM call against a versioned prompt template.

mod json_extract;
mod levels;
mod prompt;

pub use json_extract::extract_json;
pub use levels::{map_language_level, map_skill_level};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use cv_common::{
    model::{
        Certification, DateRange, DrivingLicense, Education, Experience, Identity, Language,
        QualityWarning, Severity, Skill, SoftwareItem, TaxonomyLink, TrainingEvent,
    },
    CandidateProfile,
};
use cv_llm::{models, CompletionRequest, LlmClient};

#[derive(Debug, Error)]
pub enum StructurerError {
    #[error("llm error: {0}")]
    Llm(#[from] cv_llm::LlmError),

    #[error("no valid JSON could be extracted from LLM output after {0} attempts")]
    NoValidJson(u32),
}

pub type Result<T> = std::result::Result<T, StructurerError>;

const MAX_ATTEMPTS: u32 = 3; // initial try + 2 retries, per §4.4

/// Structure `raw_text` into a [`CandidateProfile`] via the LLM, retrying up
/// to twice on empty or invalid JSON output (§4.4).
pub async fn structure(raw_text: &str, llm: &dyn LlmClient) -> Result<CandidateProfile> {
    let template = prompt::load_template("v1");
    let user_prompt = template.replace("{{raw_text}}", raw_text);

    let mut last_err = None;
    for attempt in 1..=MAX_ATTEMPTS {
        let response = llm
            .complete(
                CompletionRequest::new(user_prompt.clone(), models::STRUCTURER)
                    .with_system(prompt::SYSTEM_PROMPT),
            )
            .await?;

        match extract_json(&response.text) {
            Ok(value) => return Ok(build_profile(value, raw_text)),
            Err(e) => {
                warn!(attempt, error = %e, "structurer: invalid JSON from LLM, retrying");
                last_err = Some(e);
            }
        }
    }

    let _ = last_err;
    Err(StructurerError::NoValidJson(MAX_ATTEMPTS))
}

#[derive(Debug, Deserialize, Default)]
struct RawProfile {
    #[serde(default)]
    full_name: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    date_of_birth: Option<String>,
    #[serde(default)]
    nationality: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    education: Vec<RawEducation>,
    #[serde(default)]
    experience: Vec<RawExperience>,
    #[serde(default)]
    certifications: Vec<RawCertification>,
    #[serde(default)]
    training: Vec<RawTraining>,
    #[serde(default)]
    driving_licenses: Vec<String>,
    #[serde(default)]
    skills: Vec<RawSkill>,
    #[serde(default)]
    languages: Vec<RawLanguage>,
    #[serde(default)]
    software: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawEducation {
    #[serde(default)]
    institution: String,
    #[serde(default)]
    degree: String,
    #[serde(default)]
    field_of_study: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawExperience {
    #[serde(default)]
    title: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    start: Option<String>,
    #[serde(default)]
    end: Option<String>,
    #[serde(default)]
    is_current: bool,
}

#[derive(Debug, Deserialize, Default)]
struct RawCertification {
    #[serde(default)]
    name: String,
    #[serde(default)]
    issuer: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawTraining {
    #[serde(default)]
    name: String,
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawSkill {
    #[serde(default)]
    name: String,
    #[serde(default)]
    level: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawLanguage {
    #[serde(default)]
    name: String,
    #[serde(default)]
    iso_code: Option<String>,
    #[serde(default)]
    level: Option<String>,
}

fn build_profile(value: serde_json::Value, raw_text: &str) -> CandidateProfile {
    let raw: RawProfile = serde_json::from_value(value.clone()).unwrap_or_default();

    let mut identity = Identity::new(&raw.full_name);
    identity.email = raw.email;
    identity.phone = raw.phone;
    identity.date_of_birth = raw.date_of_birth.as_deref().and_then(parse_flexible_date);
    identity.nationality = raw.nationality;
    identity.location = raw.location;
    identity.address = raw.address;

    let mut profile = CandidateProfile::new(identity);
    profile.raw_text = raw_text.to_string();
    profile.structurer_json = value;

    for e in raw.education {
        let (range, swapped) = build_range(e.start.as_deref(), e.end.as_deref());
        if swapped {
            profile.warnings.push(date_swap_warning("education", &e.institution));
        }
        profile.education.push(Education {
            institution: e.institution,
            degree: e.degree,
            field_of_study: e.field_of_study,
            range,
        });
    }

    for x in raw.experience {
        let (range, swapped) = build_range(x.start.as_deref(), x.end.as_deref());
        if swapped {
            profile.warnings.push(date_swap_warning("experience", &x.company));
        }
        profile.experience.push(Experience {
            title: x.title,
            company: x.company,
            location: x.location,
            description: x.description,
            range,
            is_current: x.is_current,
            role_taxonomy: TaxonomyLink::none(),
        });
    }

    for c in raw.certifications {
        profile.certifications.push(Certification {
            name: c.name,
            issuer: c.issuer,
            date: c.date.as_deref().and_then(parse_flexible_date),
            taxonomy: TaxonomyLink::none(),
        });
    }

    for t in raw.training {
        profile.training.push(TrainingEvent {
            name: t.name,
            provider: t.provider,
            date: t.date.as_deref().and_then(parse_flexible_date),
        });
    }

    for d in raw.driving_licenses {
        profile.driving_licenses.push(DrivingLicense { category: d });
    }

    for s in raw.skills {
        profile.skills.push(Skill {
            name: s.name.clone(),
            level: s.level.as_deref().and_then(map_skill_level),
            taxonomy: TaxonomyLink::none(),
        });
    }

    for l in raw.languages {
        profile.languages.push(Language {
            name: l.name,
            iso_code: l.iso_code,
            level: l.level.as_deref().and_then(map_language_level),
        });
    }

    for s in raw.software {
        profile.software.push(SoftwareItem {
            name: s,
            taxonomy: TaxonomyLink::none(),
        });
    }

    profile.recompute_completeness();
    profile
}

fn date_swap_warning(section: &str, field: &str) -> QualityWarning {
    QualityWarning {
        category: "date_range_swapped".into(),
        severity: Severity::Warning,
        field: field.to_string(),
        section: section.to_string(),
        original: None,
        suggested: None,
        was_auto_fixed: true,
        llm_detected: false,
        message_en: "Start date was after end date; the range was swapped.".into(),
        message_el: "Η ημερομηνία έναρξης ήταν μετά την ημερομηνία λήξης· το εύρος αντιστράφηκε."
            .into(),
    }
}

/// Build a [`DateRange`] from raw start/end strings, substituting
/// `YYYY-01-01` for year-only dates and auto-swapping an inverted range
/// (§4.4 "Enforces").
fn build_range(start: Option<&str>, end: Option<&str>) -> (DateRange, bool) {
    let start_date = start
        .and_then(parse_flexible_date)
        .unwrap_or_else(|| NaiveDate::from_ymd_opt(1900, 1, 1).unwrap());
    let end_date = end.and_then(parse_flexible_date);

    let mut range = DateRange {
        start: start_date,
        end: end_date,
    };
    let swapped = range.auto_swap();
    (range, swapped)
}

/// Parse a date that may be a full `YYYY-MM-DD`, a `YYYY-MM`, or a bare
/// `YYYY` (substituted to `YYYY-01-01`, §4.4).
fn parse_flexible_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if raw.len() == 7 {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d") {
            return Some(d);
        }
    }
    if raw.len() == 4 && raw.chars().all(|c| c.is_ascii_digit()) {
        if let Ok(d) = NaiveDate::parse_from_str(&format!("{raw}-01-01"), "%Y-%m-%d") {
            return Some(d);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_llm::FakeLlmClient;

    #[test]
    fn parse_flexible_date_substitutes_year_only() {
        let d = parse_flexible_date("2019").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2019, 1, 1).unwrap());
    }

    #[test]
    fn parse_flexible_date_handles_full_iso() {
        let d = parse_flexible_date("2019-06-15").unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2019, 6, 15).unwrap());
    }

    #[test]
    fn build_range_swaps_inverted_dates() {
        let (range, swapped) = build_range(Some("2022"), Some("2018"));
        assert!(swapped);
        assert!(range.start <= range.end.unwrap());
    }

    #[tokio::test]
    async fn structure_parses_direct_json_on_first_attempt() {
        let json = r#"{"full_name": "Maria Papadopoulou", "email": "maria@example.gr",
            "skills": [{"name": "Rust", "level": "expert"}],
            "languages": [{"name": "English", "level": "C1"}]}"#;
        let llm = FakeLlmClient::new(vec![json.to_string()]);
        let profile = structure("raw cv text", &llm).await.unwrap();
        assert_eq!(profile.identity.full_name, "Maria Papadopoulou");
        assert_eq!(profile.skills.len(), 1);
        assert!(profile.completeness_score > 0.0);
    }

    #[tokio::test]
    async fn structure_retries_on_invalid_json_then_succeeds() {
        let valid = r#"{"full_name": "Giorgos"}"#;
        let llm = FakeLlmClient::new(vec!["not json at all".to_string(), valid.to_string()]);
        let profile = structure("raw cv text", &llm).await.unwrap();
        assert_eq!(profile.identity.full_name, "Giorgos");
    }

    #[tokio::test]
    async fn structure_fails_after_exhausting_retries() {
        let llm = FakeLlmClient::new(vec![
            "garbage".to_string(),
            "still garbage".to_string(),
            "nope".to_string(),
        ]);
        let result = structure("raw cv text", &llm).await;
        assert!(result.is_err());
    }
}
