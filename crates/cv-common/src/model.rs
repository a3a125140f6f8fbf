//! The three-tier candidate data model (§3).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MatchMethod;

/// A taxonomy linkage carried by every proficiency/role reference (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyLink {
    pub canonical_id: Option<String>,
    pub suggested_id: Option<String>,
    pub similarity: f32,
    pub match_method: MatchMethod,
}

impl TaxonomyLink {
    #[must_use]
    pub fn none() -> Self {
        Self {
            canonical_id: None,
            suggested_id: None,
            similarity: 0.0,
            match_method: MatchMethod::None,
        }
    }

    #[must_use]
    pub fn is_confident(&self) -> bool {
        self.match_method.is_confident() && self.canonical_id.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProficiencyLevel {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
    Master,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CefrLevel {
    A1,
    A2,
    B1,
    B2,
    C1,
    C2,
    Native,
}

/// A start/end pair that self-corrects an inverted range (§3 invariant b).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    /// Swap start/end if inverted. Returns `true` if a swap happened, so the
    /// caller can register a `date_error` warning (§4.6).
    pub fn auto_swap(&mut self) -> bool {
        if let Some(end) = self.end {
            if self.start > end {
                self.end = Some(self.start);
                self.start = end;
                return true;
            }
        }
        false
    }

    #[must_use]
    pub fn duration_months(&self) -> i64 {
        let end = self.end.unwrap_or_else(|| Utc::now().date_naive());
        let months = (end.year() as i64 - self.start.year() as i64) * 12
            + (end.month() as i64 - self.start.month() as i64);
        months.max(0)
    }
}

use chrono::Datelike;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Education {
    pub institution: String,
    pub degree: String,
    pub field_of_study: Option<String>,
    pub range: DateRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub description: Option<String>,
    pub range: DateRange,
    pub is_current: bool,
    pub role_taxonomy: TaxonomyLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certification {
    pub name: String,
    pub issuer: Option<String>,
    pub date: Option<NaiveDate>,
    pub taxonomy: TaxonomyLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingEvent {
    pub name: String,
    pub provider: Option<String>,
    pub date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DrivingLicense {
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub name: String,
    pub level: Option<ProficiencyLevel>,
    pub taxonomy: TaxonomyLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Language {
    pub name: String,
    pub iso_code: Option<String>,
    pub level: Option<CefrLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftwareItem {
    pub name: String,
    pub taxonomy: TaxonomyLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub full_name: String,
    pub full_name_normalized: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub nationality: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
}

impl Identity {
    #[must_use]
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            full_name_normalized: crate::text::strip_accents(full_name),
            email: None,
            phone: None,
            date_of_birth: None,
            nationality: None,
            location: None,
            address: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
    Insufficient,
}

impl QualityLevel {
    /// I3: bucket a completeness score.
    #[must_use]
    pub fn from_score(score: f32) -> Self {
        if score >= 0.9 {
            QualityLevel::Excellent
        } else if score >= 0.7 {
            QualityLevel::Good
        } else if score >= 0.5 {
            QualityLevel::Fair
        } else if score >= 0.3 {
            QualityLevel::Poor
        } else {
            QualityLevel::Insufficient
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityWarning {
    pub category: String,
    pub severity: Severity,
    pub field: String,
    pub section: String,
    pub original: Option<String>,
    pub suggested: Option<String>,
    pub was_auto_fixed: bool,
    pub llm_detected: bool,
    pub message_en: String,
    pub message_el: String,
}

/// A skill/certification/software term that no taxonomy tier confidently
/// matched (§4.5, §9 "unmatched items table").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmatchedItem {
    pub candidate_id: Uuid,
    pub item_type: String,
    pub original_value: String,
    pub normalized_value: String,
    pub suggested_id: Option<String>,
    pub similarity: f32,
}

/// The canonical candidate aggregate (§3 "Candidate Profile").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: Uuid,
    pub identity: Identity,
    pub education: Vec<Education>,
    pub experience: Vec<Experience>,
    pub certifications: Vec<Certification>,
    pub training: Vec<TrainingEvent>,
    pub driving_licenses: Vec<DrivingLicense>,
    pub skills: Vec<Skill>,
    pub languages: Vec<Language>,
    pub software: Vec<SoftwareItem>,
    pub raw_text: String,
    pub structurer_json: serde_json::Value,
    pub quality_json: serde_json::Value,
    pub warnings: Vec<QualityWarning>,
    pub completeness_score: f32,
    pub quality_level: QualityLevel,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl CandidateProfile {
    #[must_use]
    pub fn new(identity: Identity) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            education: Vec::new(),
            experience: Vec::new(),
            certifications: Vec::new(),
            training: Vec::new(),
            driving_licenses: Vec::new(),
            skills: Vec::new(),
            languages: Vec::new(),
            software: Vec::new(),
            raw_text: String::new(),
            structurer_json: serde_json::Value::Null,
            quality_json: serde_json::Value::Null,
            warnings: Vec::new(),
            completeness_score: 0.0,
            quality_level: QualityLevel::Insufficient,
            is_active: true,
            updated_at: Utc::now(),
        }
    }

    /// I3: `0.7 * (name/contact/history coverage) + 0.3 * (skills/languages/location/certs/software coverage)`.
    pub fn recompute_completeness(&mut self) {
        let identity_fields_present = [
            !self.identity.full_name.is_empty(),
            self.identity.email.is_some() || self.identity.phone.is_some(),
            !self.education.is_empty() || !self.experience.is_empty(),
        ];
        let core_fraction =
            identity_fields_present.iter().filter(|p| **p).count() as f32 / 3.0;

        let secondary_fields_present = [
            !self.skills.is_empty(),
            !self.languages.is_empty(),
            self.identity.location.is_some(),
            !self.certifications.is_empty(),
            !self.software.is_empty(),
        ];
        let secondary_fraction =
            secondary_fields_present.iter().filter(|p| **p).count() as f32 / 5.0;

        self.completeness_score = 0.7 * core_fraction + 0.3 * secondary_fraction;
        self.quality_level = QualityLevel::from_score(self.completeness_score);
    }

    /// Sum duration in months across all experience entries, divided into
    /// years — the computation backing the SQL generator's `experience_years`
    /// filter (§4.11) and the completeness audit.
    #[must_use]
    pub fn total_experience_years(&self) -> f64 {
        let months: i64 = self.experience.iter().map(|e| e.range.duration_months()).sum();
        months as f64 / 12.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn date_range_auto_swap_fixes_inverted_range() {
        let mut range = DateRange {
            start: date(2020, 1, 1),
            end: Some(date(2018, 1, 1)),
        };
        assert!(range.auto_swap());
        assert!(range.start <= range.end.unwrap());
    }

    #[test]
    fn date_range_no_swap_for_valid_range() {
        let mut range = DateRange {
            start: date(2018, 1, 1),
            end: Some(date(2020, 1, 1)),
        };
        assert!(!range.auto_swap());
    }

    #[test]
    fn duration_months_computes_whole_months() {
        let range = DateRange {
            start: date(2020, 1, 1),
            end: Some(date(2021, 7, 1)),
        };
        assert_eq!(range.duration_months(), 18);
    }

    #[test]
    fn completeness_score_matches_i3_formula() {
        let mut profile = CandidateProfile::new(Identity::new("Maria Papadopoulou"));
        profile.identity.email = Some("maria@example.gr".to_string());
        profile.experience.push(Experience {
            title: "Software Engineer".into(),
            company: "Acme".into(),
            location: None,
            description: None,
            range: DateRange { start: date(2020, 1, 1), end: None },
            is_current: true,
            role_taxonomy: TaxonomyLink::none(),
        });
        profile.skills.push(Skill {
            name: "Rust".into(),
            level: None,
            taxonomy: TaxonomyLink::none(),
        });
        profile.recompute_completeness();
        // core: 3/3 present, secondary: skills only = 1/5
        let expected = 0.7 * 1.0 + 0.3 * (1.0 / 5.0);
        assert!((profile.completeness_score - expected).abs() < 1e-6);
        assert_eq!(profile.quality_level, QualityLevel::from_score(expected));
    }

    #[test]
    fn quality_level_buckets_follow_i3_thresholds() {
        assert_eq!(QualityLevel::from_score(0.95), QualityLevel::Excellent);
        assert_eq!(QualityLevel::from_score(0.7), QualityLevel::Good);
        assert_eq!(QualityLevel::from_score(0.5), QualityLevel::Fair);
        assert_eq!(QualityLevel::from_score(0.3), QualityLevel::Poor);
        assert_eq!(QualityLevel::from_score(0.1), QualityLevel::Insufficient);
    }
}
