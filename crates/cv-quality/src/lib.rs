//! Quality/Audit Gate (§4.6): field validators that register bilingual
//! `QualityWarning`s without ever failing the pipeline. Completeness scoring
//! itself lives on `CandidateProfile::recompute_completeness` (§8); this
//! crate's `audit` just runs it and returns the resulting warnings alongside
//! its own.

use once_cell::sync::Lazy;
use regex::Regex;

use cv_common::model::{QualityLevel, QualityWarning, Severity};
use cv_common::text::trigram_similarity;
use cv_common::CandidateProfile;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$").unwrap());

static REPEATED_CHAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.)\1{2,}").unwrap());

const KNOWN_DOMAINS: &[&str] = &[
    "gmail.com",
    "yahoo.com",
    "hotmail.com",
    "outlook.com",
    "icloud.com",
    "protonmail.com",
    "yahoo.gr",
    "windowslive.com",
];

const TYPO_SIMILARITY_LOW: f64 = 0.75;
const TYPO_SIMILARITY_HIGH: f64 = 1.0;

/// Validate a candidate email address (§4.6). Returns `None` when the
/// address is well-formed and no typo is suspected.
#[must_use]
pub fn validate_email(email: &str) -> Option<QualityWarning> {
    if !EMAIL_RE.is_match(email) {
        return Some(QualityWarning {
            category: "email_format".into(),
            severity: Severity::Warning,
            field: "email".into(),
            section: "identity".into(),
            original: Some(email.to_string()),
            suggested: None,
            was_auto_fixed: false,
            llm_detected: false,
            message_en: format!("'{email}' does not look like a valid email address."),
            message_el: format!("Η διεύθυνση '{email}' δεν μοιάζει με έγκυρο email."),
        });
    }

    if let Some(m) = REPEATED_CHAR_RE.find(email) {
        return Some(QualityWarning {
            category: "email_repeated_chars".into(),
            severity: Severity::Info,
            field: "email".into(),
            section: "identity".into(),
            original: Some(email.to_string()),
            suggested: None,
            was_auto_fixed: false,
            llm_detected: false,
            message_en: format!(
                "'{email}' contains a suspicious repeated character run ('{}').",
                m.as_str()
            ),
            message_el: format!(
                "Το '{email}' περιέχει ύποπτη επανάληψη χαρακτήρων ('{}').",
                m.as_str()
            ),
        });
    }

    if let Some(suggested) = suspected_domain_typo(email) {
        return Some(QualityWarning {
            category: "email_domain_typo".into(),
            severity: Severity::Info,
            field: "email".into(),
            section: "identity".into(),
            original: Some(email.to_string()),
            suggested: Some(suggested.clone()),
            was_auto_fixed: false,
            llm_detected: false,
            message_en: format!("Domain may be a typo; did you mean '{suggested}'?"),
            message_el: format!("Ο τομέας μπορεί να είναι τυπογραφικό λάθος; μήπως εννοείτε '{suggested}';"),
        });
    }

    None
}

fn suspected_domain_typo(email: &str) -> Option<String> {
    let domain = email.rsplit('@').next()?.to_lowercase();
    if KNOWN_DOMAINS.contains(&domain.as_str()) {
        return None;
    }
    KNOWN_DOMAINS
        .iter()
        .map(|known| (*known, trigram_similarity(&domain, known)))
        .filter(|(_, score)| *score > TYPO_SIMILARITY_LOW && *score < TYPO_SIMILARITY_HIGH)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(known, _)| format!("{}@{known}", email.rsplit_once('@').map(|(l, _)| l).unwrap_or("")))
}

/// Validate a Greek phone number (§4.6): mobile `69XXXXXXXX`, landline
/// `2XXXXXXXXX`, both with an optional `+30`/`0030` prefix.
#[must_use]
pub fn validate_phone(phone: &str) -> Option<QualityWarning> {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();

    let stripped = digits
        .strip_prefix("0030")
        .or_else(|| digits.strip_prefix("30"))
        .unwrap_or(&digits);

    let is_mobile = stripped.starts_with('6');
    let is_landline = stripped.starts_with('2');

    if !is_mobile && !is_landline {
        return Some(QualityWarning {
            category: "phone_format".into(),
            severity: Severity::Warning,
            field: "phone".into(),
            section: "identity".into(),
            original: Some(phone.to_string()),
            suggested: None,
            was_auto_fixed: false,
            llm_detected: false,
            message_en: format!("'{phone}' does not match a recognized Greek mobile or landline prefix."),
            message_el: format!("Το '{phone}' δεν ταιριάζει με γνωστό ελληνικό πρόθεμα κινητού ή σταθερού."),
        });
    }

    match stripped.len().cmp(&10) {
        std::cmp::Ordering::Less => Some(QualityWarning {
            category: "phone_truncated".into(),
            severity: Severity::Warning,
            field: "phone".into(),
            section: "identity".into(),
            original: Some(phone.to_string()),
            suggested: None,
            was_auto_fixed: false,
            llm_detected: false,
            message_en: format!("'{phone}' has fewer digits than a valid GR number (10)."),
            message_el: format!("Το '{phone}' έχει λιγότερα ψηφία από έναν έγκυρο ελληνικό αριθμό (10)."),
        }),
        std::cmp::Ordering::Greater => Some(QualityWarning {
            category: "phone_overflow".into(),
            severity: Severity::Warning,
            field: "phone".into(),
            section: "identity".into(),
            original: Some(phone.to_string()),
            suggested: Some(stripped[..10].to_string()),
            was_auto_fixed: false,
            llm_detected: false,
            message_en: format!("'{phone}' has more digits than a valid GR number (10)."),
            message_el: format!("Το '{phone}' έχει περισσότερα ψηφία από έναν έγκυρο ελληνικό αριθμό (10)."),
        }),
        std::cmp::Ordering::Equal => None,
    }
}

/// Run every field validator over `profile` and append resulting warnings,
/// then recompute completeness (§8) and quality level. Date-range swap
/// warnings are registered upstream, at parse time, by the structurer
/// (§4.4) and are already present in `profile.warnings` by the time this
/// runs; this pass neither duplicates nor removes them.
pub fn audit(profile: &mut CandidateProfile) {
    if let Some(email) = profile.identity.email.clone() {
        if let Some(warning) = validate_email(&email) {
            profile.warnings.push(warning);
        }
    }
    if let Some(phone) = profile.identity.phone.clone() {
        if let Some(warning) = validate_phone(&phone) {
            profile.warnings.push(warning);
        }
    }
    profile.recompute_completeness();
}

#[must_use]
pub fn quality_level(profile: &CandidateProfile) -> QualityLevel {
    profile.quality_level
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_email_passes() {
        assert!(validate_email("nikos.papas@gmail.com").is_none());
    }

    #[test]
    fn malformed_email_is_flagged() {
        let warning = validate_email("not-an-email").unwrap();
        assert_eq!(warning.category, "email_format");
        assert_eq!(warning.severity, Severity::Warning);
    }

    #[test]
    fn repeated_characters_are_flagged() {
        let warning = validate_email("aaaa@gmail.com").unwrap();
        assert_eq!(warning.category, "email_repeated_chars");
    }

    #[test]
    fn domain_typo_is_suggested() {
        let warning = validate_email("user@gmial.com").unwrap();
        assert_eq!(warning.category, "email_domain_typo");
        assert_eq!(warning.suggested.as_deref(), Some("user@gmail.com"));
    }

    #[test]
    fn exact_known_domain_is_not_flagged() {
        assert!(validate_email("user@yahoo.com").is_none());
    }

    #[test]
    fn mobile_number_with_plus30_prefix_is_valid() {
        assert!(validate_phone("+30 6971234567").is_none());
    }

    #[test]
    fn landline_with_0030_prefix_is_valid() {
        assert!(validate_phone("0030 2101234567").is_none());
    }

    #[test]
    fn unrecognized_prefix_is_flagged() {
        let warning = validate_phone("5551234567").unwrap();
        assert_eq!(warning.category, "phone_format");
    }

    #[test]
    fn truncated_number_is_flagged() {
        let warning = validate_phone("697123456").unwrap();
        assert_eq!(warning.category, "phone_truncated");
    }

    #[test]
    fn overflow_number_is_flagged_with_suggestion() {
        let warning = validate_phone("69712345678").unwrap();
        assert_eq!(warning.category, "phone_overflow");
        assert_eq!(warning.suggested.as_deref(), Some("6971234567"));
    }
}
