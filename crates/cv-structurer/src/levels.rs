//! Free-form, bilingual (Greek/English) skill and language proficiency
//! terms mapped into the canonical enums (§4.4).

use cv_common::model::{CefrLevel, ProficiencyLevel};
use cv_common::text::normalize;

pub fn map_skill_level(raw: &str) -> Option<ProficiencyLevel> {
    let n = normalize(raw);
    match n.as_str() {
        "beginner" | "basic" | "αρχαριος" | "βασικο" | "βασικος" => Some(ProficiencyLevel::Beginner),
        "intermediate" | "μεσαιο" | "μετριο" => Some(ProficiencyLevel::Intermediate),
        "advanced" | "προχωρημενο" | "προχωρημενος" => Some(ProficiencyLevel::Advanced),
        "expert" | "εμπειρογνωμονας" | "εμπειρο" => Some(ProficiencyLevel::Expert),
        "master" | "masterful" | "αριστο" => Some(ProficiencyLevel::Master),
        _ => None,
    }
}

pub fn map_language_level(raw: &str) -> Option<CefrLevel> {
    let n = normalize(raw);
    match n.as_str() {
        "a1" => Some(CefrLevel::A1),
        "a2" => Some(CefrLevel::A2),
        "b1" | "intermediate" | "μεσαιο" => Some(CefrLevel::B1),
        "b2" | "upper intermediate" | "καλη γνωση" => Some(CefrLevel::B2),
        "c1" | "advanced" | "πολυ καλη γνωση" => Some(CefrLevel::C1),
        "c2" | "proficient" | "αριστη γνωση" => Some(CefrLevel::C2),
        "native" | "mother tongue" | "μητρικη" | "μητρικη γλωσσα" => Some(CefrLevel::Native),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_skill_level_handles_english_and_greek() {
        assert_eq!(map_skill_level("Expert"), Some(ProficiencyLevel::Expert));
        assert_eq!(map_skill_level("προχωρημένο"), Some(ProficiencyLevel::Advanced));
        assert_eq!(map_skill_level("unrecognized"), None);
    }

    #[test]
    fn map_language_level_handles_cefr_codes_and_words() {
        assert_eq!(map_language_level("C1"), Some(CefrLevel::C1));
        assert_eq!(map_language_level("native"), Some(CefrLevel::Native));
        assert_eq!(map_language_level("μητρική"), Some(CefrLevel::Native));
        assert_eq!(map_language_level("xyz"), None);
    }
}
