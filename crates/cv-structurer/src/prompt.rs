//! Versioned prompt template loading: looks on disk first, falls back to an
//! embedded default (§4.4).

use std::path::PathBuf;

pub const SYSTEM_PROMPT: &str =
    "You extract structured candidate data from CV text. Respond with a single JSON object \
     matching the requested schema and nothing else.";

const DEFAULT_TEMPLATE: &str = include_str!("../prompts/structurer_v1.txt");

/// Load the structurer prompt template for `version`, trying
/// `prompts/structurer_{version}.txt` relative to the working directory
/// before falling back to the embedded default.
pub fn load_template(version: &str) -> String {
    let path = PathBuf::from("prompts").join(format!("structurer_{version}.txt"));
    std::fs::read_to_string(&path).unwrap_or_else(|_| DEFAULT_TEMPLATE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_template_falls_back_to_embedded_default() {
        let template = load_template("nonexistent-version");
        assert!(template.contains("{{raw_text}}"));
    }
}
