//! Three-step JSON extraction from raw LLM output (§4.4): direct parse,
//! then a fenced-code-block scan, then a first-`{`-to-last-`}` window, each
//! preceded by a light repair pass.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)```").expect("static regex is valid")
});

#[derive(Debug)]
pub struct JsonExtractError(pub String);

impl std::fmt::Display for JsonExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "could not extract JSON: {}", self.0)
    }
}

impl std::error::Error for JsonExtractError {}

pub fn extract_json(raw: &str) -> Result<Value, JsonExtractError> {
    let trimmed = raw.trim();

    if let Ok(v) = serde_json::from_str(trimmed) {
        return Ok(v);
    }
    if let Ok(v) = serde_json::from_str(&repair(trimmed)) {
        return Ok(v);
    }

    if let Some(caps) = FENCE.captures(trimmed) {
        let candidate = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
        if let Ok(v) = serde_json::from_str(candidate) {
            return Ok(v);
        }
        if let Ok(v) = serde_json::from_str(&repair(candidate)) {
            return Ok(v);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            let window = &trimmed[start..=end];
            if let Ok(v) = serde_json::from_str(window) {
                return Ok(v);
            }
            if let Ok(v) = serde_json::from_str(&repair(window)) {
                return Ok(v);
            }
        }
    }

    Err(JsonExtractError(format!(
        "no parseable JSON object found in {} bytes of output",
        raw.len()
    )))
}

/// Strip trailing commas before `}`/`]` and drop ASCII control characters
/// other than whitespace, a common failure mode in LLM JSON output.
fn repair(input: &str) -> String {
    let no_control: String = input
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t' || *c == '\r')
        .collect();

    let mut out = String::with_capacity(no_control.len());
    let chars: Vec<char> = no_control.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_parses_direct_object() {
        let raw = r#"{"full_name": "Maria"}"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["full_name"], "Maria");
    }

    #[test]
    fn extract_json_scans_fenced_code_block() {
        let raw = "Here is the result:\n```json\n{\"full_name\": \"Giorgos\"}\n```\nThanks.";
        let v = extract_json(raw).unwrap();
        assert_eq!(v["full_name"], "Giorgos");
    }

    #[test]
    fn extract_json_falls_back_to_brace_window() {
        let raw = "Sure, here you go: {\"full_name\": \"Eleni\"} I hope that helps!";
        let v = extract_json(raw).unwrap();
        assert_eq!(v["full_name"], "Eleni");
    }

    #[test]
    fn extract_json_repairs_trailing_comma() {
        let raw = r#"{"full_name": "Kostas", "skills": ["rust",],}"#;
        let v = extract_json(raw).unwrap();
        assert_eq!(v["full_name"], "Kostas");
    }

    #[test]
    fn extract_json_fails_on_non_json_text() {
        assert!(extract_json("I cannot process this request.").is_err());
    }
}
