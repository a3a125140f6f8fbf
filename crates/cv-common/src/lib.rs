//! Shared types for the CV intake and matching pipeline.
//!
//! Every other crate in this workspace depends on this one for the
//! correlation id, the candidate data model, and the pipeline-wide error
//! and warning types.

pub mod model;
pub mod text;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

pub use model::*;

/// Errors shared across pipeline stages.
///
/// Stage-specific crates define their own `thiserror` enums and convert into
/// this one with `#[from]` at the orchestrator boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unsupported media type: {0}")]
    UnsupportedMedia(String),

    #[error("document too large: {size} bytes (max {max})")]
    TooLarge { size: u64, max: u64 },

    #[error("missing correlation id")]
    MissingCorrelationId,

    #[error("no extractable text")]
    NoText,

    #[error("provider error ({provider}): {message}")]
    Provider { provider: String, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("consistency error: {0}")]
    Consistency(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("other error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Opaque 128-bit identifier bound to an upload at presign time; the single
/// key threading every artifact and state record for one intake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(pub Uuid);

impl CorrelationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// How a raw skill/role/software/certification term was linked to a
/// canonical taxonomy id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Substring,
    Fuzzy,
    FuzzySuggested,
    Semantic,
    Suggested,
    None,
}

impl MatchMethod {
    /// Minimum similarity a confident match of this tier must carry (§3 invariant d).
    #[must_use]
    pub fn confidence_threshold(self) -> f32 {
        match self {
            MatchMethod::Exact => 1.0,
            MatchMethod::Substring => 0.9,
            MatchMethod::Fuzzy => 0.75,
            MatchMethod::Semantic => 0.85,
            MatchMethod::FuzzySuggested | MatchMethod::Suggested | MatchMethod::None => 0.0,
        }
    }

    #[must_use]
    pub fn is_confident(self) -> bool {
        matches!(
            self,
            MatchMethod::Exact | MatchMethod::Substring | MatchMethod::Fuzzy | MatchMethod::Semantic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_id_round_trips_through_string() {
        let id = CorrelationId::new();
        let parsed: CorrelationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn match_method_thresholds_match_spec() {
        assert_eq!(MatchMethod::Exact.confidence_threshold(), 1.0);
        assert_eq!(MatchMethod::Substring.confidence_threshold(), 0.9);
        assert_eq!(MatchMethod::Fuzzy.confidence_threshold(), 0.75);
        assert_eq!(MatchMethod::Semantic.confidence_threshold(), 0.85);
        assert!(MatchMethod::Exact.is_confident());
        assert!(!MatchMethod::Suggested.is_confident());
    }
}
