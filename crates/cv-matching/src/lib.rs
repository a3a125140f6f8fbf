//! Relaxed Matcher (C12, §4.12) and HR Intelligence Analyzer (C13, §4.13).
//!
//! Both stages start from an LLM-extracted `JobRequirements` structure;
//! the matcher scores the active candidate pool against it via a
//! `PostgreSQL` function and evaluates the top few with a cheap LLM pass,
//! while the analyzer composes a bilingual HR report over up to ten
//! enriched profiles, synchronously or via a polled background job.

pub mod hr_analyzer;
pub mod hr_report;
pub mod matcher;
pub mod requirements;

use thiserror::Error;

pub use hr_analyzer::{analyze_sync, HrJobRecord, HrJobStatus, HrJobStore};
pub use hr_report::{categorize, detect_language, Category, HrAnalysisReport, PromptLanguage, RankedCandidate};
pub use matcher::{relaxed_match, CandidateMatch, MatchLevel, MatchResult, Recommendation};
pub use requirements::{extract_requirements, JobRequirements};

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("llm error: {0}")]
    Llm(#[from] cv_llm::LlmError),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),
}

pub type Result<T> = std::result::Result<T, MatchingError>;
