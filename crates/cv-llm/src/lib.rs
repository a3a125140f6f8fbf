//! Unified LLM capability client.
//!
//! Four surfaces in the pipeline call out to an LLM: the triple-OCR
//! arbitrator, the CV structurer, the query translator, and the HR
//! intelligence analyzer. Rather than each depending on a concrete
//! Bedrock/OpenAI SDK, they depend on this crate's [`LlmClient`] trait,
//! which exposes exactly the two operations they need. This keeps every
//! caller testable against [`FakeLlmClient`] without touching the network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to {provider} failed: {message}")]
    RequestFailed { provider: String, message: String },

    #[error("response from {provider} could not be parsed: {message}")]
    BadResponse { provider: String, message: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, LlmError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(default)]
    pub system: Option<String>,
}

impl CompletionRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.0,
            system: None,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency: Duration,
}

/// The capability set every LLM-backed stage depends on (§9 design notes).
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse>;
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Model ids for the two Claude tiers the original system pins (high-quality
/// structuring/arbitration vs. cheap per-candidate scoring).
pub mod models {
    pub const STRUCTURER: &str = "eu.anthropic.claude-sonnet-4-5-20250929-v1:0";
    pub const ARBITRATION: &str = "eu.anthropic.claude-haiku-4-5-20251001-v1:0";
}

/// Talks to a Bedrock-compatible `invoke-model` HTTP endpoint. Grounded on
/// the video-extract-core api-server's use of `reqwest` for out-of-process
/// calls; the wire shape mirrors Bedrock's Anthropic Messages API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BedrockConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_embedding_batch")]
    pub embedding_batch_size: usize,
}

fn default_endpoint() -> String {
    std::env::var("BEDROCK_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4500/bedrock".to_string())
}

fn default_embedding_model() -> String {
    std::env::var("EMBEDDING_MODEL").unwrap_or_else(|_| "cohere.embed-multilingual-v3".to_string())
}

fn default_embedding_batch() -> usize {
    96
}

impl Default for BedrockConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            embedding_model: default_embedding_model(),
            embedding_batch_size: default_embedding_batch(),
        }
    }
}

pub struct BedrockLlmClient {
    http: reqwest::Client,
    config: BedrockConfig,
}

impl BedrockLlmClient {
    #[must_use]
    pub fn new(config: BedrockConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Serialize)]
struct InvokeBody<'a> {
    anthropic_version: &'a str,
    max_tokens: u32,
    messages: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
}

#[derive(Deserialize)]
struct InvokeResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Deserialize)]
struct ContentBlock {
    text: String,
}

#[async_trait]
impl LlmClient for BedrockLlmClient {
    async fn complete(&self, req: CompletionRequest) -> Result<CompletionResponse> {
        let start = std::time::Instant::now();
        let body = InvokeBody {
            anthropic_version: "bedrock-2023-05-31",
            max_tokens: req.max_tokens,
            messages: vec![serde_json::json!({"role": "user", "content": req.prompt})],
            system: req.system.as_deref(),
        };

        let url = format!("{}/model/{}/invoke", self.config.endpoint, req.model);
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "bedrock".into(),
                message: e.to_string(),
            })?;

        let parsed: InvokeResponse = resp.json().await.map_err(|e| LlmError::BadResponse {
            provider: "bedrock".into(),
            message: e.to_string(),
        })?;

        let text = parsed
            .content
            .first()
            .map(|c| c.text.clone())
            .ok_or_else(|| LlmError::BadResponse {
                provider: "bedrock".into(),
                message: "empty content array".into(),
            })?;

        Ok(CompletionResponse {
            text,
            input_tokens: parsed.usage.input_tokens,
            output_tokens: parsed.usage.output_tokens,
            latency: start.elapsed(),
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/model/{}/invoke", self.config.endpoint, self.config.embedding_model);
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.embedding_batch_size) {
            let resp = self
                .http
                .post(&url)
                .json(&serde_json::json!({ "texts": chunk }))
                .send()
                .await
                .map_err(|e| LlmError::RequestFailed {
                    provider: "bedrock-embed".into(),
                    message: e.to_string(),
                })?;
            let vectors: Vec<Vec<f32>> = resp.json().await.map_err(|e| LlmError::BadResponse {
                provider: "bedrock-embed".into(),
                message: e.to_string(),
            })?;
            out.extend(vectors);
        }
        Ok(out)
    }
}

/// Deterministic stand-in used by unit tests across the workspace: returns a
/// canned completion (configurable) and a cheap hash-based embedding so
/// cosine similarity tests are repeatable without network access.
pub struct FakeLlmClient {
    pub completions: std::sync::Mutex<Vec<String>>,
    pub embedding_dim: usize,
}

impl FakeLlmClient {
    #[must_use]
    pub fn new(completions: Vec<String>) -> Self {
        Self {
            completions: std::sync::Mutex::new(completions),
            embedding_dim: 1024,
        }
    }

    #[must_use]
    pub fn with_dim(completions: Vec<String>, embedding_dim: usize) -> Self {
        Self {
            completions: std::sync::Mutex::new(completions),
            embedding_dim,
        }
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse> {
        let mut queue = self.completions.lock().unwrap();
        let text = if queue.is_empty() {
            String::new()
        } else {
            queue.remove(0)
        };
        Ok(CompletionResponse {
            text,
            input_tokens: 0,
            output_tokens: 0,
            latency: Duration::from_millis(1),
        })
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| hash_embedding(t, self.embedding_dim)).collect())
    }
}

/// A cheap deterministic embedding: hash n-grams of the input into buckets.
/// Close inputs (shared n-grams) land closer in cosine space than unrelated
/// ones, which is all the taxonomy mapper's semantic-tier tests require.
fn hash_embedding(text: &str, dim: usize) -> Vec<f32> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let normalized = text.to_lowercase();
    let mut vec = vec![0f32; dim];
    let chars: Vec<char> = normalized.chars().collect();
    if chars.is_empty() {
        return vec;
    }
    for window in chars.windows(3.min(chars.len()).max(1)) {
        let mut hasher = DefaultHasher::new();
        window.hash(&mut hasher);
        let bucket = (hasher.finish() as usize) % dim;
        vec[bucket] += 1.0;
    }
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}

/// Cosine similarity between two equal-length vectors, used by the taxonomy
/// mapper's semantic tier (§4.5 step 4).
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_client_returns_queued_completions_in_order() {
        let client = FakeLlmClient::new(vec!["first".into(), "second".into()]);
        let r1 = client.complete(CompletionRequest::new("p", "m")).await.unwrap();
        let r2 = client.complete(CompletionRequest::new("p", "m")).await.unwrap();
        assert_eq!(r1.text, "first");
        assert_eq!(r2.text, "second");
    }

    #[tokio::test]
    async fn fake_client_embeddings_are_deterministic() {
        let client = FakeLlmClient::new(vec![]);
        let a = client.embed(&["rust engineer".to_string()]).await.unwrap();
        let b = client.embed(&["rust engineer".to_string()]).await.unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.5, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[tokio::test]
    async fn similar_texts_embed_closer_than_unrelated_ones() {
        let client = FakeLlmClient::new(vec![]);
        let base = client.embed(&["senior accountant".to_string()]).await.unwrap();
        let close = client.embed(&["accountant senior".to_string()]).await.unwrap();
        let far = client.embed(&["deep sea fishing".to_string()]).await.unwrap();
        let sim_close = cosine_similarity(&base[0], &close[0]);
        let sim_far = cosine_similarity(&base[0], &far[0]);
        assert!(sim_close > sim_far);
    }
}
