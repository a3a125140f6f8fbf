//! Triple-OCR engine (§4.3): a vision-capable LLM, local Tesseract, and a
//! cloud OCR service race in parallel over the same page image, and their
//! outputs are fused by pairwise text agreement.

use async_trait::async_trait;
use leptess::{LepTess, Variable};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use cv_common::text::lcs_ratio;
use cv_llm::{models, CompletionRequest, LlmClient};

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("failed to initialize tesseract: {0}")]
    Init(String),

    #[error("tesseract recognition failed: {0}")]
    Recognition(String),

    #[error("cloud ocr request failed: {0}")]
    CloudRequest(String),

    #[error("llm error: {0}")]
    Llm(#[from] cv_llm::LlmError),
}

pub type Result<T> = std::result::Result<T, OcrError>;

/// One provider's independent attempt at reading the page (§4.3 "per-provider result").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    pub provider: &'static str,
    pub text: String,
    pub confidence: f32,
    pub error: Option<String>,
}

impl ProviderResult {
    fn failed(provider: &'static str, message: impl Into<String>) -> Self {
        Self {
            provider,
            text: String::new(),
            confidence: 0.0,
            error: Some(message.into()),
        }
    }

    fn is_usable(&self) -> bool {
        self.error.is_none() && !self.text.trim().is_empty()
    }
}

/// The fused result of all three providers (§4.3 steps 5-6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionResult {
    pub text: String,
    pub confidence: f32,
    pub agreement_rate: Option<f64>,
    /// Per-provider contribution, normalized to sum to 1.
    pub attribution: Vec<(String, f32)>,
    pub providers: Vec<ProviderResult>,
}

/// A cloud OCR service (e.g. AWS Textract). Kept behind a trait so tests run
/// against a canned fake rather than a live account.
#[async_trait]
pub trait CloudOcrClient: Send + Sync {
    async fn extract(&self, image: &[u8]) -> Result<ProviderResult>;
}

#[derive(Debug, Clone)]
pub struct TextractConfig {
    pub endpoint: String,
}

impl Default for TextractConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("TEXTRACT_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4500/textract".to_string()),
        }
    }
}

pub struct TextractClient {
    http: reqwest::Client,
    config: TextractConfig,
}

impl TextractClient {
    #[must_use]
    pub fn new(config: TextractConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[derive(Deserialize)]
struct TextractLine {
    text: String,
    confidence: f32,
}

#[derive(Deserialize)]
struct TextractResponse {
    lines: Vec<TextractLine>,
}

#[async_trait]
impl CloudOcrClient for TextractClient {
    async fn extract(&self, image: &[u8]) -> Result<ProviderResult> {
        let resp = self
            .http
            .post(&self.config.endpoint)
            .body(image.to_vec())
            .send()
            .await
            .map_err(|e| OcrError::CloudRequest(e.to_string()))?;

        let parsed: TextractResponse = resp
            .json()
            .await
            .map_err(|e| OcrError::CloudRequest(e.to_string()))?;

        if parsed.lines.is_empty() {
            return Ok(ProviderResult::failed("textract", "no lines detected"));
        }

        let text = parsed
            .lines
            .iter()
            .map(|l| l.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        let mean_confidence =
            parsed.lines.iter().map(|l| l.confidence).sum::<f32>() / parsed.lines.len() as f32;

        Ok(ProviderResult {
            provider: "textract",
            text,
            confidence: mean_confidence,
            error: None,
        })
    }
}

/// Deterministic stand-in for tests: always returns the same canned line.
pub struct FakeCloudOcrClient {
    pub text: String,
    pub confidence: f32,
}

#[async_trait]
impl CloudOcrClient for FakeCloudOcrClient {
    async fn extract(&self, _image: &[u8]) -> Result<ProviderResult> {
        Ok(ProviderResult {
            provider: "textract",
            text: self.text.clone(),
            confidence: self.confidence,
            error: None,
        })
    }
}

const LLM_PRIOR_CONFIDENCE: f32 = 0.95;
const ARBITRATION_PREFIX_CHARS: usize = 4000;
const AGREEMENT_HIGH: f64 = 0.90;
const AGREEMENT_MID: f64 = 0.70;

/// Run local Tesseract against a page image. Blocking; callers should wrap
/// in `tokio::task::spawn_blocking`.
pub fn run_local_ocr(image_bytes: &[u8], lang: &str) -> ProviderResult {
    let mut lt = match LepTess::new(None, lang) {
        Ok(lt) => lt,
        Err(e) => return ProviderResult::failed("tesseract", format!("init failed: {e}")),
    };

    lt.set_variable(Variable::TesseditPagesegMode, "3").ok();

    if let Err(e) = lt.set_image_from_mem(image_bytes) {
        return ProviderResult::failed("tesseract", format!("failed to load image: {e}"));
    }

    let text = lt.get_utf8_text().unwrap_or_default();
    let confidence = (lt.mean_text_conf() as f32 / 100.0).clamp(0.0, 1.0);

    if text.trim().is_empty() {
        return ProviderResult::failed("tesseract", "no text detected");
    }

    ProviderResult {
        provider: "tesseract",
        text,
        confidence,
        error: None,
    }
}

/// Run the vision-capable LLM against the first-page render, encoded as a
/// data-url-style prefix in the prompt (§4.3 "the LLM uses the first-page render").
pub async fn run_llm_vision_ocr(llm: &dyn LlmClient, image_base64: &str) -> ProviderResult {
    let prompt = format!(
        "Transcribe all visible text from this document image exactly as written, \
         preserving line breaks. Image (base64): {image_base64}"
    );
    match llm
        .complete(CompletionRequest::new(prompt, models::STRUCTURER).with_system(
            "You are a precise OCR transcription engine. Output only the transcribed text.",
        ))
        .await
    {
        Ok(resp) if !resp.text.trim().is_empty() => ProviderResult {
            provider: "llm_vision",
            text: resp.text,
            confidence: LLM_PRIOR_CONFIDENCE,
            error: None,
        },
        Ok(_) => ProviderResult::failed("llm_vision", "empty completion"),
        Err(e) => ProviderResult::failed("llm_vision", e.to_string()),
    }
}

/// Run all three providers in parallel and fuse their results (§4.3).
pub async fn extract_and_fuse(
    image_bytes: &[u8],
    image_base64: &str,
    lang: &str,
    llm: &dyn LlmClient,
    cloud: &dyn CloudOcrClient,
) -> Result<FusionResult> {
    let local_bytes = image_bytes.to_vec();
    let local_lang = lang.to_string();
    let local_fut = tokio::task::spawn_blocking(move || run_local_ocr(&local_bytes, &local_lang));
    let llm_fut = run_llm_vision_ocr(llm, image_base64);
    let cloud_fut = cloud.extract(image_bytes);

    let (local_res, llm_res, cloud_res) = tokio::join!(local_fut, llm_fut, cloud_fut);

    let local = local_res.unwrap_or_else(|e| ProviderResult::failed("tesseract", e.to_string()));
    let cloud = cloud_res.unwrap_or_else(|e| ProviderResult::failed("textract", e.to_string()));
    let providers = vec![llm_res, local, cloud];

    fuse(providers, llm).await
}

async fn fuse(providers: Vec<ProviderResult>, llm: &dyn LlmClient) -> Result<FusionResult> {
    let usable: Vec<&ProviderResult> = providers.iter().filter(|p| p.is_usable()).collect();

    if usable.is_empty() {
        warn!("triple-ocr fusion: no provider produced usable text");
        return Ok(FusionResult {
            text: String::new(),
            confidence: 0.0,
            agreement_rate: None,
            attribution: Vec::new(),
            providers,
        });
    }

    if usable.len() == 1 {
        let only = usable[0];
        let result = FusionResult {
            text: only.text.clone(),
            confidence: only.confidence * 0.7,
            agreement_rate: None,
            attribution: vec![(only.provider.to_string(), 1.0)],
            providers: providers.clone(),
        };
        return Ok(result);
    }

    let mut pairwise = Vec::new();
    for i in 0..usable.len() {
        for j in (i + 1)..usable.len() {
            pairwise.push(lcs_ratio(
                &usable[i].text.to_lowercase(),
                &usable[j].text.to_lowercase(),
            ));
        }
    }
    let agreement_rate = pairwise.iter().sum::<f64>() / pairwise.len() as f64;

    let best = usable
        .iter()
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .unwrap();

    let (text, confidence) = if agreement_rate >= AGREEMENT_HIGH {
        (best.text.clone(), 0.95)
    } else if agreement_rate >= AGREEMENT_MID {
        (best.text.clone(), 0.80)
    } else {
        let arbitrated = arbitrate(&usable, llm).await?;
        (arbitrated, 0.70)
    };

    let attribution = attribute(&usable, &text);

    info!(agreement_rate, confidence, "triple-ocr fusion complete");

    Ok(FusionResult {
        text,
        confidence,
        agreement_rate: Some(agreement_rate),
        attribution,
        providers,
    })
}

async fn arbitrate(usable: &[&ProviderResult], llm: &dyn LlmClient) -> Result<String> {
    let mut prompt = String::from(
        "Three OCR engines produced disagreeing transcriptions of the same document. \
         Merge them into a single best-effort corrected transcription:\n\n",
    );
    for p in usable {
        let truncated: String = p.text.chars().take(ARBITRATION_PREFIX_CHARS).collect();
        prompt.push_str(&format!("--- {} ---\n{}\n\n", p.provider, truncated));
    }

    let resp = llm
        .complete(CompletionRequest::new(prompt, models::ARBITRATION).with_system(
            "You reconcile conflicting OCR outputs. Respond with only the merged text.",
        ))
        .await?;
    Ok(resp.text)
}

fn attribute(usable: &[&ProviderResult], final_text: &str) -> Vec<(String, f32)> {
    let final_lower = final_text.to_lowercase();
    let raw: Vec<(String, f64)> = usable
        .iter()
        .map(|p| (p.provider.to_string(), lcs_ratio(&p.text.to_lowercase(), &final_lower)))
        .collect();
    let total: f64 = raw.iter().map(|(_, s)| s).sum();
    if total == 0.0 {
        let share = 1.0 / raw.len() as f32;
        return raw.into_iter().map(|(name, _)| (name, share)).collect();
    }
    raw.into_iter()
        .map(|(name, s)| (name, (s / total) as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_llm::FakeLlmClient;

    fn usable(provider: &'static str, text: &str, confidence: f32) -> ProviderResult {
        ProviderResult {
            provider,
            text: text.to_string(),
            confidence,
            error: None,
        }
    }

    #[tokio::test]
    async fn fuse_returns_empty_when_no_provider_usable() {
        let llm = FakeLlmClient::new(vec![]);
        let providers = vec![
            ProviderResult::failed("llm_vision", "timeout"),
            ProviderResult::failed("tesseract", "no text"),
            ProviderResult::failed("textract", "error"),
        ];
        let result = fuse(providers, &llm).await.unwrap();
        assert_eq!(result.text, "");
        assert_eq!(result.confidence, 0.0);
    }

    #[tokio::test]
    async fn fuse_penalizes_single_usable_provider_by_30_percent() {
        let llm = FakeLlmClient::new(vec![]);
        let providers = vec![
            usable("llm_vision", "Maria Papadopoulou, Software Engineer", 0.95),
            ProviderResult::failed("tesseract", "no text"),
            ProviderResult::failed("textract", "error"),
        ];
        let result = fuse(providers, &llm).await.unwrap();
        assert!((result.confidence - 0.95 * 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn fuse_picks_highest_confidence_text_on_high_agreement() {
        let llm = FakeLlmClient::new(vec![]);
        let providers = vec![
            usable("llm_vision", "Maria Papadopoulou Software Engineer", 0.95),
            usable("tesseract", "Maria Papadopoulou Software Engineer", 0.80),
            usable("textract", "Maria Papadopoulou Software Engineer", 0.85),
        ];
        let result = fuse(providers, &llm).await.unwrap();
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.text, "Maria Papadopoulou Software Engineer");
    }

    #[tokio::test]
    async fn fuse_invokes_arbitration_on_low_agreement() {
        let llm = FakeLlmClient::new(vec!["arbitrated merged text".to_string()]);
        let providers = vec![
            usable("llm_vision", "completely different text alpha", 0.95),
            usable("tesseract", "nothing resembling the others bravo", 0.60),
            usable("textract", "yet another disagreeing reading charlie", 0.70),
        ];
        let result = fuse(providers, &llm).await.unwrap();
        assert_eq!(result.text, "arbitrated merged text");
        assert_eq!(result.confidence, 0.70);
    }

    #[test]
    fn attribution_sums_to_one() {
        let providers = vec![
            usable("llm_vision", "Maria Papadopoulou", 0.95),
            usable("tesseract", "Maria Papadopouiou", 0.80),
        ];
        let refs: Vec<&ProviderResult> = providers.iter().collect();
        let attribution = attribute(&refs, "Maria Papadopoulou");
        let total: f32 = attribution.iter().map(|(_, s)| s).sum();
        assert!((total - 1.0).abs() < 1e-4);
    }
}
