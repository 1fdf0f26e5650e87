//! Scoring oracle client — the single point of entry for all generative-model
//! calls in the API.
//!
//! No other module may call the Gemini API directly. The workflow sees only
//! the `CvScorer` trait; `AppState` holds an `Arc<dyn CvScorer>`, so tests
//! swap in a fake without touching handler code.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::settings::{keys, SettingsStore};

pub mod prompts;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";
/// Used when the operator has not configured `GEMINI_MODEL_NAME`.
const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_TEMPERATURE: f32 = 0.7;
const MAX_OUTPUT_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ScorerError {
    #[error("scorer not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("model returned empty content")]
    EmptyContent,

    #[error("model returned an invalid report: {0}")]
    InvalidReport(#[from] serde_json::Error),

    #[error("rate limited after {retries} retries")]
    RateLimited { retries: u32 },
}

// ────────────────────────────────────────────────────────────────────────────
// Report data model (shared across all scorer backends)
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub category: String,
    pub recommendation: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordOptimization {
    pub present: Vec<String>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatFeedback {
    #[serde(deserialize_with = "clamped_rating")]
    pub rating: i32, // 1 – 5
    pub comments: Vec<String>,
}

/// Candidate identity highlights the dashboard surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub contact: Option<String>,
}

/// Present only when a prior analysis was supplied for comparison.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparativeFeedback {
    pub improvements_made: Vec<String>,
    pub points_to_still_improve: Vec<String>,
}

/// Full structured report returned by the oracle and stored verbatim in
/// `cv_analyses.analysis_result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvReport {
    #[serde(deserialize_with = "clamped_score")]
    pub score: i32, // 0 – 100
    pub overall_feedback: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub suggestions: Vec<Suggestion>,
    pub keyword_optimization: KeywordOptimization,
    pub format_feedback: FormatFeedback,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<ExtractedData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparative_feedback: Option<ComparativeFeedback>,
}

/// Models occasionally emit `87.0` or an out-of-range score. Accept any JSON
/// number and clamp into 0–100; anything non-numeric still fails the parse.
fn clamped_score<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(0.0, 100.0) as i32)
}

fn clamped_rating<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    Ok(raw.round().clamp(1.0, 5.0) as i32)
}

/// Parses oracle output into a typed report. Fails closed: a report missing
/// required fields never reaches the database.
pub fn parse_report(text: &str) -> Result<CvReport, ScorerError> {
    let text = strip_json_fences(text);
    Ok(serde_json::from_str(text)?)
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

/// One CV submission headed for the oracle.
pub struct ScoreRequest {
    pub file_bytes: Vec<u8>,
    pub file_name: String,
    pub mime_type: String,
    /// Role the candidate is targeting, when provided with the upload.
    pub target_role: Option<String>,
    /// The user's most recent stored report, for comparative feedback.
    pub previous_report: Option<serde_json::Value>,
}

/// The scoring oracle. Implement this to swap backends without touching the
/// workflow, handlers, or persistence.
///
/// Carried in `AppState` as `Arc<dyn CvScorer>`.
#[async_trait]
pub trait CvScorer: Send + Sync {
    async fn score(&self, request: ScoreRequest) -> Result<CvReport, ScorerError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Gemini request/response wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: SystemInstruction<'a>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct SystemInstruction<'a> {
    parts: Vec<TextPart<'a>>,
}

#[derive(Debug, Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}

impl GenerateContentResponse {
    /// Extracts the text of the first candidate's first text part.
    fn text(&self) -> Option<&str> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .and_then(|c| c.parts.iter().find_map(|p| p.text.as_deref()))
    }
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// GeminiScorer — production implementation
// ────────────────────────────────────────────────────────────────────────────

/// Scores CVs through the Gemini `generateContent` REST API.
///
/// Model name, prompt template, temperature and the API key are read from the
/// settings store on every call, so an operator change applies to the next
/// upload without a restart.
#[derive(Clone)]
pub struct GeminiScorer {
    client: Client,
    settings: SettingsStore,
}

impl GeminiScorer {
    pub fn new(settings: SettingsStore) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .expect("Failed to build HTTP client"),
            settings,
        }
    }

    async fn setting(&self, key: &str) -> Result<Option<String>, ScorerError> {
        self.settings
            .get(key)
            .await
            .map_err(|e| ScorerError::NotConfigured(format!("settings store unavailable: {e}")))
    }

    /// Calls the API with retries on 429 and 5xx, exponential backoff.
    async fn call(
        &self,
        api_key: &str,
        model: &str,
        body: &GenerateContentRequest<'_>,
    ) -> Result<GenerateContentResponse, ScorerError> {
        let url = format!("{GEMINI_API_BASE}/{model}:generateContent");
        let mut last_error: Option<ScorerError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s
                let delay = std::time::Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "Scoring call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", api_key)
                .header("content-type", "application/json")
                .json(body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(ScorerError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("Gemini API returned {}: {}", status, body);
                last_error = Some(ScorerError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<GeminiError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(ScorerError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            let parsed: GenerateContentResponse = response.json().await?;

            if let Some(usage) = &parsed.usage_metadata {
                debug!(
                    "Scoring call succeeded: prompt_tokens={:?}, output_tokens={:?}",
                    usage.prompt_token_count, usage.candidates_token_count
                );
            }

            return Ok(parsed);
        }

        Err(last_error.unwrap_or(ScorerError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl CvScorer for GeminiScorer {
    async fn score(&self, request: ScoreRequest) -> Result<CvReport, ScorerError> {
        // 1. Live configuration, missing key fails before any upload work
        let api_key = self
            .setting(keys::GEMINI_API_KEY)
            .await?
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ScorerError::NotConfigured("GEMINI_API_KEY is not set".to_string()))?;

        let model = self
            .setting(keys::GEMINI_MODEL_NAME)
            .await?
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let template = self
            .setting(keys::GEMINI_PROMPT_CV_ANALYSIS)
            .await?
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| prompts::DEFAULT_CV_ANALYSIS_PROMPT.to_string());

        let temperature = self
            .setting(keys::GEMINI_TEMPERATURE)
            .await?
            .and_then(|t| t.parse::<f32>().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);

        // 2. Assemble the user prompt and the inline file payload
        let prompt = prompts::build_user_prompt(
            &template,
            &request.file_name,
            request.target_role.as_deref(),
            request.previous_report.as_ref(),
        );

        let body = GenerateContentRequest {
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: prompts::SYSTEM_INSTRUCTION,
                }],
            },
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::Text { text: &prompt },
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: &request.mime_type,
                            data: BASE64.encode(&request.file_bytes),
                        },
                    },
                ],
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: MAX_OUTPUT_TOKENS,
                response_mime_type: "application/json",
            },
        };

        // 3. Call, extract, validate
        let response = self.call(&api_key, &model, &body).await?;
        let text = response.text().ok_or(ScorerError::EmptyContent)?;
        parse_report(text)
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from model output.
fn strip_json_fences(text: &str) -> &str {
    let text = text.trim();
    if let Some(stripped) = text.strip_prefix("```json") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else if let Some(stripped) = text.strip_prefix("```") {
        stripped
            .trim_start()
            .strip_suffix("```")
            .map(|s| s.trim())
            .unwrap_or(stripped.trim_start())
    } else {
        text
    }
}
