use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::error::AppError;
use crate::models::{
    Content, GenerateContentRequest, GenerateContentResponse, GeneratedVerdict, GenerationConfig,
    Part,
};
use crate::sanitize::{remove_emphasis_marks, strip_code_fence};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";
pub const TEMPERATURE: f32 = 0.9;

/// Why a generation attempt failed. Logged, then collapsed into `AppError::GenerationFailed`.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("response contained no text")]
    EmptyResponse,

    #[error("response was not a verdict: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Anything that can turn a prompt into a verdict
#[async_trait]
pub trait VerdictGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedVerdict, AppError>;
}

/// Parse raw model text into a verdict: trim, unwrap a code fence, read strict JSON,
/// and drop emphasis marks from the explanation.
pub fn parse_generation(text: &str) -> Result<GeneratedVerdict, GenerationError> {
    let json_text = strip_code_fence(text);
    let mut verdict: GeneratedVerdict = serde_json::from_str(&json_text)?;
    verdict.result = remove_emphasis_marks(verdict.result.as_str());
    Ok(verdict)
}

pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(endpoint: &str, model: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// One call to `generateContent`, returning the raw text of the first candidate
    pub async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: TEMPERATURE,
            },
        };

        let res = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status, body });
        }

        let body: GenerateContentResponse = res.json().await?;
        body.text().ok_or(GenerationError::EmptyResponse)
    }

    async fn try_generate(&self, prompt: &str) -> Result<GeneratedVerdict, GenerationError> {
        let text = self.generate_text(prompt).await?;
        parse_generation(&text)
    }
}

#[async_trait]
impl VerdictGenerator for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<GeneratedVerdict, AppError> {
        self.try_generate(prompt).await.map_err(|e| {
            tracing::error!(model = %self.model, "Gemini API error: {}", e);
            AppError::GenerationFailed
        })
    }
}
