use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ApiError;

/// OpenRouter API base URL
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Candidate models in priority order: cheaper free-tier models first, the
/// auto-routing catch-all last.
pub const CANDIDATE_MODELS: &[&str] = &[
    "meta-llama/llama-3.1-8b-instruct:free",
    "google/gemma-2-9b-it:free",
    "mistralai/mistral-7b-instruct:free",
    "openrouter/auto",
];

/// Hard deadline for a single model attempt.
pub const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(10);

const MAX_TOKENS: u32 = 300;

const CAPTION_PROMPT: &str = "Please describe this image in detail. Be specific about objects, people, colors, setting, and any text visible. Provide a comprehensive caption that would be useful for someone who cannot see the image.";

const APP_REFERER: &str = "https://ai-caption-tool.vercel.app";
const APP_TITLE: &str = "AI Image Captioning Tool";

/// Failure of a single model attempt. Swallowed by the fallback chain; only
/// the last one is kept for diagnostics when every candidate fails.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("timed out after {}ms", ATTEMPT_TIMEOUT.as_millis())]
    TimedOut,

    #[error("network error: {0}")]
    Network(String),

    #[error("api error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("model returned an empty caption")]
    EmptyCaption,
}

/// One inference attempt against a named model. The seam exists so the
/// fallback chain can be exercised without a live API.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn describe_image(
        &self,
        model: &str,
        image_data_uri: &str,
    ) -> Result<String, AttemptError>;
}

// ============================================================================
// OpenRouter wire types (OpenAI compatible)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl<'a> },
}

#[derive(Debug, Serialize)]
struct ImageUrl<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: UpstreamErrorDetail,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorDetail {
    message: String,
}

/// Production [`ModelClient`] talking to OpenRouter's chat completions API.
pub struct OpenRouterClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenRouterClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        let client = Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url,
        }
    }
}

#[async_trait]
impl ModelClient for OpenRouterClient {
    async fn describe_image(
        &self,
        model: &str,
        image_data_uri: &str,
    ) -> Result<String, AttemptError> {
        let body = ChatRequest {
            model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: CAPTION_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: image_data_uri,
                        },
                    },
                ],
            }],
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AttemptError::TimedOut
                } else {
                    AttemptError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AttemptError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<UpstreamErrorBody>(&text)
                .map(|e| e.error.message)
                .unwrap_or(text);
            return Err(AttemptError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&text).map_err(|e| AttemptError::InvalidResponse(e.to_string()))?;

        let caption = parsed
            .choices
            .first()
            .and_then(|c| c.message.content.as_deref())
            .unwrap_or("")
            .trim()
            .to_string();

        if caption.is_empty() {
            return Err(AttemptError::EmptyCaption);
        }

        Ok(caption)
    }
}

/// Sequential fallback over candidate models: first non-empty caption wins,
/// a failed attempt moves on to the next candidate, exhaustion surfaces as
/// [`ApiError::ProviderUnavailable`]. No retries, no backoff, no racing.
pub struct CaptionProvider {
    client: Arc<dyn ModelClient>,
    candidates: Vec<String>,
}

impl CaptionProvider {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self {
            client,
            candidates: CANDIDATE_MODELS.iter().map(|m| (*m).to_string()).collect(),
        }
    }

    pub async fn caption(&self, image_data_uri: &str) -> Result<String, ApiError> {
        let mut last_error: Option<AttemptError> = None;

        for model in &self.candidates {
            debug!(model, "trying caption model");

            let attempt =
                tokio::time::timeout(ATTEMPT_TIMEOUT, self.client.describe_image(model, image_data_uri));

            match attempt.await {
                Ok(Ok(caption)) => {
                    info!(model, "caption generated");
                    return Ok(caption);
                }
                Ok(Err(err)) => {
                    warn!(model, error = %err, "caption model failed");
                    last_error = Some(err);
                }
                Err(_) => {
                    warn!(model, "caption model timed out");
                    last_error = Some(AttemptError::TimedOut);
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no candidate models configured".to_string());
        Err(ApiError::ProviderUnavailable(detail))
    }
}
