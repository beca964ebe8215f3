//! Text-generation service boundary and its OpenAI-compatible client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, Request, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Field, Unit};
use crate::util::{compact_text, is_http_url, normalize_text_option};

pub const DEFAULT_TEXT_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Translate source text into the target locale
    Translate,
    /// Rewrite an existing translation to fit its budget
    Shorten,
}

/// Hints passed along with every call for one target locale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationContext {
    /// Already-translated app name for the target locale
    #[serde(default)]
    pub app_title: Option<String>,
    /// Free-form tone or terminology instruction
    #[serde(default)]
    pub style: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub mode: GenerationMode,
    pub text: String,
    pub source_locale: String,
    pub target_locale: String,
    pub field: Field,
    pub max_len: usize,
    pub unit: Unit,
    pub context: TranslationContext,
}

impl GenerationRequest {
    /// System instruction sent to the model.
    pub fn instruction(&self) -> String {
        let mut instruction = match self.mode {
            GenerationMode::Translate => format!(
                "Translate the app store {} from {} to {}. The result must be at most {} {}. \
                 Reply with the translated text only.",
                self.field, self.source_locale, self.target_locale, self.max_len,
                self.unit.label()
            ),
            GenerationMode::Shorten => format!(
                "Rewrite this {} app store {} so it is at most {} {} while keeping its meaning. \
                 Reply with the rewritten text only.",
                self.target_locale,
                self.field,
                self.max_len,
                self.unit.label()
            ),
        };
        if let Some(title) = self.context.app_title.as_deref() {
            instruction.push_str(&format!(" The app is called \"{title}\" in this language."));
        }
        if let Some(style) = self.context.style.as_deref() {
            instruction.push(' ');
            instruction.push_str(style);
        }
        instruction
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerationError {
    #[error("Text service rate limited the request")]
    RateLimited {
        /// Server-suggested wait before retrying
        retry_after: Option<Duration>,
    },
    #[error("Text service request failed: {0}")]
    Failed(String),
}

/// A service that produces text from an instruction.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatibleGenerator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiCompatibleGenerator {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("OpenAiCompatibleGenerator")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

impl OpenAiCompatibleGenerator {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self, GenerationError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !is_http_url(&base_url) {
            return Err(GenerationError::Failed(
                "text API URL must start with http:// or https://".to_string(),
            ));
        }
        let api_key = normalize_text_option(Some(api_key.into()))
            .ok_or_else(|| GenerationError::Failed("text API key must not be empty".to_string()))?;
        let model = normalize_text_option(Some(model.into()))
            .unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string());
        let client = Client::builder()
            .build()
            .map_err(|error| GenerationError::Failed(error.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key,
            model,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> Result<Request, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: 0.2,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: request.instruction(),
                },
                ChatMessage {
                    role: "user",
                    content: request.text.clone(),
                },
            ],
        };
        self.client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .build()
            .map_err(|error| GenerationError::Failed(error.to_string()))
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatibleGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let http_request = self.build_request(request)?;
        let response = self
            .client
            .execute(http_request)
            .await
            .map_err(|error| GenerationError::Failed(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(parse_retry_after);
            return Err(GenerationError::RateLimited { retry_after });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::Failed(format!(
                "HTTP {}: {}",
                status.as_u16(),
                compact_text(&body)
            )));
        }

        let payload: ChatResponse = response
            .json()
            .await
            .map_err(|error| GenerationError::Failed(error.to_string()))?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| normalize_text_option(Some(choice.message.content)))
            .ok_or_else(|| GenerationError::Failed("empty completion".to_string()))
    }
}

/// Longest `Retry-After` hint honoured; larger values are clamped.
const MAX_RETRY_AFTER_SECS: f64 = 600.0;

/// Parse a `Retry-After` header given in whole or fractional seconds.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| Duration::from_secs_f64(seconds.min(MAX_RETRY_AFTER_SECS)))
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}
