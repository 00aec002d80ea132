/// LLM Client: the single point of entry for all generator calls in Tailor.
///
/// The orchestrators only ever see the `Generator` trait. Tier selection
/// (default vs pro) is resolved to a concrete `Generator` through
/// `GeneratorRegistry` before any orchestration runs.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::generation::TokenUsage;
use crate::schema::SchemaValidator;

pub mod prompts;
pub mod sse;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const PROVIDER: &str = "anthropic";
const MAX_TOKENS: u32 = 4096;
const MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Rate limited after {retries} retries")]
    RateLimited { retries: u32 },

    #[error("LLM returned empty content")]
    EmptyContent,

    #[error("LLM output does not match the requested shape: {}", .0.join("; "))]
    ShapeMismatch(Vec<String>),

    #[error("stream error: {0}")]
    Stream(String),
}

/// Structured output plus the token accounting for the call that produced it.
#[derive(Debug, Clone)]
pub struct GeneratedObject {
    pub object: Value,
    pub usage: TokenUsage,
}

pub type TextStream = BoxStream<'static, Result<String, LlmError>>;

/// Capability interface for an external generator backend.
#[async_trait]
pub trait Generator: Send + Sync {
    fn provider(&self) -> &str;

    fn model(&self) -> &str;

    /// Produces one JSON object constrained to `target_schema`.
    async fn generate(
        &self,
        prompt: &str,
        target_schema: &SchemaValidator,
    ) -> Result<GeneratedObject, LlmError>;

    /// Opens an incremental text stream for `prompt`.
    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, LlmError>;
}

/// Default and pro generator tiers.
#[derive(Clone)]
pub struct GeneratorRegistry {
    default: Arc<dyn Generator>,
    pro: Arc<dyn Generator>,
}

impl GeneratorRegistry {
    pub fn new(default: Arc<dyn Generator>, pro: Arc<dyn Generator>) -> Self {
        Self { default, pro }
    }

    pub fn for_tier(&self, pro: bool) -> Arc<dyn Generator> {
        if pro {
            Arc::clone(&self.pro)
        } else {
            Arc::clone(&self.default)
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Anthropic Messages API wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<AnthropicMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ToolDefinition<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice<'a> {
    #[serde(rename = "type")]
    choice_type: &'a str,
    name: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct LlmResponse {
    pub content: Vec<ContentBlock>,
    pub usage: Usage,
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
    pub input: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl LlmResponse {
    /// Extracts the text content from the first text block.
    pub fn text(&self) -> Option<&str> {
        self.content
            .iter()
            .find(|b| b.block_type == "text")
            .and_then(|b| b.text.as_deref())
    }

    /// Extracts the arguments of the first tool call.
    pub fn tool_input(&self) -> Option<&Value> {
        self.content
            .iter()
            .find(|b| b.block_type == "tool_use")
            .and_then(|b| b.input.as_ref())
    }

    /// The structured object: tool-call arguments, or a JSON text block as fallback.
    fn object(&self) -> Result<Value, LlmError> {
        if let Some(input) = self.tool_input() {
            return Ok(input.clone());
        }
        let text = self.text().ok_or(LlmError::EmptyContent)?;
        // Strip markdown code fences if the model wraps JSON in them
        Ok(serde_json::from_str(strip_json_fences(text))?)
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicError {
    error: AnthropicErrorBody,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// LlmClient
// ────────────────────────────────────────────────────────────────────────────

/// Anthropic-backed `Generator`. One instance per model tier.
#[derive(Clone)]
pub struct LlmClient {
    client: Client,
    api_key: String,
    model: String,
}

impl LlmClient {
    /// No whole-request timeout is set on the HTTP client; streamed bodies are
    /// long-lived and callers bound each call with their own deadline.
    pub fn new(api_key: String, model: String) -> Result<Self, LlmError> {
        Ok(Self {
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()?,
            api_key,
            model,
        })
    }

    /// Sends a request, retrying on 429 (rate limit) and 5xx errors with
    /// exponential backoff. Returns the successful response unread.
    async fn send(&self, request_body: &AnthropicRequest<'_>) -> Result<reqwest::Response, LlmError> {
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s
                let delay = Duration::from_millis(1000 * (1 << (attempt - 1)));
                warn!(
                    "LLM call attempt {} failed, retrying after {}ms...",
                    attempt,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .header("content-type", "application/json")
                .json(request_body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => {
                    last_error = Some(LlmError::Http(e));
                    continue;
                }
            };

            let status = response.status();

            if status.as_u16() == 429 || status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                warn!("LLM API returned {}: {}", status, body);
                last_error = Some(LlmError::Api {
                    status: status.as_u16(),
                    message: body,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<AnthropicError>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or(body);
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or(LlmError::RateLimited {
            retries: MAX_RETRIES,
        }))
    }
}

#[async_trait]
impl Generator for LlmClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &str,
        target_schema: &SchemaValidator,
    ) -> Result<GeneratedObject, LlmError> {
        let request_body = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: prompts::STRUCTURED_SYSTEM,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            tools: Some(vec![ToolDefinition {
                name: prompts::RESUME_TOOL_NAME,
                description: prompts::RESUME_TOOL_DESCRIPTION,
                input_schema: target_schema.schema(),
            }]),
            tool_choice: Some(ToolChoice {
                choice_type: "tool",
                name: prompts::RESUME_TOOL_NAME,
            }),
            stream: false,
        };

        let llm_response: LlmResponse = self.send(&request_body).await?.json().await?;

        debug!(
            "LLM call succeeded: model={}, input_tokens={}, output_tokens={}",
            self.model, llm_response.usage.input_tokens, llm_response.usage.output_tokens
        );

        let object = llm_response.object()?;
        target_schema.check(&object).map_err(LlmError::ShapeMismatch)?;

        Ok(GeneratedObject {
            object,
            usage: TokenUsage::new(
                llm_response.usage.input_tokens,
                llm_response.usage.output_tokens,
            ),
        })
    }

    async fn generate_stream(&self, prompt: &str) -> Result<TextStream, LlmError> {
        let request_body = AnthropicRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: prompts::MARKDOWN_SYSTEM,
            messages: vec![AnthropicMessage {
                role: "user",
                content: prompt,
            }],
            tools: None,
            tool_choice: None,
            stream: true,
        };

        let response = self.send(&request_body).await?;
        debug!("LLM stream opened: model={}", self.model);
        Ok(sse::text_deltas(response.bytes_stream().boxed()))
    }
}

/// Strips ```json ... ``` or ``` ... ``` code fences from LLM output.
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
