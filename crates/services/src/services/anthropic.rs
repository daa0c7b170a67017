//! Anthropic Messages API client behind the [`TextGenerator`] seam.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("missing api key: ANTHROPIC_API_KEY environment variable not set")]
    MissingApiKey,
    #[error("network error: {0}")]
    Transport(String),
    #[error("timeout")]
    Timeout,
    #[error("http {status}: {body}")]
    Http { status: u16, body: String },
    #[error("vendor rate limited")]
    VendorRateLimited,
    #[error("invalid api key")]
    InvalidApiKey,
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// One generation request: a system instruction plus a user instruction.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Completed (non-streaming) generation result.
#[derive(Debug, Clone)]
pub struct Generated {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, GenerationError>> + Send>>;

/// Seam for the text-generation backend, so feature pipelines can run against
/// a scripted generator in tests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, request: GenerationRequest) -> Result<Generated, GenerationError>;

    /// Incremental text fragments. Cancelling the token ends the stream and
    /// drops the underlying vendor call.
    async fn stream(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, GenerationError>;
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct SseDeltaEvent {
    delta: SseDelta,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum SseDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Anthropic Messages API client.
#[derive(Debug, Clone)]
pub struct Anthropic {
    http: Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl Anthropic {
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

    /// Create a client from the ANTHROPIC_API_KEY environment variable. A
    /// missing key is a fatal configuration error, surfaced at startup.
    pub fn from_env(model: Option<String>) -> Result<Self, GenerationError> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map(SecretString::from)
            .map_err(|_| GenerationError::MissingApiKey)?;
        Self::new(api_key, model)
    }

    pub fn new(api_key: SecretString, model: Option<String>) -> Result<Self, GenerationError> {
        let http = Client::builder()
            .timeout(Self::REQUEST_TIMEOUT)
            .user_agent(concat!("tracklite/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GenerationError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: API_URL.to_string(),
        })
    }

    /// Point the client at a different endpoint (tests, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn api_request(&self, request: GenerationRequest, stream: bool) -> ApiRequest {
        ApiRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            system: request.system,
            messages: vec![Message {
                role: "user",
                content: request.user,
            }],
            stream,
        }
    }

    async fn send(&self, request: &ApiRequest) -> Result<reqwest::Response, GenerationError> {
        let res = self
            .http
            .post(&self.base_url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        match res.status() {
            s if s.is_success() => Ok(res),
            StatusCode::UNAUTHORIZED => Err(GenerationError::InvalidApiKey),
            StatusCode::TOO_MANY_REQUESTS => Err(GenerationError::VendorRateLimited),
            s => {
                let status = s.as_u16();
                let body = res.text().await.unwrap_or_default();
                Err(GenerationError::Http { status, body })
            }
        }
    }
}

#[async_trait]
impl TextGenerator for Anthropic {
    async fn complete(&self, request: GenerationRequest) -> Result<Generated, GenerationError> {
        let api_request = self.api_request(request, false);
        let response = self
            .send(&api_request)
            .await?
            .json::<ApiResponse>()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;

        let text = response
            .content
            .into_iter()
            .find_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
            })
            .ok_or_else(|| GenerationError::Malformed("no text content in response".to_string()))?;

        Ok(Generated {
            text,
            input_tokens: response.usage.input_tokens,
            output_tokens: response.usage.output_tokens,
        })
    }

    async fn stream(
        &self,
        request: GenerationRequest,
        cancel: CancellationToken,
    ) -> Result<TextStream, GenerationError> {
        let api_request = self.api_request(request, true);
        let response = self.send(&api_request).await?;

        let fragments = response
            .bytes_stream()
            .eventsource()
            .filter_map(|item| async move {
                match item {
                    Ok(event) => match event.event.as_str() {
                        "content_block_delta" => {
                            match serde_json::from_str::<SseDeltaEvent>(&event.data) {
                                Ok(SseDeltaEvent {
                                    delta: SseDelta::TextDelta { text },
                                }) => Some(Ok(text)),
                                Ok(_) => None,
                                Err(e) => Some(Err(GenerationError::Malformed(e.to_string()))),
                            }
                        }
                        "error" => Some(Err(GenerationError::Malformed(event.data))),
                        // message_start, ping, content_block_stop, message_delta,
                        // message_stop and unknown future events carry no text.
                        _ => None,
                    },
                    Err(e) => Some(Err(GenerationError::Transport(e.to_string()))),
                }
            })
            .take_until(cancel.cancelled_owned());

        Ok(Box::pin(fragments))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> GenerationError {
    if e.is_timeout() {
        GenerationError::Timeout
    } else {
        GenerationError::Transport(e.to_string())
    }
}

/// Extract JSON from a response that may wrap it in a markdown code block.
pub fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let content_start = start + 7;
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let content_start = start + 3;
        // Skip past any language identifier on the same line.
        let content_start = text[content_start..]
            .find('\n')
            .map(|i| content_start + i + 1)
            .unwrap_or(content_start);
        if let Some(end) = text[content_start..].find("```") {
            return text[content_start..content_start + end].trim();
        }
    }

    text
}

/// Parse a structured response, stripping any code fencing first. A parse
/// failure is a hard error; there is no partial-result fallback.
pub fn parse_json_response<T: DeserializeOwned>(text: &str) -> Result<T, GenerationError> {
    let json_str = extract_json(text);
    if json_str.is_empty() {
        return Err(GenerationError::Malformed(
            "empty response from model".to_string(),
        ));
    }

    serde_json::from_str(json_str).map_err(|e| {
        tracing::error!(
            json_error = %e,
            response_preview = %json_str.chars().take(500).collect::<String>(),
            "failed to parse structured model response"
        );
        GenerationError::Malformed(e.to_string())
    })
}
