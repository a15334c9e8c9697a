//! Gemini `generateContent` client.
//!
//! Sends the request text (optionally wrapped in a prompt template) to a
//! Gemini model and returns the model's answer as JSON. Answers are usually
//! asked for as JSON, and models like to wrap them in a Markdown code
//! fence; the fence is stripped before parsing. An answer that is not JSON
//! comes back as a JSON string.
//!
//! See: <https://ai.google.dev/api/generate-content>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::traits::Fetcher;
use crate::{MuninnError, Result};

/// Default base URL for the Gemini API
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

/// Placeholder substituted with the request text in prompt templates.
pub const TEXT_PLACEHOLDER: &str = "{text}";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClient {
    api_key: String,
    http: Client,
    base_url: String,
    model: String,
    prompt_template: Option<String>,
    timeout: Duration,
}

impl GeminiClient {
    /// Create a client for the public Gemini API.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            prompt_template: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Use a different model (e.g. `gemini-1.5-pro`).
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Wrap request text in a template. Every `{text}` is replaced with the
    /// request text.
    pub fn prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    /// Per-request timeout. Default: 30s.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the prompt sent for `text`.
    pub fn render_prompt(&self, text: &str) -> String {
        match &self.prompt_template {
            Some(template) => template.replace(TEXT_PLACEHOLDER, text),
            None => text.to_string(),
        }
    }

    /// Ask the model about `text` and return its answer.
    pub async fn generate(&self, text: &str) -> Result<Value> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let prompt = self.render_prompt(text);

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(self.timeout)
            .json(&GenerateContentRequest {
                contents: vec![RequestContent {
                    parts: vec![RequestPart { text: &prompt }],
                }],
            })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(self.error_for_status(response).await);
        }

        let body: GenerateContentResponse = response.json().await.map_err(transport_error)?;
        let answer = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().find_map(|p| p.text))
            .ok_or(MuninnError::EmptyResponse)?;

        debug!(model = %self.model, answer_len = answer.len(), "gemini answered");
        Ok(parse_answer(&answer))
    }

    /// Map a non-success response to an error.
    async fn error_for_status(&self, response: reqwest::Response) -> MuninnError {
        let status = response.status();
        match status.as_u16() {
            401 | 403 => MuninnError::AuthenticationFailed,
            404 => MuninnError::ModelNotFound(self.model.clone()),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                MuninnError::RateLimited { retry_after }
            }
            code => {
                let body = response.text().await.unwrap_or_default();
                let message = serde_json::from_str::<ErrorResponse>(&body)
                    .map(|e| e.error.message)
                    .unwrap_or_else(|_| format!("Gemini API error: {status}"));
                MuninnError::Api {
                    status: code,
                    message,
                }
            }
        }
    }
}

#[async_trait]
impl Fetcher<Value> for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn fetch(&self, text: &str) -> Result<Value> {
        self.generate(text).await
    }
}

fn transport_error(e: reqwest::Error) -> MuninnError {
    if e.is_timeout() {
        MuninnError::Timeout
    } else {
        MuninnError::Http(e.to_string())
    }
}

/// Parse a model answer as JSON, stripping a Markdown code fence first.
/// Non-JSON answers become a JSON string, without the fence.
pub fn parse_answer(answer: &str) -> Value {
    let unfenced = strip_code_fence(answer.trim());
    serde_json::from_str(unfenced).unwrap_or_else(|_| Value::String(unfenced.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<RequestContent<'a>>,
}

#[derive(Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}
