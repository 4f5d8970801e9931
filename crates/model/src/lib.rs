use std::env;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";
pub const DEFAULT_MODEL: &str = "qwen-plus";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(6);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(40);

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model credential is not configured: {0}")]
    Configuration(String),
    #[error("model transport failure: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model endpoint returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("model response is missing completion content: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone)]
pub struct DashScopeConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl DashScopeConfig {
    /// Read credentials and endpoint overrides from the environment.
    /// Returns `None` when no API key is set, which callers treat as
    /// "heuristic-only mode" rather than an error.
    pub fn from_env() -> Option<Self> {
        let api_key = env::var("DASHSCOPE_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())?;

        Some(Self {
            api_key,
            base_url: env::var("DASHSCOPE_BASE_URL")
                .ok()
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: env::var("DASHSCOPE_MODEL")
                .ok()
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub temperature: f64,
    pub top_p: Option<f64>,
    /// Overrides the configured model for this call when set.
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// Single-shot chat-completion client for DashScope's OpenAI-compatible
/// endpoint. Holds only the connection pool and credential; no retries and
/// no request-scoped state, so one instance is shared across all requests.
#[derive(Debug, Clone)]
pub struct DashScopeClient {
    config: DashScopeConfig,
    http: reqwest::Client,
}

impl DashScopeClient {
    pub fn new(config: DashScopeConfig) -> Result<Self, ModelError> {
        if config.api_key.is_empty() {
            return Err(ModelError::Configuration(
                "DASHSCOPE_API_KEY is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self { config, http })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Issue one chat completion and return the first choice's text content.
    /// A failure propagates immediately; the orchestrating service decides
    /// whether to fall back.
    pub async fn chat_complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &ChatOptions,
    ) -> Result<String, ModelError> {
        let model = options.model.as_deref().unwrap_or(&self.config.model);
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut body = serde_json::json!({
            "model": model,
            "temperature": options.temperature,
            "messages": [
                ChatMessage { role: "system", content: system_prompt },
                ChatMessage { role: "user", content: user_prompt },
            ],
        });
        if let Some(top_p) = options.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }

        tracing::debug!(%model, url = %url, "dispatching chat completion");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response.json().await?;
        extract_completion_text(&data)
    }
}

fn extract_completion_text(data: &Value) -> Result<String, ModelError> {
    data.get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ModelError::Malformed(data.to_string()))
}
