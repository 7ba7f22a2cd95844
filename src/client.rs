use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};
use crate::settings::Settings;

pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";

/// Turns document text into a raw JSON-shaped response.
#[async_trait]
pub trait ExtractionClient: Send + Sync {
    async fn extract(&self, system_prompt: &str, document: &str) -> Result<String>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// OpenAI-compatible chat completions client (OpenRouter by default).
pub struct OpenRouterClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenRouterClient {
    /// Fails with `Configuration` when no key is given, before any document is touched.
    pub fn new(settings: &Settings, api_key: Option<String>) -> Result<Self> {
        let api_key = api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| PipelineError::Configuration(format!("{} is not set", API_KEY_VAR)))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(settings.request_timeout_secs))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(OpenRouterClient {
            http,
            api_key: SecretString::from(api_key),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
        })
    }

    pub fn from_env(settings: &Settings) -> Result<Self> {
        Self::new(settings, std::env::var(API_KEY_VAR).ok())
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl ExtractionClient for OpenRouterClient {
    async fn extract(&self, system_prompt: &str, document: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: document,
                },
            ],
        };

        let start = Instant::now();
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| PipelineError::Service(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Service(format!("Unreadable response: {}", e)))?;
        debug!(
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            "chat completion returned"
        );

        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| PipelineError::Service("No message content in response".into()))
    }
}

/// Rejected credentials are fatal; everything else only costs the current document.
fn status_error(status: StatusCode, body: &str) -> PipelineError {
    let body = body.trim();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PipelineError::Configuration(format!(
            "{} rejected by provider ({}): {}",
            API_KEY_VAR, status, body
        )),
        _ => PipelineError::Service(format!("HTTP {}: {}", status, body)),
    }
}
