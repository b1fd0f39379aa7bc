use crate::ai::{GenerationBackend, GenerationOptions, Provider};
use crate::config::ModelSettings;
use crate::error::MangabaError;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ClaudeMessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    top_k: u32,
    messages: Vec<ClaudeMessage>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct ClaudeMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessagesResponse {
    #[serde(default)]
    content: Vec<ClaudeContentBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
    error: ClaudeErrorBody,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorBody {
    message: String,
}

impl ClaudeClient {
    pub fn new(settings: &ModelSettings) -> Result<Self, MangabaError> {
        let endpoint = settings
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            "anthropic-version",
            header::HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        let key_value = header::HeaderValue::from_str(&settings.api_key)
            .map_err(|e| MangabaError::Config(format!("invalid Anthropic API key format: {}", e)))?;
        headers.insert("x-api-key", key_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| MangabaError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationBackend for ClaudeClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, MangabaError> {
        let request = ClaudeMessagesRequest {
            model: self.model.clone(),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_k: options.top_k,
            messages: vec![ClaudeMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        log::debug!("[CLAUDE] Sending request with model {}", self.model);

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| backend_error(format!("API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<ClaudeErrorResponse>(&error_text) {
                return Err(backend_error(format!(
                    "API error ({}): {}",
                    status, error_response.error.message
                )));
            }

            return Err(backend_error(format!(
                "API returned error status: {}, body: {}",
                status, error_text
            )));
        }

        let response_data: ClaudeMessagesResponse = response
            .json()
            .await
            .map_err(|e| backend_error(format!("failed to parse response: {}", e)))?;

        let content = response_data
            .content
            .iter()
            .filter_map(|block| match block {
                ClaudeContentBlock::Text { text } => Some(text.as_str()),
                ClaudeContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(MangabaError::EmptyResponse);
        }

        log::debug!("[CLAUDE] Response received ({} chars)", content.len());
        Ok(content)
    }
}

fn backend_error(message: String) -> MangabaError {
    MangabaError::Backend {
        provider: "anthropic",
        message,
    }
}
