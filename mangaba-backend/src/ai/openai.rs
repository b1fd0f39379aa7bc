use crate::ai::{GenerationBackend, GenerationOptions, Provider};
use crate::config::ModelSettings;
use crate::error::MangabaError;
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Clone)]
pub struct OpenAIClient {
    client: Client,
    endpoint: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct OpenAICompletionRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAICompletionResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}

impl OpenAIClient {
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
        let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
            .map_err(|e| MangabaError::Config(format!("invalid OpenAI API key format: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth_value);

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
impl GenerationBackend for OpenAIClient {
    fn provider(&self) -> Provider {
        Provider::OpenAI
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, MangabaError> {
        let request = OpenAICompletionRequest {
            model: self.model.clone(),
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
        };

        log::debug!(
            "[OPENAI] Sending request to {} with model {}",
            self.endpoint,
            self.model
        );

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

            if let Ok(error_response) = serde_json::from_str::<OpenAIErrorResponse>(&error_text) {
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

        let response_data: OpenAICompletionResponse = response
            .json()
            .await
            .map_err(|e| backend_error(format!("failed to parse response: {}", e)))?;

        let content = response_data
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(MangabaError::EmptyResponse);
        }

        log::debug!("[OPENAI] Response received ({} chars)", content.len());
        Ok(content)
    }
}

fn backend_error(message: String) -> MangabaError {
    MangabaError::Backend {
        provider: "openai",
        message,
    }
}
