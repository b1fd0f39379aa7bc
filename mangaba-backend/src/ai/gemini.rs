use crate::ai::{GenerationBackend, GenerationOptions, Provider};
use crate::config::ModelSettings;
use crate::error::MangabaError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "topP")]
    top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiErrorBody,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    message: String,
}

impl GeminiClient {
    pub fn new(settings: &ModelSettings) -> Result<Self, MangabaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| MangabaError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: settings
                .endpoint
                .clone()
                .unwrap_or_else(|| API_BASE.to_string()),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
        })
    }
}

#[async_trait]
impl GenerationBackend for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, MangabaError> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base, self.model, self.api_key
        );

        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: options.temperature,
                top_k: options.top_k,
                top_p: options.top_p,
                max_output_tokens: options.max_tokens,
            },
        };

        log::debug!("[GEMINI] Sending request with model {}", self.model);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| backend_error(format!("API request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();

            if let Ok(error_response) = serde_json::from_str::<GeminiErrorResponse>(&error_text) {
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

        let response_data: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| backend_error(format!("failed to parse response: {}", e)))?;

        let content = response_data
            .candidates
            .first()
            .map(|c| {
                c.content
                    .parts
                    .iter()
                    .map(|p| p.text.as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if content.is_empty() {
            return Err(MangabaError::EmptyResponse);
        }

        log::debug!("[GEMINI] Response received ({} chars)", content.len());
        Ok(content)
    }
}

fn backend_error(message: String) -> MangabaError {
    MangabaError::Backend {
        provider: "gemini",
        message,
    }
}
