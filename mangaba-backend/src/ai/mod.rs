//! Generation backends
//!
//! One capability interface ([`GenerationBackend`]) and one reqwest adapter
//! per provider, selected through [`AiClient::from_settings`].

pub mod claude;
pub mod gemini;
pub mod openai;

pub use claude::ClaudeClient;
pub use gemini::GeminiClient;
pub use openai::OpenAIClient;

use crate::config::ModelSettings;
use crate::error::MangabaError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum backoff delay between retries of a transient backend failure
const MIN_BACKOFF_SECS: u64 = 5;
/// Maximum backoff delay between retries
const MAX_BACKOFF_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenAI,
    Anthropic,
}

impl Provider {
    pub fn all() -> Vec<Provider> {
        vec![Provider::Gemini, Provider::OpenAI, Provider::Anthropic]
    }

    pub fn from_str(s: &str) -> Option<Provider> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Some(Provider::Gemini),
            "openai" | "gpt" => Some(Provider::OpenAI),
            "anthropic" | "claude" => Some(Provider::Anthropic),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAI => "openai",
            Provider::Anthropic => "anthropic",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sampling parameters passed with every generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        GenerationOptions {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_tokens: 2048,
        }
    }
}

impl From<&ModelSettings> for GenerationOptions {
    fn from(settings: &ModelSettings) -> Self {
        GenerationOptions {
            temperature: settings.temperature,
            top_k: settings.top_k,
            top_p: settings.top_p,
            max_tokens: settings.max_tokens,
        }
    }
}

/// The single capability every provider adapter implements.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, MangabaError>;

    /// Cheap smoke call used to validate credentials at startup.
    async fn validate(&self) -> Result<(), MangabaError> {
        let options = GenerationOptions {
            max_tokens: 16,
            ..GenerationOptions::default()
        };
        self.generate("Reply with the single word: ok", &options)
            .await
            .map(|_| ())
    }
}

/// Unified client over the configured providers.
pub enum AiClient {
    Gemini(GeminiClient),
    OpenAI(OpenAIClient),
    Claude(ClaudeClient),
}

impl AiClient {
    /// Build the adapter for a provider from its settings.
    pub fn from_settings(
        provider: Provider,
        settings: &ModelSettings,
    ) -> Result<Self, MangabaError> {
        if !settings.is_configured() {
            return Err(MangabaError::Config(format!(
                "no API key configured for provider '{}'",
                provider
            )));
        }
        match provider {
            Provider::Gemini => Ok(AiClient::Gemini(GeminiClient::new(settings)?)),
            Provider::OpenAI => Ok(AiClient::OpenAI(OpenAIClient::new(settings)?)),
            Provider::Anthropic => Ok(AiClient::Claude(ClaudeClient::new(settings)?)),
        }
    }
}

#[async_trait]
impl GenerationBackend for AiClient {
    fn provider(&self) -> Provider {
        match self {
            AiClient::Gemini(_) => Provider::Gemini,
            AiClient::OpenAI(_) => Provider::OpenAI,
            AiClient::Claude(_) => Provider::Anthropic,
        }
    }

    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, MangabaError> {
        match self {
            AiClient::Gemini(client) => client.generate(prompt, options).await,
            AiClient::OpenAI(client) => client.generate(prompt, options).await,
            AiClient::Claude(client) => client.generate(prompt, options).await,
        }
    }
}

/// Generate with exponential backoff on transient failures.
///
/// Non-transient errors (bad credentials, malformed requests) propagate
/// immediately; transient ones (rate limits, gateway errors, timeouts) are
/// retried up to `max_retries` times with a doubling delay, capped.
pub async fn generate_with_retry(
    backend: &dyn GenerationBackend,
    prompt: &str,
    options: &GenerationOptions,
    max_retries: u32,
) -> Result<String, MangabaError> {
    let mut delay = MIN_BACKOFF_SECS;
    let mut attempt = 0;
    loop {
        match backend.generate(prompt, options).await {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < max_retries => {
                attempt += 1;
                log::warn!(
                    "[AI] Transient {} error (attempt {}/{}), retrying in {}s: {}",
                    backend.provider(),
                    attempt,
                    max_retries,
                    delay,
                    e
                );
                tokio::time::sleep(Duration::from_secs(delay)).await;
                delay = (delay * 2).min(MAX_BACKOFF_SECS);
            }
            Err(e) => return Err(e),
        }
    }
}
