//! Process-wide configuration
//!
//! Every recognized option lives in an explicit typed struct; the composition
//! root builds one `Config` and hands it to [`crate::runtime::MangabaAI`].
//! Nothing here has side effects at load time.
//!
//! Values come from environment variables (with defaults) or from a JSON file
//! in the same shape; a missing file falls back to the environment.

use crate::ai::Provider;
use crate::error::MangabaError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;

/// Generation settings for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    /// Override for the provider endpoint (proxies, self-hosted gateways).
    #[serde(default)]
    pub endpoint: Option<String>,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_tokens: u32,
}

impl ModelSettings {
    fn with_defaults(model: &str) -> Self {
        ModelSettings {
            api_key: String::new(),
            model: model.to_string(),
            endpoint: None,
            temperature: 0.7,
            top_k: 40,
            top_p: 0.95,
            max_tokens: 2048,
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

/// Per-provider model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub gemini: ModelSettings,
    pub openai: ModelSettings,
    pub anthropic: ModelSettings,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        ModelsConfig {
            gemini: ModelSettings::with_defaults("gemini-1.5-flash"),
            openai: ModelSettings::with_defaults("gpt-4o"),
            anthropic: ModelSettings::with_defaults("claude-3-opus-20240229"),
        }
    }
}

impl ModelsConfig {
    pub fn settings(&self, provider: Provider) -> &ModelSettings {
        match provider {
            Provider::Gemini => &self.gemini,
            Provider::OpenAI => &self.openai,
            Provider::Anthropic => &self.anthropic,
        }
    }

    /// Providers that have an API key available.
    pub fn configured(&self) -> Vec<Provider> {
        Provider::all()
            .into_iter()
            .filter(|p| self.settings(*p).is_configured())
            .collect()
    }
}

/// Agent execution knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Upper bound on tasks started per scheduling round.
    pub max_concurrent_tasks: usize,
    /// Per-task wall clock limit for a single agent call; 0 disables it.
    pub task_timeout_secs: u64,
    /// Retries for transient backend failures (rate limits, gateway errors).
    pub max_retries: u32,
    /// Responses shorter than this get one elaboration retry.
    pub min_response_len: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            max_concurrent_tasks: 5,
            task_timeout_secs: 300,
            max_retries: 3,
            min_response_len: 50,
        }
    }
}

/// Shared context store bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Entries kept per agent history and in the global history (FIFO).
    pub max_context_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            max_context_size: 10,
        }
    }
}

/// Inter-agent mailbox knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunicationConfig {
    /// Messages kept per receiver queue before eviction kicks in.
    pub max_messages: usize,
    /// Default time-to-live for messages sent without an explicit ttl.
    pub message_ttl_secs: u64,
    /// Priorities are clamped to `0..priority_levels`.
    pub priority_levels: u8,
}

impl Default for CommunicationConfig {
    fn default() -> Self {
        CommunicationConfig {
            max_messages: 1000,
            message_ttl_secs: 3600,
            priority_levels: 5,
        }
    }
}

/// Context fusion knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextFusionConfig {
    /// Scopes kept before the least recently fused one is evicted.
    pub max_contexts: usize,
}

impl Default for ContextFusionConfig {
    fn default() -> Self {
        ContextFusionConfig { max_contexts: 10 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub models: ModelsConfig,
    pub agents: AgentConfig,
    pub memory: MemoryConfig,
    pub communication: CommunicationConfig,
    pub context_fusion: ContextFusionConfig,
}

impl Config {
    /// Build a configuration from environment variables, with defaults for
    /// anything unset. Unparsable numeric values are logged and defaulted.
    pub fn from_env() -> Self {
        let mut config = Config::default();

        config.models.gemini.api_key = env::var("GEMINI_API_KEY").unwrap_or_default();
        config.models.openai.api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        config.models.anthropic.api_key = env::var("ANTHROPIC_API_KEY").unwrap_or_default();

        if let Ok(model) = env::var("GEMINI_MODEL") {
            config.models.gemini.model = model;
        }
        if let Ok(model) = env::var("OPENAI_MODEL") {
            config.models.openai.model = model;
        }
        if let Ok(model) = env::var("ANTHROPIC_MODEL") {
            config.models.anthropic.model = model;
        }

        config.agents.max_concurrent_tasks =
            env_parse("MANGABA_MAX_CONCURRENT_TASKS", config.agents.max_concurrent_tasks);
        config.agents.task_timeout_secs =
            env_parse("MANGABA_TASK_TIMEOUT_SECS", config.agents.task_timeout_secs);
        config.agents.max_retries = env_parse("MANGABA_MAX_RETRIES", config.agents.max_retries);
        config.agents.min_response_len =
            env_parse("MANGABA_MIN_RESPONSE_LEN", config.agents.min_response_len);

        config.memory.max_context_size =
            env_parse("MANGABA_MEMORY_SIZE", config.memory.max_context_size);

        config.communication.max_messages =
            env_parse("MANGABA_MAX_MESSAGES", config.communication.max_messages);
        config.communication.message_ttl_secs =
            env_parse("MANGABA_MESSAGE_TTL_SECS", config.communication.message_ttl_secs);
        config.communication.priority_levels =
            env_parse("MANGABA_PRIORITY_LEVELS", config.communication.priority_levels);

        config.context_fusion.max_contexts =
            env_parse("MANGABA_MAX_CONTEXTS", config.context_fusion.max_contexts);

        config
    }

    /// Load a JSON configuration file. A missing file falls back to
    /// [`Config::from_env`]; a malformed file is an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, MangabaError> {
        let path = path.as_ref();
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "[CONFIG] {} not found, using environment configuration",
                    path.display()
                );
                return Ok(Config::from_env());
            }
            Err(e) => {
                return Err(MangabaError::Config(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        serde_json::from_str(&contents).map_err(|e| {
            MangabaError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Reject configurations that cannot work at all.
    pub fn validate(&self) -> Result<(), MangabaError> {
        if self.memory.max_context_size == 0 {
            return Err(MangabaError::Config(
                "memory.max_context_size must be at least 1".to_string(),
            ));
        }
        if self.communication.max_messages == 0 {
            return Err(MangabaError::Config(
                "communication.max_messages must be at least 1".to_string(),
            ));
        }
        if self.communication.priority_levels == 0 {
            return Err(MangabaError::Config(
                "communication.priority_levels must be at least 1".to_string(),
            ));
        }
        if self.context_fusion.max_contexts == 0 {
            return Err(MangabaError::Config(
                "context_fusion.max_contexts must be at least 1".to_string(),
            ));
        }
        for provider in Provider::all() {
            let settings = self.models.settings(provider);
            if settings.model.is_empty() {
                return Err(MangabaError::Config(format!(
                    "models.{}.model must not be empty",
                    provider.as_str()
                )));
            }
        }
        Ok(())
    }
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                log::warn!("[CONFIG] Ignoring unparsable {}='{}'", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}
