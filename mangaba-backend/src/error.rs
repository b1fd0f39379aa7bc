//! Error taxonomy for the task runner
//!
//! Backend and search failures are recorded against the task that triggered
//! them and never crash the run. Scheduling errors (cyclic dependencies,
//! unknown agents) abort before any task executes.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MangabaError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{provider} backend error: {message}")]
    Backend {
        provider: &'static str,
        message: String,
    },

    #[error("search failed: {0}")]
    Search(String),

    #[error("cyclic task dependencies: {0}")]
    CyclicDependency(String),

    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("agent '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("unknown task id {0}")]
    UnknownTask(usize),

    #[error("agent call timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("backend returned an empty response")]
    EmptyResponse,
}

impl MangabaError {
    /// Whether a retry with backoff is worth attempting.
    ///
    /// Mirrors the transient-error classification used for HTTP tools:
    /// timeouts, connection drops, rate limits and 5xx gateway errors.
    pub fn is_transient(&self) -> bool {
        let message = match self {
            MangabaError::Backend { message, .. } => message,
            MangabaError::Search(message) => message,
            _ => return false,
        };
        let lower = message.to_lowercase();
        lower.contains("timed out")
            || lower.contains("timeout")
            || lower.contains("connection")
            || lower.contains("rate limit")
            || lower.contains("429")
            || lower.contains("502")
            || lower.contains("503")
            || lower.contains("504")
    }
}
