//! Auxiliary tools agents can consult before generation

pub mod search;

pub use search::GoogleSearchTool;

use crate::error::MangabaError;
use async_trait::async_trait;

/// A tool an agent runs against the task text before generation.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    /// Whether this tool should run for the given task text. Tools without a
    /// trigger run for every task.
    fn matches(&self, _task_text: &str) -> bool {
        true
    }

    async fn run(&self, query: &str) -> Result<String, MangabaError>;
}
