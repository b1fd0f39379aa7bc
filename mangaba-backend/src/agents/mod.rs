//! Agents
//!
//! An agent binds a name and role to one generation backend. Before each
//! call it enriches the task text with its own recent history, the shared
//! global history and the results of prerequisite tasks; afterwards it
//! records the exchange in both histories.

use crate::ai::{generate_with_retry, GenerationBackend, GenerationOptions};
use crate::error::MangabaError;
use crate::memory::ContextualMemory;
use crate::tools::Tool;
use std::sync::Arc;

/// How many recent history entries are folded into each prompt.
const CONTEXT_WINDOW: usize = 3;

/// What an agent does with a generation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Return the error to the caller; the scheduler records it against the
    /// task and skips dependents.
    #[default]
    Propagate,
    /// Return the error as marker text in place of a result. Dependents will
    /// run and see the marker.
    Capture,
}

pub struct Agent {
    name: String,
    role: String,
    goal: String,
    backend: Arc<dyn GenerationBackend>,
    options: GenerationOptions,
    tools: Vec<Arc<dyn Tool>>,
    memory: Option<ContextualMemory>,
    error_policy: ErrorPolicy,
    min_response_len: usize,
    max_retries: u32,
}

pub struct AgentBuilder {
    agent: Agent,
}

impl AgentBuilder {
    pub fn new(name: impl Into<String>, backend: Arc<dyn GenerationBackend>) -> Self {
        AgentBuilder {
            agent: Agent {
                name: name.into(),
                role: String::new(),
                goal: String::new(),
                backend,
                options: GenerationOptions::default(),
                tools: Vec::new(),
                memory: None,
                error_policy: ErrorPolicy::default(),
                min_response_len: 0,
                max_retries: 0,
            },
        }
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.agent.role = role.into();
        self
    }

    pub fn goal(mut self, goal: impl Into<String>) -> Self {
        self.agent.goal = goal.into();
        self
    }

    pub fn options(mut self, options: GenerationOptions) -> Self {
        self.agent.options = options;
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.agent.tools.push(tool);
        self
    }

    pub fn memory(mut self, memory: ContextualMemory) -> Self {
        self.agent.memory = Some(memory);
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.agent.error_policy = policy;
        self
    }

    /// Responses shorter than this get one elaboration retry; 0 disables it.
    pub fn min_response_len(mut self, len: usize) -> Self {
        self.agent.min_response_len = len;
        self
    }

    /// Retries for transient backend failures.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.agent.max_retries = retries;
        self
    }

    pub fn build(self) -> Agent {
        self.agent
    }
}

impl Agent {
    pub fn builder(name: impl Into<String>, backend: Arc<dyn GenerationBackend>) -> AgentBuilder {
        AgentBuilder::new(name, backend)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    /// Execute one task: enrich the prompt, run matching tools, generate,
    /// and record the exchange.
    ///
    /// `dependency_results` are the completed results of the task's direct
    /// prerequisites, included verbatim in the prompt.
    pub async fn execute(
        &self,
        task_text: &str,
        dependency_results: &[String],
    ) -> Result<String, MangabaError> {
        log::info!("[AGENT] {} executing: {}", self.name, task_text);

        let mut prompt = self.enrich(task_text, dependency_results);
        self.append_tool_outputs(task_text, &mut prompt).await;

        match self.generate(&prompt).await {
            Ok(response) => {
                self.remember(task_text, &response);
                Ok(response)
            }
            Err(e) => match self.error_policy {
                ErrorPolicy::Propagate => Err(e),
                ErrorPolicy::Capture => {
                    let marker = format!("Generation error: {}", e);
                    log::warn!("[AGENT] {} captured failure: {}", self.name, e);
                    self.remember(task_text, &marker);
                    Ok(marker)
                }
            },
        }
    }

    fn enrich(&self, task_text: &str, dependency_results: &[String]) -> String {
        let mut prompt = String::new();

        if !self.role.is_empty() {
            prompt.push_str(&format!(
                "You are {}, acting as {}.\n",
                self.name, self.role
            ));
        }
        if !self.goal.is_empty() {
            prompt.push_str(&format!("Your goal: {}\n", self.goal));
        }
        if !prompt.is_empty() {
            prompt.push('\n');
        }

        if let Some(memory) = &self.memory {
            let individual = memory.recent_individual(&self.name, CONTEXT_WINDOW);
            if !individual.is_empty() {
                prompt.push_str("Your recent exchanges:\n");
                for entry in &individual {
                    prompt.push_str(&format!("- {} => {}\n", entry.input, entry.output));
                }
                prompt.push('\n');
            }

            let global = memory.recent_global(CONTEXT_WINDOW);
            if !global.is_empty() {
                prompt.push_str("Shared context:\n");
                for entry in &global {
                    prompt.push_str(&format!("- [{}] {}\n", entry.agent, entry.output));
                }
                prompt.push('\n');
            }
        }

        if !dependency_results.is_empty() {
            prompt.push_str("Results from prerequisite tasks:\n");
            for result in dependency_results {
                prompt.push_str(result);
                prompt.push('\n');
            }
            prompt.push('\n');
        }

        prompt.push_str(&format!("Task: {}", task_text));
        prompt
    }

    async fn append_tool_outputs(&self, task_text: &str, prompt: &mut String) {
        let mut outputs = Vec::new();
        for tool in &self.tools {
            if !tool.matches(task_text) {
                continue;
            }
            match tool.run(task_text).await {
                Ok(output) => outputs.push(format!("[{}] {}", tool.name(), output)),
                Err(e) => {
                    // A failed tool degrades the prompt, not the task.
                    log::warn!("[AGENT] {} tool '{}' failed: {}", self.name, tool.name(), e);
                    outputs.push(format!("[{}] error: {}", tool.name(), e));
                }
            }
        }
        if !outputs.is_empty() {
            prompt.push_str("\n\nTool results:\n");
            for output in &outputs {
                prompt.push_str(output);
                prompt.push('\n');
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String, MangabaError> {
        let response =
            generate_with_retry(&*self.backend, prompt, &self.options, self.max_retries).await?;

        if self.min_response_len > 0 && response.trim().len() < self.min_response_len {
            log::debug!(
                "[AGENT] {} response below {} chars, asking for elaboration",
                self.name,
                self.min_response_len
            );
            let elaboration_prompt = format!("{}\n\nPlease provide more detail.", prompt);
            match generate_with_retry(
                &*self.backend,
                &elaboration_prompt,
                &self.options,
                self.max_retries,
            )
            .await
            {
                Ok(elaborated) => return Ok(elaborated),
                Err(e) => {
                    log::warn!(
                        "[AGENT] {} elaboration retry failed, keeping short response: {}",
                        self.name,
                        e
                    );
                }
            }
        }

        Ok(response)
    }

    fn remember(&self, input: &str, output: &str) {
        if let Some(memory) = &self.memory {
            memory.store_individual(&self.name, input, output);
            memory.store_global(&self.name, input, output);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::Provider;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    struct ScriptedBackend {
        prompts: Mutex<Vec<String>>,
        replies: Mutex<Vec<Result<String, String>>>,
    }

    impl ScriptedBackend {
        fn new(replies: Vec<Result<String, String>>) -> Self {
            ScriptedBackend {
                prompts: Mutex::new(Vec::new()),
                replies: Mutex::new(replies),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn generate(
            &self,
            prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, MangabaError> {
            self.prompts.lock().push(prompt.to_string());
            let mut replies = self.replies.lock();
            match replies.remove(0) {
                Ok(text) => Ok(text),
                Err(message) => Err(MangabaError::Backend {
                    provider: "gemini",
                    message,
                }),
            }
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn matches(&self, task_text: &str) -> bool {
            task_text.contains("echo")
        }

        async fn run(&self, query: &str) -> Result<String, MangabaError> {
            Ok(format!("echoed {}", query))
        }
    }

    #[tokio::test]
    async fn test_prompt_contains_dependency_results_verbatim() {
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("done".to_string())]));
        let agent = Agent::builder("writer", backend.clone()).build();

        let deps = vec!["the researcher found three key trends".to_string()];
        agent.execute("Write a summary", &deps).await.unwrap();

        let prompts = backend.prompts.lock();
        assert!(prompts[0].contains("the researcher found three key trends"));
        assert!(prompts[0].contains("Task: Write a summary"));
    }

    #[tokio::test]
    async fn test_memory_written_after_execution() {
        let memory = ContextualMemory::new(5);
        let backend = Arc::new(ScriptedBackend::new(vec![Ok("an answer".to_string())]));
        let agent = Agent::builder("researcher", backend)
            .memory(memory.clone())
            .build();

        agent.execute("a question", &[]).await.unwrap();

        let history = memory.recall_individual("researcher");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].input, "a question");
        assert_eq!(history[0].output, "an answer");
        assert_eq!(memory.recall_global().len(), 1);
    }

    #[tokio::test]
    async fn test_recent_history_flows_into_next_prompt() {
        let memory = ContextualMemory::new(5);
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("first answer".to_string()),
            Ok("second answer".to_string()),
        ]));
        let agent = Agent::builder("analyst", backend.clone())
            .memory(memory.clone())
            .build();

        agent.execute("first question", &[]).await.unwrap();
        agent.execute("second question", &[]).await.unwrap();

        let prompts = backend.prompts.lock();
        assert!(prompts[1].contains("first answer"));
    }

    #[tokio::test]
    async fn test_short_response_triggers_one_elaboration_retry() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("ok".to_string()),
            Ok("a considerably longer elaborated answer".to_string()),
        ]));
        let agent = Agent::builder("writer", backend.clone())
            .min_response_len(10)
            .build();

        let result = agent.execute("explain", &[]).await.unwrap();
        assert_eq!(result, "a considerably longer elaborated answer");

        let prompts = backend.prompts.lock();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("Please provide more detail."));
    }

    #[tokio::test]
    async fn test_propagate_policy_returns_error() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err("boom".to_string())]));
        let agent = Agent::builder("writer", backend).build();

        assert!(agent.execute("explain", &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_capture_policy_returns_marker_text() {
        let backend = Arc::new(ScriptedBackend::new(vec![Err("boom".to_string())]));
        let agent = Agent::builder("writer", backend)
            .error_policy(ErrorPolicy::Capture)
            .build();

        let result = agent.execute("explain", &[]).await.unwrap();
        assert!(result.contains("Generation error"));
        assert!(result.contains("boom"));
    }

    #[tokio::test]
    async fn test_matching_tool_output_reaches_prompt() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Ok("done".to_string()),
            Ok("done".to_string()),
        ]));
        let agent = Agent::builder("researcher", backend.clone())
            .tool(Arc::new(EchoTool))
            .build();

        agent.execute("please echo this", &[]).await.unwrap();
        agent.execute("nothing to see", &[]).await.unwrap();

        let prompts = backend.prompts.lock();
        assert!(prompts[0].contains("[echo] echoed please echo this"));
        assert!(!prompts[1].contains("[echo]"));
    }
}
