//! Composition surface
//!
//! [`MangabaAI`] wires the configured providers, the shared memory and the
//! two protocols together, and exposes the narrow surface external callers
//! (platform integrations, the demo binary) use: create agents, describe
//! tasks, execute, read results.

use crate::agents::{Agent, AgentBuilder, ErrorPolicy};
use crate::ai::{AiClient, GenerationBackend, GenerationOptions, Provider};
use crate::config::Config;
use crate::crew::{Crew, CrewConfig, TaskId};
use crate::error::MangabaError;
use crate::memory::ContextualMemory;
use crate::protocols::{A2AProtocol, McpProtocol};
use std::collections::HashMap;
use std::sync::Arc;

/// Description of one task submitted to [`MangabaAI::execute`].
///
/// `deps` are positions of earlier specs in the same submission.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub description: String,
    pub agent: String,
    pub priority: i32,
    pub deps: Vec<usize>,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>, agent: impl Into<String>) -> Self {
        TaskSpec {
            description: description.into(),
            agent: agent.into(),
            priority: 0,
            deps: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_deps(mut self, deps: &[usize]) -> Self {
        self.deps = deps.to_vec();
        self
    }
}

pub struct MangabaAI {
    config: Config,
    memory: ContextualMemory,
    a2a: A2AProtocol,
    mcp: McpProtocol,
    backends: HashMap<Provider, Arc<AiClient>>,
    agents: HashMap<String, Arc<Agent>>,
}

impl MangabaAI {
    /// Build the runtime from an explicit configuration. Creates one client
    /// per provider that has an API key.
    pub fn new(config: Config) -> Result<Self, MangabaError> {
        config.validate()?;

        let mut backends = HashMap::new();
        for provider in config.models.configured() {
            let client = AiClient::from_settings(provider, config.models.settings(provider))?;
            backends.insert(provider, Arc::new(client));
            log::info!("[RUNTIME] Configured {} backend", provider);
        }

        Ok(MangabaAI {
            memory: ContextualMemory::new(config.memory.max_context_size),
            a2a: A2AProtocol::new(&config.communication),
            mcp: McpProtocol::new(config.context_fusion.max_contexts),
            backends,
            agents: HashMap::new(),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn memory(&self) -> &ContextualMemory {
        &self.memory
    }

    pub fn a2a(&self) -> &A2AProtocol {
        &self.a2a
    }

    pub fn mcp(&self) -> &McpProtocol {
        &self.mcp
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.backends.keys().copied().collect()
    }

    pub fn agent(&self, name: &str) -> Option<&Arc<Agent>> {
        self.agents.get(name)
    }

    /// Start building an agent on one of the configured providers, with the
    /// shared memory and the configured retry/response knobs already applied.
    pub fn agent_builder(
        &self,
        name: &str,
        provider: Provider,
    ) -> Result<AgentBuilder, MangabaError> {
        let backend = self.backends.get(&provider).ok_or_else(|| {
            MangabaError::Config(format!("provider '{}' is not configured", provider))
        })?;
        let backend: Arc<dyn GenerationBackend> = backend.clone();

        Ok(Agent::builder(name, backend)
            .options(GenerationOptions::from(
                self.config.models.settings(provider),
            ))
            .memory(self.memory.clone())
            .min_response_len(self.config.agents.min_response_len)
            .max_retries(self.config.agents.max_retries))
    }

    /// Create and register an agent with the default error policy.
    pub fn create_agent(
        &mut self,
        name: &str,
        role: &str,
        goal: &str,
        provider: Provider,
    ) -> Result<Arc<Agent>, MangabaError> {
        if self.agents.contains_key(name) {
            return Err(MangabaError::DuplicateAgent(name.to_string()));
        }
        let agent = Arc::new(
            self.agent_builder(name, provider)?
                .role(role)
                .goal(goal)
                .error_policy(ErrorPolicy::Propagate)
                .build(),
        );
        self.agents.insert(name.to_string(), agent.clone());
        Ok(agent)
    }

    /// Register an agent built elsewhere (custom tools, policies).
    pub fn register_agent(&mut self, agent: Agent) -> Result<Arc<Agent>, MangabaError> {
        let name = agent.name().to_string();
        if self.agents.contains_key(&name) {
            return Err(MangabaError::DuplicateAgent(name));
        }
        let agent = Arc::new(agent);
        self.agents.insert(name, agent.clone());
        Ok(agent)
    }

    /// A crew preloaded with every registered agent.
    pub fn crew(&self) -> Crew {
        let mut crew = Crew::new(CrewConfig::from(&self.config.agents));
        for agent in self.agents.values() {
            // Names are unique in the registry, so this cannot fail.
            let _ = crew.add_agent(agent.clone());
        }
        crew
    }

    /// Execute a set of task specs and return, for every task, either its
    /// result or an error description keyed by the task description.
    pub async fn execute(
        &self,
        specs: Vec<TaskSpec>,
    ) -> Result<HashMap<String, String>, MangabaError> {
        let mut crew = self.crew();

        let mut ids: Vec<TaskId> = Vec::with_capacity(specs.len());
        for (position, spec) in specs.iter().enumerate() {
            let mut deps = Vec::with_capacity(spec.deps.len());
            for &dep in &spec.deps {
                let id = ids
                    .get(dep)
                    .copied()
                    .filter(|_| dep < position)
                    .ok_or(MangabaError::UnknownTask(dep))?;
                deps.push(id);
            }
            let id = crew.add_task(spec.description.clone(), &spec.agent, spec.priority, &deps)?;
            ids.push(id);
        }

        let outcomes = crew.run().await?;

        let mut results = HashMap::new();
        for (spec, id) in specs.iter().zip(&ids) {
            if let Some(outcome) = outcomes.get(id) {
                results.insert(spec.description.clone(), outcome.describe());
            }
        }
        Ok(results)
    }

    /// Smoke-test every configured backend. Returns false (and logs) if any
    /// credential fails.
    pub async fn validate_api_keys(&self) -> bool {
        let mut all_valid = true;
        for (provider, backend) in &self.backends {
            match backend.validate().await {
                Ok(()) => log::info!("[RUNTIME] API key valid for {}", provider),
                Err(e) => {
                    log::error!("[RUNTIME] API key validation failed for {}: {}", provider, e);
                    all_valid = false;
                }
            }
        }
        all_valid
    }

    /// Drop accumulated context and registered agents.
    pub fn cleanup(&mut self) {
        self.mcp.clear();
        self.memory.clear();
        self.agents.clear();
        log::info!("[RUNTIME] Cleaned up protocols, memory and agents");
    }
}
