//! Shared contextual memory
//!
//! Maps each agent name to a bounded history of (input, output) pairs, plus a
//! global history visible to every agent. Oldest entries are evicted first
//! once a history reaches the configured bound.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// One remembered exchange.
#[derive(Debug, Clone)]
pub struct MemoryEntry {
    /// Name of the agent that produced this entry.
    pub agent: String,
    pub input: String,
    pub output: String,
    pub created_at: DateTime<Utc>,
}

impl MemoryEntry {
    fn new(agent: &str, input: &str, output: &str) -> Self {
        MemoryEntry {
            agent: agent.to_string(),
            input: input.to_string(),
            output: output.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug)]
struct MemoryInner {
    individual: HashMap<String, VecDeque<MemoryEntry>>,
    global: VecDeque<MemoryEntry>,
    max_context_size: usize,
}

/// Cloneable handle to the shared store; clones see the same state.
#[derive(Debug, Clone)]
pub struct ContextualMemory {
    inner: Arc<RwLock<MemoryInner>>,
}

impl ContextualMemory {
    pub fn new(max_context_size: usize) -> Self {
        ContextualMemory {
            inner: Arc::new(RwLock::new(MemoryInner {
                individual: HashMap::new(),
                global: VecDeque::new(),
                max_context_size: max_context_size.max(1),
            })),
        }
    }

    /// Append an exchange to an agent's own history.
    pub fn store_individual(&self, agent: &str, input: &str, output: &str) {
        let mut inner = self.inner.write();
        let bound = inner.max_context_size;
        let history = inner.individual.entry(agent.to_string()).or_default();
        history.push_back(MemoryEntry::new(agent, input, output));
        while history.len() > bound {
            history.pop_front();
        }
    }

    /// Append an exchange to the history every agent can see.
    pub fn store_global(&self, agent: &str, input: &str, output: &str) {
        let mut inner = self.inner.write();
        let bound = inner.max_context_size;
        inner.global.push_back(MemoryEntry::new(agent, input, output));
        while inner.global.len() > bound {
            inner.global.pop_front();
        }
    }

    /// Full history for one agent, oldest first.
    pub fn recall_individual(&self, agent: &str) -> Vec<MemoryEntry> {
        self.inner
            .read()
            .individual
            .get(agent)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Full global history, oldest first.
    pub fn recall_global(&self) -> Vec<MemoryEntry> {
        self.inner.read().global.iter().cloned().collect()
    }

    /// The `n` most recent entries for one agent, oldest first.
    pub fn recent_individual(&self, agent: &str, n: usize) -> Vec<MemoryEntry> {
        let inner = self.inner.read();
        match inner.individual.get(agent) {
            Some(history) => history
                .iter()
                .skip(history.len().saturating_sub(n))
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    /// The `n` most recent global entries, oldest first.
    pub fn recent_global(&self, n: usize) -> Vec<MemoryEntry> {
        let inner = self.inner.read();
        inner
            .global
            .iter()
            .skip(inner.global.len().saturating_sub(n))
            .cloned()
            .collect()
    }

    /// Drop all remembered exchanges.
    pub fn clear(&self) {
        let mut inner = self.inner.write();
        inner.individual.clear();
        inner.global.clear();
        log::debug!("[MEMORY] Cleared all histories");
    }
}
