//! Context fusion
//!
//! Each scope accumulates the text it has seen: fusing a prompt combines it
//! with the scope's stored context and stores the combination back, so the
//! context grows monotonically until cleared.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct ScopeContext {
    text: String,
    /// Sequence number of the last fusion, for least-recently-fused eviction.
    last_fused: u64,
}

#[derive(Debug, Default)]
struct McpInner {
    scopes: HashMap<String, ScopeContext>,
    fuse_counter: u64,
}

#[derive(Clone)]
pub struct McpProtocol {
    inner: Arc<RwLock<McpInner>>,
    max_contexts: usize,
}

impl McpProtocol {
    pub fn new(max_contexts: usize) -> Self {
        McpProtocol {
            inner: Arc::new(RwLock::new(McpInner::default())),
            max_contexts: max_contexts.max(1),
        }
    }

    /// Combine `prompt` with the scope's remembered context, remember the
    /// combination, and return it.
    ///
    /// Creating a scope beyond the configured cap evicts the least recently
    /// fused scope.
    pub fn fuse(&self, scope: &str, prompt: &str) -> String {
        let mut inner = self.inner.write();

        let current = inner
            .scopes
            .get(scope)
            .map(|c| c.text.clone())
            .unwrap_or_default();

        let enriched = format!(
            "Previous context:\n{}\n\nNew input:\n{}\n\nConsider the previous context when responding.",
            current, prompt
        );

        if !inner.scopes.contains_key(scope) && inner.scopes.len() >= self.max_contexts {
            if let Some(oldest) = inner
                .scopes
                .iter()
                .min_by_key(|(_, c)| c.last_fused)
                .map(|(name, _)| name.clone())
            {
                log::warn!("[MCP] Scope cap reached, evicting '{}'", oldest);
                inner.scopes.remove(&oldest);
            }
        }

        inner.fuse_counter += 1;
        let last_fused = inner.fuse_counter;
        inner.scopes.insert(
            scope.to_string(),
            ScopeContext {
                text: enriched.clone(),
                last_fused,
            },
        );

        log::debug!(
            "[MCP] Fused scope '{}' ({} chars of context)",
            scope,
            enriched.len()
        );
        enriched
    }

    /// The scope's accumulated context; empty if the scope is unknown.
    pub fn context_of(&self, scope: &str) -> String {
        self.inner
            .read()
            .scopes
            .get(scope)
            .map(|c| c.text.clone())
            .unwrap_or_default()
    }

    /// Forget one scope.
    pub fn clear_scope(&self, scope: &str) {
        self.inner.write().scopes.remove(scope);
    }

    /// Forget every scope.
    pub fn clear(&self) {
        self.inner.write().scopes.clear();
        log::debug!("[MCP] Cleared all scopes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fusion_is_cumulative() {
        let mcp = McpProtocol::new(10);
        let first = mcp.fuse("analysis", "alpha");
        assert!(first.contains("alpha"));

        let second = mcp.fuse("analysis", "beta");
        assert!(second.contains("alpha"));
        assert!(second.contains("beta"));

        // The stored context is the latest fusion result.
        assert_eq!(mcp.context_of("analysis"), second);
    }

    #[test]
    fn test_scopes_are_isolated() {
        let mcp = McpProtocol::new(10);
        mcp.fuse("a", "only in a");
        let fused = mcp.fuse("b", "only in b");
        assert!(!fused.contains("only in a"));
    }

    #[test]
    fn test_clear_resets_context() {
        let mcp = McpProtocol::new(10);
        mcp.fuse("analysis", "alpha");
        mcp.clear();
        assert_eq!(mcp.context_of("analysis"), "");

        let fused = mcp.fuse("analysis", "beta");
        assert!(!fused.contains("alpha"));
    }

    #[test]
    fn test_scope_cap_evicts_least_recently_fused() {
        let mcp = McpProtocol::new(2);
        mcp.fuse("first", "1");
        mcp.fuse("second", "2");
        mcp.fuse("first", "again");
        mcp.fuse("third", "3");

        assert_eq!(mcp.context_of("second"), "");
        assert!(!mcp.context_of("first").is_empty());
        assert!(!mcp.context_of("third").is_empty());
    }
}
