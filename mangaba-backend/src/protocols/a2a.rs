//! Agent-to-agent mailbox
//!
//! Per-receiver message queues ordered by descending priority (stable for
//! equal priority), with per-message time-to-live. Expired messages are
//! purged lazily on read. Receiving drains the queue: each message is
//! delivered at most once, so two readers never process the same message.

use crate::config::CommunicationConfig;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Synchronous notification hook invoked inside `send`, after the message is
/// queued. Keep these cheap; heavy work belongs in the receiving agent.
pub type MessageCallback = Arc<dyn Fn(&AgentMessage) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub sender: String,
    pub receiver: String,
    pub content: String,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl AgentMessage {
    /// A message is visible only while `now - created_at < ttl`.
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        (now - self.created_at).num_seconds() >= self.ttl_secs as i64
    }
}

#[derive(Clone)]
pub struct A2AProtocol {
    queues: Arc<DashMap<String, Vec<AgentMessage>>>,
    callbacks: Arc<DashMap<String, MessageCallback>>,
    max_messages: usize,
    priority_levels: u8,
}

impl A2AProtocol {
    pub fn new(config: &CommunicationConfig) -> Self {
        A2AProtocol {
            queues: Arc::new(DashMap::new()),
            callbacks: Arc::new(DashMap::new()),
            max_messages: config.max_messages.max(1),
            priority_levels: config.priority_levels.max(1),
        }
    }

    /// Queue a message for `receiver` and notify its callback, if any.
    ///
    /// Priorities above the configured level count are clamped. When the
    /// receiver's queue is full, the oldest message of the lowest priority
    /// class is evicted to make room.
    pub fn send(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
        priority: u8,
        ttl_secs: u64,
    ) -> AgentMessage {
        let priority = priority.min(self.priority_levels - 1);
        let message = AgentMessage {
            id: Uuid::new_v4().to_string(),
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            content: content.to_string(),
            priority,
            created_at: Utc::now(),
            ttl_secs,
        };

        {
            let mut queue = self.queues.entry(receiver.to_string()).or_default();
            // Insert after the last message of >= priority: descending order,
            // stable for equal priority.
            let position = queue.partition_point(|m| m.priority >= priority);
            queue.insert(position, message.clone());

            if queue.len() > self.max_messages {
                let lowest = queue.last().map(|m| m.priority).unwrap_or(0);
                let evict_at = queue.partition_point(|m| m.priority > lowest);
                let evicted = queue.remove(evict_at);
                log::warn!(
                    "[A2A] Queue for '{}' full, evicting message {} from '{}'",
                    receiver,
                    evicted.id,
                    evicted.sender
                );
            }
        }

        log::debug!(
            "[A2A] {} -> {} (priority {}, ttl {}s)",
            sender,
            receiver,
            priority,
            ttl_secs
        );

        // Invoke outside the queue lock so the callback may peek or send.
        let callback = self.callbacks.get(receiver).map(|cb| cb.value().clone());
        if let Some(callback) = callback {
            callback(&message);
        }

        message
    }

    /// Drain and return the receiver's pending messages, highest priority
    /// first. Expired messages are purged and never returned. Consume-once:
    /// a returned message is gone from the queue.
    pub fn receive(&self, agent: &str) -> Vec<AgentMessage> {
        let now = Utc::now();
        match self.queues.remove(agent) {
            Some((_, queue)) => queue
                .into_iter()
                .filter(|m| !m.is_expired_at(now))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Look at pending messages without consuming them; purges expired ones.
    pub fn peek(&self, agent: &str) -> Vec<AgentMessage> {
        let now = Utc::now();
        match self.queues.get_mut(agent) {
            Some(mut queue) => {
                queue.retain(|m| !m.is_expired_at(now));
                queue.clone()
            }
            None => Vec::new(),
        }
    }

    /// Number of unexpired messages waiting for `agent`.
    pub fn pending_count(&self, agent: &str) -> usize {
        self.peek(agent).len()
    }

    /// Register a synchronous notification callback for a receiver.
    /// A second registration for the same receiver replaces the first.
    pub fn register_callback(&self, agent: &str, callback: MessageCallback) {
        self.callbacks.insert(agent.to_string(), callback);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn protocol() -> A2AProtocol {
        A2AProtocol::new(&CommunicationConfig::default())
    }

    #[test]
    fn test_priority_ordering_is_stable() {
        let a2a = protocol();
        a2a.send("a", "receiver", "low-1", 0, 60);
        a2a.send("a", "receiver", "high", 3, 60);
        a2a.send("a", "receiver", "low-2", 0, 60);
        a2a.send("a", "receiver", "mid", 1, 60);

        let contents: Vec<String> = a2a
            .receive("receiver")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["high", "mid", "low-1", "low-2"]);
    }

    #[test]
    fn test_receive_consumes_messages() {
        let a2a = protocol();
        a2a.send("a", "receiver", "once", 0, 60);
        assert_eq!(a2a.receive("receiver").len(), 1);
        assert!(a2a.receive("receiver").is_empty());
    }

    #[test]
    fn test_expired_messages_are_purged_on_read() {
        let a2a = protocol();
        a2a.send("a", "receiver", "fresh", 0, 60);

        // A message sent 2 seconds ago with ttl 1 must be absent.
        let stale = AgentMessage {
            id: Uuid::new_v4().to_string(),
            sender: "a".to_string(),
            receiver: "receiver".to_string(),
            content: "stale".to_string(),
            priority: 0,
            created_at: Utc::now() - chrono::Duration::seconds(2),
            ttl_secs: 1,
        };
        a2a.queues.get_mut("receiver").unwrap().push(stale);

        let contents: Vec<String> = a2a
            .receive("receiver")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["fresh"]);
    }

    #[test]
    fn test_zero_ttl_expires_immediately() {
        let a2a = protocol();
        a2a.send("a", "receiver", "gone", 0, 0);
        assert!(a2a.receive("receiver").is_empty());
    }

    #[test]
    fn test_callback_fires_within_send() {
        let a2a = protocol();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_by_callback = seen.clone();
        a2a.register_callback(
            "receiver",
            Arc::new(move |message: &AgentMessage| {
                seen_by_callback.lock().push(message.content.clone());
            }),
        );

        a2a.send("a", "receiver", "notify me", 0, 60);
        assert_eq!(*seen.lock(), vec!["notify me".to_string()]);
        // The message is still queued for a later receive.
        assert_eq!(a2a.pending_count("receiver"), 1);
    }

    #[test]
    fn test_priority_clamped_to_configured_levels() {
        let a2a = protocol();
        let message = a2a.send("a", "receiver", "clamped", 200, 60);
        assert_eq!(message.priority, 4);
    }

    #[test]
    fn test_queue_cap_evicts_oldest_lowest_priority() {
        let config = CommunicationConfig {
            max_messages: 2,
            message_ttl_secs: 3600,
            priority_levels: 5,
        };
        let a2a = A2AProtocol::new(&config);
        a2a.send("a", "receiver", "old-low", 0, 60);
        a2a.send("a", "receiver", "high", 3, 60);
        a2a.send("a", "receiver", "new-low", 0, 60);

        let contents: Vec<String> = a2a
            .receive("receiver")
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["high", "new-low"]);
    }

    #[test]
    fn test_peek_does_not_consume() {
        let a2a = protocol();
        a2a.send("a", "receiver", "still here", 0, 60);
        assert_eq!(a2a.peek("receiver").len(), 1);
        assert_eq!(a2a.receive("receiver").len(), 1);
    }
}
