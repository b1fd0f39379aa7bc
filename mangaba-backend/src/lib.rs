//! Multi-agent task runner
//!
//! Named agents wrap a generation backend; tasks bind a description to an
//! agent and optional prerequisites; a crew executes the resulting DAG with
//! independent tasks fanned out concurrently. Two protocols thread shared
//! text context between agent calls: a priority/TTL mailbox (A2A) and
//! cumulative context fusion (MCP).

pub mod agents;
pub mod ai;
pub mod config;
pub mod crew;
pub mod error;
pub mod memory;
pub mod protocols;
pub mod runtime;
pub mod tools;

pub use agents::{Agent, AgentBuilder, ErrorPolicy};
pub use ai::{AiClient, GenerationBackend, GenerationOptions, Provider};
pub use config::Config;
pub use crew::{Crew, CrewConfig, TaskId, TaskOutcome};
pub use error::MangabaError;
pub use memory::ContextualMemory;
pub use protocols::{A2AProtocol, AgentMessage, McpProtocol};
pub use runtime::{MangabaAI, TaskSpec};
pub use tools::{GoogleSearchTool, Tool};
