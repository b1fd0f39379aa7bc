pub mod a2a;
pub mod mcp;

pub use a2a::{A2AProtocol, AgentMessage, MessageCallback};
pub use mcp::McpProtocol;
