//! Model Context Protocol client manager and tool routing.

pub mod client;
pub mod manager;
mod sse;
pub mod toolkit;
pub mod transport;

pub use client::{McpCallOutput, McpSession, McpTool, RmcpSession};
pub use manager::{namespaced_tool_name, McpClientManager, DEFAULT_CONNECT_TIMEOUT};
pub use toolkit::McpToolkit;
pub use transport::{McpConnector, RmcpConnector};
