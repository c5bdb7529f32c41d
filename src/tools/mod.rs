//! Tool system for function calling.

pub mod arguments;
pub mod message;
pub mod tool;
pub mod toolkit;
pub mod types;

pub use arguments::ToolArguments;
pub use message::{message_toolkit, ASK_USER_TOOL, NOTIFY_USER_TOOL};
pub use tool::{AgentTool, Tool};
pub use toolkit::{LocalToolkit, Toolkit};
pub use types::{ToolDefinition, ToolParameters};
