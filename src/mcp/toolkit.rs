use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::manager::McpClientManager;
use crate::error::Result;
use crate::tools::{ToolDefinition, Toolkit};
use crate::types::ToolResult;

/// Exposes the tools of every connected MCP server as one toolkit.
#[derive(Debug, Clone)]
pub struct McpToolkit {
    manager: Arc<McpClientManager>,
}

impl McpToolkit {
    pub fn new(manager: Arc<McpClientManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<McpClientManager> {
        &self.manager
    }
}

#[async_trait]
impl Toolkit for McpToolkit {
    fn name(&self) -> &str {
        "mcp"
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.manager.get_all_tools()
    }

    fn has_tool(&self, function_name: &str) -> bool {
        self.manager.has_tool(function_name)
    }

    async fn invoke(&self, function_name: &str, args: Value) -> Result<ToolResult> {
        Ok(self.manager.invoke(function_name, args).await)
    }
}
