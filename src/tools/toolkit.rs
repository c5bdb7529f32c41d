//! Toolkits: named groups of tools the agent can dispatch to.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::Tool;
use super::types::ToolDefinition;
use crate::error::{Result, StrideError};
use crate::types::ToolResult;

/// A provider of callable tools, local or remote.
#[async_trait]
pub trait Toolkit: Send + Sync {
    /// Provider name, reported as `tool_name` on tool events.
    fn name(&self) -> &str;

    /// Catalog entries for every tool this provider exposes.
    fn definitions(&self) -> Vec<ToolDefinition>;

    fn has_tool(&self, function_name: &str) -> bool;

    /// Invoke `function_name`. Unknown names yield [`StrideError::ToolNotFound`].
    async fn invoke(&self, function_name: &str, args: serde_json::Value) -> Result<ToolResult>;
}

/// In-process toolkit backed by an ordered registry of [`Tool`]s.
pub struct LocalToolkit {
    name: String,
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl LocalToolkit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. A later tool with the same name replaces the earlier one.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        match self.index.get(tool.name()) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(tool.name().to_string(), self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, function_name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(function_name).map(|&i| &self.tools[i])
    }
}

impl std::fmt::Debug for LocalToolkit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalToolkit")
            .field("name", &self.name)
            .field("tools", &self.tools.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl Toolkit for LocalToolkit {
    fn name(&self) -> &str {
        &self.name
    }

    fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    fn has_tool(&self, function_name: &str) -> bool {
        self.index.contains_key(function_name)
    }

    async fn invoke(&self, function_name: &str, args: serde_json::Value) -> Result<ToolResult> {
        let tool = self
            .get(function_name)
            .ok_or_else(|| StrideError::ToolNotFound(function_name.to_string()))?;
        let args = ToolArguments::new(args).filtered(tool.parameters());
        tool.execute(&args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{AgentTool, ToolParameters};
    use serde_json::json;

    fn echo_toolkit() -> LocalToolkit {
        LocalToolkit::new("echo").with_tool(AgentTool::new(
            "echo_text",
            "Echo text back",
            ToolParameters::object().string("text", "Text to echo", true).build(),
            |args| async move { Ok(ToolResult::ok(args.raw().to_string())) },
        ))
    }

    #[tokio::test]
    async fn invoke_filters_arguments_to_schema() {
        let toolkit = echo_toolkit();
        let result = toolkit
            .invoke("echo_text", json!({"text": "hi", "extra": 1}))
            .await
            .unwrap();
        assert_eq!(result.message.as_deref(), Some(r#"{"text":"hi"}"#));
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let err = echo_toolkit().invoke("nope", json!({})).await.unwrap_err();
        assert!(matches!(err, StrideError::ToolNotFound(name) if name == "nope"));
    }

    #[test]
    fn definitions_keep_registration_order() {
        let toolkit = echo_toolkit().with_tool(AgentTool::new(
            "a_second",
            "second",
            ToolParameters::empty(),
            |_| async { Ok(ToolResult::default()) },
        ));
        let names: Vec<_> = toolkit.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["echo_text", "a_second"]);
        assert!(toolkit.has_tool("a_second"));
    }
}
