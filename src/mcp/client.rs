//! MCP sessions: the seam between the manager and a live server connection.

use async_trait::async_trait;
use rmcp::model::{CallToolRequestParams, CallToolResult, Content, JsonObject, ResourceContents};
use rmcp::service::{ClientInitializeError, DynService, Peer, RoleClient, RunningService, ServiceError};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{Result, StrideError};

type DynClientService = Box<dyn DynService<RoleClient>>;
pub type McpRunningService = RunningService<RoleClient, DynClientService>;

/// A tool advertised by an MCP server.
#[derive(Debug, Clone, PartialEq)]
pub struct McpTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

impl McpTool {
    pub fn new(name: impl Into<String>, description: Option<&str>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.map(str::to_string),
            input_schema,
        }
    }
}

/// Successful output of an MCP tool call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct McpCallOutput {
    /// Text items joined with newlines.
    pub text: Option<String>,
    pub structured: Option<Value>,
}

/// An initialized connection to one MCP server.
#[async_trait]
pub trait McpSession: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<McpTool>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpCallOutput>;

    /// Shut the connection down. Closing twice is a no-op.
    async fn close(&self) -> Result<()>;
}

/// [`McpSession`] over an rmcp running service.
pub struct RmcpSession {
    peer: Peer<RoleClient>,
    service: Mutex<Option<McpRunningService>>,
}

impl RmcpSession {
    pub fn new(service: McpRunningService) -> Self {
        Self {
            peer: service.peer().clone(),
            service: Mutex::new(Some(service)),
        }
    }
}

impl std::fmt::Debug for RmcpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RmcpSession").finish_non_exhaustive()
    }
}

#[async_trait]
impl McpSession for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let tools = match self.peer.list_all_tools().await {
            Ok(tools) => tools,
            Err(ServiceError::UnexpectedResponse) => {
                let page = self
                    .peer
                    .list_tools(None)
                    .await
                    .map_err(|e| map_service_error("list_tools", e))?;
                page.tools
            }
            Err(e) => return Err(map_service_error("list_tools", e)),
        };

        Ok(tools.into_iter().map(map_tool).collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpCallOutput> {
        let arguments = coerce_tool_arguments(arguments)?;
        let result = self
            .peer
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_owned().into(),
                arguments,
                task: None,
            })
            .await
            .map_err(|e| map_service_error("call_tool", e))?;

        map_call_result(name, result)
    }

    async fn close(&self) -> Result<()> {
        let Some(service) = self.service.lock().await.take() else {
            return Ok(());
        };
        service
            .cancel()
            .await
            .map(|reason| tracing::debug!(?reason, "MCP session closed"))
            .map_err(|e| StrideError::provider("mcp", format!("failed to close session: {e}")))
    }
}

fn map_tool(tool: rmcp::model::Tool) -> McpTool {
    McpTool {
        name: tool.name.to_string(),
        description: tool.description.map(|d| d.to_string()),
        input_schema: Value::Object((*tool.input_schema).clone()),
    }
}

pub(crate) fn coerce_tool_arguments(value: Value) -> Result<Option<JsonObject>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(map)),
        Value::String(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            let parsed: Value = serde_json::from_str(trimmed).map_err(|e| {
                StrideError::InvalidArgument(format!("MCP tool arguments must be valid JSON: {e}"))
            })?;
            coerce_tool_arguments(parsed)
        }
        other => Err(StrideError::InvalidArgument(format!(
            "MCP tool arguments must be a JSON object; got {other}"
        ))),
    }
}

fn extract_text_content(content: &[Content]) -> Option<String> {
    let mut lines = Vec::new();
    for item in content {
        if let Some(text) = item.as_text() {
            lines.push(text.text.clone());
            continue;
        }
        if let Some(resource) = item.as_resource() {
            if let ResourceContents::TextResourceContents { text, .. } = &resource.resource {
                lines.push(text.clone());
            }
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn map_call_result(name: &str, result: CallToolResult) -> Result<McpCallOutput> {
    let text = extract_text_content(&result.content);

    if result.is_error.unwrap_or(false) {
        let message = text
            .clone()
            .or_else(|| result.structured_content.as_ref().map(|v| v.to_string()))
            .unwrap_or_else(|| "MCP tool returned an error result".into());
        return Err(StrideError::tool(name, message));
    }

    Ok(McpCallOutput {
        text,
        structured: result.structured_content,
    })
}

pub(crate) fn map_client_initialize_error(error: ClientInitializeError) -> StrideError {
    match error {
        ClientInitializeError::ConnectionClosed(context) => {
            StrideError::provider("mcp", format!("initialize connection closed: {context}"))
        }
        ClientInitializeError::TransportError { error, context } => {
            StrideError::provider("mcp", format!("initialize transport error ({context}): {error}"))
        }
        ClientInitializeError::JsonRpcError(error) => StrideError::provider(
            "mcp",
            format!("initialize JSON-RPC error {}: {}", error.code.0, error.message),
        ),
        ClientInitializeError::Cancelled => StrideError::Cancelled,
        other => StrideError::provider("mcp", format!("initialize error: {other}")),
    }
}

fn map_service_error(context: &str, error: ServiceError) -> StrideError {
    match error {
        ServiceError::McpError(error) => StrideError::provider(
            "mcp",
            format!("{context}: MCP error {}: {}", error.code.0, error.message),
        ),
        ServiceError::TransportSend(error) => {
            StrideError::provider("mcp", format!("{context}: transport send failed: {error}"))
        }
        ServiceError::TransportClosed => StrideError::provider("mcp", format!("{context}: transport closed")),
        ServiceError::UnexpectedResponse => {
            StrideError::provider("mcp", format!("{context}: unexpected MCP response"))
        }
        ServiceError::Cancelled { reason } => {
            let suffix = reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default();
            StrideError::provider("mcp", format!("{context}: request cancelled{suffix}"))
        }
        ServiceError::Timeout { timeout } => StrideError::Timeout(timeout.as_millis() as u64),
        other => StrideError::provider("mcp", format!("{context}: service error: {other}")),
    }
}
