//! Owns every MCP session and routes namespaced tool calls to them.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::client::{McpSession, McpTool};
use super::transport::{McpConnector, RmcpConnector};
use crate::config::McpConfig;
use crate::error::Result;
use crate::tools::ToolDefinition;
use crate::types::ToolResult;
use crate::util::timeout::with_timeout;

/// Default bound on connecting to and listing one server.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Public name of `tool` on `server`.
///
/// Providers already named `mcp_*` are not prefixed twice.
pub fn namespaced_tool_name(server: &str, tool: &str) -> String {
    format!("{}{tool}", server_prefix(server))
}

fn server_prefix(server: &str) -> String {
    if server.starts_with("mcp_") {
        format!("{server}_")
    } else {
        format!("mcp_{server}_")
    }
}

struct Connected {
    session: Arc<dyn McpSession>,
    tools: Vec<McpTool>,
}

#[derive(Default)]
struct ManagerState {
    initialized: bool,
    servers: BTreeMap<String, Connected>,
}

pub struct McpClientManager {
    config: McpConfig,
    connector: Arc<dyn McpConnector>,
    connect_timeout: Duration,
    init_lock: Mutex<()>,
    state: RwLock<ManagerState>,
}

impl std::fmt::Debug for McpClientManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientManager")
            .field("configured", &self.config.servers.keys().collect::<Vec<_>>())
            .field("connected", &self.connected_servers())
            .finish()
    }
}

impl McpClientManager {
    pub fn new(config: McpConfig, connector: Arc<dyn McpConnector>) -> Self {
        Self {
            config,
            connector,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            init_lock: Mutex::new(()),
            state: RwLock::new(ManagerState::default()),
        }
    }

    /// Manager that connects through rmcp.
    pub fn with_rmcp(config: McpConfig) -> Self {
        Self::new(config, Arc::new(RmcpConnector::new()))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn read(&self) -> RwLockReadGuard<'_, ManagerState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ManagerState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_initialized(&self) -> bool {
        self.read().initialized
    }

    pub fn connected_servers(&self) -> Vec<String> {
        self.read().servers.keys().cloned().collect()
    }

    /// Connect to every enabled server and list its tools.
    ///
    /// Idempotent. A server that fails to connect is logged and skipped.
    pub async fn initialize(&self) -> Result<()> {
        let _guard = self.init_lock.lock().await;
        if self.read().initialized {
            return Ok(());
        }

        for (name, server) in &self.config.servers {
            if !server.enabled {
                info!(server = %name, "MCP server disabled, skipping");
                continue;
            }

            let connected = with_timeout(self.connect_timeout, async {
                let session = self.connector.connect(name, server).await?;
                match session.list_tools().await {
                    Ok(tools) => Ok(Connected { session, tools }),
                    Err(e) => {
                        let _ = session.close().await;
                        Err(e)
                    }
                }
            })
            .await;

            match connected {
                Ok(mut connected) => {
                    let mut state = self.write();
                    connected.tools.retain(|tool| {
                        let public = namespaced_tool_name(name, &tool.name);
                        let taken = state.servers.iter().any(|(other, c)| {
                            c.tools.iter().any(|t| namespaced_tool_name(other, &t.name) == public)
                        });
                        if taken {
                            error!(
                                server = %name,
                                tool = %tool.name,
                                name = %public,
                                "MCP tool name already taken, skipping"
                            );
                        }
                        !taken
                    });
                    info!(
                        server = %name,
                        transport = %server.transport,
                        tools = connected.tools.len(),
                        "connected to MCP server"
                    );
                    state.servers.insert(name.clone(), connected);
                }
                Err(e) => error!(server = %name, error = %e, "failed to connect to MCP server"),
            }
        }

        self.write().initialized = true;
        Ok(())
    }

    /// Catalog entries for every tool on every connected server.
    pub fn get_all_tools(&self) -> Vec<ToolDefinition> {
        let state = self.read();
        state
            .servers
            .iter()
            .flat_map(|(server, connected)| {
                connected.tools.iter().map(move |tool| ToolDefinition {
                    name: namespaced_tool_name(server, &tool.name),
                    description: format!(
                        "[{server}] {}",
                        tool.description.as_deref().unwrap_or(&tool.name)
                    ),
                    parameters: tool.input_schema.clone(),
                })
            })
            .collect()
    }

    /// Split a namespaced name into `(server, tool)`.
    ///
    /// Only servers that advertise the tool match. An ambiguous name resolves
    /// to nothing.
    pub fn resolve(&self, namespaced: &str) -> Option<(String, String)> {
        let state = self.read();
        let mut matches = state.servers.iter().filter_map(|(server, connected)| {
            let tool = namespaced.strip_prefix(&server_prefix(server))?;
            connected
                .tools
                .iter()
                .any(|t| t.name == tool)
                .then(|| (server.clone(), tool.to_string()))
        });
        let found = matches.next()?;
        if matches.next().is_some() {
            warn!(name = %namespaced, "MCP tool name matches more than one server");
            return None;
        }
        Some(found)
    }

    pub fn has_tool(&self, namespaced: &str) -> bool {
        self.resolve(namespaced).is_some()
    }

    /// Call a namespaced tool. Failures come back as an unsuccessful result.
    pub async fn invoke(&self, namespaced: &str, args: Value) -> ToolResult {
        let target = self.resolve(namespaced).and_then(|(server, tool)| {
            self.read()
                .servers
                .get(&server)
                .map(|connected| (server, tool, connected.session.clone()))
        });
        let Some((server, tool, session)) = target else {
            return ToolResult::failure(format!("MCP server for tool '{namespaced}' is not connected"));
        };

        match session.call_tool(&tool, args).await {
            Ok(output) => {
                let message = output
                    .text
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| format!("tool {tool} executed successfully"));
                let result = ToolResult::ok(message);
                match output.structured {
                    Some(data) => result.with_data(data),
                    None => result,
                }
            }
            Err(e) => {
                warn!(server = %server, tool = %tool, error = %e, "MCP tool call failed");
                ToolResult::failure(format!("failed to call MCP tool '{namespaced}': {e}"))
            }
        }
    }

    /// Close every session and forget all tools. Safe to call repeatedly.
    pub async fn cleanup(&self) {
        let _guard = self.init_lock.lock().await;
        let servers = {
            let mut state = self.write();
            state.initialized = false;
            std::mem::take(&mut state.servers)
        };
        for (name, connected) in servers {
            match connected.session.close().await {
                Ok(()) => info!(server = %name, "closed MCP session"),
                Err(e) => warn!(server = %name, error = %e, "failed to close MCP session"),
            }
        }
    }
}
