//! MCP server configuration.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StrideError};

/// Transport used to reach an MCP server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum McpTransportKind {
    Stdio,
    Sse,
    #[default]
    StreamableHttp,
}

/// One configured MCP server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpServerConfig {
    #[serde(default)]
    pub transport: McpTransportKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
}

fn default_enabled() -> bool {
    true
}

impl McpServerConfig {
    /// A stdio server launched with `command args...`.
    pub fn stdio(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            transport: McpTransportKind::Stdio,
            command: Some(command.into()),
            args: Some(args),
            ..Self::remote(McpTransportKind::Stdio, "")
        }
    }

    /// A remote server reached over `transport` at `url`.
    pub fn remote(transport: McpTransportKind, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            transport,
            enabled: true,
            description: String::new(),
            env: None,
            command: None,
            args: None,
            url: (!url.is_empty()).then_some(url),
            headers: None,
        }
    }

    /// stdio needs a command; SSE and streamable HTTP need a URL.
    pub fn validate(&self, name: &str) -> Result<()> {
        match self.transport {
            McpTransportKind::Stdio => {
                if self.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    return Err(StrideError::Configuration(format!(
                        "MCP server '{name}': stdio transport requires a command"
                    )));
                }
            }
            McpTransportKind::Sse | McpTransportKind::StreamableHttp => {
                if self.url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                    return Err(StrideError::Configuration(format!(
                        "MCP server '{name}': {} transport requires a url",
                        self.transport
                    )));
                }
            }
        }
        Ok(())
    }
}

/// All configured MCP servers, keyed by provider name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub servers: BTreeMap<String, McpServerConfig>,
}

impl McpConfig {
    pub fn with_server(mut self, name: impl Into<String>, server: McpServerConfig) -> Self {
        self.servers.insert(name.into(), server);
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.servers.iter().try_for_each(|(name, server)| server.validate(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stdio_requires_command() {
        let mut server = McpServerConfig::stdio("npx", vec![]);
        assert!(server.validate("fs").is_ok());
        server.command = None;
        assert!(matches!(server.validate("fs"), Err(StrideError::Configuration(_))));
    }

    #[test]
    fn remote_requires_url() {
        assert!(McpServerConfig::remote(McpTransportKind::Sse, "").validate("x").is_err());
        assert!(McpServerConfig::remote(McpTransportKind::StreamableHttp, "http://h/mcp")
            .validate("x")
            .is_ok());
    }

    #[test]
    fn parses_mcp_servers_document() {
        let yaml = r#"
mcpServers:
  search:
    url: http://localhost:8000/mcp
  files:
    transport: stdio
    command: mcp-files
    args: ["--root", "/tmp"]
    enabled: false
"#;
        let config: McpConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.servers["search"].transport, McpTransportKind::StreamableHttp);
        assert!(config.servers["search"].enabled);
        assert_eq!(config.servers["files"].transport, McpTransportKind::Stdio);
        assert!(!config.servers["files"].enabled);
        assert!(config.validate().is_ok());
    }
}
