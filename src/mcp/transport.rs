//! Connecting to MCP servers over stdio, SSE and streamable HTTP.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use rmcp::model::{ClientInfo, ProtocolVersion};
use rmcp::service::{ClientInitializeError, ServiceExt};
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::transport::{StreamableHttpClientTransport, TokioChildProcess};
use tokio::process::Command;
use tracing::debug;

use super::client::{map_client_initialize_error, McpRunningService, McpSession, RmcpSession};
use super::sse;
use crate::config::{McpServerConfig, McpTransportKind};
use crate::error::{Result, StrideError};

/// Opens sessions to configured servers.
#[async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(&self, name: &str, config: &McpServerConfig) -> Result<Arc<dyn McpSession>>;
}

/// Connector backed by rmcp.
#[derive(Debug, Clone, Default)]
pub struct RmcpConnector;

impl RmcpConnector {
    pub fn new() -> Self {
        Self
    }

    async fn serve(
        &self,
        name: &str,
        config: &McpServerConfig,
        client_info: ClientInfo,
    ) -> std::result::Result<McpRunningService, ClientInitializeError> {
        match config.transport {
            McpTransportKind::Stdio => {
                let mut command = Command::new(config.command.as_deref().unwrap_or_default());
                command.args(config.args.iter().flatten());
                if let Some(env) = &config.env {
                    command.envs(env);
                }
                let transport = TokioChildProcess::new(command).map_err(|error| {
                    ClientInitializeError::transport::<TokioChildProcess>(error, "spawn stdio transport")
                })?;
                client_info.into_dyn().serve(transport).await
            }
            McpTransportKind::StreamableHttp => {
                let url = config.url.as_deref().unwrap_or_default();
                let headers = header_map(config.headers.as_ref()).map_err(|e| {
                    ClientInitializeError::ConnectionClosed(format!("{name}: {e}"))
                })?;
                let transport = StreamableHttpClientTransport::from_config(
                    StreamableHttpClientTransportConfig::with_uri(url)
                        .custom_headers(headers),
                );
                client_info.into_dyn().serve(transport).await
            }
            McpTransportKind::Sse => {
                let url = config.url.as_deref().unwrap_or_default();
                let transport = sse::connect(url, config.headers.as_ref())
                    .await
                    .map_err(|e| ClientInitializeError::ConnectionClosed(format!("{name}: {e}")))?;
                client_info.into_dyn().serve(transport).await
            }
        }
    }

    fn should_retry_protocol_fallback(error: &ClientInitializeError) -> bool {
        match error {
            ClientInitializeError::JsonRpcError(error) => {
                let message = error.message.to_ascii_lowercase();
                message.contains("protocol") && message.contains("version")
            }
            _ => false,
        }
    }
}

#[async_trait]
impl McpConnector for RmcpConnector {
    async fn connect(&self, name: &str, config: &McpServerConfig) -> Result<Arc<dyn McpSession>> {
        config.validate(name)?;

        let latest = ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            ..Default::default()
        };
        let service = match self.serve(name, config, latest).await {
            Ok(service) => service,
            Err(error) if Self::should_retry_protocol_fallback(&error) => {
                debug!(server = %name, "retrying MCP initialize with 2024-11-05 protocol");
                let fallback = ClientInfo {
                    protocol_version: ProtocolVersion::V_2024_11_05,
                    ..Default::default()
                };
                self.serve(name, config, fallback)
                    .await
                    .map_err(map_client_initialize_error)?
            }
            Err(error) => return Err(map_client_initialize_error(error)),
        };

        Ok(Arc::new(RmcpSession::new(service)))
    }
}

/// Configured headers as typed header pairs.
pub(crate) fn header_map(
    headers: Option<&HashMap<String, String>>,
) -> Result<HashMap<HeaderName, HeaderValue>> {
    let mut map = HashMap::new();
    for (name, value) in headers.into_iter().flatten() {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| StrideError::Configuration(format!("invalid header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| StrideError::Configuration(format!("invalid value for header '{name}': {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

/// HTTP client that sends `headers` on every request.
pub(crate) fn header_client(headers: Option<&HashMap<String, String>>) -> Result<reqwest::Client> {
    let defaults: HeaderMap = header_map(headers)?.into_iter().collect();
    Ok(reqwest::Client::builder().default_headers(defaults).build()?)
}
