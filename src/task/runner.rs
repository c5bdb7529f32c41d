//! Task runner that feeds queued user messages through a plan-act flow.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::task::{Task, TaskRunner};
use crate::agent::{PlanActFlow, ToolSet};
use crate::config::AppConfig;
use crate::error::Result;
use crate::llm::{LlmClient, OpenAiCompatibleClient};
#[cfg(feature = "mcp")]
use crate::mcp::{McpClientManager, McpToolkit};
use crate::tools::message_toolkit;
use crate::types::{EventKind, UserInput};

/// Runs the agent for every message on a task's input queue and writes the
/// resulting events, as JSON, to its output queue.
///
/// Stops after a `Wait`; the next execution resumes the paused flow.
pub struct AgentTaskRunner {
    flow: Arc<Mutex<PlanActFlow>>,
    #[cfg(feature = "mcp")]
    mcp: Option<Arc<McpClientManager>>,
}

impl std::fmt::Debug for AgentTaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentTaskRunner").finish_non_exhaustive()
    }
}

impl AgentTaskRunner {
    pub fn new(flow: PlanActFlow) -> Self {
        Self {
            flow: Arc::new(Mutex::new(flow)),
            #[cfg(feature = "mcp")]
            mcp: None,
        }
    }

    /// Connect MCP servers before the first message and close them on destroy.
    #[cfg(feature = "mcp")]
    pub fn with_mcp(mut self, manager: Arc<McpClientManager>) -> Self {
        self.mcp = Some(manager);
        self
    }

    /// Build the OpenAI-compatible client, message tools and MCP tools
    /// described by `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiCompatibleClient::new(config.llm_config.clone())?);
        let tools = ToolSet::new().with_local(Arc::new(message_toolkit()));

        #[cfg(feature = "mcp")]
        let manager = Arc::new(McpClientManager::with_rmcp(config.mcp_config.clone()));
        #[cfg(feature = "mcp")]
        let tools = tools.with_remote(Arc::new(McpToolkit::new(manager.clone())));

        let runner = Self::new(PlanActFlow::new(llm, config.agent_config.clone(), tools));
        #[cfg(feature = "mcp")]
        let runner = runner.with_mcp(manager);
        Ok(runner)
    }

    pub fn flow(&self) -> &Arc<Mutex<PlanActFlow>> {
        &self.flow
    }
}

/// Queue payloads are `{message, attachments}` JSON; bare text is accepted too.
fn parse_input(payload: &str) -> UserInput {
    serde_json::from_str(payload).unwrap_or_else(|_| UserInput::new(payload))
}

#[async_trait]
impl TaskRunner for AgentTaskRunner {
    async fn invoke(&self, task: Arc<Task>) -> Result<()> {
        #[cfg(feature = "mcp")]
        if let Some(mcp) = &self.mcp {
            mcp.initialize().await?;
        }

        while let Some(entry) = task.input().pop().await? {
            let input = parse_input(&entry.payload);
            info!(task_id = %task.id(), entry_id = %entry.id, "processing user message");

            let mut events = PlanActFlow::stream(self.flow.clone(), input);
            let mut waiting = false;
            while let Some(event) = events.recv().await {
                waiting |= matches!(event.kind, EventKind::Wait);
                task.output().put(serde_json::to_string(&event)?).await?;
            }

            if waiting {
                debug!(task_id = %task.id(), "waiting for user input");
                break;
            }
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        #[cfg(feature = "mcp")]
        if let Some(mcp) = &self.mcp {
            mcp.cleanup().await;
        }
        Ok(())
    }

    async fn on_done(&self, task: &Task) {
        match task.output().size().await {
            Ok(size) => info!(task_id = %task.id(), events = size, "agent task done"),
            Err(e) => warn!(task_id = %task.id(), error = %e, "agent task done, output queue unavailable"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_accept_json_or_text() {
        let input = parse_input(r#"{"message": "plan a trip", "attachments": ["/tmp/a.txt"]}"#);
        assert_eq!(input.message, "plan a trip");
        assert_eq!(input.attachments, vec!["/tmp/a.txt"]);
        assert_eq!(parse_input("just text").message, "just text");
    }
}
