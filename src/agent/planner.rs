//! Planner: turns a request into a [`Plan`] and revises its unfinished suffix.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::base::{BaseAgent, ToolSet};
use super::prompts;
use super::stream::EventSink;
use crate::config::AgentConfig;
use crate::error::{Result, StrideError};
use crate::llm::{LlmClient, ResponseFormat, ToolChoice};
use crate::types::{Event, EventKind, Plan, PlanEventStatus, Step, UserInput};

#[derive(Debug, Deserialize)]
struct RevisedSteps {
    #[serde(default)]
    steps: Vec<Step>,
}

/// Agent that plans but never calls tools.
#[derive(Debug, Clone)]
pub struct PlannerAgent {
    agent: BaseAgent,
}

impl PlannerAgent {
    pub fn new(llm: Arc<dyn LlmClient>, config: AgentConfig, tools: ToolSet) -> Self {
        let agent = BaseAgent::builder("planner", llm, config)
            .system_prompt(prompts::planner_system_prompt())
            .tools(tools)
            .response_format(ResponseFormat::JsonObject)
            .tool_choice(ToolChoice::None)
            .build();
        Self { agent }
    }

    pub fn agent(&self) -> &BaseAgent {
        &self.agent
    }

    /// Plan the request. Emits `Plan{created}` and returns the plan, or
    /// `None` when the model produced nothing usable.
    pub async fn create_plan(&self, input: &UserInput, sink: &EventSink) -> Result<Option<Plan>> {
        let query = prompts::create_plan(&input.message, &input.attachments);
        let Some(text) = self.final_text(query, sink).await? else {
            return Ok(None);
        };

        let plan = self
            .agent
            .json_parser()
            .parse(&text, None)
            .and_then(|value| serde_json::from_value::<Plan>(value).map_err(StrideError::from));
        match plan {
            Ok(plan) => {
                info!(plan_id = %plan.id, steps = plan.steps.len(), "plan created");
                sink.emit(EventKind::Plan {
                    plan: plan.clone(),
                    status: PlanEventStatus::Created,
                })
                .await?;
                Ok(Some(plan))
            }
            Err(e) => {
                warn!(error = %e, "planner reply is not a plan");
                sink.emit(Event::error(format!("failed to parse plan: {e}"))).await?;
                Ok(None)
            }
        }
    }

    /// Revise the steps after `step`, keeping every finished step, then emit
    /// `Plan{updated}`.
    pub async fn update_plan(&self, plan: &mut Plan, step: &Step, sink: &EventSink) -> Result<()> {
        let query = prompts::update_plan(&serde_json::to_string(plan)?, &serde_json::to_string(step)?);
        let Some(text) = self.final_text(query, sink).await? else {
            return Ok(());
        };

        let revised = self
            .agent
            .json_parser()
            .parse(&text, None)
            .and_then(|value| serde_json::from_value::<RevisedSteps>(value).map_err(StrideError::from));
        match revised {
            Ok(revised) => {
                plan.replace_pending_steps(revised.steps);
                info!(plan_id = %plan.id, steps = plan.steps.len(), "plan updated");
                sink.emit(EventKind::Plan {
                    plan: plan.clone(),
                    status: PlanEventStatus::Updated,
                })
                .await
            }
            Err(e) => {
                warn!(error = %e, "planner reply is not a step list");
                sink.emit(Event::error(format!("failed to parse plan update: {e}"))).await
            }
        }
    }

    /// Run one query, forwarding everything except the final message, which
    /// is returned. Returns `None` when the loop reported an error first.
    async fn final_text(&self, query: String, sink: &EventSink) -> Result<Option<String>> {
        let mut child = self.agent.invoke_within(sink, query, None);
        let mut failed = false;
        let mut text = None;

        while let Some(event) = child.recv().await {
            match event.kind {
                EventKind::Message { message, .. } => {
                    if !failed {
                        text = Some(message);
                    }
                }
                EventKind::Error { .. } => {
                    failed = true;
                    sink.emit(event).await?;
                }
                _ => sink.emit(event).await?,
            }
        }

        if sink.is_cancelled() {
            return Err(StrideError::Cancelled);
        }
        Ok(text)
    }
}
