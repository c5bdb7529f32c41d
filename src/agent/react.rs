//! Executor: runs plan steps with tools and writes the final summary.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::base::{BaseAgent, ToolSet};
use super::prompts;
use super::stream::EventSink;
use crate::config::AgentConfig;
use crate::error::{Result, StrideError};
use crate::llm::{LlmClient, ResponseFormat};
use crate::tools::{ASK_USER_TOOL, NOTIFY_USER_TOOL};
use crate::types::{
    Event, EventKind, ExecutionStatus, FileRecord, Plan, Role, Step, StepEventStatus, ToolEventStatus,
    UserInput,
};

/// How a call to [`ReActAgent::execute_step`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step reached a terminal status.
    Finished,
    /// The step asked the user something and is still open.
    WaitingForUser,
}

/// Structured report the executor returns when a step is done.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StepReport {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub attachments: Vec<String>,
}

/// Final summary of a finished task.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Summary {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ReActAgent {
    agent: BaseAgent,
}

impl ReActAgent {
    pub fn new(llm: Arc<dyn LlmClient>, config: AgentConfig, tools: ToolSet) -> Self {
        let agent = BaseAgent::builder("executor", llm, config)
            .system_prompt(prompts::react_system_prompt())
            .tools(tools)
            .response_format(ResponseFormat::JsonObject)
            .interrupt_on(ASK_USER_TOOL)
            .compactable([NOTIFY_USER_TOOL])
            .build();
        Self { agent }
    }

    pub fn agent(&self) -> &BaseAgent {
        &self.agent
    }

    /// Run `step` to completion or until the user is asked a question.
    ///
    /// A step still pending when the loop ends is marked completed. A failed
    /// step keeps its failure.
    pub async fn execute_step(
        &self,
        plan: &Plan,
        step: &mut Step,
        input: &UserInput,
        sink: &EventSink,
    ) -> Result<StepOutcome> {
        step.status = ExecutionStatus::Running;
        sink.emit(step_event(step, StepEventStatus::Started)).await?;

        let query = prompts::execute_step(
            &input.message,
            &input.attachments,
            &plan.language,
            &step.description,
        );
        let mut child = self.agent.invoke_within(sink, query, None);

        while let Some(event) = child.recv().await {
            match event.kind {
                EventKind::Tool {
                    ref function_name,
                    ref function_args,
                    status,
                    ..
                } if function_name == ASK_USER_TOOL => match status {
                    ToolEventStatus::Calling => {
                        sink.emit(ask_user_message(function_args)).await?;
                    }
                    ToolEventStatus::Called => {
                        debug!(step_id = %step.id, "step waiting for user");
                        sink.emit(EventKind::Wait).await?;
                        return Ok(StepOutcome::WaitingForUser);
                    }
                },
                EventKind::Message { ref message, .. } => {
                    if step.status == ExecutionStatus::Failed {
                        continue;
                    }
                    match self.parse_report(message) {
                        Ok(report) => {
                            step.success = report.success;
                            step.result = report.result.clone();
                            step.attachments = report.attachments.clone();
                            step.status = ExecutionStatus::Completed;
                            sink.emit(step_event(step, StepEventStatus::Completed)).await?;
                            if let Some(result) = report.result.filter(|r| !r.is_empty()) {
                                sink.emit(user_message(result, &report.attachments)).await?;
                            }
                        }
                        Err(e) => {
                            warn!(step_id = %step.id, error = %e, "step report is not valid JSON");
                            step.mark_failed(e.to_string());
                            sink.emit(step_event(step, StepEventStatus::Failed)).await?;
                        }
                    }
                }
                EventKind::Error { ref error } => {
                    step.mark_failed(error.clone());
                    sink.emit(step_event(step, StepEventStatus::Failed)).await?;
                    sink.emit(event).await?;
                }
                _ => sink.emit(event).await?,
            }
        }

        if sink.is_cancelled() {
            return Err(StrideError::Cancelled);
        }
        if !step.done() {
            step.status = ExecutionStatus::Completed;
        }
        Ok(StepOutcome::Finished)
    }

    /// Ask for the task summary and emit it as a user-facing message.
    pub async fn summarize(&self, sink: &EventSink) -> Result<()> {
        let mut child = self.agent.invoke_within(sink, prompts::SUMMARIZE_PROMPT, None);

        while let Some(event) = child.recv().await {
            match event.kind {
                EventKind::Message { ref message, .. } => {
                    let summary = self
                        .agent
                        .json_parser()
                        .parse(message, None)
                        .and_then(|v| serde_json::from_value::<Summary>(v).map_err(StrideError::from));
                    match summary {
                        Ok(summary) => sink.emit(user_message(summary.message, &summary.attachments)).await?,
                        Err(e) => sink.emit(Event::error(format!("failed to parse summary: {e}"))).await?,
                    }
                }
                _ => sink.emit(event).await?,
            }
        }

        if sink.is_cancelled() {
            return Err(StrideError::Cancelled);
        }
        Ok(())
    }

    /// Fold the user's reply into memory before resuming a waiting step.
    pub async fn roll_back(&self, input: &UserInput) {
        self.agent.roll_back(input).await;
    }

    pub async fn compact_memory(&self) -> usize {
        self.agent.compact_memory().await
    }

    fn parse_report(&self, text: &str) -> Result<StepReport> {
        let value = self.agent.json_parser().parse(text, None)?;
        Ok(serde_json::from_value(value)?)
    }
}

fn step_event(step: &Step, status: StepEventStatus) -> EventKind {
    EventKind::Step {
        step: step.clone(),
        status,
    }
}

fn user_message(text: impl Into<String>, attachments: &[String]) -> EventKind {
    EventKind::Message {
        role: Role::Assistant,
        message: text.into(),
        attachments: attachments.iter().map(FileRecord::from_path).collect(),
    }
}

fn ask_user_message(args: &Value) -> EventKind {
    let text = args.get("text").and_then(Value::as_str).unwrap_or_default();
    let attachments: Vec<String> = args
        .get("attachments")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    user_message(text, &attachments)
}
