//! Plan-act flow: plan, execute step by step, replan, summarize.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;

use super::base::ToolSet;
use super::planner::PlannerAgent;
use super::react::{ReActAgent, StepOutcome};
use super::stream::{EventSink, EventStream, DEFAULT_EVENT_BUFFER};
use crate::config::AgentConfig;
use crate::error::Result;
use crate::llm::LlmClient;
use crate::types::{Event, EventKind, ExecutionStatus, Plan, PlanEventStatus, Step, UserInput};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FlowStatus {
    #[default]
    Idle,
    Planning,
    Executing,
    Updating,
    Summarizing,
    Completed,
}

/// Drives a planner and an executor over one conversation.
///
/// State survives a `Wait`, so the next [`run`](Self::run) resumes the step
/// that asked the user.
#[derive(Debug)]
pub struct PlanActFlow {
    planner: PlannerAgent,
    executor: ReActAgent,
    status: FlowStatus,
    plan: Option<Plan>,
    last_step: Option<Step>,
    waiting: bool,
}

impl PlanActFlow {
    pub fn new(llm: Arc<dyn LlmClient>, config: AgentConfig, tools: ToolSet) -> Self {
        Self::from_agents(
            PlannerAgent::new(llm.clone(), config.clone(), tools.clone()),
            ReActAgent::new(llm, config, tools),
        )
    }

    pub fn from_agents(planner: PlannerAgent, executor: ReActAgent) -> Self {
        Self {
            planner,
            executor,
            status: FlowStatus::Idle,
            plan: None,
            last_step: None,
            waiting: false,
        }
    }

    pub fn status(&self) -> FlowStatus {
        self.status
    }

    pub fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    pub fn planner(&self) -> &PlannerAgent {
        &self.planner
    }

    pub fn executor(&self) -> &ReActAgent {
        &self.executor
    }

    /// Run the flow on a spawned task, feeding the returned stream.
    pub fn stream(flow: Arc<Mutex<Self>>, input: UserInput) -> EventStream {
        EventStream::spawn(DEFAULT_EVENT_BUFFER, move |sink| async move {
            let mut flow = flow.lock().await;
            flow.run(&input, &sink).await
        })
    }

    /// Handle one user message. Ends with `Done`, or returns right after a
    /// `Wait` with the flow paused.
    pub async fn run(&mut self, input: &UserInput, sink: &EventSink) -> Result<()> {
        if self.waiting {
            info!("resuming after user reply");
            self.waiting = false;
            self.executor.roll_back(input).await;
            self.status = FlowStatus::Executing;
        } else {
            self.plan = None;
            self.last_step = None;
            self.status = FlowStatus::Planning;
        }

        loop {
            match self.status {
                FlowStatus::Planning => {
                    info!("creating plan");
                    match self.planner.create_plan(input, sink).await? {
                        Some(plan) => {
                            sink.emit(EventKind::Title {
                                title: plan.title.clone(),
                            })
                            .await?;
                            if let Some(message) = plan.message.as_deref().filter(|m| !m.is_empty()) {
                                sink.emit(Event::message(message)).await?;
                            }
                            self.plan = Some(plan);
                            self.status = FlowStatus::Executing;
                        }
                        None => self.status = FlowStatus::Idle,
                    }
                }
                FlowStatus::Executing => {
                    let Some(plan) = self.plan.as_mut() else {
                        self.status = FlowStatus::Idle;
                        continue;
                    };
                    plan.status = ExecutionStatus::Running;
                    let Some(index) = plan.next_pending_index() else {
                        self.status = FlowStatus::Summarizing;
                        continue;
                    };

                    let mut step = plan.steps[index].clone();
                    info!(step_id = %step.id, description = %step.description, "executing step");
                    let outcome = self.executor.execute_step(plan, &mut step, input, sink).await?;
                    plan.steps[index] = step.clone();

                    if outcome == StepOutcome::WaitingForUser {
                        self.waiting = true;
                        return Ok(());
                    }
                    self.executor.compact_memory().await;
                    self.last_step = Some(step);
                    self.status = FlowStatus::Updating;
                }
                FlowStatus::Updating => {
                    if let (Some(plan), Some(step)) = (self.plan.as_mut(), self.last_step.as_ref()) {
                        self.planner.update_plan(plan, step, sink).await?;
                    }
                    self.status = FlowStatus::Executing;
                }
                FlowStatus::Summarizing => {
                    self.executor.summarize(sink).await?;
                    self.status = FlowStatus::Completed;
                }
                FlowStatus::Completed => {
                    if let Some(plan) = self.plan.as_mut() {
                        plan.status = ExecutionStatus::Completed;
                        sink.emit(EventKind::Plan {
                            plan: plan.clone(),
                            status: PlanEventStatus::Completed,
                        })
                        .await?;
                    }
                    self.status = FlowStatus::Idle;
                }
                FlowStatus::Idle => break,
            }
        }

        sink.emit(EventKind::Done).await
    }
}
