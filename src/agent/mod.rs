//! Agents: the shared tool loop, planner, executor and the flow that joins them.

pub mod base;
pub mod flow;
pub mod planner;
pub mod prompts;
pub mod react;
pub mod stream;

pub use base::{AgentBuilder, BaseAgent, ToolSet, EMPTY_REPLY_NUDGE};
pub use flow::{FlowStatus, PlanActFlow};
pub use planner::PlannerAgent;
pub use react::{ReActAgent, StepOutcome, StepReport, Summary};
pub use stream::{EventSink, EventStream, DEFAULT_EVENT_BUFFER};
