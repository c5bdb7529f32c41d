//! Plan and step model.

use serde::{Deserialize, Serialize};

/// Execution status shared by plans and steps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl ExecutionStatus {
    /// Terminal states.
    pub fn is_done(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One unit of work in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub attachments: Vec<String>,
}

impl Step {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            description: description.into(),
            status: ExecutionStatus::Pending,
            result: None,
            error: None,
            success: false,
            attachments: Vec::new(),
        }
    }

    pub fn done(&self) -> bool {
        self.status.is_done()
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.success = false;
        self.error = Some(error.into());
    }
}

/// An ordered decomposition of a user goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    /// Planner's reply to the user, shown alongside the plan.
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub status: ExecutionStatus,
    #[serde(default)]
    pub error: Option<String>,
}

impl Default for Plan {
    fn default() -> Self {
        Self {
            id: new_id(),
            title: String::new(),
            goal: String::new(),
            language: String::new(),
            steps: Vec::new(),
            message: None,
            status: ExecutionStatus::Pending,
            error: None,
        }
    }
}

impl Plan {
    pub fn done(&self) -> bool {
        self.status.is_done()
    }

    /// Index of the first step that has not reached a terminal state.
    pub fn next_pending_index(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.done())
    }

    pub fn next_pending_step(&self) -> Option<&Step> {
        self.next_pending_index().map(|i| &self.steps[i])
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// Replace every step from the first unfinished one onward.
    ///
    /// Finished steps are never touched. A plan with no unfinished step is
    /// left as is.
    pub fn replace_pending_steps(&mut self, revised: Vec<Step>) {
        let Some(first_pending) = self.next_pending_index() else {
            return;
        };
        self.steps.truncate(first_pending);
        self.steps.extend(revised);
    }
}
