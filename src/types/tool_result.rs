//! Shared tool result shape.

use serde::{Deserialize, Serialize};

/// Outcome of a tool invocation, local or remote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

fn default_success() -> bool {
    true
}

impl Default for ToolResult {
    fn default() -> Self {
        Self {
            success: true,
            message: None,
            data: None,
        }
    }
}

impl ToolResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }

    /// JSON body written into a `tool` memory record.
    pub fn to_content(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            self.message.clone().unwrap_or_default()
        })
    }
}
