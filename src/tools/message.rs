//! User-facing message tools.

use super::toolkit::LocalToolkit;
use super::tool::AgentTool;
use super::types::ToolParameters;
use crate::types::ToolResult;

/// Function that pauses execution until the user replies.
pub const ASK_USER_TOOL: &str = "message_ask_user";
/// Function that sends a progress note without waiting.
pub const NOTIFY_USER_TOOL: &str = "message_notify_user";

/// Toolkit exposing `message_notify_user` and `message_ask_user`.
pub fn message_toolkit() -> LocalToolkit {
    LocalToolkit::new("message")
        .with_tool(AgentTool::new(
            NOTIFY_USER_TOOL,
            "Send a message to the user without requiring a reply. Use it to acknowledge \
             a request, report progress or hand over results.",
            ToolParameters::object()
                .string("text", "Message text shown to the user", true)
                .string_array("attachments", "Files to show the user (absolute paths)", false)
                .build(),
            |_args| async { Ok(ToolResult::ok("Continue")) },
        ))
        .with_tool(AgentTool::new(
            ASK_USER_TOOL,
            "Ask the user a question and wait for the answer. Use it for clarification, \
             confirmation or when the user must take over (for example a login).",
            ToolParameters::object()
                .string("text", "Question shown to the user", true)
                .string_array("attachments", "Files related to the question (absolute paths)", false)
                .string_enum(
                    "suggest_user_takeover",
                    "Suggest that the user takes over an interactive session",
                    &["none", "browser"],
                    false,
                )
                .build(),
            |_args| async { Ok(ToolResult::ok("Waiting for the user's reply")) },
        ))
}
