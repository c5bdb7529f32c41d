//! Completion backend interface.

pub mod http;
pub mod openai;

pub use openai::OpenAiCompatibleClient;

use async_trait::async_trait;

use crate::error::Result;
use crate::tools::ToolDefinition;
use crate::types::ChatMessage;

/// Output format hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Tool selection constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    Function(String),
}

/// One completion call.
#[derive(Debug, Clone, Copy)]
pub struct CompletionRequest<'a> {
    pub messages: &'a [ChatMessage],
    pub tools: &'a [ToolDefinition],
    pub response_format: Option<ResponseFormat>,
    pub tool_choice: Option<&'a ToolChoice>,
}

/// A chat-completion backend.
///
/// Transport, auth and protocol failures all surface as
/// [`crate::error::StrideError`] so callers can retry uniformly.
#[async_trait]
pub trait LlmClient: Send + Sync {
    fn model_name(&self) -> &str;

    fn temperature(&self) -> f32;

    fn max_tokens(&self) -> u32;

    /// Request one assistant message.
    async fn invoke(&self, request: CompletionRequest<'_>) -> Result<ChatMessage>;
}
