//! OpenAI-compatible Chat Completions client.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::http::{bearer_headers, build_client, status_to_error};
use super::{CompletionRequest, LlmClient, ResponseFormat, ToolChoice};
use crate::config::LlmConfig;
use crate::error::{Result, StrideError};
use crate::types::{ChatMessage, FunctionCall, Role, ToolCall};

/// Client for any endpoint speaking the `/chat/completions` protocol.
#[derive(Debug, Clone)]
pub struct OpenAiCompatibleClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl OpenAiCompatibleClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        config.validate()?;
        let http = build_client(config.request_timeout())?;
        Ok(Self { config, http })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    fn build_request_body(&self, request: &CompletionRequest<'_>) -> serde_json::Value {
        let messages = request.messages.iter().map(message_to_openai).collect::<Vec<_>>();

        let mut body = serde_json::Map::new();
        body.insert("model".into(), self.config.model_name.clone().into());
        body.insert("messages".into(), messages.into());
        body.insert("temperature".into(), self.config.temperature.into());
        body.insert("max_tokens".into(), self.config.max_tokens.into());

        if !request.tools.is_empty() {
            let tools = request.tools.iter().map(|t| t.to_openai()).collect::<Vec<_>>();
            body.insert("tools".into(), tools.into());
            body.insert("parallel_tool_calls".into(), false.into());
            if let Some(choice) = request.tool_choice {
                body.insert("tool_choice".into(), tool_choice_to_openai(choice));
            }
        }

        if request.response_format == Some(ResponseFormat::JsonObject) {
            body.insert("response_format".into(), serde_json::json!({"type": "json_object"}));
        }

        serde_json::Value::Object(body)
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatibleClient {
    fn model_name(&self) -> &str {
        &self.config.model_name
    }

    fn temperature(&self) -> f32 {
        self.config.temperature
    }

    fn max_tokens(&self) -> u32 {
        self.config.max_tokens
    }

    async fn invoke(&self, request: CompletionRequest<'_>) -> Result<ChatMessage> {
        let body = self.build_request_body(&request);

        debug!(
            model = %self.config.model_name,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "chat completion request"
        );

        let resp = self
            .http
            .post(self.endpoint())
            .headers(bearer_headers(&self.config.api_key))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body_text));
        }

        let data: OpenAiChatResponse = resp.json().await?;
        let choice = data
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| StrideError::api(200, "No choices in completion response"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc
                    .id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
                kind: tc.kind.unwrap_or_else(|| "function".to_string()),
                function: FunctionCall {
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                },
            })
            .collect();

        Ok(ChatMessage {
            role: Role::Assistant,
            content: choice.message.content,
            tool_calls,
            tool_call_id: None,
            function_name: None,
        })
    }
}

fn tool_choice_to_openai(choice: &ToolChoice) -> serde_json::Value {
    match choice {
        ToolChoice::Auto => "auto".into(),
        ToolChoice::None => "none".into(),
        ToolChoice::Required => "required".into(),
        ToolChoice::Function(name) => serde_json::json!({
            "type": "function",
            "function": { "name": name },
        }),
    }
}

fn message_to_openai(msg: &ChatMessage) -> serde_json::Value {
    let mut out = serde_json::Map::new();
    out.insert("role".into(), msg.role.to_string().into());
    out.insert(
        "content".into(),
        msg.content.clone().map_or(serde_json::Value::Null, Into::into),
    );
    if !msg.tool_calls.is_empty() {
        out.insert("tool_calls".into(), serde_json::json!(msg.tool_calls));
    }
    if let Some(id) = &msg.tool_call_id {
        out.insert("tool_call_id".into(), id.clone().into());
    }
    serde_json::Value::Object(out)
}

// Chat Completions response types (internal)

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Deserialize)]
struct OpenAiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Deserialize)]
struct OpenAiToolCall {
    /// Some backends send null or omit it.
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
    function: OpenAiFunction,
}

#[derive(Deserialize)]
struct OpenAiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}
