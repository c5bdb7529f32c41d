//! The shared tool-dispatching execution loop.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::stream::{EventSink, EventStream, DEFAULT_EVENT_BUFFER};
use crate::config::AgentConfig;
use crate::error::{Result, StrideError};
use crate::llm::{CompletionRequest, LlmClient, ResponseFormat, ToolChoice};
use crate::memory::Memory;
use crate::tools::{ToolDefinition, Toolkit, ASK_USER_TOOL};
use crate::types::{ChatMessage, Event, EventKind, Role, ToolCall, ToolEventStatus, ToolResult, UserInput};
use crate::util::json::{JsonParser, RepairJsonParser};
use crate::util::retry::RetryPolicy;

/// User turn injected after an empty assistant reply.
pub const EMPTY_REPLY_NUDGE: &str = "No reply was received. Please continue.";

/// Toolkits available to an agent. Local toolkits resolve before remote ones.
#[derive(Clone, Default)]
pub struct ToolSet {
    local: Vec<Arc<dyn Toolkit>>,
    remote: Vec<Arc<dyn Toolkit>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local(mut self, toolkit: Arc<dyn Toolkit>) -> Self {
        self.local.push(toolkit);
        self
    }

    pub fn with_remote(mut self, toolkit: Arc<dyn Toolkit>) -> Self {
        self.remote.push(toolkit);
        self
    }

    fn all(&self) -> impl Iterator<Item = &Arc<dyn Toolkit>> {
        self.local.iter().chain(self.remote.iter())
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.all().flat_map(|t| t.definitions()).collect()
    }

    pub fn resolve(&self, function_name: &str) -> Option<Arc<dyn Toolkit>> {
        self.all().find(|t| t.has_tool(function_name)).cloned()
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet")
            .field("local", &self.local.iter().map(|t| t.name()).collect::<Vec<_>>())
            .field("remote", &self.remote.iter().map(|t| t.name()).collect::<Vec<_>>())
            .finish()
    }
}

struct AgentInner {
    name: String,
    llm: Arc<dyn LlmClient>,
    config: AgentConfig,
    tools: ToolSet,
    memory: Mutex<Memory>,
    json_parser: Arc<dyn JsonParser>,
    response_format: Option<ResponseFormat>,
    tool_choice: Option<ToolChoice>,
    interrupt_on: HashSet<String>,
}

/// Builder for [`BaseAgent`].
pub struct AgentBuilder {
    name: String,
    llm: Arc<dyn LlmClient>,
    config: AgentConfig,
    system_prompt: Option<String>,
    tools: ToolSet,
    json_parser: Arc<dyn JsonParser>,
    response_format: Option<ResponseFormat>,
    tool_choice: Option<ToolChoice>,
    interrupt_on: HashSet<String>,
    compactable: Vec<String>,
}

impl AgentBuilder {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn tools(mut self, tools: ToolSet) -> Self {
        self.tools = tools;
        self
    }

    pub fn json_parser(mut self, parser: Arc<dyn JsonParser>) -> Self {
        self.json_parser = parser;
        self
    }

    /// Output format used when `invoke` is called without one.
    pub fn response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    /// Stop the loop right after this function's `called` event, leaving
    /// its result out of memory.
    pub fn interrupt_on(mut self, function_name: impl Into<String>) -> Self {
        self.interrupt_on.insert(function_name.into());
        self
    }

    /// Function names whose results [`BaseAgent::compact_memory`] may drop.
    pub fn compactable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compactable = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn build(self) -> BaseAgent {
        let memory = match self.system_prompt {
            Some(prompt) => Memory::new(prompt),
            None => Memory::default(),
        }
        .with_compactable(self.compactable);

        BaseAgent {
            inner: Arc::new(AgentInner {
                name: self.name,
                llm: self.llm,
                config: self.config,
                tools: self.tools,
                memory: Mutex::new(memory),
                json_parser: self.json_parser,
                response_format: self.response_format,
                tool_choice: self.tool_choice,
                interrupt_on: self.interrupt_on,
            }),
        }
    }
}

/// Conversation loop against a completion backend with single-tool rounds.
///
/// Cloning is cheap and shares memory.
#[derive(Clone)]
pub struct BaseAgent {
    inner: Arc<AgentInner>,
}

impl std::fmt::Debug for BaseAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BaseAgent")
            .field("name", &self.inner.name)
            .field("model", &self.inner.llm.model_name())
            .field("tools", &self.inner.tools)
            .finish()
    }
}

impl BaseAgent {
    pub fn builder(name: impl Into<String>, llm: Arc<dyn LlmClient>, config: AgentConfig) -> AgentBuilder {
        AgentBuilder {
            name: name.into(),
            llm,
            config,
            system_prompt: None,
            tools: ToolSet::default(),
            json_parser: Arc::new(RepairJsonParser),
            response_format: None,
            tool_choice: None,
            interrupt_on: HashSet::new(),
            compactable: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn json_parser(&self) -> &dyn JsonParser {
        self.inner.json_parser.as_ref()
    }

    /// Run one query through the loop on its own task.
    pub fn invoke(&self, query: impl Into<String>, format: Option<ResponseFormat>) -> EventStream {
        let agent = self.clone();
        let query = query.into();
        EventStream::spawn(DEFAULT_EVENT_BUFFER, move |sink| async move {
            agent.run(query, format, &sink).await
        })
    }

    /// Same as [`invoke`](Self::invoke) but cancelled together with `parent`.
    pub fn invoke_within(
        &self,
        parent: &EventSink,
        query: impl Into<String>,
        format: Option<ResponseFormat>,
    ) -> EventStream {
        let agent = self.clone();
        let query = query.into();
        parent.spawn_child(move |sink| async move { agent.run(query, format, &sink).await })
    }

    /// Drive the loop, sending events to `sink`.
    pub async fn run(&self, query: String, format: Option<ResponseFormat>, sink: &EventSink) -> Result<()> {
        let format = format.or(self.inner.response_format);
        let max_iterations = self.inner.config.max_iterations;

        let mut message = match self.invoke_llm(vec![ChatMessage::user(query)], format, sink).await {
            Ok(message) => message,
            Err(e) => return self.fail(e, "", sink).await,
        };

        let mut iterations = 0;
        while let Some(call) = message.tool_calls.first().cloned() {
            if iterations >= max_iterations {
                self.drop_unanswered_call().await;
                let error = format!("{}: reached the iteration limit ({max_iterations})", self.inner.name);
                sink.emit(Event::error(error)).await?;
                break;
            }
            iterations += 1;

            let function_name = call.function.name.clone();
            let Some(toolkit) = self.inner.tools.resolve(&function_name) else {
                self.drop_unanswered_call().await;
                return self
                    .fail(StrideError::ToolNotFound(function_name), message.text(), sink)
                    .await;
            };

            let args = self
                .inner
                .json_parser
                .parse(&call.function.arguments, Some(Value::Object(Default::default())))
                .unwrap_or_else(|_| Value::Object(Default::default()));

            sink.emit(tool_event(&call, toolkit.name(), &args, None)).await?;
            let result = self.invoke_tool(toolkit.as_ref(), &function_name, &args, sink).await?;
            sink.emit(tool_event(&call, toolkit.name(), &args, Some(result.clone())))
                .await?;

            debug!(
                agent = %self.inner.name,
                iteration = iterations,
                function = %function_name,
                success = result.success,
                "tool round complete"
            );

            if self.inner.interrupt_on.contains(&function_name) {
                return Ok(());
            }

            let tool_message = ChatMessage::tool_result(&call.id, &function_name, result.to_content());
            message = match self.invoke_llm(vec![tool_message], format, sink).await {
                Ok(message) => message,
                Err(e) => return self.fail(e, "", sink).await,
            };
        }

        sink.emit(Event::message(message.text())).await
    }

    /// Terminal fault: an `Error` event followed by the closing `Message`.
    async fn fail(&self, error: StrideError, final_text: &str, sink: &EventSink) -> Result<()> {
        if matches!(error, StrideError::Cancelled) {
            return Err(error);
        }
        warn!(agent = %self.inner.name, error = %error, "agent loop failed");
        sink.emit(Event::error(&error)).await?;
        sink.emit(Event::message(final_text)).await
    }

    /// Append `messages` and request a reply, retrying failures and empty replies.
    async fn invoke_llm(
        &self,
        messages: Vec<ChatMessage>,
        format: Option<ResponseFormat>,
        sink: &EventSink,
    ) -> Result<ChatMessage> {
        let inner = &self.inner;
        let attempts = inner.config.max_retries.max(1);
        let tools = inner.tools.definitions();
        let mut memory = inner.memory.lock().await;
        memory.add_messages(messages);

        let mut last_error = String::new();
        for attempt in 1..=attempts {
            let request = CompletionRequest {
                messages: memory.messages(),
                tools: &tools,
                response_format: format,
                tool_choice: inner.tool_choice.as_ref(),
            };
            let outcome = sink.guard(inner.llm.invoke(request)).await;
            match outcome {
                Ok(mut reply) if !reply.is_empty_reply() => {
                    reply.role = Role::Assistant;
                    reply.tool_calls.truncate(1);
                    memory.add_message(reply.clone());
                    return Ok(reply);
                }
                Ok(_) => {
                    warn!(agent = %inner.name, attempt, max_attempts = attempts, "empty assistant reply");
                    memory.add_messages([ChatMessage::assistant(""), ChatMessage::user(EMPTY_REPLY_NUDGE)]);
                    last_error = "empty assistant reply".to_string();
                }
                Err(StrideError::Cancelled) => return Err(StrideError::Cancelled),
                Err(e) => {
                    warn!(agent = %inner.name, attempt, max_attempts = attempts, error = %e, "completion failed");
                    last_error = e.to_string();
                    if attempt < attempts {
                        sink.sleep(inner.config.retry_interval()).await?;
                    }
                }
            }
        }

        Err(StrideError::RetriesExhausted {
            attempts,
            message: last_error,
        })
    }

    /// Call a tool with the retry budget. Failures become a failed result.
    async fn invoke_tool(
        &self,
        toolkit: &dyn Toolkit,
        function_name: &str,
        args: &Value,
        sink: &EventSink,
    ) -> Result<ToolResult> {
        let config = &self.inner.config;
        let policy = RetryPolicy::fixed(config.max_retries, config.retry_interval());
        let outcome = sink
            .guard(policy.execute(move || toolkit.invoke(function_name, args.clone())))
            .await;
        match outcome {
            Ok(result) => Ok(result),
            Err(StrideError::Cancelled) => Err(StrideError::Cancelled),
            Err(e) => {
                warn!(agent = %self.inner.name, function = %function_name, error = %e, "tool failed");
                Ok(ToolResult::failure(e.to_string()))
            }
        }
    }

    /// Remove a trailing assistant turn whose tool call will never be answered.
    async fn drop_unanswered_call(&self) {
        let mut memory = self.inner.memory.lock().await;
        if memory
            .last_message()
            .is_some_and(|m| m.role == Role::Assistant && !m.tool_calls.is_empty())
        {
            memory.roll_back();
        }
    }

    /// Prepare memory for resuming with the user's reply.
    ///
    /// A pending `message_ask_user` call is answered with the reply.
    /// Otherwise the last record is removed.
    pub async fn roll_back(&self, input: &UserInput) {
        let mut memory = self.inner.memory.lock().await;
        let pending_ask = memory
            .last_message()
            .filter(|m| m.role == Role::Assistant)
            .and_then(|m| m.tool_calls.first())
            .filter(|call| call.function.name == ASK_USER_TOOL)
            .map(|call| call.id.clone());

        match pending_ask {
            Some(call_id) => {
                memory.add_message(ChatMessage::tool_result(call_id, ASK_USER_TOOL, input.message.clone()))
            }
            None => {
                memory.roll_back();
            }
        }
    }

    pub async fn compact_memory(&self) -> usize {
        self.inner.memory.lock().await.compact()
    }

    /// Copy of the current conversation.
    pub async fn memory_snapshot(&self) -> Vec<ChatMessage> {
        self.inner.memory.lock().await.messages().to_vec()
    }
}

fn tool_event(call: &ToolCall, tool_name: &str, args: &Value, result: Option<ToolResult>) -> Event {
    let status = if result.is_some() {
        ToolEventStatus::Called
    } else {
        ToolEventStatus::Calling
    };
    Event::new(EventKind::Tool {
        tool_call_id: call.id.clone(),
        tool_name: tool_name.to_string(),
        function_name: call.function.name.clone(),
        function_args: args.clone(),
        function_result: result,
        status,
    })
}
