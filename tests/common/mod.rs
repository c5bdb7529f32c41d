//! Shared test helpers: scripted completion backend, recording toolkits,
//! mock MCP sessions and task runners.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

use stride::config::{AgentConfig, McpServerConfig};
use stride::error::{Result, StrideError};
use stride::llm::{CompletionRequest, LlmClient, ResponseFormat, ToolChoice};
use stride::mcp::{McpCallOutput, McpConnector, McpSession, McpTool};
use stride::task::{Task, TaskRunner};
use stride::tools::{AgentTool, LocalToolkit, ToolParameters};
use stride::types::{ChatMessage, Event, EventKind, ToolCall, ToolResult};

/// Agent limits with no retry delay.
pub fn test_config() -> AgentConfig {
    AgentConfig {
        max_iterations: 10,
        max_retries: 3,
        max_search_results: 10,
        retry_interval_ms: 0,
    }
}

/// Assistant turn requesting one call per `(id, function, args)`.
pub fn tool_calls(calls: &[(&str, &str, Value)]) -> ChatMessage {
    ChatMessage::assistant_tool_calls(
        calls
            .iter()
            .map(|(id, name, args)| ToolCall::new(*id, *name, args.to_string()))
            .collect(),
    )
}

pub fn tool_call(id: &str, name: &str, args: Value) -> ChatMessage {
    tool_calls(&[(id, name, args)])
}

/// One completion request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub messages: Vec<ChatMessage>,
    pub tool_names: Vec<String>,
    pub response_format: Option<ResponseFormat>,
    pub tool_choice: Option<ToolChoice>,
}

/// Completion backend that replays queued replies in order.
#[derive(Default)]
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<ChatMessage>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, message: ChatMessage) -> &Self {
        self.replies.lock().unwrap().push_back(Ok(message));
        self
    }

    pub fn text(&self, text: &str) -> &Self {
        self.reply(ChatMessage::assistant(text))
    }

    pub fn json(&self, value: Value) -> &Self {
        self.text(&value.to_string())
    }

    pub fn fail(&self, error: StrideError) -> &Self {
        self.replies.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn temperature(&self) -> f32 {
        0.0
    }

    fn max_tokens(&self) -> u32 {
        1024
    }

    async fn invoke(&self, request: CompletionRequest<'_>) -> Result<ChatMessage> {
        self.requests.lock().unwrap().push(RecordedRequest {
            messages: request.messages.to_vec(),
            tool_names: request.tools.iter().map(|t| t.name.clone()).collect(),
            response_format: request.response_format,
            tool_choice: request.tool_choice.cloned(),
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(StrideError::api(500, "script exhausted")))
    }
}

/// Calls seen by a recording toolkit, as `(function, args)`.
pub type CallLog = Arc<Mutex<Vec<(String, Value)>>>;

/// Toolkit whose functions record their arguments and answer `"<fn> ok"`.
pub fn recording_toolkit(name: &str, functions: &[&str]) -> (LocalToolkit, CallLog) {
    let log: CallLog = Arc::default();
    let mut toolkit = LocalToolkit::new(name);
    for function in functions {
        let log = log.clone();
        let function_name = function.to_string();
        toolkit.register(Arc::new(AgentTool::new(
            *function,
            format!("test function {function}"),
            ToolParameters::object().string("input", "free text", false).build(),
            move |args| {
                let log = log.clone();
                let function_name = function_name.clone();
                async move {
                    log.lock().unwrap().push((function_name.clone(), args.raw().clone()));
                    Ok(ToolResult::ok(format!("{function_name} ok")))
                }
            },
        )));
    }
    (toolkit, log)
}

pub fn kinds(events: &[Event]) -> Vec<&'static str> {
    events
        .iter()
        .map(|e| match &e.kind {
            EventKind::Plan { .. } => "plan",
            EventKind::Title { .. } => "title",
            EventKind::Step { .. } => "step",
            EventKind::Message { .. } => "message",
            EventKind::Tool { .. } => "tool",
            EventKind::Wait => "wait",
            EventKind::Error { .. } => "error",
            EventKind::Done => "done",
        })
        .collect()
}

pub fn messages(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Message { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

pub fn errors(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Error { error } => Some(error.clone()),
            _ => None,
        })
        .collect()
}

/// MCP session serving a fixed tool list.
pub struct MockSession {
    tools: Vec<McpTool>,
    pub calls: Mutex<Vec<(String, Value)>>,
    pub closed: AtomicUsize,
    fail_calls: bool,
}

impl MockSession {
    pub fn new(tools: &[&str]) -> Self {
        Self {
            tools: tools
                .iter()
                .map(|t| McpTool::new(*t, Some(format!("{t} tool").as_str()), json!({"type": "object"})))
                .collect(),
            calls: Mutex::new(Vec::new()),
            closed: AtomicUsize::new(0),
            fail_calls: false,
        }
    }

    pub fn failing(mut self) -> Self {
        self.fail_calls = true;
        self
    }
}

#[async_trait]
impl McpSession for MockSession {
    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpCallOutput> {
        self.calls.lock().unwrap().push((name.to_string(), arguments));
        if self.fail_calls {
            return Err(StrideError::tool(name, "upstream unavailable"));
        }
        Ok(McpCallOutput {
            text: Some(format!("{name} result")),
            structured: None,
        })
    }

    async fn close(&self) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector handing out pre-built sessions by server name. Unknown names
/// fail to connect.
#[derive(Default)]
pub struct MockConnector {
    sessions: HashMap<String, Arc<MockSession>>,
    pub attempts: Mutex<Vec<String>>,
}

impl MockConnector {
    pub fn with_session(mut self, name: &str, session: MockSession) -> Self {
        self.sessions.insert(name.to_string(), Arc::new(session));
        self
    }

    pub fn session(&self, name: &str) -> Arc<MockSession> {
        self.sessions[name].clone()
    }
}

#[async_trait]
impl McpConnector for MockConnector {
    async fn connect(&self, name: &str, _config: &McpServerConfig) -> Result<Arc<dyn McpSession>> {
        self.attempts.lock().unwrap().push(name.to_string());
        match self.sessions.get(name) {
            Some(session) => Ok(session.clone() as Arc<dyn McpSession>),
            None => Err(StrideError::provider("mcp", format!("{name}: connection refused"))),
        }
    }
}

/// What a [`RecordingRunner`] does when invoked.
#[derive(Debug, Clone, Copy)]
pub enum RunnerBehavior {
    Finish,
    Hang,
    Panic,
    Fail,
}

/// Task runner that counts callbacks.
pub struct RecordingRunner {
    behavior: RunnerBehavior,
    pub started: Notify,
    pub done: Notify,
    pub invoked: AtomicUsize,
    pub on_done_calls: AtomicUsize,
    pub destroyed: AtomicUsize,
}

impl RecordingRunner {
    pub fn new(behavior: RunnerBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            started: Notify::new(),
            done: Notify::new(),
            invoked: AtomicUsize::new(0),
            on_done_calls: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TaskRunner for RecordingRunner {
    async fn invoke(&self, task: Arc<Task>) -> Result<()> {
        self.invoked.fetch_add(1, Ordering::SeqCst);
        self.started.notify_one();
        match self.behavior {
            RunnerBehavior::Finish => {
                task.output().put("finished".to_string()).await?;
                Ok(())
            }
            RunnerBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            RunnerBehavior::Panic => panic!("runner exploded"),
            RunnerBehavior::Fail => Err(StrideError::InvalidState("runner failed".into())),
        }
    }

    async fn destroy(&self) -> Result<()> {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn on_done(&self, _task: &Task) {
        self.on_done_calls.fetch_add(1, Ordering::SeqCst);
        self.done.notify_one();
    }
}

/// Wait for a task's execution to end, failing after two seconds.
pub async fn wait_until_done(task: &Arc<Task>) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !task.done() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("task did not finish");
}
