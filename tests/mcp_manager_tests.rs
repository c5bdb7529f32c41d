//! MCP manager routing against in-process sessions.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;
use stride::agent::{BaseAgent, ToolSet};
use stride::config::{McpConfig, McpServerConfig};
use stride::error::Result;
use stride::mcp::{McpClientManager, McpConnector, McpSession, McpToolkit};
use stride::types::{EventKind, ToolEventStatus};

fn server() -> McpServerConfig {
    McpServerConfig::stdio("mock-server", Vec::new())
}

fn disabled() -> McpServerConfig {
    McpServerConfig {
        enabled: false,
        ..server()
    }
}

fn manager(config: McpConfig, connector: Arc<MockConnector>) -> McpClientManager {
    McpClientManager::new(config, connector)
}

#[tokio::test]
async fn tools_are_namespaced_and_routed() {
    let connector = Arc::new(MockConnector::default().with_session("search", MockSession::new(&["web_search"])));
    let config = McpConfig::default().with_server("search", server());
    let manager = manager(config, connector.clone());

    manager.initialize().await.unwrap();

    let tools = manager.get_all_tools();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "mcp_search_web_search");
    assert_eq!(tools[0].description, "[search] web_search tool");
    assert_eq!(tools[0].parameters, json!({"type": "object"}));
    assert_eq!(
        manager.resolve("mcp_search_web_search"),
        Some(("search".to_string(), "web_search".to_string()))
    );
    assert!(manager.has_tool("mcp_search_web_search"));
    assert!(!manager.has_tool("mcp_search_image_search"));

    let result = manager.invoke("mcp_search_web_search", json!({"query": "rust"})).await;
    assert!(result.success);
    assert_eq!(result.message.as_deref(), Some("web_search result"));
    let calls = connector.session("search").calls.lock().unwrap().clone();
    assert_eq!(calls, vec![("web_search".to_string(), json!({"query": "rust"}))]);
}

#[tokio::test]
async fn mcp_prefixed_servers_are_not_prefixed_twice() {
    let connector = Arc::new(MockConnector::default().with_session("mcp_fs", MockSession::new(&["read"])));
    let manager = manager(McpConfig::default().with_server("mcp_fs", server()), connector);

    manager.initialize().await.unwrap();

    assert_eq!(manager.get_all_tools()[0].name, "mcp_fs_read");
    assert_eq!(manager.resolve("mcp_fs_read"), Some(("mcp_fs".to_string(), "read".to_string())));
}

#[tokio::test]
async fn colliding_tool_names_are_published_once() {
    let connector = Arc::new(
        MockConnector::default()
            .with_session("a", MockSession::new(&["b_x", "y"]))
            .with_session("a_b", MockSession::new(&["x", "z"])),
    );
    let config = McpConfig::default().with_server("a", server()).with_server("a_b", server());
    let manager = manager(config, connector.clone());

    manager.initialize().await.unwrap();

    let mut names: Vec<_> = manager.get_all_tools().into_iter().map(|t| t.name).collect();
    names.sort();
    assert_eq!(names, vec!["mcp_a_b_x", "mcp_a_b_z", "mcp_a_y"]);
    for name in &names {
        assert!(manager.has_tool(name), "{name} is advertised but unresolvable");
    }
    assert_eq!(manager.resolve("mcp_a_b_x"), Some(("a".to_string(), "b_x".to_string())));
    assert_eq!(manager.resolve("mcp_a_b_z"), Some(("a_b".to_string(), "z".to_string())));

    let result = manager.invoke("mcp_a_b_x", json!({})).await;
    assert!(result.success);
    assert_eq!(connector.session("a").calls.lock().unwrap().len(), 1);
    assert!(connector.session("a_b").calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failing_and_disabled_servers_are_skipped() {
    let connector = Arc::new(MockConnector::default().with_session("good", MockSession::new(&["ping"])));
    let config = McpConfig::default()
        .with_server("good", server())
        .with_server("broken", server())
        .with_server("off", disabled());
    let manager = manager(config, connector.clone());

    manager.initialize().await.unwrap();

    assert!(manager.is_initialized());
    assert_eq!(manager.connected_servers(), vec!["good"]);
    let mut attempts = connector.attempts.lock().unwrap().clone();
    attempts.sort();
    assert_eq!(attempts, vec!["broken", "good"]);
}

struct HangingConnector;

#[async_trait]
impl McpConnector for HangingConnector {
    async fn connect(&self, _name: &str, _config: &McpServerConfig) -> Result<Arc<dyn McpSession>> {
        std::future::pending().await
    }
}

#[tokio::test(start_paused = true)]
async fn slow_servers_time_out() {
    let manager = McpClientManager::new(McpConfig::default().with_server("slow", server()), Arc::new(HangingConnector))
        .with_connect_timeout(Duration::from_secs(5));

    manager.initialize().await.unwrap();

    assert!(manager.is_initialized());
    assert!(manager.connected_servers().is_empty());
}

#[tokio::test]
async fn initialize_is_idempotent() {
    let connector = Arc::new(MockConnector::default().with_session("search", MockSession::new(&["web_search"])));
    let manager = manager(McpConfig::default().with_server("search", server()), connector.clone());

    manager.initialize().await.unwrap();
    manager.initialize().await.unwrap();

    assert_eq!(connector.attempts.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_or_failing_calls_become_failed_results() {
    let connector = Arc::new(
        MockConnector::default().with_session("flaky", MockSession::new(&["fetch"]).failing()),
    );
    let manager = manager(McpConfig::default().with_server("flaky", server()), connector);
    manager.initialize().await.unwrap();

    let missing = manager.invoke("mcp_nowhere_fetch", json!({})).await;
    assert!(!missing.success);
    assert!(missing.message.unwrap().contains("not connected"));

    let failed = manager.invoke("mcp_flaky_fetch", json!({})).await;
    assert!(!failed.success);
    assert!(failed.message.unwrap().contains("upstream unavailable"));
}

#[tokio::test]
async fn cleanup_closes_sessions_and_allows_reinitialize() {
    let connector = Arc::new(MockConnector::default().with_session("search", MockSession::new(&["web_search"])));
    let manager = manager(McpConfig::default().with_server("search", server()), connector.clone());
    manager.initialize().await.unwrap();

    manager.cleanup().await;
    manager.cleanup().await;

    assert_eq!(connector.session("search").closed.load(Ordering::SeqCst), 1);
    assert!(!manager.is_initialized());
    assert!(manager.get_all_tools().is_empty());
    let after = manager.invoke("mcp_search_web_search", json!({})).await;
    assert!(!after.success);

    manager.initialize().await.unwrap();
    assert_eq!(manager.connected_servers(), vec!["search"]);
}

#[tokio::test]
async fn agent_dispatches_through_mcp_toolkit() {
    let connector = Arc::new(MockConnector::default().with_session("search", MockSession::new(&["web_search"])));
    let manager = Arc::new(manager(McpConfig::default().with_server("search", server()), connector));
    manager.initialize().await.unwrap();

    let llm = ScriptedLlm::new();
    llm.reply(tool_call("c1", "mcp_search_web_search", json!({"query": "weather"})))
        .text("It is sunny.");
    let agent = BaseAgent::builder("test", llm.clone(), test_config())
        .tools(ToolSet::new().with_remote(Arc::new(McpToolkit::new(manager))))
        .build();

    let events = agent.invoke("weather?", None).collect_all().await;

    assert_eq!(llm.requests()[0].tool_names, vec!["mcp_search_web_search"]);
    match &events[1].kind {
        EventKind::Tool {
            tool_name,
            function_result: Some(result),
            status: ToolEventStatus::Called,
            ..
        } => {
            assert_eq!(tool_name, "mcp");
            assert!(result.success);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(messages(&events), vec!["It is sunny."]);
}
