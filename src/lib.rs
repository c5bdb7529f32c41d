//! stride: a plan-and-act agent engine.
//!
//! A planner breaks a user's goal into steps, an executor runs each step
//! through a tool-calling loop against an OpenAI-compatible model, and the
//! planner revises the remaining steps as results come in. Tools come from
//! local toolkits and from MCP servers. Work runs as background tasks whose
//! input and output are ordered queues (in memory or Redis Streams).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use stride::agent::{PlanActFlow, ToolSet};
//! use stride::config::AppConfig;
//! use stride::llm::OpenAiCompatibleClient;
//! use stride::types::UserInput;
//!
//! # async fn example() -> stride::error::Result<()> {
//! let config = AppConfig::default();
//! let llm = Arc::new(OpenAiCompatibleClient::new(config.llm_config.clone())?);
//! let tools = ToolSet::new().with_local(Arc::new(stride::tools::message_toolkit()));
//! let flow = PlanActFlow::new(llm, config.agent_config.clone(), tools);
//!
//! let flow = Arc::new(tokio::sync::Mutex::new(flow));
//! let mut events = PlanActFlow::stream(flow, UserInput::new("Summarize today's news"));
//! while let Some(event) = events.recv().await {
//!     println!("{}", serde_json::to_string(&event)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod task;
pub mod tools;
pub mod types;
pub mod util;

#[cfg(feature = "mcp")]
pub mod mcp;

#[cfg(feature = "cli")]
pub mod cli;
