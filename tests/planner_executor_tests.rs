//! Planner and executor agents driven by a scripted backend.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use common::*;
use stride::agent::{EventStream, PlannerAgent, ReActAgent, StepOutcome, ToolSet};
use stride::llm::{ResponseFormat, ToolChoice};
use stride::memory::COMPACTED_PLACEHOLDER;
use stride::tools::{message_toolkit, ASK_USER_TOOL, NOTIFY_USER_TOOL};
use stride::types::{
    Event, EventKind, ExecutionStatus, Plan, PlanEventStatus, Role, Step, StepEventStatus, UserInput,
};

fn message_tools() -> ToolSet {
    ToolSet::new().with_local(Arc::new(message_toolkit()))
}

fn plan_with(steps: &[&str]) -> Plan {
    Plan {
        title: "Trip".into(),
        goal: "Plan a trip".into(),
        language: "en".into(),
        steps: steps.iter().map(|d| Step::new(*d)).collect(),
        ..Plan::default()
    }
}

fn step_statuses(events: &[Event]) -> Vec<StepEventStatus> {
    events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::Step { status, .. } => Some(*status),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn create_plan_emits_created_plan() {
    let llm = ScriptedLlm::new();
    llm.json(json!({
        "title": "Weekend in Lisbon",
        "goal": "Plan a weekend in Lisbon",
        "language": "en",
        "message": "I'll plan it.",
        "steps": [
            {"id": "1", "description": "Find flights"},
            {"id": "2", "description": "Book a hotel"}
        ]
    }));
    let planner = PlannerAgent::new(llm.clone(), test_config(), message_tools());
    let (sink, stream) = EventStream::channel(64);

    let plan = planner
        .create_plan(&UserInput::new("plan a weekend in Lisbon"), &sink)
        .await
        .unwrap()
        .unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert_eq!(plan.title, "Weekend in Lisbon");
    assert_eq!(plan.message.as_deref(), Some("I'll plan it."));
    assert_eq!(plan.steps.len(), 2);
    assert!(plan.steps.iter().all(|s| s.status == ExecutionStatus::Pending));
    assert_eq!(kinds(&events), vec!["plan"]);
    assert!(matches!(
        events[0].kind,
        EventKind::Plan {
            status: PlanEventStatus::Created,
            ..
        }
    ));

    let request = &llm.requests()[0];
    assert_eq!(request.response_format, Some(ResponseFormat::JsonObject));
    assert_eq!(request.tool_choice, Some(ToolChoice::None));
    assert_eq!(request.messages[0].role, Role::System);
}

#[tokio::test]
async fn fenced_plan_is_repaired() {
    let llm = ScriptedLlm::new();
    llm.text("```json\n{\"title\": \"T\", \"steps\": [{\"description\": \"only step\",}]}\n```");
    let planner = PlannerAgent::new(llm, test_config(), ToolSet::new());
    let (sink, _stream) = EventStream::channel(64);

    let plan = planner.create_plan(&UserInput::new("x"), &sink).await.unwrap().unwrap();

    assert_eq!(plan.steps.len(), 1);
    assert_eq!(plan.steps[0].description, "only step");
    assert!(!plan.steps[0].id.is_empty());
}

#[tokio::test]
async fn unparseable_plan_reports_error() {
    let llm = ScriptedLlm::new();
    llm.text("I cannot make a plan for that.");
    let planner = PlannerAgent::new(llm, test_config(), ToolSet::new());
    let (sink, stream) = EventStream::channel(64);

    let plan = planner.create_plan(&UserInput::new("x"), &sink).await.unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert!(plan.is_none());
    assert_eq!(kinds(&events), vec!["error"]);
    assert!(errors(&events)[0].starts_with("failed to parse plan"));
}

#[tokio::test]
async fn planner_backend_failure_yields_no_plan() {
    let llm = ScriptedLlm::new();
    let planner = PlannerAgent::new(llm, test_config(), ToolSet::new());
    let (sink, stream) = EventStream::channel(64);

    let plan = planner.create_plan(&UserInput::new("x"), &sink).await.unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert!(plan.is_none());
    assert_eq!(kinds(&events), vec!["error"]);
}

#[tokio::test]
async fn update_plan_keeps_finished_steps() {
    let llm = ScriptedLlm::new();
    llm.json(json!({
        "steps": [
            {"id": "b2", "description": "B2"},
            {"id": "c2", "description": "C2"},
            {"id": "d2", "description": "D2"}
        ]
    }));
    let planner = PlannerAgent::new(llm, test_config(), ToolSet::new());
    let mut plan = plan_with(&["A", "B", "C"]);
    plan.steps[0].status = ExecutionStatus::Completed;
    plan.steps[0].result = Some("a done".into());
    let finished = plan.steps[0].clone();
    let (sink, stream) = EventStream::channel(64);

    planner.update_plan(&mut plan, &finished, &sink).await.unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    let descriptions: Vec<_> = plan.steps.iter().map(|s| s.description.as_str()).collect();
    assert_eq!(descriptions, vec!["A", "B2", "C2", "D2"]);
    assert_eq!(plan.steps[0], finished);
    assert!(matches!(
        events.last().map(|e| &e.kind),
        Some(EventKind::Plan {
            status: PlanEventStatus::Updated,
            ..
        })
    ));
}

#[tokio::test]
async fn execute_step_completes_from_report() {
    let llm = ScriptedLlm::new();
    llm.reply(tool_call("n1", NOTIFY_USER_TOOL, json!({"text": "searching"})))
        .json(json!({
            "success": true,
            "result": "Found two flights",
            "attachments": ["/home/ubuntu/flights.md"]
        }));
    let executor = ReActAgent::new(llm.clone(), test_config(), message_tools());
    let plan = plan_with(&["Find flights"]);
    let mut step = plan.steps[0].clone();
    let (sink, stream) = EventStream::channel(64);

    let outcome = executor
        .execute_step(&plan, &mut step, &UserInput::new("plan a trip"), &sink)
        .await
        .unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert_eq!(outcome, StepOutcome::Finished);
    assert_eq!(step.status, ExecutionStatus::Completed);
    assert!(step.success);
    assert_eq!(step.result.as_deref(), Some("Found two flights"));
    assert_eq!(kinds(&events), vec!["step", "tool", "tool", "step", "message"]);
    assert_eq!(
        step_statuses(&events),
        vec![StepEventStatus::Started, StepEventStatus::Completed]
    );
    match &events[4].kind {
        EventKind::Message {
            message, attachments, ..
        } => {
            assert_eq!(message, "Found two flights");
            assert_eq!(attachments[0].filename, "flights.md");
            assert_eq!(attachments[0].mime_type, "text/markdown");
        }
        other => panic!("unexpected event: {other:?}"),
    }

    // The notify result is stale once the step is done.
    assert_eq!(executor.compact_memory().await, 1);
    let memory = executor.agent().memory_snapshot().await;
    let notify = memory.iter().find(|m| m.role == Role::Tool).unwrap();
    assert_eq!(notify.text(), COMPACTED_PLACEHOLDER);
    assert_eq!(notify.tool_call_id.as_deref(), Some("n1"));
}

#[tokio::test]
async fn execute_step_waits_on_ask_user() {
    let llm = ScriptedLlm::new();
    llm.reply(tool_call(
        "ask1",
        ASK_USER_TOOL,
        json!({"text": "Which city?", "attachments": ["/tmp/options.txt"]}),
    ));
    let executor = ReActAgent::new(llm.clone(), test_config(), message_tools());
    let plan = plan_with(&["Pick a city"]);
    let mut step = plan.steps[0].clone();
    let (sink, stream) = EventStream::channel(64);

    let outcome = executor
        .execute_step(&plan, &mut step, &UserInput::new("plan a trip"), &sink)
        .await
        .unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert_eq!(outcome, StepOutcome::WaitingForUser);
    assert_eq!(step.status, ExecutionStatus::Running);
    assert_eq!(kinds(&events), vec!["step", "message", "wait"]);
    match &events[1].kind {
        EventKind::Message {
            message, attachments, ..
        } => {
            assert_eq!(message, "Which city?");
            assert_eq!(attachments.len(), 1);
            assert_eq!(attachments[0].filepath, "/tmp/options.txt");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(llm.remaining(), 0);
}

#[tokio::test]
async fn execute_step_fails_on_loop_error() {
    let llm = ScriptedLlm::new();
    llm.reply(tool_call("c1", "browser_open", json!({})));
    let executor = ReActAgent::new(llm, test_config(), message_tools());
    let plan = plan_with(&["Open the site"]);
    let mut step = plan.steps[0].clone();
    let (sink, stream) = EventStream::channel(64);

    let outcome = executor
        .execute_step(&plan, &mut step, &UserInput::new("x"), &sink)
        .await
        .unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert_eq!(outcome, StepOutcome::Finished);
    assert_eq!(step.status, ExecutionStatus::Failed);
    assert!(!step.success);
    assert_eq!(step.error.as_deref(), Some("Tool not found: browser_open"));
    assert_eq!(kinds(&events), vec!["step", "step", "error"]);
    assert_eq!(
        step_statuses(&events),
        vec![StepEventStatus::Started, StepEventStatus::Failed]
    );
}

#[tokio::test]
async fn report_with_code_block_completes_the_step() {
    let llm = ScriptedLlm::new();
    llm.text("{\"success\": true, \"result\": \"Run this:\n```python\nprint(1)\n```\", \"attachments\": []}");
    let executor = ReActAgent::new(llm, test_config(), message_tools());
    let plan = plan_with(&["Write a script"]);
    let mut step = plan.steps[0].clone();
    let (sink, stream) = EventStream::channel(64);

    executor
        .execute_step(&plan, &mut step, &UserInput::new("x"), &sink)
        .await
        .unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert_eq!(step.status, ExecutionStatus::Completed);
    assert!(step.success);
    assert_eq!(step.result.as_deref(), Some("Run this:\n```python\nprint(1)\n```"));
    assert_eq!(
        step_statuses(&events),
        vec![StepEventStatus::Started, StepEventStatus::Completed]
    );
}

#[tokio::test]
async fn execute_step_fails_on_invalid_report() {
    let llm = ScriptedLlm::new();
    llm.text("all good, no json here");
    let executor = ReActAgent::new(llm, test_config(), message_tools());
    let plan = plan_with(&["Do it"]);
    let mut step = plan.steps[0].clone();
    let (sink, stream) = EventStream::channel(64);

    executor
        .execute_step(&plan, &mut step, &UserInput::new("x"), &sink)
        .await
        .unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert_eq!(step.status, ExecutionStatus::Failed);
    assert_eq!(
        step_statuses(&events),
        vec![StepEventStatus::Started, StepEventStatus::Failed]
    );
}

#[tokio::test]
async fn summarize_emits_message_with_attachments() {
    let llm = ScriptedLlm::new();
    llm.json(json!({
        "message": "Your trip is booked.",
        "attachments": ["/home/ubuntu/itinerary.pdf"]
    }));
    let executor = ReActAgent::new(llm.clone(), test_config(), message_tools());
    let (sink, stream) = EventStream::channel(64);

    executor.summarize(&sink).await.unwrap();
    drop(sink);
    let events = stream.collect_all().await;

    assert_eq!(messages(&events), vec!["Your trip is booked."]);
    match &events[0].kind {
        EventKind::Message { attachments, .. } => {
            assert_eq!(attachments[0].filename, "itinerary.pdf");
            assert_eq!(attachments[0].mime_type, "application/pdf");
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(llm.requests()[0].response_format, Some(ResponseFormat::JsonObject));
}
