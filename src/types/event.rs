//! Event stream produced by agents and flows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file::FileRecord;
use super::message::Role;
use super::plan::{Plan, Step};
use super::tool_result::ToolResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanEventStatus {
    Created,
    Updated,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepEventStatus {
    Started,
    Failed,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolEventStatus {
    Calling,
    Called,
}

/// Event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Plan {
        plan: Plan,
        status: PlanEventStatus,
    },
    Title {
        title: String,
    },
    Step {
        step: Step,
        status: StepEventStatus,
    },
    Message {
        role: Role,
        message: String,
        #[serde(default)]
        attachments: Vec<FileRecord>,
    },
    Tool {
        tool_call_id: String,
        /// Toolkit that owns the function.
        tool_name: String,
        function_name: String,
        function_args: serde_json::Value,
        #[serde(default)]
        function_result: Option<ToolResult>,
        status: ToolEventStatus,
    },
    Wait,
    Error {
        error: String,
    },
    Done,
}

/// Envelope carrying identity and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            kind,
        }
    }

    /// Assistant-authored message without attachments.
    pub fn message(text: impl Into<String>) -> Self {
        Self::new(EventKind::Message {
            role: Role::Assistant,
            message: text.into(),
            attachments: Vec::new(),
        })
    }

    pub fn error(error: impl std::fmt::Display) -> Self {
        Self::new(EventKind::Error {
            error: error.to_string(),
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::Done | EventKind::Wait)
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Self::new(kind)
    }
}

/// An event read back from a transport.
///
/// Payloads whose `type` this build does not know are kept as raw JSON so
/// they can be forwarded unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamItem {
    Known(Event),
    Opaque(serde_json::Value),
}

impl StreamItem {
    pub fn event(&self) -> Option<&Event> {
        match self {
            Self::Known(event) => Some(event),
            Self::Opaque(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn envelope_flattens_payload() {
        let event = Event::new(EventKind::Title {
            title: "Weekend plan".into(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "title");
        assert_eq!(value["title"], "Weekend plan");
        assert!(value["id"].is_string());
        assert!(value["created_at"].is_string());

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn unit_variants_carry_only_type() {
        let value = serde_json::to_value(Event::new(EventKind::Wait)).unwrap();
        assert_eq!(value["type"], "wait");
    }

    #[test]
    fn unknown_variant_is_kept_opaque() {
        let raw = json!({
            "id": "e1",
            "created_at": "2026-01-01T00:00:00Z",
            "type": "browser_screenshot",
            "url": "https://example.com",
        });
        let item: StreamItem = serde_json::from_value(raw.clone()).unwrap();
        assert!(item.event().is_none());
        assert_eq!(serde_json::to_value(&item).unwrap(), raw);
    }

    #[test]
    fn known_variant_parses_as_event() {
        let raw = serde_json::to_string(&Event::error("boom")).unwrap();
        let item: StreamItem = serde_json::from_str(&raw).unwrap();
        assert!(matches!(
            item.event().map(|e| &e.kind),
            Some(EventKind::Error { error }) if error == "boom"
        ));
    }
}
