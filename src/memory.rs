//! Conversation memory owned by one agent.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{ChatMessage, Role};

/// Body written over compacted tool results.
pub const COMPACTED_PLACEHOLDER: &str = "(removed)";

/// Ordered, role-tagged conversation log.
///
/// When a system prompt is configured it becomes the first record, inserted
/// on the first append.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Memory {
    messages: Vec<ChatMessage>,
    #[serde(skip)]
    system_prompt: Option<String>,
    #[serde(skip)]
    compactable: BTreeSet<String>,
}

impl Memory {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(system_prompt.into()),
            ..Self::default()
        }
    }

    /// Function names whose tool results may be compacted.
    pub fn with_compactable<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.compactable = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn add_message(&mut self, message: ChatMessage) {
        if self.messages.is_empty() {
            if let Some(prompt) = &self.system_prompt {
                self.messages.push(ChatMessage::system(prompt.clone()));
            }
        }
        self.messages.push(message);
    }

    pub fn add_messages(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        for message in messages {
            self.add_message(message);
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Remove exactly the last record.
    pub fn roll_back(&mut self) -> Option<ChatMessage> {
        self.messages.pop()
    }

    /// Replace stale tool-result bodies with [`COMPACTED_PLACEHOLDER`].
    ///
    /// Only `tool` records from a compactable function are rewritten, and the
    /// newest record is left alone. Ids and function names stay intact.
    pub fn compact(&mut self) -> usize {
        if self.compactable.is_empty() {
            return 0;
        }
        let history = self.messages.len().saturating_sub(1);
        let mut compacted = 0;
        for message in &mut self.messages[..history] {
            if message.role != Role::Tool || message.text() == COMPACTED_PLACEHOLDER {
                continue;
            }
            let eligible = message
                .function_name
                .as_deref()
                .is_some_and(|name| self.compactable.contains(name));
            if eligible {
                tracing::debug!(function = ?message.function_name, "compacting tool result");
                message.content = Some(COMPACTED_PLACEHOLDER.to_string());
                compacted += 1;
            }
        }
        compacted
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }
}
