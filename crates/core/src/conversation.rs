//! Conversation history for one orchestration run.

use mangafmt_providers::{ChatMessage, Completion, Role};
use serde::{Deserialize, Serialize};

/// Append-only message history owned by a single run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Conversation {
    pub fn seeded(system_prompt: &str, user_input: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_input)],
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn push_assistant(&mut self, completion: &Completion) {
        self.messages.push(ChatMessage::assistant(
            completion.content.clone(),
            completion.tool_calls.clone(),
        ));
    }

    pub fn push_tool_result(&mut self, call_id: &str, output: impl Into<String>) {
        self.messages.push(ChatMessage::tool_result(call_id, output));
    }

    /// Ids of requested tool calls that have no result yet.
    pub fn unanswered_calls(&self) -> Vec<String> {
        let mut pending: Vec<String> = Vec::new();
        for message in &self.messages {
            match message.role {
                Role::Assistant => {
                    pending.extend(message.tool_calls.iter().map(|c| c.id.clone()));
                }
                Role::Tool => {
                    if let Some(id) = &message.tool_call_id {
                        if let Some(pos) = pending.iter().position(|p| p == id) {
                            pending.remove(pos);
                        }
                    }
                }
                Role::System | Role::User => {}
            }
        }
        pending
    }

    /// Text of the latest assistant message, if it has any.
    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(|m| m.content.as_deref())
    }
}
