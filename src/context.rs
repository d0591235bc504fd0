//! Conversation record and active tool set for a single session

use serde::{Deserialize, Serialize};

use crate::llm::ToolDefinition;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Message in the conversation record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Append-only conversation record plus the tool set currently exposed to
/// the LLM.
///
/// Steering works by appending a fresh system directive; earlier directives
/// stay in the history and only the most recent one is authoritative.
#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    messages: Vec<Message>,
    active_tools: Vec<ToolDefinition>,
}

impl ConversationContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Entries are never removed or rewritten.
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The most recent message, if any.
    #[allow(dead_code)] // Accessor for API completeness
    pub fn latest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// The most recent system directive, if any.
    #[allow(dead_code)] // Accessor for API completeness
    pub fn latest_directive(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Replace the entire active tool set.
    ///
    /// Swapping this set is the only way the controller communicates what
    /// is legal next; it is never merged or extended in place.
    pub fn set_active_tools(&mut self, tools: Vec<ToolDefinition>) {
        self.active_tools = tools;
    }

    /// The tool set to expose on the next LLM invocation.
    pub fn active_tools(&self) -> &[ToolDefinition] {
        &self.active_tools
    }
}
