//! Conversation data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tokens::estimate_tokens;

/// Role of a conversation message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

impl Role {
    /// String form used in storage and prompts
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    /// Parse the storage string form
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A conversation message, immutable once appended
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Message identifier
    pub id: Uuid,
    /// Message role
    pub role: Role,
    /// Message content
    pub content: String,
    /// Approximate token cost, fixed at construction
    pub token_estimate: u32,
    /// Message timestamp
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message; the token estimate is derived from the content
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        let token_estimate = estimate_tokens(&content);
        Self {
            id: Uuid::new_v4(),
            role,
            content,
            token_estimate,
            timestamp: Utc::now(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool message
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Override the token estimate (e.g. when the provider reported usage)
    pub fn with_token_estimate(mut self, tokens: u32) -> Self {
        self.token_estimate = tokens;
        self
    }
}

/// Cumulative token estimate of a message sequence
pub fn total_tokens(messages: &[Message]) -> u64 {
    messages.iter().map(|m| u64::from(m.token_estimate)).sum()
}

/// Per-user ordered conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSession {
    /// Owning user identifier
    pub user_id: String,
    /// Messages, oldest first
    pub messages: Vec<Message>,
}

impl ConversationSession {
    /// Create an empty session
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            messages: Vec::new(),
        }
    }

    /// Create a session over an existing message sequence
    pub fn with_messages(user_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            user_id: user_id.into(),
            messages,
        }
    }

    /// Append a message
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Cumulative token estimate of the session
    pub fn total_tokens(&self) -> u64 {
        total_tokens(&self.messages)
    }

    /// The most recent message, if any
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render the most recent messages as prompt context.
    ///
    /// Numbered `role: content` lines, long content truncated to 200 chars.
    /// Empty when the session holds fewer than two messages.
    pub fn recent_context(&self, max_messages: usize) -> String {
        if self.messages.len() <= 1 {
            return String::new();
        }

        let start = self.messages.len().saturating_sub(max_messages);
        let mut lines = vec!["CONVERSATION HISTORY:".to_string()];
        for (i, msg) in self.messages[start..].iter().enumerate() {
            let mut content = msg.content.clone();
            if content.chars().count() > 200 {
                content = content.chars().take(200).collect::<String>() + "...";
            }
            lines.push(format!("{}. {}: {}", i + 1, msg.role, content));
        }
        lines.join("\n")
    }
}
