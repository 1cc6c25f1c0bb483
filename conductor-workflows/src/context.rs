//! ABOUTME: Bounded conversation context ring buffer
//! ABOUTME: Ported from the `ConversationContextManager` referenced throughout orchestrator.py

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ContextMessage {
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Higher priority messages are kept longer when the buffer trims.
    #[serde(default)]
    pub priority: u8,
}

const DEFAULT_MAX_TURNS: usize = 20;

/// Recent-turns ring buffer for one session's conversation. The original
/// bounds by token count (`max_tokens=4096`); this rewrite bounds by turn
/// count, which is the detail actually exercised elsewhere in the system
/// (clarification question/answer pairs, not raw token budgets).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationContext {
    pub session_id: String,
    max_turns: usize,
    messages: VecDeque<ContextMessage>,
}

impl ConversationContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_capacity(session_id, DEFAULT_MAX_TURNS)
    }

    pub fn with_capacity(session_id: impl Into<String>, max_turns: usize) -> Self {
        Self {
            session_id: session_id.into(),
            max_turns,
            messages: VecDeque::new(),
        }
    }

    pub fn add_user_message(&mut self, content: impl Into<String>, priority: u8) {
        self.push(MessageRole::User, content.into(), Default::default(), priority);
    }

    pub fn add_system_message(&mut self, content: impl Into<String>, metadata: serde_json::Map<String, serde_json::Value>) {
        self.push(MessageRole::System, content.into(), metadata, 0);
    }

    fn push(&mut self, role: MessageRole, content: String, metadata: serde_json::Map<String, serde_json::Value>, priority: u8) {
        self.messages.push_back(ContextMessage {
            role,
            content,
            metadata,
            priority,
        });
        self.trim();
    }

    /// Drop the oldest, lowest-priority entries once over capacity. High
    /// priority entries (clarification Q&A) are preferred for retention.
    fn trim(&mut self) {
        while self.messages.len() > self.max_turns {
            let drop_index = self
                .messages
                .iter()
                .enumerate()
                .min_by_key(|(i, m)| (m.priority, std::cmp::Reverse(*i)))
                .map(|(i, _)| i);
            match drop_index {
                Some(i) => {
                    self.messages.remove(i);
                }
                None => break,
            }
        }
    }

    pub fn recent(&self) -> impl Iterator<Item = &ContextMessage> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Render the buffer as a short summary suitable for inclusion in an
    /// intent-classification prompt.
    pub fn as_prompt_fragment(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{:?}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_oldest_low_priority_first() {
        let mut ctx = ConversationContext::with_capacity("s1", 2);
        ctx.add_user_message("first", 0);
        ctx.add_user_message("second", 5);
        ctx.add_user_message("third", 0);

        assert_eq!(ctx.len(), 2);
        let contents: Vec<&str> = ctx.recent().map(|m| m.content.as_str()).collect();
        assert!(contents.contains(&"second"));
        assert!(contents.contains(&"third"));
    }

    #[test]
    fn prompt_fragment_preserves_order() {
        let mut ctx = ConversationContext::new("s1");
        ctx.add_user_message("monitor my email", 2);
        ctx.add_system_message("requested clarification", Default::default());
        let fragment = ctx.as_prompt_fragment();
        assert!(fragment.find("monitor my email").unwrap() < fragment.find("requested clarification").unwrap());
    }
}
