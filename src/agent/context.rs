//! Bounded conversation context.
//!
//! Holds the most recent non-system turns up to a configurable cap; the
//! system prompt lives in its own slot and is never evicted.

use crate::llm::{ChatMessage, Role};
use std::collections::VecDeque;

/// Per-agent conversation memory.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    system: Option<String>,
    turns: VecDeque<(Role, String)>,
    capacity: usize,
}

impl ConversationContext {
    /// Create a context holding at most `capacity` non-system turns.
    pub fn new(capacity: usize) -> Self {
        Self {
            system: None,
            turns: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Set or replace the system prompt slot.
    pub fn set_system(&mut self, prompt: impl Into<String>) {
        self.system = Some(prompt.into());
    }

    /// The system prompt, if set.
    pub fn system(&self) -> Option<&str> {
        self.system.as_deref()
    }

    /// Append a turn; the oldest turn drops when the cap is exceeded.
    ///
    /// System turns go to the dedicated slot instead of the ring.
    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        let content = content.into();
        if role == Role::System {
            self.system = Some(content);
            return;
        }
        self.turns.push_back((role, content));
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }

    /// The retained turns, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &(Role, String)> {
        self.turns.iter()
    }

    /// Number of retained non-system turns.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns are retained.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render as chat messages, system slot first.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        if let Some(system) = &self.system {
            messages.push(ChatMessage::system(system.clone()));
        }
        for (role, content) in &self.turns {
            messages.push(ChatMessage {
                role: *role,
                content: content.clone(),
            });
        }
        messages
    }

    /// Drop all retained turns; the system slot survives.
    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
