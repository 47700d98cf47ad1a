//! Conversation State
//!
//! Ordered transcript plus cumulative token counters for one session.

use serde::{Deserialize, Serialize};

use crate::message::{Message, Role, TokenUsage};

/// History and token accounting for a single conversation
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ConversationState {
    /// Prepended to every snapshot, never stored in history
    system_prompt: Option<String>,

    history: Vec<Message>,

    total_input_tokens: u64,
    total_output_tokens: u64,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            system_prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Add a message at the end of the history
    pub fn append(&mut self, message: Message) {
        debug_assert!(message.validate().is_ok(), "malformed {} message", message.role);
        self.history.push(message);
    }

    /// Add several messages at once, preserving their order
    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.append(message);
        }
    }

    /// Transcript for the next completion request
    pub fn snapshot(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 1);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages
    }

    /// Add a completion's usage to the running totals
    pub const fn record_usage(&mut self, input_tokens: u64, output_tokens: u64) {
        self.total_input_tokens = self.total_input_tokens.saturating_add(input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(output_tokens);
    }

    /// Drop all history and zero the counters
    pub fn clear(&mut self) {
        self.history.clear();
        self.total_input_tokens = 0;
        self.total_output_tokens = 0;
    }

    /// Stored history, without the system prompt
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    pub const fn total_input_tokens(&self) -> u64 {
        self.total_input_tokens
    }

    pub const fn total_output_tokens(&self) -> u64 {
        self.total_output_tokens
    }

    pub const fn totals(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.total_input_tokens,
            output_tokens: self.total_output_tokens,
        }
    }

    /// 1-based number of the next user turn
    pub fn turn_number(&self) -> usize {
        self.history.iter().filter(|m| m.role == Role::User).count() + 1
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.history.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
