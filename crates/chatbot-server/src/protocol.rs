//! WebSocket message types.

use chatbot_core::LoopEvent;
use serde::{Deserialize, Serialize};

/// Frames sent by the browser
#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Chat {
        #[serde(default)]
        message: String,
    },
    Clear,
}

/// Frames sent to the browser
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        provider: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caching: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tools: Option<usize>,
    },
    UserMessage {
        message: String,
    },
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },
    ToolResult {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },
    AssistantMessage {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        tokens: Option<String>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
            provider: None,
            model: None,
            caching: None,
            tools: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Frame forwarded for a loop event, if any
    pub fn from_event(event: LoopEvent) -> Option<Self> {
        match event {
            LoopEvent::ToolCall {
                id,
                name,
                arguments,
            } => Some(Self::ToolCall {
                id,
                name,
                arguments,
            }),
            LoopEvent::ToolResult {
                id,
                name,
                content,
                is_error,
            } => Some(Self::ToolResult {
                id,
                name,
                content,
                is_error,
            }),
            LoopEvent::Status { .. } | LoopEvent::AssistantText { .. } | LoopEvent::Usage { .. } => {
                None
            }
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"encoding failed: {e}"}}"#)
        })
    }
}
