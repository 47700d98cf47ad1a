//! Conversation Messages
//!
//! Role-tagged messages exchanged between the orchestration loop and an
//! LLM backend, plus the backend's completion response.

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// Role of a message sender
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    System,
    /// User input
    User,
    /// Assistant (LLM) response
    Assistant,
    /// Tool result
    Tool,
}

impl Role {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation requested by the model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Correlation identifier, echoed back on the tool result
    pub id: String,

    /// Tool name as registered in the [`ToolRegistry`](crate::tool::ToolRegistry)
    pub name: String,

    /// JSON-encoded argument object, kept verbatim as the backend sent it
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decode the argument string into a JSON object.
    ///
    /// An empty string is treated as `{}`; anything that is not an object
    /// is rejected.
    pub fn parse_arguments(&self) -> Result<serde_json::Map<String, serde_json::Value>> {
        if self.arguments.trim().is_empty() {
            return Ok(serde_json::Map::new());
        }
        match serde_json::from_str::<serde_json::Value>(&self.arguments)? {
            serde_json::Value::Object(map) => Ok(map),
            serde_json::Value::Null => Ok(serde_json::Map::new()),
            other => Err(ChatError::tool_invocation(
                &self.name,
                format!("arguments must be a JSON object, got {other}"),
            )),
        }
    }
}

/// Prompt-prefix cache annotation
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheControl {
    #[serde(rename = "type")]
    pub kind: CacheKind,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheKind {
    #[default]
    Ephemeral,
}

/// A single message in a conversation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message role
    pub role: Role,

    /// Text content; absent on assistant turns that only carry tool calls
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Requested tool invocations (assistant role only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Call being answered (tool role only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Cache breakpoint, set by backends that need manual annotations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

impl Message {
    fn with_content(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
            cache_control: None,
        }
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::with_content(Role::System, content)
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::with_content(Role::User, content)
    }

    /// Create an assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_content(Role::Assistant, content)
    }

    /// Create an assistant turn that requests tools
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
            cache_control: None,
        }
    }

    /// Create a tool result message
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::with_content(Role::Tool, content)
        }
    }

    /// Text content or the empty string
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }

    /// Tool calls or an empty slice
    pub fn calls(&self) -> &[ToolCall] {
        self.tool_calls.as_deref().unwrap_or_default()
    }

    /// Check the structural invariants of a message
    pub fn validate(&self) -> Result<()> {
        let has_content = self.content.is_some();
        let has_calls = !self.calls().is_empty();

        match self.role {
            Role::Tool => {
                if self.tool_call_id.is_none() {
                    return Err(ChatError::Other("tool message without tool_call_id".into()));
                }
                if !has_content {
                    return Err(ChatError::Other("tool message without content".into()));
                }
            }
            Role::Assistant => {
                if !has_content && !has_calls {
                    return Err(ChatError::Other(
                        "assistant message without content or tool calls".into(),
                    ));
                }
            }
            Role::System | Role::User => {
                if has_calls {
                    return Err(ChatError::Other(format!("{} message with tool calls", self.role)));
                }
                if !has_content {
                    return Err(ChatError::Other(format!("{} message without content", self.role)));
                }
            }
        }

        if self.role != Role::Tool && self.tool_call_id.is_some() {
            return Err(ChatError::Other(format!("{} message with tool_call_id", self.role)));
        }

        Ok(())
    }
}

/// Token usage reported by a backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input_tokens += rhs.input_tokens;
        self.output_tokens += rhs.output_tokens;
    }
}

/// Response from one completion request
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Generated text
    pub content: Option<String>,

    /// Requested tool invocations, in backend order
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,

    /// Token usage (if reported)
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

impl CompletionResponse {
    /// Plain text answer with no tool calls
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Answer that requests tools
    pub fn with_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            content,
            tool_calls: Some(tool_calls),
            usage: None,
        }
    }

    pub const fn with_usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.usage = Some(TokenUsage {
            input_tokens,
            output_tokens,
        });
        self
    }

    /// Whether the model asked for at least one tool
    pub fn has_tool_calls(&self) -> bool {
        self.tool_calls.as_ref().is_some_and(|calls| !calls.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.text(), "Hello");
        assert!(msg.validate().is_ok());
    }

    #[test]
    fn test_tool_message_requires_call_id() {
        let ok = Message::tool("call_1", "result");
        assert!(ok.validate().is_ok());

        let mut missing = ok.clone();
        missing.tool_call_id = None;
        assert!(missing.validate().is_err());
    }

    #[test]
    fn test_assistant_needs_content_or_calls() {
        let calls_only =
            Message::assistant_tool_calls(None, vec![ToolCall::new("c1", "search", "{}")]);
        assert!(calls_only.validate().is_ok());

        let empty = Message::assistant_tool_calls(None, vec![]);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_parse_arguments() {
        let call = ToolCall::new("c1", "search", r#"{"query":"X"}"#);
        let args = call.parse_arguments().unwrap();
        assert_eq!(args["query"], "X");

        assert!(ToolCall::new("c2", "noop", "").parse_arguments().unwrap().is_empty());
        assert!(ToolCall::new("c3", "bad", "[1,2]").parse_arguments().is_err());
        assert!(ToolCall::new("c4", "bad", "{not json").parse_arguments().is_err());
    }

    #[test]
    fn test_terminal_response_detection() {
        assert!(!CompletionResponse::text("4").has_tool_calls());
        assert!(!CompletionResponse::with_tool_calls(Some("hm".into()), vec![]).has_tool_calls());
        assert!(
            CompletionResponse::with_tool_calls(None, vec![ToolCall::new("c", "t", "{}")])
                .has_tool_calls()
        );
    }
}
