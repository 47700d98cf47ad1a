//! Error Types

use thiserror::Error;

/// Result type alias for chatbot operations
pub type Result<T> = std::result::Result<T, ChatError>;

/// Chatbot error types
#[derive(Error, Debug)]
pub enum ChatError {
    /// LLM backend unreachable or returned a non-success status
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// LLM backend answered with a payload that could not be interpreted
    #[error("Backend protocol error: {0}")]
    BackendProtocol(String),

    /// Model asked for a tool that no connected provider exposes
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// Provider reachable but the call failed
    #[error("Tool '{tool}' failed: {message}")]
    ToolInvocation { tool: String, message: String },

    /// Too many completion round-trips for a single query
    #[error("Tool loop exceeded {0} completion requests")]
    ToolLoopExceeded(usize),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rate limited by the backend
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other/unknown error
    #[error("{0}")]
    Other(String),
}

impl ChatError {
    /// Build a tool invocation error
    pub fn tool_invocation(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolInvocation {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Check if the caller may retry the same query
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::RateLimited(_) | Self::Io(_)
        )
    }

    /// Errors that are folded into the transcript instead of aborting a query
    pub const fn is_tool_level(&self) -> bool {
        matches!(self, Self::UnknownTool(_) | Self::ToolInvocation { .. })
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::BackendUnavailable(_) => {
                "The AI service is currently unavailable. Please try again.".into()
            }
            Self::BackendProtocol(msg) => {
                format!("The AI service returned an unexpected response: {msg}")
            }
            Self::UnknownTool(name) => format!("The tool '{name}' is not available."),
            Self::ToolInvocation { tool, message } => format!("Tool '{tool}' failed: {message}"),
            Self::ToolLoopExceeded(max) => format!(
                "Stopped after {max} requests without a final answer. Please try a simpler query."
            ),
            Self::Config(msg) => format!("Configuration problem: {msg}"),
            Self::RateLimited(_) => "You've made too many requests. Please wait a moment.".into(),
            Self::Auth(_) => "Authentication failed. Please check your API key.".into(),
            _ => "An unexpected error occurred.".into(),
        }
    }
}

impl From<anyhow::Error> for ChatError {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_level_errors_are_not_retryable() {
        let unknown = ChatError::UnknownTool("foo".into());
        let failed = ChatError::tool_invocation("search", "timeout");

        assert!(unknown.is_tool_level());
        assert!(failed.is_tool_level());
        assert!(!unknown.is_retryable());
        assert_eq!(failed.to_string(), "Tool 'search' failed: timeout");
    }

    #[test]
    fn test_backend_errors_surface_to_user() {
        let err = ChatError::BackendUnavailable("connection refused".into());
        assert!(err.is_retryable());
        assert!(!err.is_tool_level());
        assert!(err.user_message().contains("unavailable"));
    }
}
