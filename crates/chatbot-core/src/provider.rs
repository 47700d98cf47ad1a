//! LLM Backend Capability
//!
//! A single interface that every chat-completion backend implements.
//! Backends differ only in authentication, endpoint and wire mapping;
//! provider-specific behaviour (prompt caching) is carried as data in
//! [`CacheSettings`] rather than by specialising the trait.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatbot_core::provider::{GenerationOptions, LlmBackend};
//!
//! let response = backend
//!     .complete(&messages, &registry.describe_all(), &GenerationOptions::default())
//!     .await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::message::{CacheControl, CompletionResponse, Message, Role};
use crate::tool::ToolSchema;

/// Content longer than this gets its own cache breakpoint
pub const CACHE_CONTENT_THRESHOLD: usize = 1000;

/// Per-request generation parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerationOptions {
    /// Maximum tokens to generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for sampling (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

const fn default_max_tokens() -> u32 {
    2024
}

const fn default_temperature() -> f32 {
    0.7
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Prompt-caching behaviour of a backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Caching requested by configuration
    pub enabled: bool,

    /// Annotate system messages
    pub cache_system_messages: bool,

    /// Backend is able to reuse prompt prefixes at all
    pub supports_caching: bool,

    /// Backend only caches at explicit breakpoints
    pub requires_manual_breakpoints: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            cache_system_messages: true,
            supports_caching: false,
            requires_manual_breakpoints: false,
        }
    }
}

impl CacheSettings {
    /// Whether this backend needs breakpoints inserted by the client
    pub const fn wants_breakpoints(&self) -> bool {
        self.enabled && self.supports_caching && self.requires_manual_breakpoints
    }

    /// Annotate a message with a cache breakpoint if appropriate.
    ///
    /// System messages are marked when `cache_system_messages` is set;
    /// any message is marked when its content is large.
    pub fn apply_breakpoint(&self, message: &mut Message) {
        if !self.wants_breakpoints() {
            return;
        }

        let mark = (message.role == Role::System && self.cache_system_messages)
            || message.text().chars().count() > CACHE_CONTENT_THRESHOLD;

        if mark {
            message.cache_control = Some(CacheControl::default());
        }
    }

    /// Apply [`apply_breakpoint`](Self::apply_breakpoint) to a whole transcript
    pub fn annotate(&self, messages: &[Message]) -> Vec<Message> {
        messages
            .iter()
            .cloned()
            .map(|mut m| {
                self.apply_breakpoint(&mut m);
                m
            })
            .collect()
    }
}

/// Capability trait for LLM backends
///
/// Implement this trait to add support for new chat-completion services.
/// The orchestration loop works exclusively through this interface.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Human-readable backend name (e.g. "OpenRouter")
    fn provider_name(&self) -> &str;

    /// Model identifier requests are sent with
    fn model(&self) -> &str;

    /// Caching behaviour
    fn cache_settings(&self) -> CacheSettings {
        CacheSettings::default()
    }

    /// Models this backend is known to serve
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Request a completion for the transcript and tool schema
    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<CompletionResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manual_cache() -> CacheSettings {
        CacheSettings {
            supports_caching: true,
            requires_manual_breakpoints: true,
            ..CacheSettings::default()
        }
    }

    #[test]
    fn test_generation_options_defaults() {
        let opts = GenerationOptions::default();
        assert_eq!(opts.max_tokens, 2024);
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn test_breakpoints_only_when_required() {
        let mut msg = Message::system("You are helpful.");
        CacheSettings::default().apply_breakpoint(&mut msg);
        assert!(msg.cache_control.is_none());

        manual_cache().apply_breakpoint(&mut msg);
        assert!(msg.cache_control.is_some());
    }

    #[test]
    fn test_breakpoints_on_large_content() {
        let settings = manual_cache();
        let annotated = settings.annotate(&[
            Message::user("short"),
            Message::tool("c1", "x".repeat(CACHE_CONTENT_THRESHOLD + 1)),
        ]);

        assert!(annotated[0].cache_control.is_none());
        assert!(annotated[1].cache_control.is_some());
    }

    #[test]
    fn test_content_threshold_counts_characters() {
        let settings = manual_cache();
        // two bytes per character, under the limit in characters
        let accented = "é".repeat(CACHE_CONTENT_THRESHOLD);
        let annotated = settings.annotate(&[
            Message::user(accented.clone()),
            Message::user(format!("{accented}é")),
        ]);

        assert!(annotated[0].cache_control.is_none());
        assert!(annotated[1].cache_control.is_some());
    }

    #[test]
    fn test_system_caching_can_be_disabled() {
        let settings = CacheSettings {
            cache_system_messages: false,
            ..manual_cache()
        };
        let mut msg = Message::system("prompt");
        settings.apply_breakpoint(&mut msg);
        assert!(msg.cache_control.is_none());
    }
}
