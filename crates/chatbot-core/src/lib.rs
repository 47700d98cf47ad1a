//! # chatbot-core
//!
//! Multi-turn tool-calling orchestration between an LLM backend and a set
//! of tool-providing servers.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ChatSession                             │
//! │  ┌──────────────────┐  ┌──────────────┐  ┌────────────────┐  │
//! │  │ ConversationState│  │ Orchestrator │──│  LlmBackend    │  │
//! │  │ (history, tokens)│──│    (loop)    │  └────────────────┘  │
//! │  └──────────────────┘  └──────┬───────┘  ┌────────────────┐  │
//! │                               └──────────│  ToolRegistry  │──┼── ToolProvider × N
//! │                                          └────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The orchestrator and registry are shared across sessions; each session
//! owns its conversation state.

pub mod error;
pub mod event;
pub mod format;
pub mod message;
pub mod orchestrator;
pub mod provider;
pub mod session;
pub mod state;
pub mod tool;

#[cfg(test)]
mod testing;

pub use error::{ChatError, Result};
pub use event::{EventSender, EventStream, LoopEvent, event_channel};
pub use message::{CompletionResponse, Message, Role, TokenUsage, ToolCall};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, OrchestratorConfig, QueryOutcome};
pub use provider::{CacheSettings, GenerationOptions, LlmBackend};
pub use session::{ChatSession, SessionId};
pub use state::ConversationState;
pub use tool::{ToolArguments, ToolDescriptor, ToolProvider, ToolRegistry, ToolSchema};
