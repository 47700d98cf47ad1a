//! # chatbot-runtime
//!
//! Concrete backends and tool providers for the chatbot.
//!
//! ## Backends
//!
//! - **OpenRouter** (default presets): hosted models behind one key
//! - **OpenAI**: direct Chat Completions access
//! - **Ollama**: local inference through its OpenAI-compatible endpoint
//!
//! ## Tool providers
//!
//! Tool servers are child processes speaking JSON-RPC over stdio,
//! listed in `server_config.json`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatbot_runtime::{LlmSettings, ServerConfigFile, build_orchestrator, connect_all};
//!
//! let registry = connect_all(&ServerConfigFile::load("server_config.json")?).await;
//! let orchestrator = build_orchestrator(&LlmSettings::from_env()?, Arc::new(registry))?;
//! ```

pub mod config;
pub mod convert;
pub mod factory;
pub mod mcp;
pub mod openai;
pub mod wire;

pub use config::{DEFAULT_CONFIG_PATH, LlmSettings, McpServerConfig, ServerConfigFile};
pub use factory::{Preset, build_orchestrator, create_backend};
pub use mcp::{McpError, StdioToolProvider, connect_all};
pub use openai::{BackendKind, BackendProfile, OpenAiCompatBackend};
