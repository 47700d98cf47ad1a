//! Backend construction from presets and settings.

use std::sync::Arc;

use chatbot_core::error::{ChatError, Result};
use chatbot_core::orchestrator::{Orchestrator, OrchestratorBuilder};
use chatbot_core::provider::LlmBackend;
use chatbot_core::tool::ToolRegistry;

use crate::config::LlmSettings;
use crate::openai::{BackendKind, BackendProfile, OpenAiCompatBackend};

pub const DEFAULT_PRESET: &str = "gpt4.1-mini";

/// A named backend/model combination
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub provider: BackendKind,
    pub model: &'static str,
    pub enable_caching: bool,
    pub cache_system_messages: bool,
}

const fn openrouter(name: &'static str, model: &'static str, caching: bool) -> Preset {
    Preset {
        name,
        provider: BackendKind::OpenRouter,
        model,
        enable_caching: caching,
        cache_system_messages: caching,
    }
}

pub const PRESETS: &[Preset] = &[
    openrouter("gpt4o", "openai/gpt-4o", true),
    openrouter("gpt4o-mini", "openai/gpt-4o-mini", true),
    openrouter("gpt4.1-mini", "openai/gpt-4.1-mini", true),
    openrouter("claude-sonnet", "anthropic/claude-3-sonnet", true),
    openrouter("claude-haiku", "anthropic/claude-3-haiku", true),
    openrouter("llama-70b", "meta-llama/llama-3-70b-instruct", false),
    openrouter("claude-sonnet-cached", "anthropic/claude-3-sonnet", true),
];

impl Preset {
    pub fn find(name: &str) -> Option<&'static Self> {
        PRESETS.iter().find(|p| p.name == name)
    }

    pub fn names() -> Vec<&'static str> {
        PRESETS.iter().map(|p| p.name).collect()
    }

    pub fn default_preset() -> &'static Self {
        // PRESETS always contains DEFAULT_PRESET
        Self::find(DEFAULT_PRESET).unwrap_or(&PRESETS[0])
    }
}

/// Model used when a provider is chosen without naming one
pub const fn default_model(kind: BackendKind) -> &'static str {
    match kind {
        BackendKind::OpenAi => "gpt-4.1-mini",
        BackendKind::OpenRouter => "openai/gpt-4.1-mini",
        BackendKind::Ollama => "llama3.1",
    }
}

/// Providers this build can talk to
pub const fn available_providers() -> [BackendKind; 3] {
    [BackendKind::OpenAi, BackendKind::OpenRouter, BackendKind::Ollama]
}

fn require_key(key: Option<&String>, var: &str) -> Result<String> {
    key.cloned()
        .ok_or_else(|| ChatError::Config(format!("{var} is not set")))
}

/// Build the profile described by `settings`
pub fn profile_for(settings: &LlmSettings) -> Result<BackendProfile> {
    let profile = match settings.provider {
        BackendKind::OpenAi => {
            BackendProfile::openai(require_key(settings.openai_api_key.as_ref(), "OPENAI_API_KEY")?)
        }
        BackendKind::OpenRouter => BackendProfile::openrouter(require_key(
            settings.openrouter_api_key.as_ref(),
            "OPENROUTER_API_KEY",
        )?),
        BackendKind::Ollama => BackendProfile::ollama(&settings.ollama_host),
    };
    Ok(profile.with_caching(settings.enable_caching, settings.cache_system_messages))
}

/// Create the backend described by `settings`
pub fn create_backend(settings: &LlmSettings) -> Result<Arc<dyn LlmBackend>> {
    let backend = OpenAiCompatBackend::new(profile_for(settings)?, settings.model.clone())?;
    tracing::info!(
        provider = %settings.provider,
        model = %settings.model,
        caching = backend.profile().cache.wants_breakpoints(),
        "Created LLM backend"
    );
    Ok(Arc::new(backend))
}

/// Wire a backend and tool registry into an orchestrator
pub fn build_orchestrator(settings: &LlmSettings, tools: Arc<ToolRegistry>) -> Result<Orchestrator> {
    let mut builder = OrchestratorBuilder::new()
        .backend(create_backend(settings)?)
        .tools(tools)
        .max_rounds(settings.max_rounds)
        .parallel_tool_calls(settings.parallel_tool_calls)
        .tool_timeout(settings.tool_timeout)
        .max_tokens(settings.generation.max_tokens)
        .temperature(settings.generation.temperature);
    if let Some(prompt) = &settings.system_prompt {
        builder = builder.system_prompt(prompt.clone());
    }
    builder.build()
}
