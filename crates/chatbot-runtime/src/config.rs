//! Configuration
//!
//! Two sources: the tool-server file (`server_config.json`) and LLM
//! settings read from the environment.

use std::path::Path;
use std::time::Duration;

use chatbot_core::error::{ChatError, Result};
use chatbot_core::orchestrator::DEFAULT_TOOL_TIMEOUT;
use chatbot_core::provider::GenerationOptions;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::factory::{DEFAULT_PRESET, Preset, default_model};
use crate::openai::{BackendKind, OLLAMA_DEFAULT_HOST};

pub const DEFAULT_CONFIG_PATH: &str = "server_config.json";
pub const DEFAULT_MAX_ROUNDS: usize = 10;

/// How to launch one tool server
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawServerConfig {
    Wrapped {
        #[serde(rename = "mcpServers")]
        mcp_servers: IndexMap<String, McpServerConfig>,
    },
    Flat(IndexMap<String, McpServerConfig>),
}

/// Contents of `server_config.json`, in file order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerConfigFile {
    servers: IndexMap<String, McpServerConfig>,
}

impl ServerConfigFile {
    /// Parse either `{"mcpServers": {...}}` or a bare `{name: {...}}` map
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawServerConfig = serde_json::from_str(json).map_err(|e| {
            ChatError::Config(format!("invalid server config: {e}"))
        })?;
        let servers = match raw {
            RawServerConfig::Wrapped { mcp_servers } => mcp_servers,
            RawServerConfig::Flat(servers) => servers,
        };
        Ok(Self { servers })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            ChatError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&json)?;
        tracing::info!(path = %path.display(), servers = config.len(), "Loaded tool server config");
        Ok(config)
    }

    pub fn servers(&self) -> impl Iterator<Item = (&String, &McpServerConfig)> {
        self.servers.iter()
    }

    pub fn get(&self, name: &str) -> Option<&McpServerConfig> {
        self.servers.get(name)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}

/// Backend and loop settings
#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub provider: BackendKind,
    pub model: String,
    pub enable_caching: bool,
    pub cache_system_messages: bool,
    pub openai_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub ollama_host: String,
    pub generation: GenerationOptions,
    pub max_rounds: usize,
    pub parallel_tool_calls: bool,
    pub tool_timeout: Duration,
    pub system_prompt: Option<String>,
}

impl LlmSettings {
    /// Settings for a named preset with everything else defaulted
    pub fn from_preset(preset: &Preset) -> Self {
        Self {
            provider: preset.provider,
            model: preset.model.to_string(),
            enable_caching: preset.enable_caching,
            cache_system_messages: preset.cache_system_messages,
            openai_api_key: None,
            openrouter_api_key: None,
            ollama_host: OLLAMA_DEFAULT_HOST.into(),
            generation: GenerationOptions::default(),
            max_rounds: DEFAULT_MAX_ROUNDS,
            parallel_tool_calls: false,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            system_prompt: None,
        }
    }

    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let mut settings = match var("LLM_PROVIDER") {
            Some(provider) => {
                let kind: BackendKind = provider.parse()?;
                Self {
                    provider: kind,
                    model: default_model(kind).to_string(),
                    enable_caching: kind != BackendKind::Ollama,
                    cache_system_messages: true,
                    ..Self::from_preset(Preset::default_preset())
                }
            }
            None => {
                let name = var("LLM_PRESET").unwrap_or_else(|| DEFAULT_PRESET.to_string());
                let preset = Preset::find(&name).ok_or_else(|| {
                    ChatError::Config(format!(
                        "unknown preset '{name}' (available: {})",
                        Preset::names().join(", ")
                    ))
                })?;
                Self::from_preset(preset)
            }
        };

        if let Some(model) = var("LLM_MODEL") {
            settings.model = model;
        }
        settings.openai_api_key = var("OPENAI_API_KEY");
        settings.openrouter_api_key = var("OPENROUTER_API_KEY");
        if let Some(host) = var("OLLAMA_HOST") {
            settings.ollama_host = host;
        }
        if let Some(max_tokens) = var("LLM_MAX_TOKENS") {
            settings.generation.max_tokens = parse_var("LLM_MAX_TOKENS", &max_tokens)?;
        }
        if let Some(temperature) = var("LLM_TEMPERATURE") {
            settings.generation.temperature = parse_var("LLM_TEMPERATURE", &temperature)?;
        }
        if let Some(rounds) = var("LLM_MAX_ROUNDS") {
            settings.max_rounds = parse_var("LLM_MAX_ROUNDS", &rounds)?;
        }
        if let Some(parallel) = var("LLM_PARALLEL_TOOLS") {
            settings.parallel_tool_calls = parse_var("LLM_PARALLEL_TOOLS", &parallel)?;
        }
        if let Some(secs) = var("MCP_TOOL_TIMEOUT_SECS") {
            let secs: u64 = parse_var("MCP_TOOL_TIMEOUT_SECS", &secs)?;
            if secs == 0 {
                return Err(ChatError::Config("MCP_TOOL_TIMEOUT_SECS must be at least 1".into()));
            }
            settings.tool_timeout = Duration::from_secs(secs);
        }
        settings.system_prompt = var("LLM_SYSTEM_PROMPT");

        Ok(settings)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| ChatError::Config(format!("{key}={value}: {e}")))
}
