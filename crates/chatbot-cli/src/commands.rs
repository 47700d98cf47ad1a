use std::path::PathBuf;

use clap::Parser;

use chatbot_runtime::DEFAULT_CONFIG_PATH;

#[derive(Debug, Parser)]
#[command(name = "chatbot", version, about = "Multi-server tool-calling chatbot")]
pub struct Cli {
    /// Path to the tool server config file
    #[arg(long, env = "MCP_SERVER_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Named backend preset (overrides LLM_PRESET)
    #[arg(long)]
    pub preset: Option<String>,

    /// Backend provider: openai, openrouter or ollama (overrides LLM_PROVIDER)
    #[arg(long)]
    pub provider: Option<String>,

    /// Model identifier (overrides LLM_MODEL)
    #[arg(long)]
    pub model: Option<String>,

    /// Print the available presets and providers, then exit
    #[arg(long)]
    pub list_presets: bool,
}

impl Cli {
    /// Environment lookup with command-line overrides applied
    pub fn setting(&self, key: &str) -> Option<String> {
        let flag = match key {
            "LLM_PRESET" => self.preset.clone(),
            "LLM_PROVIDER" => self.provider.clone(),
            "LLM_MODEL" => self.model.clone(),
            _ => None,
        };
        flag.or_else(|| std::env::var(key).ok())
    }
}

/// One line typed at the prompt
#[derive(Debug, PartialEq, Eq)]
pub enum Input<'a> {
    Quit,
    Clear,
    History,
    Empty,
    Query(&'a str),
}

impl<'a> Input<'a> {
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        match line.to_lowercase().as_str() {
            "" => Self::Empty,
            "quit" | "exit" => Self::Quit,
            "clear" => Self::Clear,
            "history" => Self::History,
            _ => Self::Query(line),
        }
    }
}
