//! mcp-chatbot console
//!
//! Connects the configured tool servers, then runs an interactive chat
//! loop on stdin/stdout. Logs go to stderr.

mod commands;
mod repl;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use chatbot_runtime::{LlmSettings, Preset, ServerConfigFile, build_orchestrator, connect_all};

use crate::commands::Cli;

fn print_presets() {
    println!("Presets:");
    for preset in chatbot_runtime::factory::PRESETS {
        println!(
            "  {:<22} {} {}{}",
            preset.name,
            preset.provider,
            preset.model,
            if preset.enable_caching { " (cached)" } else { "" }
        );
    }
    let providers: Vec<String> = chatbot_runtime::factory::available_providers()
        .iter()
        .map(ToString::to_string)
        .collect();
    println!("Providers: {}", providers.join(", "));
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("❌ Fatal error: {e}");
        for cause in e.chain().skip(1) {
            eprintln!("   caused by: {cause}");
        }
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if cli.list_presets {
        print_presets();
        return Ok(());
    }

    let settings = LlmSettings::from_lookup(|key| cli.setting(key))
        .context("invalid LLM settings")?;
    tracing::info!(
        provider = %settings.provider,
        model = %settings.model,
        default_preset = Preset::default_preset().name,
        "Resolved LLM settings"
    );

    let servers = ServerConfigFile::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    let registry = connect_all(&servers).await;
    if registry.is_empty() {
        tracing::warn!("No tools available; the model will answer without tools");
    }

    let orchestrator = build_orchestrator(&settings, Arc::new(registry))?;
    repl::run(Arc::new(orchestrator)).await
}
