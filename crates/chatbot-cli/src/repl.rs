//! Interactive console loop.

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use futures::StreamExt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use chatbot_core::format::{history_lines, token_line};
use chatbot_core::{ChatSession, EventStream, LoopEvent, Orchestrator, TokenUsage};

use crate::commands::Input;

const PREVIEW_CHARS: usize = 100;

fn print_banner(orchestrator: &Orchestrator) {
    let backend = orchestrator.backend();
    let caching = backend.cache_settings().wants_breakpoints();

    println!("\n🤖 Multi-Server Chatbot Started!");
    println!("Provider: {}", backend.provider_name());
    println!("Model: {}", backend.model());
    println!("Caching: {}", if caching { "Enabled" } else { "Disabled" });
    println!("Tools: {} available", orchestrator.tools().len());
    for name in orchestrator.tools().names() {
        println!("  • {name}");
    }
    println!("\nSpecial commands:");
    println!("  'clear'   - Clear conversation history");
    println!("  'history' - Show conversation history");
    println!("  'quit'    - Exit chatbot");
    println!("\nType your queries to start chatting...");
}

/// Render one loop event as console output
pub fn render_event(event: &LoopEvent) -> Option<String> {
    match event {
        LoopEvent::AssistantText { content } => Some(content.clone()),
        LoopEvent::ToolCall {
            name, arguments, ..
        } => Some(format!("🔧 Calling tool {name} with args {arguments}")),
        LoopEvent::ToolResult {
            name,
            content,
            is_error: true,
            ..
        } => Some(format!("⚠ {name}: {content}")),
        LoopEvent::Usage {
            input_tokens,
            output_tokens,
            total_input,
            total_output,
        } => Some(format!(
            "🔢 {}",
            token_line(
                TokenUsage {
                    input_tokens: *input_tokens,
                    output_tokens: *output_tokens,
                },
                TokenUsage {
                    input_tokens: *total_input,
                    output_tokens: *total_output,
                },
            )
        )),
        LoopEvent::ToolResult { .. } | LoopEvent::Status { .. } => None,
    }
}

async fn print_events(mut events: EventStream) {
    while let Some(event) = events.next().await {
        if let LoopEvent::Status { message } = &event {
            tracing::debug!("{}", message);
        }
        if let Some(line) = render_event(&event) {
            println!("{line}");
        }
    }
}

fn print_history(session: &ChatSession) {
    let history = session.history();
    println!("\n📜 Conversation History ({} messages):", history.len());
    for line in history_lines(history, PREVIEW_CHARS) {
        println!("  {line}");
    }
}

/// Next line typed at the prompt, or `None` on end of input or interrupt.
///
/// Once `ctrl_c()` has been awaited SIGINT no longer terminates the
/// process, so the prompt has to watch for it as well.
async fn next_input<R, F, T>(lines: &mut Lines<R>, interrupt: F) -> std::io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = T>,
{
    tokio::select! {
        line = lines.next_line() => line,
        _ = interrupt => {
            println!();
            Ok(None)
        }
    }
}

/// Run until `quit` or end of input
pub async fn run(orchestrator: Arc<Orchestrator>) -> Result<()> {
    print_banner(&orchestrator);

    let mut session = ChatSession::new(orchestrator);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n[Turn {}] Query: ", session.turn_number());
        std::io::stdout().flush()?;

        let Some(line) = next_input(&mut lines, tokio::signal::ctrl_c()).await? else {
            break;
        };

        match Input::parse(&line) {
            Input::Quit => break,
            Input::Empty => {}
            Input::Clear => {
                session.clear_session();
                println!("🧹 Conversation history and token counts cleared!");
            }
            Input::History => print_history(&session),
            Input::Query(query) => {
                let (fut, events) = session.submit(query);
                let run = async { tokio::join!(fut, print_events(events)).0 };

                tokio::select! {
                    result = run => {
                        if let Err(e) = result {
                            tracing::debug!(error = ?e, "Query failed");
                            println!("\n❌ Error: {}", e.user_message());
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        println!("\n⏹ Query cancelled");
                    }
                }
            }
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_tool_events() {
        let call = LoopEvent::ToolCall {
            id: "c1".into(),
            name: "search_papers".into(),
            arguments: r#"{"topic":"physics"}"#.into(),
        };
        assert_eq!(
            render_event(&call).unwrap(),
            r#"🔧 Calling tool search_papers with args {"topic":"physics"}"#
        );

        let ok = LoopEvent::ToolResult {
            id: "c1".into(),
            name: "search_papers".into(),
            content: "3 papers".into(),
            is_error: false,
        };
        assert!(render_event(&ok).is_none());

        let failed = LoopEvent::ToolResult {
            id: "c2".into(),
            name: "fetch".into(),
            content: "Error: timeout".into(),
            is_error: true,
        };
        assert_eq!(render_event(&failed).unwrap(), "⚠ fetch: Error: timeout");
    }

    #[tokio::test]
    async fn test_interrupt_at_prompt_ends_input() {
        // nothing is ever written, so the read never completes
        let (_keep_open, idle) = tokio::io::duplex(64);
        let mut lines = BufReader::new(idle).lines();

        let line = next_input(&mut lines, std::future::ready(())).await.unwrap();
        assert!(line.is_none());
    }

    #[tokio::test]
    async fn test_prompt_reads_line_without_interrupt() {
        let mut lines = BufReader::new(&b"history\n"[..]).lines();

        let line = next_input(&mut lines, std::future::pending::<()>()).await.unwrap();
        assert_eq!(line.as_deref(), Some("history"));
    }

    #[test]
    fn test_render_usage() {
        let usage = LoopEvent::Usage {
            input_tokens: 1200,
            output_tokens: 80,
            total_input: 5400,
            total_output: 310,
        };
        assert_eq!(
            render_event(&usage).unwrap(),
            "🔢 Tokens: 1.2k/80 (Total: 5.4k/310)"
        );
    }
}
