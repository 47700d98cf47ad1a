//! Display helpers shared by the drivers.

use crate::message::{Message, TokenUsage};

/// `1234` → `"1.2k"`, `999` → `"999"`
#[allow(clippy::cast_precision_loss)]
pub fn format_tokens(count: u64) -> String {
    if count >= 1000 {
        format!("{:.1}k", count as f64 / 1000.0)
    } else {
        count.to_string()
    }
}

/// `Tokens: in/out (Total: in/out)`
pub fn token_line(turn: TokenUsage, total: TokenUsage) -> String {
    format!(
        "Tokens: {}/{} (Total: {}/{})",
        format_tokens(turn.input_tokens),
        format_tokens(turn.output_tokens),
        format_tokens(total.input_tokens),
        format_tokens(total.output_tokens),
    )
}

/// First `max` characters of `text`, with an ellipsis if cut
pub fn preview(text: &str, max: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// One line per message: `N. role: preview`
pub fn history_lines(history: &[Message], max: usize) -> Vec<String> {
    history
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            let body = if msg.calls().is_empty() {
                msg.text().to_string()
            } else {
                let names: Vec<&str> = msg.calls().iter().map(|c| c.name.as_str()).collect();
                format!("[calls {}] {}", names.join(", "), msg.text())
            };
            format!("{}. {}: {}", i + 1, msg.role, preview(body.trim(), max))
        })
        .collect()
}
