//! Conversion between core messages and Chat Completions wire types.

use chatbot_core::error::{ChatError, Result};
use chatbot_core::message::{
    CacheControl, CompletionResponse, Message, Role, TokenUsage, ToolCall,
};
use chatbot_core::tool::ToolSchema;

use crate::wire::{
    ContentPart, Response, WireContent, WireFunctionCall, WireFunctionDef, WireMessage, WireTool,
    WireToolCall,
};

// ── Outgoing ───────────────────────────────────────────────────────

/// Convert one core message to its wire form
pub fn to_wire_message(message: &Message) -> WireMessage {
    let content = message.content.as_ref().map(|text| match &message.cache_control {
        Some(cache) => WireContent::Parts(vec![ContentPart {
            part_type: "text".into(),
            text: text.clone(),
            cache_control: serde_json::to_value(cache).ok(),
        }]),
        None => WireContent::Text(text.clone()),
    });

    let tool_calls = message.tool_calls.as_ref().map(|calls| {
        calls
            .iter()
            .map(|call| WireToolCall {
                id: call.id.clone(),
                call_type: "function".into(),
                function: WireFunctionCall {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect()
    });

    WireMessage {
        role: message.role.as_str().to_string(),
        content,
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

pub fn to_wire_messages(messages: &[Message]) -> Vec<WireMessage> {
    messages.iter().map(to_wire_message).collect()
}

pub fn to_wire_tools(tools: &[ToolSchema]) -> Option<Vec<WireTool<'_>>> {
    if tools.is_empty() {
        return None;
    }
    Some(
        tools
            .iter()
            .map(|t| WireTool {
                tool_type: "function",
                function: WireFunctionDef {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect(),
    )
}

// ── Incoming ───────────────────────────────────────────────────────

fn parse_role(role: &str) -> Result<Role> {
    match role {
        "system" | "developer" => Ok(Role::System),
        "user" => Ok(Role::User),
        "assistant" => Ok(Role::Assistant),
        "tool" => Ok(Role::Tool),
        other => Err(ChatError::BackendProtocol(format!("unknown role '{other}'"))),
    }
}

/// Convert a wire message back into a core message
pub fn from_wire_message(wire: WireMessage) -> Result<Message> {
    let role = parse_role(&wire.role)?;

    let mut cache_control = None;
    let content = wire.content.map(|content| match content {
        WireContent::Text(text) => text,
        WireContent::Parts(parts) => {
            if parts.iter().any(|p| p.cache_control.is_some()) {
                cache_control = Some(CacheControl::default());
            }
            parts
                .into_iter()
                .filter(|p| p.part_type == "text")
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        }
    });

    let tool_calls = wire.tool_calls.map(|calls| {
        calls
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
            .collect::<Vec<_>>()
    });

    Ok(Message {
        role,
        content,
        tool_calls,
        tool_call_id: wire.tool_call_id,
        cache_control,
    })
}

/// Turn a decoded API response into a [`CompletionResponse`]
pub fn from_wire_response(response: Response) -> Result<CompletionResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ChatError::BackendProtocol("response contained no choices".into()))?;

    if choice.finish_reason.as_deref() == Some("length") {
        tracing::warn!("Completion truncated by max_tokens");
    }

    let message = from_wire_message(choice.message)?;
    let tool_calls = message.tool_calls.filter(|calls| !calls.is_empty());

    Ok(CompletionResponse {
        content: message.content,
        tool_calls,
        usage: response.usage.map(|u| TokenUsage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        }),
    })
}

/// Decode a raw response body
pub fn parse_response_body(body: &str) -> Result<CompletionResponse> {
    let response: Response = serde_json::from_str(body)
        .map_err(|e| ChatError::BackendProtocol(format!("invalid response body: {e}")))?;
    from_wire_response(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_calls_survive_round_trip() {
        let original = Message::assistant_tool_calls(
            Some("Let me check.".into()),
            vec![
                ToolCall::new("call_a", "search_papers", r#"{"topic": "physics", "max": 5}"#),
                ToolCall::new("call_b", "fetch", r#"{"url":"https://arxiv.org"}"#),
            ],
        );

        let wire = to_wire_message(&original);
        let json = serde_json::to_string(&wire).unwrap();
        let decoded: WireMessage = serde_json::from_str(&json).unwrap();
        let back = from_wire_message(decoded).unwrap();

        assert_eq!(back, original);
        assert_eq!(back.calls()[0].arguments, r#"{"topic": "physics", "max": 5}"#);
    }

    #[test]
    fn test_tool_result_wire_shape() {
        let wire = serde_json::to_value(to_wire_message(&Message::tool("call_a", "42"))).unwrap();
        assert_eq!(
            wire,
            serde_json::json!({"role": "tool", "content": "42", "tool_call_id": "call_a"})
        );
    }

    #[test]
    fn test_cache_breakpoint_uses_content_parts() {
        let mut msg = Message::system("You are helpful.");
        msg.cache_control = Some(CacheControl::default());

        let wire = serde_json::to_value(to_wire_message(&msg)).unwrap();
        assert_eq!(wire["content"][0]["type"], "text");
        assert_eq!(wire["content"][0]["cache_control"]["type"], "ephemeral");

        let back = from_wire_message(serde_json::from_value(wire).unwrap()).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"query\":\"X\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 15, "completion_tokens": 8, "total_tokens": 23}
        });

        let response = parse_response_body(&body.to_string()).unwrap();
        assert!(response.content.is_none());
        assert!(response.has_tool_calls());
        assert_eq!(response.tool_calls.unwrap()[0].arguments, r#"{"query":"X"}"#);
        assert_eq!(
            response.usage,
            Some(TokenUsage {
                input_tokens: 15,
                output_tokens: 8
            })
        );
    }

    #[test]
    fn test_malformed_bodies_are_protocol_errors() {
        assert!(matches!(
            parse_response_body("not json"),
            Err(ChatError::BackendProtocol(_))
        ));
        assert!(matches!(
            parse_response_body(r#"{"choices": []}"#),
            Err(ChatError::BackendProtocol(_))
        ));
    }

    #[test]
    fn test_no_tools_omits_field() {
        assert!(to_wire_tools(&[]).is_none());
    }
}
