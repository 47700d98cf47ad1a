//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ChatError, Result};
use crate::message::{CompletionResponse, Message, ToolCall};
use crate::provider::{GenerationOptions, LlmBackend};
use crate::tool::{ToolArguments, ToolDescriptor, ToolProvider, ToolSchema};

/// Backend that replays queued responses and records every request
#[derive(Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<CompletionResponse>>>,
    requests: Mutex<Vec<Vec<Message>>>,
    tools: Mutex<Vec<Vec<ToolSchema>>>,
    repeat_tool_call: bool,
}

impl ScriptedBackend {
    pub fn new(responses: Vec<Result<CompletionResponse>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// A backend that asks for the same tool forever
    pub fn never_stops() -> Self {
        Self {
            repeat_tool_call: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }

    /// Tool schemas offered with each request
    pub fn offered_tools(&self) -> Vec<Vec<ToolSchema>> {
        self.tools.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn provider_name(&self) -> &str {
        "Scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(vec!["scripted-model".into()])
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        _options: &GenerationOptions,
    ) -> Result<CompletionResponse> {
        self.tools.lock().unwrap().push(tools.to_vec());
        let n = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(messages.to_vec());
            requests.len()
        };

        if self.repeat_tool_call {
            let id = format!("call_{n}");
            return Ok(tool_response(&[(id.as_str(), "search", r#"{"query":"again"}"#)]));
        }

        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChatError::BackendProtocol("script exhausted".into())))
    }
}

/// Assistant response carrying tool calls `(id, name, arguments)`
pub fn tool_response(calls: &[(&str, &str, &str)]) -> CompletionResponse {
    CompletionResponse::with_tool_calls(
        None,
        calls
            .iter()
            .map(|(id, name, args)| ToolCall::new(*id, *name, *args))
            .collect(),
    )
}

/// How a [`MockProvider`] answers calls
#[derive(Clone, Copy)]
pub enum Behaviour {
    Echo,
    Fail,
    Hang,
    /// Sleep for `base - index * step` milliseconds, keyed by the `n` argument
    Staggered,
}

/// Tool provider that echoes its arguments
pub struct MockProvider {
    id: String,
    tools: Vec<ToolDescriptor>,
    behaviour: Behaviour,
    pub calls: AtomicUsize,
}

impl MockProvider {
    pub fn new(id: &str, names: &[&str], behaviour: Behaviour) -> Self {
        Self {
            id: id.into(),
            tools: names
                .iter()
                .map(|n| {
                    ToolDescriptor::new(
                        *n,
                        format!("{n} tool"),
                        serde_json::json!({"type": "object", "properties": {}}),
                    )
                })
                .collect(),
            behaviour,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.clone()
    }
}

#[async_trait]
impl ToolProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, arguments: ToolArguments) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let args = serde_json::Value::Object(arguments);
        match self.behaviour {
            Behaviour::Echo => Ok(format!("{name} -> {args}")),
            Behaviour::Fail => Err(ChatError::tool_invocation(name, "provider exploded")),
            Behaviour::Hang => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            Behaviour::Staggered => {
                let n = args.get("n").and_then(serde_json::Value::as_u64).unwrap_or(0);
                tokio::time::sleep(Duration::from_millis(60u64.saturating_sub(n * 20))).await;
                Ok(format!("{name} #{n}"))
            }
        }
    }
}
