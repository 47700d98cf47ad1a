//! Orchestration Loop
//!
//! Drives one user query to a final answer:
//!
//! ```text
//! AWAITING_QUERY → REQUESTING_COMPLETION ─┬─ no tool calls ─→ TERMINAL
//!                        ↑                │
//!                        └─ DISPATCHING_TOOLS ←┘
//! ```
//!
//! Tool failures are folded into the transcript so the model can react;
//! backend failures abort the query and are returned to the caller.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use crate::error::{ChatError, Result};
use crate::event::{EventSender, LoopEvent};
use crate::message::{Message, TokenUsage, ToolCall};
use crate::provider::{GenerationOptions, LlmBackend};
use crate::state::ConversationState;
use crate::tool::ToolRegistry;

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    /// Optional system prompt placed ahead of every transcript
    pub system_prompt: Option<String>,

    /// Maximum completion requests per query
    pub max_rounds: usize,

    /// Dispatch the tool calls of one round concurrently
    pub parallel_tool_calls: bool,

    /// Longest a single tool call may run before it counts as failed
    pub tool_timeout: Duration,

    /// Generation options
    pub generation: GenerationOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_rounds: 10,
            parallel_tool_calls: false,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            generation: GenerationOptions::default(),
        }
    }
}

/// Result of a successfully answered query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryOutcome {
    /// Final assistant text
    pub final_text: String,

    /// Completion requests issued for this query
    pub rounds: usize,

    /// Tokens consumed by this query
    pub usage: TokenUsage,
}

/// Shared, stateless part of a chat session
///
/// One orchestrator can serve many sessions; each session brings its own
/// [`ConversationState`].
pub struct Orchestrator {
    backend: Arc<dyn LlmBackend>,
    tools: Arc<ToolRegistry>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn LlmBackend>,
        tools: Arc<ToolRegistry>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            backend,
            tools,
            config,
        }
    }

    /// Fresh conversation state carrying the configured system prompt
    pub fn new_conversation(&self) -> ConversationState {
        self.config
            .system_prompt
            .as_ref()
            .map_or_else(ConversationState::new, ConversationState::with_system_prompt)
    }

    /// Answer one user query against a conversation.
    ///
    /// The user message is appended immediately and is never rolled back.
    /// Each tool round (assistant message plus all of its results) is
    /// committed in one step, so dropping this future mid-round leaves no
    /// partial round behind.
    pub async fn run(
        &self,
        state: &mut ConversationState,
        query: &str,
        events: &EventSender,
    ) -> Result<QueryOutcome> {
        state.append(Message::user(query));

        let schemas = self.tools.describe_all();
        let mut usage = TokenUsage::default();
        let mut rounds = 0;

        loop {
            if rounds >= self.config.max_rounds {
                tracing::warn!(max = self.config.max_rounds, "Tool loop exceeded");
                return Err(ChatError::ToolLoopExceeded(self.config.max_rounds));
            }
            rounds += 1;

            events.status(format!("Requesting completion ({rounds})"));
            let response = self
                .backend
                .complete(&state.snapshot(), &schemas, &self.config.generation)
                .await?;

            if let Some(u) = response.usage {
                state.record_usage(u.input_tokens, u.output_tokens);
                usage += u;
                events.emit(LoopEvent::Usage {
                    input_tokens: u.input_tokens,
                    output_tokens: u.output_tokens,
                    total_input: state.total_input_tokens(),
                    total_output: state.total_output_tokens(),
                });
            }

            if let Some(text) = response.content.as_deref().filter(|t| !t.is_empty()) {
                events.emit(LoopEvent::AssistantText {
                    content: text.to_string(),
                });
            }

            if !response.has_tool_calls() {
                let final_text = response.content.unwrap_or_default();
                state.append(Message::assistant(final_text.clone()));
                tracing::debug!(rounds, "Query answered");
                return Ok(QueryOutcome {
                    final_text,
                    rounds,
                    usage,
                });
            }

            let calls = response.tool_calls.unwrap_or_default();
            let round = self.dispatch_round(response.content, calls, events).await;
            state.extend(round);
        }
    }

    /// Invoke every call of one assistant turn and build the round's messages
    async fn dispatch_round(
        &self,
        content: Option<String>,
        calls: Vec<ToolCall>,
        events: &EventSender,
    ) -> Vec<Message> {
        for call in &calls {
            tracing::debug!(tool = %call.name, id = %call.id, "Executing tool");
            events.emit(LoopEvent::ToolCall {
                id: call.id.clone(),
                name: call.name.clone(),
                arguments: call.arguments.clone(),
            });
        }

        let results = if self.config.parallel_tool_calls {
            join_all(calls.iter().map(|call| self.execute_tool(call))).await
        } else {
            let mut results = Vec::with_capacity(calls.len());
            for call in &calls {
                results.push(self.execute_tool(call).await);
            }
            results
        };

        let mut round = Vec::with_capacity(calls.len() + 1);
        let mut tool_messages = Vec::with_capacity(calls.len());

        for (call, result) in calls.iter().zip(results) {
            let (text, is_error) = match result {
                Ok(output) => (output, false),
                Err(e) => {
                    tracing::warn!(tool = %call.name, error = %e, "Tool failed");
                    (format!("Error: {e}"), true)
                }
            };
            events.emit(LoopEvent::ToolResult {
                id: call.id.clone(),
                name: call.name.clone(),
                content: text.clone(),
                is_error,
            });
            tool_messages.push(Message::tool(call.id.clone(), text));
        }

        round.push(Message::assistant_tool_calls(content, calls));
        round.extend(tool_messages);
        round
    }

    async fn execute_tool(&self, call: &ToolCall) -> Result<String> {
        if self.tools.get(&call.name).is_none() {
            return Err(ChatError::UnknownTool(call.name.clone()));
        }
        let arguments = call.parse_arguments().map_err(|e| {
            if e.is_tool_level() {
                e
            } else {
                ChatError::tool_invocation(&call.name, format!("invalid arguments: {e}"))
            }
        })?;

        let timeout = self.config.tool_timeout;
        tokio::time::timeout(timeout, self.tools.invoke(&call.name, arguments))
            .await
            .map_err(|_| ChatError::tool_invocation(&call.name, format!("timed out after {timeout:?}")))?
    }

    /// Get the backend
    pub fn backend(&self) -> &dyn LlmBackend {
        self.backend.as_ref()
    }

    /// Get the tool registry
    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Get configuration
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }
}

/// Builder for [`Orchestrator`]
pub struct OrchestratorBuilder {
    backend: Option<Arc<dyn LlmBackend>>,
    tools: Arc<ToolRegistry>,
    config: OrchestratorConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            backend: None,
            tools: Arc::new(ToolRegistry::new()),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub const fn max_rounds(mut self, max: usize) -> Self {
        self.config.max_rounds = max;
        self
    }

    pub const fn parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.config.parallel_tool_calls = enabled;
        self
    }

    pub const fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tool_timeout = timeout;
        self
    }

    pub const fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.config.generation.max_tokens = max_tokens;
        self
    }

    pub const fn temperature(mut self, temp: f32) -> Self {
        self.config.generation.temperature = temp;
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let backend = self
            .backend
            .ok_or_else(|| ChatError::Config("LLM backend is required".into()))?;
        if self.config.max_rounds == 0 {
            return Err(ChatError::Config("max_rounds must be at least 1".into()));
        }

        Ok(Orchestrator::new(backend, self.tools, self.config))
    }
}
