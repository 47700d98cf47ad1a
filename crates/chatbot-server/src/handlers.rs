//! HTTP/WebSocket Handlers

use std::fmt::Display;

use axum::{
    Json,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use chatbot_core::{ChatSession, LoopEvent, QueryOutcome, format::token_line};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub provider: String,
    pub model: String,
    pub caching: bool,
    pub tools: usize,
}

#[derive(Debug, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    pub provider: String,
}

// ============================================================================
// HTTP
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = state.orchestrator.backend();
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        provider: backend.provider_name().to_string(),
        model: backend.model().to_string(),
        caching: state.caching,
        tools: state.orchestrator.tools().len(),
    })
}

/// Tools available to the model, in registration order
pub async fn list_tools(State(state): State<AppState>) -> Json<Vec<ToolInfo>> {
    let registry = state.orchestrator.tools();
    let tools = registry
        .describe_all()
        .into_iter()
        .map(|schema| ToolInfo {
            provider: registry.provider_of(&schema.name).unwrap_or_default().to_string(),
            name: schema.name,
            description: schema.description,
        })
        .collect();
    Json(tools)
}

// ============================================================================
// WebSocket
// ============================================================================

/// WebSocket chat
pub async fn chat_ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sender, receiver) = socket.split();
    serve_session(sender, receiver, state).await;
}

async fn send<S>(sender: &mut S, message: &ServerMessage) -> bool
where
    S: Sink<Message> + Unpin,
{
    sender
        .send(Message::Text(message.to_json().into()))
        .await
        .is_ok()
}

fn connected_status(state: &AppState) -> ServerMessage {
    let backend = state.orchestrator.backend();
    ServerMessage::Status {
        message: format!(
            "Connected to {} using {}",
            backend.provider_name(),
            backend.model()
        ),
        provider: Some(backend.provider_name().to_string()),
        model: Some(backend.model().to_string()),
        caching: Some(state.caching),
        tools: Some(state.orchestrator.tools().len()),
    }
}

/// Run one chat session over a pair of frame channels until the client leaves
pub async fn serve_session<S, R, E>(mut sender: S, mut receiver: R, state: AppState)
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: Display,
{
    let mut session = ChatSession::new(state.orchestrator.clone());
    tracing::info!(session = %session.id(), "WebSocket connected");

    if !send(&mut sender, &connected_status(&state)).await {
        return;
    }

    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::error!("WebSocket error: {}", e);
                break;
            }
            _ => continue,
        };

        let request: ClientMessage = match serde_json::from_str(text.as_str()) {
            Ok(r) => r,
            Err(e) => {
                if !send(&mut sender, &ServerMessage::error(format!("Invalid message: {e}"))).await {
                    break;
                }
                continue;
            }
        };

        match request {
            ClientMessage::Chat { message } => {
                let query = message.trim();
                if query.is_empty() {
                    continue;
                }
                if !run_query(&mut session, query, &mut sender, &mut receiver).await {
                    break;
                }
            }
            ClientMessage::Clear => {
                session.clear_session();
                if !send(&mut sender, &ServerMessage::status("Conversation history cleared")).await {
                    break;
                }
            }
        }
    }

    tracing::info!(
        session = %session.id(),
        title = %session.title(),
        started = %session.created_at(),
        last_active = %session.updated_at(),
        "WebSocket disconnected"
    );
}

/// Answer one query, forwarding tool progress as it happens.
///
/// Returns `false` once the client is gone; the query is dropped at that
/// point and nothing more is committed.
async fn run_query<S, R, E>(
    session: &mut ChatSession,
    query: &str,
    sender: &mut S,
    receiver: &mut R,
) -> bool
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
{
    if !send(
        sender,
        &ServerMessage::UserMessage {
            message: query.to_string(),
        },
    )
    .await
    {
        return false;
    }

    let mut texts: Vec<String> = Vec::new();
    let outcome = {
        let (fut, mut events) = session.submit(query);
        tokio::pin!(fut);

        loop {
            tokio::select! {
                result = &mut fut => {
                    // flush whatever the loop emitted before finishing
                    while let Some(event) = events.next().await {
                        if !forward(event, &mut texts, sender).await {
                            return false;
                        }
                    }
                    break result;
                }
                Some(event) = events.next() => {
                    if !forward(event, &mut texts, sender).await {
                        tracing::info!("Client gone, cancelling query");
                        return false;
                    }
                }
                frame = receiver.next() => match frame {
                    Some(Ok(Message::Text(_))) => {
                        if !send(sender, &ServerMessage::error("A query is already in progress")).await {
                            return false;
                        }
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => {
                        tracing::info!("Client disconnected, cancelling query");
                        return false;
                    }
                    Some(Ok(_)) => {}
                },
            }
        }
    };

    let reply = match outcome {
        Ok(QueryOutcome { usage, .. }) => ServerMessage::AssistantMessage {
            message: texts.join("\n"),
            tokens: Some(token_line(usage, session.state().totals())),
        },
        Err(e) => {
            tracing::error!(session = %session.id(), "Query failed: {}", e);
            ServerMessage::error(format!("Error processing query: {}", e.user_message()))
        }
    };
    send(sender, &reply).await
}

async fn forward<S>(event: LoopEvent, texts: &mut Vec<String>, sender: &mut S) -> bool
where
    S: Sink<Message> + Unpin,
{
    if let LoopEvent::AssistantText { content } = &event {
        texts.push(content.clone());
    }
    match ServerMessage::from_event(event) {
        Some(message) => send(sender, &message).await,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chatbot_core::{
        CompletionResponse, GenerationOptions, LlmBackend, OrchestratorBuilder, ToolArguments,
        ToolCall, ToolDescriptor, ToolProvider, ToolRegistry, ToolSchema,
    };
    use futures::channel::mpsc;
    use serde_json::{Value, json};
    use tokio::task::JoinHandle;

    struct Scripted(Mutex<VecDeque<CompletionResponse>>);

    #[async_trait]
    impl LlmBackend for Scripted {
        fn provider_name(&self) -> &str {
            "Scripted"
        }

        fn model(&self) -> &str {
            "script-1"
        }

        async fn list_models(&self) -> chatbot_core::Result<Vec<String>> {
            Ok(vec!["script-1".into()])
        }

        async fn complete(
            &self,
            _messages: &[chatbot_core::Message],
            _tools: &[ToolSchema],
            _options: &GenerationOptions,
        ) -> chatbot_core::Result<CompletionResponse> {
            let next = self.0.lock().unwrap().pop_front();
            Ok(next.unwrap_or_else(|| CompletionResponse::text("ok")))
        }
    }

    /// `search` echoes its arguments, `wait` never answers
    struct Library;

    #[async_trait]
    impl ToolProvider for Library {
        fn id(&self) -> &str {
            "library"
        }

        async fn list_tools(&self) -> chatbot_core::Result<Vec<ToolDescriptor>> {
            Ok(vec![
                ToolDescriptor::new("search", "Search papers", json!({"type": "object"})),
                ToolDescriptor::new("wait", "Never returns", json!({"type": "object"})),
            ])
        }

        async fn call_tool(&self, name: &str, args: ToolArguments) -> chatbot_core::Result<String> {
            if name == "search" {
                return Ok(format!("found {}", Value::Object(args)));
            }
            std::future::pending().await
        }
    }

    struct Client {
        tx: mpsc::UnboundedSender<Result<Message, axum::Error>>,
        rx: mpsc::UnboundedReceiver<Message>,
        server: JoinHandle<()>,
    }

    impl Client {
        async fn connect(script: Vec<CompletionResponse>) -> Self {
            let mut registry = ToolRegistry::new();
            registry.register_provider(Arc::new(Library)).await.unwrap();
            let orchestrator = OrchestratorBuilder::new()
                .backend(Arc::new(Scripted(Mutex::new(script.into()))))
                .tools(Arc::new(registry))
                .build()
                .unwrap();

            let (tx, from_client) = mpsc::unbounded();
            let (to_client, rx) = mpsc::unbounded();
            let state = AppState::new(Arc::new(orchestrator));
            let server = tokio::spawn(serve_session(to_client, from_client, state));
            Self { tx, rx, server }
        }

        fn send(&self, frame: &Value) {
            self.tx
                .unbounded_send(Ok(Message::Text(frame.to_string().into())))
                .unwrap();
        }

        async fn recv(&mut self) -> Value {
            let frame = tokio::time::timeout(Duration::from_secs(2), self.rx.next())
                .await
                .expect("no frame within 2s")
                .expect("server hung up");
            match frame {
                Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    }

    fn calls(id: &str, name: &str, arguments: &str) -> CompletionResponse {
        CompletionResponse::with_tool_calls(None, vec![ToolCall::new(id, name, arguments)])
    }

    #[tokio::test]
    async fn test_status_on_connect() {
        let mut client = Client::connect(vec![]).await;

        let status = client.recv().await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["message"], "Connected to Scripted using script-1");
        assert_eq!(status["provider"], "Scripted");
        assert_eq!(status["model"], "script-1");
        assert_eq!(status["caching"], false);
        assert_eq!(status["tools"], 2);
    }

    #[tokio::test]
    async fn test_chat_frames_in_order() {
        let mut client = Client::connect(vec![
            calls("call_1", "search", r#"{"query":"qubits"}"#).with_usage(10, 2),
            CompletionResponse::text("Found 3 papers.").with_usage(1200, 3),
        ])
        .await;
        client.recv().await;

        client.send(&json!({"type": "chat", "message": "  find qubit papers  "}));

        let user = client.recv().await;
        assert_eq!(user, json!({"type": "user_message", "message": "find qubit papers"}));

        let call = client.recv().await;
        assert_eq!(call["type"], "tool_call");
        assert_eq!(call["id"], "call_1");
        assert_eq!(call["name"], "search");
        assert_eq!(call["arguments"], r#"{"query":"qubits"}"#);

        let result = client.recv().await;
        assert_eq!(result["type"], "tool_result");
        assert_eq!(result["content"], r#"found {"query":"qubits"}"#);
        assert_eq!(result["is_error"], false);

        let answer = client.recv().await;
        assert_eq!(answer["type"], "assistant_message");
        assert_eq!(answer["message"], "Found 3 papers.");
        assert_eq!(answer["tokens"], "Tokens: 1.2k/5 (Total: 1.2k/5)");
    }

    #[tokio::test]
    async fn test_clear_and_invalid_frames() {
        let mut client = Client::connect(vec![]).await;
        client.recv().await;

        client.send(&json!({"type": "clear"}));
        assert_eq!(
            client.recv().await,
            json!({"type": "status", "message": "Conversation history cleared"})
        );

        client.send(&json!({"type": "dance"}));
        let error = client.recv().await;
        assert_eq!(error["type"], "error");
        assert!(error["message"].as_str().unwrap().starts_with("Invalid message"));

        // blank queries are ignored
        client.send(&json!({"type": "chat", "message": "   "}));
        client.send(&json!({"type": "chat", "message": "hi"}));
        assert_eq!(client.recv().await["type"], "user_message");
        assert_eq!(client.recv().await["message"], "ok");
    }

    #[tokio::test]
    async fn test_busy_session_rejects_then_disconnect_cancels() {
        let mut client = Client::connect(vec![calls("call_1", "wait", "{}")]).await;
        client.recv().await;

        client.send(&json!({"type": "chat", "message": "hold on"}));
        assert_eq!(client.recv().await["type"], "user_message");
        assert_eq!(client.recv().await["name"], "wait");

        client.send(&json!({"type": "chat", "message": "are you there?"}));
        assert_eq!(
            client.recv().await,
            json!({"type": "error", "message": "A query is already in progress"})
        );

        let Client { tx, mut rx, server } = client;
        drop(tx);

        // the tool never answers, so only cancellation can end the session
        tokio::time::timeout(Duration::from_secs(2), server)
            .await
            .expect("session still running after disconnect")
            .unwrap();
        assert!(rx.next().await.is_none());
    }
}
