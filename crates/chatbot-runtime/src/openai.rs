//! OpenAI-compatible LLM Backend
//!
//! Implementation of `LlmBackend` for any Chat Completions endpoint.
//! OpenAI, OpenRouter and Ollama (`/v1`) differ only in base URL,
//! authentication and caching behaviour, captured by [`BackendProfile`].

use std::time::Duration;

use async_trait::async_trait;
use chatbot_core::{
    error::{ChatError, Result},
    message::{CompletionResponse, Message},
    provider::{CacheSettings, GenerationOptions, LlmBackend},
    tool::ToolSchema,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::convert;
use crate::wire::{ErrorResponse, ModelList, Request};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const OLLAMA_DEFAULT_HOST: &str = "http://localhost:11434";

const OPENAI_MODELS: &[&str] = &[
    "gpt-4o",
    "gpt-4o-mini",
    "gpt-4.1",
    "gpt-4.1-mini",
    "gpt-4.1-nano",
    "gpt-4-turbo",
    "gpt-3.5-turbo",
];

const OPENROUTER_MODELS: &[&str] = &[
    "openai/gpt-4o",
    "openai/gpt-4o-mini",
    "openai/gpt-4.1-mini",
    "anthropic/claude-3-sonnet",
    "anthropic/claude-3-haiku",
    "meta-llama/llama-3-70b-instruct",
    "google/gemini-pro",
];

/// Which service a backend talks to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    OpenAi,
    OpenRouter,
    Ollama,
}

impl BackendKind {
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::OpenRouter => "OpenRouter",
            Self::Ollama => "Ollama",
        }
    }
}

impl std::str::FromStr for BackendKind {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "openrouter" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(ChatError::Config(format!(
                "unknown provider '{other}' (expected openai, openrouter or ollama)"
            ))),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Endpoint and behaviour of one backend
#[derive(Clone, Debug)]
pub struct BackendProfile {
    pub kind: BackendKind,
    pub base_url: String,
    pub api_key: Option<String>,
    pub known_models: Vec<String>,
    pub cache: CacheSettings,
    pub timeout: Duration,
}

impl BackendProfile {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::OpenAi,
            base_url: OPENAI_BASE_URL.into(),
            api_key: Some(api_key.into()),
            known_models: OPENAI_MODELS.iter().map(|m| (*m).to_string()).collect(),
            // OpenAI caches long prefixes automatically
            cache: CacheSettings {
                supports_caching: true,
                requires_manual_breakpoints: false,
                ..CacheSettings::default()
            },
            timeout: Duration::from_secs(120),
        }
    }

    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self {
            kind: BackendKind::OpenRouter,
            base_url: OPENROUTER_BASE_URL.into(),
            api_key: Some(api_key.into()),
            known_models: OPENROUTER_MODELS.iter().map(|m| (*m).to_string()).collect(),
            cache: CacheSettings {
                supports_caching: true,
                requires_manual_breakpoints: true,
                ..CacheSettings::default()
            },
            timeout: Duration::from_secs(120),
        }
    }

    pub fn ollama(host: impl AsRef<str>) -> Self {
        Self {
            kind: BackendKind::Ollama,
            base_url: format!("{}/v1", host.as_ref().trim_end_matches('/')),
            api_key: None,
            known_models: Vec::new(),
            cache: CacheSettings {
                enabled: false,
                ..CacheSettings::default()
            },
            timeout: Duration::from_secs(300),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Apply the configured caching preferences; a profile that has
    /// caching switched off keeps it off
    #[must_use]
    pub const fn with_caching(mut self, enabled: bool, cache_system_messages: bool) -> Self {
        self.cache.enabled = self.cache.enabled && enabled;
        self.cache.cache_system_messages = cache_system_messages;
        self
    }
}

/// Chat Completions backend
pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    profile: BackendProfile,
    model: String,
}

impl OpenAiCompatBackend {
    pub fn new(profile: BackendProfile, model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(profile.timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            profile,
            model: model.into(),
        })
    }

    pub const fn profile(&self) -> &BackendProfile {
        &self.profile
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.profile.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.profile.api_key.as_deref() {
            Some(key) if !key.is_empty() => request.bearer_auth(key),
            _ => request,
        }
    }

    /// Map a non-success HTTP status to an error
    fn status_error(status: StatusCode, body: &str) -> ChatError {
        let detail = serde_json::from_str::<ErrorResponse>(body)
            .map_or_else(|_| body.trim().to_string(), |e| e.error.message);
        let message = format!("HTTP {}: {detail}", status.as_u16());

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatError::Auth(message),
            StatusCode::TOO_MANY_REQUESTS => ChatError::RateLimited(message),
            _ => ChatError::BackendUnavailable(message),
        }
    }

    async fn fetch_models(&self) -> Result<Vec<String>> {
        let response = self
            .authorize(self.client.get(self.endpoint("models")))
            .send()
            .await
            .map_err(|e| ChatError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::BackendUnavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(Self::status_error(status, &body));
        }

        let list: ModelList = serde_json::from_str(&body)
            .map_err(|e| ChatError::BackendProtocol(format!("invalid model list: {e}")))?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl LlmBackend for OpenAiCompatBackend {
    fn provider_name(&self) -> &str {
        self.profile.kind.display_name()
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn cache_settings(&self) -> CacheSettings {
        self.profile.cache
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        match self.fetch_models().await {
            Ok(models) => Ok(models),
            Err(e) if !self.profile.known_models.is_empty() => {
                tracing::warn!(provider = %self.profile.kind, "Model listing failed, using known models: {}", e);
                Ok(self.profile.known_models.clone())
            }
            Err(e) => Err(e),
        }
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: &[ToolSchema],
        options: &GenerationOptions,
    ) -> Result<CompletionResponse> {
        let annotated = self.profile.cache.annotate(messages);
        let request = Request {
            model: &self.model,
            messages: convert::to_wire_messages(&annotated),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            tools: convert::to_wire_tools(tools),
        };

        tracing::debug!(
            provider = %self.profile.kind,
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Sending completion request"
        );

        let response = self
            .authorize(self.client.post(self.endpoint("chat/completions")))
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::BackendUnavailable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChatError::BackendUnavailable(e.to_string()))?;

        if !status.is_success() {
            let err = Self::status_error(status, &body);
            tracing::warn!(provider = %self.profile.kind, "Completion request failed: {}", err);
            return Err(err);
        }

        convert::parse_response_body(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatbot_core::message::{Role, TokenUsage};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-test",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    fn backend(server: &MockServer, profile: BackendProfile) -> OpenAiCompatBackend {
        let profile = profile.with_base_url(format!("{}/v1", server.uri()));
        OpenAiCompatBackend::new(profile, "gpt-4o-mini").unwrap()
    }

    #[tokio::test]
    async fn test_text_completion() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(serde_json::json!({
                "model": "gpt-4o-mini",
                "max_tokens": 2024
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("Hello!")))
            .mount(&server)
            .await;

        let llm = backend(&server, BackendProfile::openai("test-key"));
        let response = llm
            .complete(&[Message::user("Hi")], &[], &GenerationOptions::default())
            .await
            .unwrap();

        assert_eq!(response.content.as_deref(), Some("Hello!"));
        assert!(!response.has_tool_calls());
        assert_eq!(
            response.usage,
            Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 5
            })
        );
    }

    #[tokio::test]
    async fn test_tools_sent_as_functions() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(body_partial_json(serde_json::json!({
                "tools": [{"type": "function", "function": {"name": "search"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let llm = backend(&server, BackendProfile::openai("k"));
        let tools = vec![ToolSchema {
            name: "search".into(),
            description: "Search things".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }];
        llm.complete(&[Message::user("find")], &tools, &GenerationOptions::default())
            .await
            .unwrap();
    }

    async fn failing_completion(code: u16) -> ChatError {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(code).set_body_json(serde_json::json!({
                "error": {"message": "nope"}
            })))
            .mount(&server)
            .await;

        let llm = backend(&server, BackendProfile::openai("k"));
        llm.complete(&[Message::user("x")], &[], &GenerationOptions::default())
            .await
            .unwrap_err()
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let err = failing_completion(401).await;
        assert!(matches!(err, ChatError::Auth(_)));
        assert!(err.to_string().contains("nope"));

        assert!(matches!(failing_completion(403).await, ChatError::Auth(_)));
        assert!(matches!(failing_completion(429).await, ChatError::RateLimited(_)));

        let err = failing_completion(503).await;
        assert!(matches!(err, ChatError::BackendUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        let profile = BackendProfile::ollama("http://127.0.0.1:9");
        let llm = OpenAiCompatBackend::new(profile, "llama3").unwrap();
        let err = llm
            .complete(&[Message::user("x")], &[], &GenerationOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::BackendUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_openrouter_marks_system_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "messages": [{
                    "role": "system",
                    "content": [{"type": "text", "cache_control": {"type": "ephemeral"}}]
                }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(text_body("cached")))
            .expect(1)
            .mount(&server)
            .await;

        let llm = backend(&server, BackendProfile::openrouter("k"));
        let messages = [Message::system("Be brief."), Message::user("hi")];
        let response = llm
            .complete(&messages, &[], &GenerationOptions::default())
            .await
            .unwrap();
        assert_eq!(response.content.as_deref(), Some("cached"));
        // caller's transcript untouched
        assert!(messages[0].cache_control.is_none());
        assert_eq!(messages[0].role, Role::System);
    }

    #[tokio::test]
    async fn test_list_models_falls_back_to_known() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let llm = backend(&server, BackendProfile::openai("k"));
        let models = llm.list_models().await.unwrap();
        assert!(models.contains(&"gpt-4o-mini".to_string()));
    }

    #[tokio::test]
    async fn test_ollama_lists_served_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [{"id": "llama3.1:8b"}, {"id": "qwen2.5:7b"}]
            })))
            .mount(&server)
            .await;

        let llm = OpenAiCompatBackend::new(BackendProfile::ollama(server.uri()), "llama3.1:8b")
            .unwrap();
        assert_eq!(llm.provider_name(), "Ollama");
        assert_eq!(llm.list_models().await.unwrap(), vec!["llama3.1:8b", "qwen2.5:7b"]);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("OpenRouter".parse::<BackendKind>().unwrap(), BackendKind::OpenRouter);
        assert!("bedrock".parse::<BackendKind>().is_err());
    }
}
