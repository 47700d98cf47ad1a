//! Tool System
//!
//! Tools live in independent provider processes. Each provider lists its
//! tools once at bootstrap; the [`ToolRegistry`] flattens every listing into
//! one namespace and routes invocations back to the owning provider.

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{ChatError, Result};

/// JSON object passed as tool arguments
pub type ToolArguments = serde_json::Map<String, serde_json::Value>;

/// A capability exposed by a tool provider
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Tool identifier
    pub name: String,

    /// Human-readable description (shown to the model)
    #[serde(default)]
    pub description: String,

    /// JSON Schema of the argument object
    #[serde(rename = "inputSchema", alias = "parameters", default = "empty_object_schema")]
    pub parameter_schema: serde_json::Value,
}

fn empty_object_schema() -> serde_json::Value {
    serde_json::json!({"type": "object", "properties": {}})
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameter_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameter_schema,
        }
    }
}

/// Tool definition in the shape used for LLM function calling
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&ToolDescriptor> for ToolSchema {
    fn from(descriptor: &ToolDescriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            description: descriptor.description.clone(),
            parameters: descriptor.parameter_schema.clone(),
        }
    }
}

/// A connected tool provider
///
/// Implementations must serialize concurrent calls on their transport.
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Provider name from configuration
    fn id(&self) -> &str;

    /// List the tools this provider exposes
    async fn list_tools(&self) -> Result<Vec<ToolDescriptor>>;

    /// Invoke a tool and return its result payload as text
    async fn call_tool(&self, name: &str, arguments: ToolArguments) -> Result<String>;
}

/// A tool name that was registered by more than one provider
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Collision {
    pub tool: String,
    /// Provider whose registration was overwritten
    pub shadowed: String,
    /// Provider that now owns the name
    pub winner: String,
}

struct Route {
    provider: Arc<dyn ToolProvider>,
    descriptor: ToolDescriptor,
}

/// Flat tool namespace across all connected providers
///
/// Built once during bootstrap, read-only afterwards. When two providers
/// expose the same tool name the later registration wins; every such
/// collision is logged and kept in [`collisions`](Self::collisions).
#[derive(Default)]
pub struct ToolRegistry {
    routes: IndexMap<String, Route>,
    collisions: Vec<Collision>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider's tool listing
    ///
    /// Returns the number of tools added or overwritten.
    pub fn register(
        &mut self,
        provider: Arc<dyn ToolProvider>,
        tools: Vec<ToolDescriptor>,
    ) -> usize {
        let count = tools.len();

        for descriptor in tools {
            let name = descriptor.name.clone();
            let route = Route {
                provider: Arc::clone(&provider),
                descriptor,
            };

            if let Some(previous) = self.routes.insert(name.clone(), route) {
                let collision = Collision {
                    tool: name,
                    shadowed: previous.provider.id().to_string(),
                    winner: provider.id().to_string(),
                };
                tracing::warn!(
                    tool = %collision.tool,
                    shadowed = %collision.shadowed,
                    winner = %collision.winner,
                    "Tool name collision, later provider wins"
                );
                self.collisions.push(collision);
            }
        }

        tracing::debug!(provider = %provider.id(), tools = count, "Registered provider tools");
        count
    }

    /// List a provider's tools and register them
    pub async fn register_provider(&mut self, provider: Arc<dyn ToolProvider>) -> Result<usize> {
        let tools = provider.list_tools().await?;
        Ok(self.register(provider, tools))
    }

    /// Schemas for every registered tool, in registration order
    pub fn describe_all(&self) -> Vec<ToolSchema> {
        self.routes
            .values()
            .map(|route| ToolSchema::from(&route.descriptor))
            .collect()
    }

    /// Route an invocation to the owning provider
    pub async fn invoke(&self, name: &str, arguments: ToolArguments) -> Result<String> {
        let route = self
            .routes
            .get(name)
            .ok_or_else(|| ChatError::UnknownTool(name.to_string()))?;

        tracing::debug!(tool = %name, provider = %route.provider.id(), "Invoking tool");

        route
            .provider
            .call_tool(name, arguments)
            .await
            .map_err(|e| {
                if e.is_tool_level() {
                    e
                } else {
                    ChatError::tool_invocation(name, e.to_string())
                }
            })
    }

    /// Descriptor of a registered tool
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.routes.get(name).map(|route| &route.descriptor)
    }

    /// Provider that owns a tool name
    pub fn provider_of(&self, name: &str) -> Option<&str> {
        self.routes.get(name).map(|route| route.provider.id())
    }

    /// Get tool names
    pub fn names(&self) -> Vec<&str> {
        self.routes.keys().map(String::as_str).collect()
    }

    /// Collisions recorded during registration
    pub fn collisions(&self) -> &[Collision] {
        &self.collisions
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("collisions", &self.collisions.len())
            .finish()
    }
}
