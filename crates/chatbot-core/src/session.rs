//! Session Management
//!
//! One [`ChatSession`] per driver connection. Sessions own their
//! conversation state and share the orchestrator (backend, tool registry).

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::event::{EventSender, EventStream, event_channel};
use crate::format::preview;
use crate::message::{Message, Role};
use crate::orchestrator::{Orchestrator, QueryOutcome};
use crate::state::ConversationState;

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A live conversation bound to a shared orchestrator
pub struct ChatSession {
    id: SessionId,
    orchestrator: Arc<Orchestrator>,
    state: ConversationState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ChatSession {
    /// Create a new session
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let now = Utc::now();
        let state = orchestrator.new_conversation();
        Self {
            id: SessionId::new(),
            orchestrator,
            state,
            created_at: now,
            updated_at: now,
        }
    }

    /// Answer a query, reporting progress through `events`
    pub async fn submit_query(&mut self, query: &str, events: &EventSender) -> Result<QueryOutcome> {
        self.touch();
        tracing::debug!(session = %self.id, turn = self.state.turn_number(), "Submitting query");
        self.orchestrator.run(&mut self.state, query, events).await
    }

    /// Answer a query and observe it as a stream of events.
    ///
    /// The stream ends when the returned future completes or is dropped.
    pub fn submit(
        &mut self,
        query: impl Into<String>,
    ) -> (impl Future<Output = Result<QueryOutcome>> + Send + '_, EventStream) {
        let (tx, stream) = event_channel();
        let query = query.into();
        let fut = async move {
            let result = self.submit_query(&query, &tx).await;
            drop(tx);
            result
        };
        (fut, stream)
    }

    /// Forget the conversation and zero the token counters
    pub fn clear_session(&mut self) {
        self.state.clear();
        self.touch();
        tracing::info!(session = %self.id, "Session cleared");
    }

    pub const fn id(&self) -> &SessionId {
        &self.id
    }

    pub const fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn history(&self) -> &[Message] {
        self.state.history()
    }

    pub fn turn_number(&self) -> usize {
        self.state.turn_number()
    }

    /// Title derived from the first user message
    pub fn title(&self) -> String {
        self.state
            .history()
            .iter()
            .find(|m| m.role == Role::User)
            .map_or_else(
                || {
                    let short: String = self.id.as_str().chars().take(8).collect();
                    format!("Session {short}")
                },
                |m| preview(m.text(), 50),
            )
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
