//! Application State

use std::sync::Arc;

use chatbot_core::Orchestrator;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Backend, tool registry and loop settings shared by every session
    pub orchestrator: Arc<Orchestrator>,

    /// Prompt caching active for the configured backend
    pub caching: bool,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        let caching = orchestrator.backend().cache_settings().wants_breakpoints();
        Self {
            orchestrator,
            caching,
        }
    }
}
