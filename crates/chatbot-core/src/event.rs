//! Loop Events
//!
//! Observable progress of one query. A fresh channel is created per query;
//! the stream half ends once the query finishes and the sender is dropped.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Something the orchestration loop did
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// Progress notice (e.g. "requesting completion")
    Status { message: String },

    /// Text produced by the model in this round
    AssistantText { content: String },

    /// A tool is about to be invoked
    ToolCall {
        id: String,
        name: String,
        arguments: String,
    },

    /// A tool returned (or failed)
    ToolResult {
        id: String,
        name: String,
        content: String,
        is_error: bool,
    },

    /// Usage of one completion plus the running totals
    Usage {
        input_tokens: u64,
        output_tokens: u64,
        total_input: u64,
        total_output: u64,
    },
}

/// Stream of events for one query
pub type EventStream = UnboundedReceiverStream<LoopEvent>;

/// Sending half handed to the loop
#[derive(Clone, Debug, Default)]
pub struct EventSender {
    tx: Option<mpsc::UnboundedSender<LoopEvent>>,
}

impl EventSender {
    /// A sender that drops every event
    pub const fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit an event; a closed receiver is not an error
    pub fn emit(&self, event: LoopEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).is_err() {
                tracing::trace!("Event receiver dropped");
            }
        }
    }

    pub(crate) fn status(&self, message: impl Into<String>) {
        self.emit(LoopEvent::Status {
            message: message.into(),
        });
    }
}

/// Create a connected sender/stream pair
pub fn event_channel() -> (EventSender, EventStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx: Some(tx) }, UnboundedReceiverStream::new(rx))
}
