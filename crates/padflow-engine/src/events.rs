//! Graph-health events emitted while a graph runs
//!
//! Runtime failures never cross node boundaries; they are reported here
//! instead, alongside lifecycle changes and dropped items.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Trait for receiving runtime events
///
/// This abstracts over the transport mechanism (mpsc, log, editor socket)
/// so the runtime does not depend on any particular consumer.
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: GraphEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone)]
pub struct EventError {
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Event error: {}", self.message)
    }
}

impl std::error::Error for EventError {}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Events emitted by a running graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphEvent {
    /// A node's run task was spawned
    #[serde(rename_all = "camelCase")]
    NodeStarted { run_id: String, node_id: String },

    /// A node's run task returned normally or was cancelled
    #[serde(rename_all = "camelCase")]
    NodeStopped { run_id: String, node_id: String },

    /// A node's run task returned an error or panicked
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        run_id: String,
        node_id: String,
        error: String,
    },

    /// A sink queue was full and an item was discarded for that sink
    #[serde(rename_all = "camelCase")]
    ItemDropped {
        source: String,
        sink: String,
        reason: String,
    },

    /// Every node task has ended
    #[serde(rename_all = "camelCase")]
    GraphStopped { run_id: String },
}

/// A no-op event sink that discards all events
///
/// Useful for testing or when events aren't needed.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: GraphEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
pub struct VecEventSink {
    events: parking_lot::Mutex<Vec<GraphEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self {
            events: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().clone()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Default for VecEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events into an unbounded channel
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<GraphEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GraphEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::channel_closed())
    }
}
