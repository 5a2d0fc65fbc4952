//! Graph-health reporting
//!
//! The host has no UI, so runtime events and load-time notes go to the log.

use padflow_engine::events::EventError;
use padflow_engine::{EventSink, GraphEvent, GraphNote, NoteLevel};

/// Writes every runtime event to the log
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        match &event {
            GraphEvent::NodeStarted { node_id, .. } => log::debug!("Node '{}' started", node_id),
            GraphEvent::NodeStopped { node_id, .. } => log::debug!("Node '{}' stopped", node_id),
            GraphEvent::NodeFailed { node_id, error, .. } => {
                log::error!("Node '{}' failed: {}", node_id, error)
            }
            GraphEvent::ItemDropped { source, sink, reason } => {
                log::warn!("Dropped item {} -> {}: {}", source, sink, reason)
            }
            GraphEvent::GraphStopped { run_id } => log::info!("Graph run {} stopped", run_id),
        }
        Ok(())
    }
}

/// Log the advisory notes of a freshly loaded graph
pub fn log_notes(notes: &[GraphNote]) {
    for GraphNote { node_id, note } in notes {
        let target = match &note.pad {
            Some(pad) => format!("{}.{}", node_id, pad),
            None => node_id.clone(),
        };
        match note.level {
            NoteLevel::Info => log::info!("{}: {}", target, note.message),
            NoteLevel::Warning => log::warn!("{}: {}", target, note.message),
            NoteLevel::Error => log::error!("{}: {}", target, note.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_every_event_is_accepted() {
        let sink = LogEventSink;
        assert_ok!(sink.send(GraphEvent::NodeFailed {
            run_id: "r".to_string(),
            node_id: "n".to_string(),
            error: "boom".to_string(),
        }));
        assert_ok!(sink.send(GraphEvent::GraphStopped {
            run_id: "r".to_string()
        }));
    }
}
