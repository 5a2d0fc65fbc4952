//! Graph - structural edits, snapshots and execution entry points
//!
//! Every mutation goes through [`Graph::apply_edit`] or
//! [`Graph::load_from_snapshot`]. Both work on a copy of the current state
//! and only swap it in once the copy has been fully reconciled, so a
//! rejected edit leaves nothing behind.
//!
//! # Example
//!
//! ```ignore
//! let mut graph = Graph::new(Arc::new(NodeLibrary::with_builtins()), EngineConfig::default());
//! graph.apply_edit(GraphEdit::insert("name", "StringProperty"))?;
//! graph.apply_edit(GraphEdit::insert("show", "Display"))?;
//! graph.apply_edit(GraphEdit::connect("name", "value", "show", "value"))?;
//!
//! let runtime = graph.start(ServiceExtensions::new(), Arc::new(NullEventSink))?;
//! ```

mod state;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use state::{EditorInfo, FlatGraph, FlatNode, GraphState, NodeBody, NodeEntry};

use crate::config::EngineConfig;
use crate::dataplane::DataPlaneServer;
use crate::edit::GraphEdit;
use crate::error::Result;
use crate::events::EventSink;
use crate::extensions::ServiceExtensions;
use crate::history::EditHistory;
use crate::node::Note;
use crate::pad::PadRef;
use crate::registry::NodeLibrary;
use crate::runtime::GraphRuntime;
use crate::services::MediaTransport;
use crate::snapshot::GraphSnapshot;
use crate::subgraph::{self, InlineSubgraph};

/// A node note tagged with the node it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNote {
    pub node_id: String,
    #[serde(flatten)]
    pub note: Note,
}

impl GraphNote {
    pub(crate) fn info(node_id: impl Into<String>, message: impl Into<String>, pad: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            note: Note::info(message).on_pad(pad),
        }
    }

    pub(crate) fn error(node_id: impl Into<String>, message: impl Into<String>, pad: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            note: Note::error(message).on_pad(pad),
        }
    }
}

/// The editable graph
pub struct Graph {
    library: Arc<NodeLibrary>,
    config: EngineConfig,
    state: GraphState,
    history: EditHistory,
}

impl Graph {
    /// Create an empty graph
    pub fn new(library: Arc<NodeLibrary>, config: EngineConfig) -> Self {
        let state = GraphState::new();
        let mut history = EditHistory::new(config.history_depth);
        if let Err(e) = history.push(&state.to_snapshot()) {
            log::warn!("Failed to record initial graph in history: {}", e);
        }
        Self {
            library,
            config,
            state,
            history,
        }
    }

    pub fn library(&self) -> &Arc<NodeLibrary> {
        &self.library
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    pub fn to_snapshot(&self) -> GraphSnapshot {
        self.state.to_snapshot()
    }

    /// Replace the whole graph with `snapshot`.
    ///
    /// Nodes are instantiated, links wired and every node resolved in
    /// dependency order. Any rejection leaves the current graph in place.
    pub fn load_from_snapshot(&mut self, snapshot: &GraphSnapshot) -> Result<GraphSnapshot> {
        let state = self.build(snapshot).inspect_err(|e| {
            log::info!("Rejected snapshot load: {}", e);
        })?;
        log::info!("Loaded graph with {} node(s)", state.nodes().len());
        self.commit(state)
    }

    /// Apply one structural edit atomically
    pub fn apply_edit(&mut self, edit: GraphEdit) -> Result<GraphSnapshot> {
        let kind = edit.kind();
        let mut state = self.state.clone();

        let result = self
            .edit_state(&mut state, edit)
            .and_then(|()| state.reconcile(&HashMap::new(), &self.config));

        match result {
            Ok(()) => {
                log::debug!("Applied {} edit", kind);
                self.commit(state)
            }
            Err(e) => {
                log::info!("Rejected {} edit: {}", kind, e);
                Err(e)
            }
        }
    }

    /// Restore the previous graph; `None` when there is nothing to undo
    pub fn undo(&mut self) -> Result<Option<GraphSnapshot>> {
        let Some(snapshot) = self.history.undo() else {
            return Ok(None);
        };
        match snapshot.and_then(|s| self.restore(&s)) {
            Ok(restored) => Ok(Some(restored)),
            Err(e) => {
                let _ = self.history.redo();
                Err(e)
            }
        }
    }

    /// Re-apply an undone graph; `None` when there is nothing to redo
    pub fn redo(&mut self) -> Result<Option<GraphSnapshot>> {
        let Some(snapshot) = self.history.redo() else {
            return Ok(None);
        };
        match snapshot.and_then(|s| self.restore(&s)) {
            Ok(restored) => Ok(Some(restored)),
            Err(e) => {
                let _ = self.history.undo();
                Err(e)
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Node notes plus structural diagnostics
    pub fn notes(&self) -> Vec<GraphNote> {
        self.state.notes()
    }

    /// Spawn every node of a frozen copy of the graph.
    ///
    /// Must be called from within a Tokio runtime. Later edits do not
    /// affect the returned runtime.
    pub fn start(&self, services: ServiceExtensions, events: Arc<dyn EventSink>) -> Result<GraphRuntime> {
        GraphRuntime::start(self.state.flatten(), &self.config, Arc::new(services), events)
    }

    /// Start the graph and serve the runtime data plane over `transport`
    pub fn run(
        &self,
        transport: Arc<dyn MediaTransport>,
        services: ServiceExtensions,
        events: Arc<dyn EventSink>,
    ) -> Result<GraphRuntime> {
        let mut runtime = self.start(services.with_transport(transport.clone()), events)?;
        let server = DataPlaneServer::new(runtime.handle(), transport, &self.config);
        runtime.attach_task(server.spawn());
        Ok(runtime)
    }

    fn build(&self, snapshot: &GraphSnapshot) -> Result<GraphState> {
        let mut state = GraphState::from_snapshot(snapshot, &self.library, &self.config)?;
        state.reconcile(&HashMap::new(), &self.config)?;
        Ok(state)
    }

    fn restore(&mut self, snapshot: &GraphSnapshot) -> Result<GraphSnapshot> {
        let state = self.build(snapshot)?;
        let restored = state.to_snapshot();
        self.state = state;
        Ok(restored)
    }

    fn commit(&mut self, state: GraphState) -> Result<GraphSnapshot> {
        let snapshot = state.to_snapshot();
        self.history.push(&snapshot)?;
        self.state = state;
        Ok(snapshot)
    }

    fn edit_state(&self, state: &mut GraphState, edit: GraphEdit) -> Result<()> {
        match edit {
            GraphEdit::InsertNode {
                id,
                node_type,
                editor_position,
                editor_name,
            } => {
                let node = self.library.create(&node_type)?;
                let id = id.unwrap_or_else(|| state.unique_id(&node_type.to_lowercase()));
                let editor = EditorInfo {
                    name: editor_name,
                    position: editor_position,
                    dimensions: None,
                };
                state.add_node(NodeEntry::plugin(id, node_type, node).with_editor(editor))
            }

            GraphEdit::InsertSubgraph {
                id,
                subgraph_id,
                editor_position,
                editor_name,
            } => {
                let editor = EditorInfo {
                    name: editor_name,
                    position: editor_position,
                    dimensions: None,
                };
                subgraph::insert_subgraph(state, &self.library, &self.config, id, &subgraph_id, editor)
                    .map(|_| ())
            }

            GraphEdit::InsertInlineSubgraph {
                id,
                subgraph_id,
                graph,
                inbound_connections,
                outbound_connections,
                remove_node_ids,
                editor_position,
                editor_name,
            } => {
                let request = InlineSubgraph {
                    id,
                    subgraph_id,
                    graph: &graph,
                    inbound: &inbound_connections,
                    outbound: &outbound_connections,
                    remove_node_ids: &remove_node_ids,
                    editor: EditorInfo {
                        name: editor_name,
                        position: editor_position,
                        dimensions: None,
                    },
                };
                subgraph::insert_inline_subgraph(state, &self.library, &self.config, request).map(|_| ())
            }

            GraphEdit::UpdateNode {
                id,
                editor_position,
                editor_dimensions,
                editor_name,
                new_id,
            } => {
                state.update_editor(&id, |editor| {
                    if editor_position.is_some() {
                        editor.position = editor_position;
                    }
                    if editor_dimensions.is_some() {
                        editor.dimensions = editor_dimensions;
                    }
                    if editor_name.is_some() {
                        editor.name = editor_name;
                    }
                })?;
                match new_id {
                    Some(new_id) => state.rename_node(&id, &new_id),
                    None => Ok(()),
                }
            }

            GraphEdit::RemoveNode { node_id } => state.remove_node(&node_id).map(|_| ()),

            GraphEdit::ConnectPad(connection) => state
                .connect(&connection.first(), &connection.second())
                .map(|_| ()),

            GraphEdit::DisconnectPad(connection) => {
                state.disconnect(&connection.first(), &connection.second())
            }

            GraphEdit::UpdatePad { node, pad, value } => state.set_value(&PadRef::new(node, pad), value),

            GraphEdit::RemoveSubgraph { node_id } => subgraph::dissolve_subgraph(state, &node_id),
        }
    }
}
