//! Structural edit protocol
//!
//! Edits are JSON objects discriminated by `type`. Each one is applied
//! atomically by [`Graph::apply_edit`](crate::graph::Graph::apply_edit).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pad::PadRef;
use crate::snapshot::GraphSnapshot;

/// Two pads named by node and pad id; order does not imply direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PadConnection {
    pub node: String,
    pub pad: String,
    pub connected_node: String,
    pub connected_pad: String,
}

impl PadConnection {
    pub fn new(
        node: impl Into<String>,
        pad: impl Into<String>,
        connected_node: impl Into<String>,
        connected_pad: impl Into<String>,
    ) -> Self {
        Self {
            node: node.into(),
            pad: pad.into(),
            connected_node: connected_node.into(),
            connected_pad: connected_pad.into(),
        }
    }

    pub fn first(&self) -> PadRef {
        PadRef::new(&self.node, &self.pad)
    }

    pub fn second(&self) -> PadRef {
        PadRef::new(&self.connected_node, &self.connected_pad)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEdit {
    InsertNode {
        #[serde(default)]
        id: Option<String>,
        node_type: String,
        #[serde(default)]
        editor_position: Option<[f64; 2]>,
        #[serde(default)]
        editor_name: Option<String>,
    },

    /// Instantiate a stored subgraph from the library's repository
    InsertSubgraph {
        #[serde(default)]
        id: Option<String>,
        subgraph_id: String,
        #[serde(default)]
        editor_position: Option<[f64; 2]>,
        #[serde(default)]
        editor_name: Option<String>,
    },

    /// Collapse part of the graph into a new subgraph node.
    ///
    /// `inbound_connections` link an outer source (`node`, `pad`) to an
    /// inner sink (`connected_node`, `connected_pad`); outbound ones link an
    /// inner source to an outer sink.
    InsertInlineSubgraph {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        subgraph_id: Option<String>,
        graph: GraphSnapshot,
        #[serde(default)]
        inbound_connections: Vec<PadConnection>,
        #[serde(default)]
        outbound_connections: Vec<PadConnection>,
        #[serde(default)]
        remove_node_ids: Vec<String>,
        #[serde(default)]
        editor_position: Option<[f64; 2]>,
        #[serde(default)]
        editor_name: Option<String>,
    },

    UpdateNode {
        id: String,
        #[serde(default)]
        editor_position: Option<[f64; 2]>,
        #[serde(default)]
        editor_dimensions: Option<[f64; 2]>,
        #[serde(default)]
        editor_name: Option<String>,
        #[serde(default)]
        new_id: Option<String>,
    },

    RemoveNode {
        node_id: String,
    },

    ConnectPad(PadConnection),

    DisconnectPad(PadConnection),

    UpdatePad {
        node: String,
        pad: String,
        value: Value,
    },

    /// Dissolve a subgraph node back into its parent
    RemoveSubgraph {
        node_id: String,
    },
}

impl GraphEdit {
    pub fn connect(
        node: impl Into<String>,
        pad: impl Into<String>,
        connected_node: impl Into<String>,
        connected_pad: impl Into<String>,
    ) -> Self {
        Self::ConnectPad(PadConnection::new(node, pad, connected_node, connected_pad))
    }

    pub fn disconnect(
        node: impl Into<String>,
        pad: impl Into<String>,
        connected_node: impl Into<String>,
        connected_pad: impl Into<String>,
    ) -> Self {
        Self::DisconnectPad(PadConnection::new(node, pad, connected_node, connected_pad))
    }

    pub fn insert(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self::InsertNode {
            id: Some(id.into()),
            node_type: node_type.into(),
            editor_position: None,
            editor_name: None,
        }
    }

    pub fn update_pad(node: impl Into<String>, pad: impl Into<String>, value: Value) -> Self {
        Self::UpdatePad {
            node: node.into(),
            pad: pad.into(),
            value,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InsertNode { .. } => "insert_node",
            Self::InsertSubgraph { .. } => "insert_subgraph",
            Self::InsertInlineSubgraph { .. } => "insert_inline_subgraph",
            Self::UpdateNode { .. } => "update_node",
            Self::RemoveNode { .. } => "remove_node",
            Self::ConnectPad(_) => "connect_pad",
            Self::DisconnectPad(_) => "disconnect_pad",
            Self::UpdatePad { .. } => "update_pad",
            Self::RemoveSubgraph { .. } => "remove_subgraph",
        }
    }
}
