//! The node plugin contract
//!
//! A node declares its pads through `resolve_pads`, a pure function of its
//! current property values and the constraints visible from connected
//! peers, and processes items in one long-lived `run` task.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraint::Constraints;
use crate::error::Result;
use crate::io::NodeIo;
use crate::pad::{PadSpec, PadState};

/// Library metadata shown by editors
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMetadata {
    pub primary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl NodeMetadata {
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            ..Self::default()
        }
    }

    pub fn secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteLevel {
    Info,
    Warning,
    Error,
}

/// Advisory diagnostic shown next to a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub level: NoteLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pad: Option<String>,
}

impl Note {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NoteLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NoteLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoteLevel::Error, message)
    }

    fn new(level: NoteLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            pad: None,
        }
    }

    pub fn on_pad(mut self, pad: impl Into<String>) -> Self {
        self.pad = Some(pad.into());
        self
    }
}

/// Lifecycle of a node.
///
/// `Unresolved` and `Resolved` describe the structural graph; `Running`
/// and `Stopped` describe a node task inside a running graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Unresolved,
    Resolved,
    Running,
    Stopped,
}

/// What a peer across a connection looks like from one pad
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerView {
    pub connected: bool,
    /// Declared constraints of the connected peer(s); `None` when unconnected
    pub constraints: Constraints,
}

/// Read-only view of a node's current pads and their peers
pub struct NodeView<'a> {
    node_id: &'a str,
    pads: &'a [PadState],
    peers: HashMap<String, PeerView>,
}

impl<'a> NodeView<'a> {
    pub fn new(node_id: &'a str, pads: &'a [PadState], peers: HashMap<String, PeerView>) -> Self {
        Self {
            node_id,
            pads,
            peers,
        }
    }

    pub fn node_id(&self) -> &str {
        self.node_id
    }

    /// Pads as of the previous resolution, empty for new nodes
    pub fn pads(&self) -> &[PadState] {
        self.pads
    }

    pub fn pad(&self, id: &str) -> Option<&PadState> {
        self.pads.iter().find(|p| p.id == id)
    }

    /// Current value of a property pad
    pub fn property(&self, id: &str) -> Option<&Value> {
        self.pad(id).and_then(|p| p.value.as_ref()).filter(|v| !v.is_null())
    }

    /// Current value of a property pad, deserialized
    pub fn property_as<T: DeserializeOwned>(&self, id: &str) -> Option<T> {
        self.property(id)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.peers.get(id).map(|p| p.connected).unwrap_or(false)
    }

    /// Declared constraints seen across the connection(s) of pad `id`
    pub fn peer_constraints(&self, id: &str) -> Constraints {
        self.peers.get(id).and_then(|p| p.constraints.clone())
    }
}

/// A processing node
///
/// Implementations must keep all structural state in their pads: the same
/// instance is shared between graph revisions and may be resolved many
/// times.
#[async_trait]
pub trait Node: Send + Sync {
    fn metadata(&self) -> NodeMetadata;

    fn description(&self) -> String {
        String::new()
    }

    /// Compute the full pad list for the current properties and peers.
    ///
    /// Must be idempotent: the same view always yields the same list.
    fn resolve_pads(&self, view: &NodeView<'_>) -> Result<Vec<PadSpec>>;

    /// Process items until cancelled or the inputs end.
    ///
    /// Every consumed item's context must be completed exactly once.
    async fn run(&self, io: NodeIo) -> Result<()>;

    fn notes(&self, _view: &NodeView<'_>) -> Vec<Note> {
        Vec::new()
    }
}
