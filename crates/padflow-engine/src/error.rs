//! Error types for the padflow engine

use thiserror::Error;

use crate::pad::PadRef;

/// Result type alias using PadflowError
pub type Result<T> = std::result::Result<T, PadflowError>;

/// Errors that can occur in the padflow engine
#[derive(Debug, Error)]
pub enum PadflowError {
    /// Two connected pads have no type in common
    #[error("Type constraint violation between {source_pad} and {sink_pad}: {detail}")]
    TypeConstraintViolation {
        source_pad: PadRef,
        sink_pad: PadRef,
        detail: String,
    },

    /// A node failed to reconcile its pad set
    #[error("Failed to resolve pads of node '{node_id}': {message}")]
    NodeResolution { node_id: String, message: String },

    /// No factory is registered for the node type
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// Node is not part of the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Pad is not part of the node
    #[error("Pad not found: {0}")]
    PadNotFound(PadRef),

    /// Node ids may not contain the separators used for proxies and flattening
    #[error("Invalid node id '{0}': ids must be non-empty and may not contain ':' or '/'")]
    InvalidNodeId(String),

    /// A node with this id already exists
    #[error("Duplicate node id: {0}")]
    DuplicateNodeId(String),

    /// Connection request does not describe a source/sink pair
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    /// Value is not accepted by the pad's constraints
    #[error("Invalid value for {pad}: {message}")]
    InvalidPadValue { pad: PadRef, message: String },

    /// Operation requires a property pad
    #[error("Pad {0} is not a property pad")]
    NotAPropertyPad(PadRef),

    /// Subgraph is not known to the repository or the node is not a subgraph
    #[error("Subgraph not found: {0}")]
    SubgraphNotFound(String),

    /// Error raised inside a node's run task
    #[error("Node '{node_id}' failed: {message}")]
    Runtime { node_id: String, message: String },

    /// Secret could not be resolved
    #[error("Secret error: {0}")]
    Secret(String),

    /// Media transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Work was cancelled
    #[error("Cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Compression error
    #[error("Compression error: {0}")]
    Compression(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PadflowError {
    /// Create a runtime error for a node
    pub fn runtime(node_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Runtime {
            node_id: node_id.into(),
            message: msg.into(),
        }
    }

    /// Create a resolution error for a node
    pub fn resolution(node_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NodeResolution {
            node_id: node_id.into(),
            message: msg.into(),
        }
    }

    /// Whether this error is a structural/type rejection (as opposed to I/O or runtime)
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::TypeConstraintViolation { .. }
                | Self::NodeResolution { .. }
                | Self::InvalidConnection(_)
                | Self::InvalidPadValue { .. }
        )
    }
}
