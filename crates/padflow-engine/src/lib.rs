//! Padflow engine - typed-pad dataflow graphs
//!
//! Nodes expose typed pads. Connecting two pads narrows both to the
//! intersection of their type constraints, and nodes re-declare their pads
//! whenever properties or peers change. The crate covers:
//!
//! - Constraint algebra and pad resolution to a fixpoint
//! - Atomic edits with compressed undo/redo history
//! - Subgraphs exposing inner pads through proxies
//! - Request contexts that track completion across forks
//! - A supervised async runtime and a transport-backed data plane
//!
//! # Architecture
//!
//! A [`Graph`] owns the structural state and validates every edit. Starting
//! it flattens subgraphs and spawns one task per node; items flow over
//! bounded queues between [`SourcePad`]s and [`SinkPad`]s.
//!
//! # Example
//!
//! ```ignore
//! use padflow_engine::{EngineConfig, Graph, GraphEdit, NodeLibrary};
//! use std::sync::Arc;
//!
//! let mut graph = Graph::new(Arc::new(NodeLibrary::with_builtins()), EngineConfig::default());
//! graph.apply_edit(GraphEdit::insert("count", "IntegerProperty"))?;
//! graph.apply_edit(GraphEdit::insert("show", "Display"))?;
//! graph.apply_edit(GraphEdit::connect("count", "value", "show", "value"))?;
//! ```

pub mod builder;
pub mod config;
pub mod constraint;
pub mod context;
pub mod dataplane;
pub mod edit;
pub mod error;
pub mod events;
pub mod extensions;
pub mod graph;
pub mod history;
pub mod io;
pub mod node;
pub mod pad;
pub mod registry;
pub mod runtime;
pub mod services;
pub mod session;
pub mod snapshot;
pub mod subgraph;

#[cfg(test)]
mod testing;

// Re-export key types
pub use builder::SnapshotBuilder;
pub use config::{EngineConfig, RuntimeErrorPolicy};
pub use constraint::{Constraints, TypeConstraint};
pub use context::{Completion, RequestContext};
pub use dataplane::{DataPlaneRequest, DataPlaneResponse, DataPlaneServer};
pub use edit::{GraphEdit, PadConnection};
pub use error::{PadflowError, Result};
pub use events::{ChannelEventSink, EventSink, GraphEvent, NullEventSink, VecEventSink};
pub use extensions::{service_keys, ServiceExtensions};
pub use graph::{Graph, GraphNote};
pub use history::EditHistory;
pub use io::{NodeIo, PadItem, SinkPad, SourcePad};
pub use node::{Node, NodeMetadata, NodeState, NodeView, Note, NoteLevel, PeerView};
pub use pad::{PadDirection, PadKind, PadRef, PadSpec, PadState, PadType};
pub use registry::{LibraryEntry, NodeFactory, NodeLibrary};
pub use runtime::{GraphRuntime, RuntimeHandle};
pub use services::{LocalTransport, MediaTransport, SecretProvider, StaticSecretProvider, TransportMessage};
pub use session::{EditorRequest, EditorResponse, EditorSession};
pub use snapshot::GraphSnapshot;
pub use subgraph::{InMemorySubgraphRepository, SubgraphRepository};

// Plugins register with `inventory::submit!`
pub use inventory;
