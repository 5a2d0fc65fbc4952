//! Subgraphs - graphs nested inside a single `SubGraph` node
//!
//! Every inner pad without an inner connection is exposed on the
//! `SubGraph` node as a proxy pad named `"{inner_node}:{inner_pad}"`.
//! Proxies copy the inner pad's direction, kind, group and effective
//! constraints, and mirror its value.
//!
//! # Example
//!
//! ```ignore
//! // Collapse `join` into a subgraph, keeping its upstream wired
//! graph.apply_edit(GraphEdit::InsertInlineSubgraph {
//!     id: Some("greeting".into()),
//!     subgraph_id: None,
//!     graph: inner_snapshot,
//!     inbound_connections: vec![PadConnection::new("name", "value", "join", "input_0")],
//!     outbound_connections: vec![],
//!     remove_node_ids: vec!["join".into()],
//!     editor_position: None,
//!     editor_name: None,
//! })?;
//! ```

use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::config::EngineConfig;
use crate::edit::PadConnection;
use crate::error::{PadflowError, Result};
use crate::graph::{EditorInfo, GraphState, NodeBody, NodeEntry};
use crate::node::{NodeMetadata, PeerView};
use crate::pad::{PadRef, PadSpec, PadState};
use crate::registry::NodeLibrary;
use crate::snapshot::GraphSnapshot;

/// Node type of subgraph instances
pub const SUBGRAPH_NODE_TYPE: &str = "SubGraph";

/// Id of the proxy pad exposing `node.pad`
pub fn proxy_pad_id(node: &str, pad: &str) -> String {
    format!("{}:{}", node, pad)
}

/// Inner pad addressed by a proxy pad id
pub fn parse_proxy_pad_id(id: &str) -> Option<PadRef> {
    id.split_once(':')
        .map(|(node, pad)| PadRef::new(node, pad))
}

/// Source of stored subgraph definitions
pub trait SubgraphRepository: Send + Sync {
    fn fetch(&self, subgraph_id: &str) -> Result<GraphSnapshot>;

    fn list(&self) -> Vec<String>;
}

/// Repository backed by a map, for hosts and tests
#[derive(Default)]
pub struct InMemorySubgraphRepository {
    graphs: RwLock<BTreeMap<String, GraphSnapshot>>,
}

impl InMemorySubgraphRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subgraph_id: impl Into<String>, graph: GraphSnapshot) {
        self.graphs.write().insert(subgraph_id.into(), graph);
    }
}

impl SubgraphRepository for InMemorySubgraphRepository {
    fn fetch(&self, subgraph_id: &str) -> Result<GraphSnapshot> {
        self.graphs
            .read()
            .get(subgraph_id)
            .cloned()
            .ok_or_else(|| PadflowError::SubgraphNotFound(subgraph_id.to_string()))
    }

    fn list(&self) -> Vec<String> {
        self.graphs.read().keys().cloned().collect()
    }
}

/// The inner graph owned by a `SubGraph` node
#[derive(Clone)]
pub struct SubgraphBody {
    pub subgraph_id: Option<String>,
    pub(crate) inner: GraphState,
}

impl SubgraphBody {
    pub(crate) fn from_snapshot(
        subgraph_id: Option<String>,
        graph: &GraphSnapshot,
        library: &NodeLibrary,
        config: &EngineConfig,
    ) -> Result<Self> {
        Ok(Self {
            subgraph_id,
            inner: GraphState::from_snapshot(graph, library, config)?,
        })
    }

    pub fn inner(&self) -> &GraphState {
        &self.inner
    }

    pub fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Subgraph")
            .secondary(self.subgraph_id.as_deref().unwrap_or("inline"))
            .tags(["subgraph"])
    }

    pub fn description(&self) -> String {
        format!("Contains {} node(s)", self.inner.nodes().len())
    }

    /// Re-resolve the inner graph as seen through the outer pads and
    /// return the proxy pads to expose
    pub(crate) fn resolve(
        &mut self,
        pads: &[PadState],
        peers: &HashMap<String, PeerView>,
        config: &EngineConfig,
    ) -> Result<Vec<PadSpec>> {
        let external: HashMap<PadRef, _> = pads
            .iter()
            .filter_map(|pad| {
                let target = pad.proxy.clone()?;
                let peer = peers.get(&pad.id).filter(|p| p.connected)?;
                Some((target, peer.constraints.clone()))
            })
            .collect();

        self.inner.reconcile(&external, config)?;
        Ok(self.exposed_pads())
    }

    /// One proxy spec per inner pad without an inner connection
    pub(crate) fn exposed_pads(&self) -> Vec<PadSpec> {
        let mut specs = Vec::new();
        for entry in self.inner.nodes() {
            for pad in &entry.pads {
                let target = PadRef::new(&entry.id, &pad.id);
                let linked = if pad.is_source() {
                    !self.inner.downstream(&target).is_empty()
                } else {
                    self.inner.upstream(&target).is_some()
                };
                if linked {
                    continue;
                }

                let mut spec = PadSpec::new(
                    proxy_pad_id(&entry.id, &pad.id),
                    pad.pad_type,
                    pad.effective.clone(),
                );
                spec.group = pad.group.clone();
                specs.push(spec.proxy_for(target, pad.value.clone()));
            }
        }
        specs
    }
}

/// Add a `SubGraph` node for a definition stored in the library's repository
pub(crate) fn insert_subgraph(
    state: &mut GraphState,
    library: &NodeLibrary,
    config: &EngineConfig,
    id: Option<String>,
    subgraph_id: &str,
    editor: EditorInfo,
) -> Result<String> {
    let repository = library.subgraph_repository().ok_or_else(|| {
        PadflowError::SubgraphNotFound(format!("{} (no subgraph repository configured)", subgraph_id))
    })?;
    let graph = repository.fetch(subgraph_id)?;
    let body = SubgraphBody::from_snapshot(Some(subgraph_id.to_string()), &graph, library, config)?;

    let node_id = id.unwrap_or_else(|| state.unique_id(subgraph_id));
    state.add_node(NodeEntry::subgraph(&node_id, body, config)?.with_editor(editor))?;
    Ok(node_id)
}

pub(crate) struct InlineSubgraph<'a> {
    pub id: Option<String>,
    pub subgraph_id: Option<String>,
    pub graph: &'a GraphSnapshot,
    pub inbound: &'a [PadConnection],
    pub outbound: &'a [PadConnection],
    pub remove_node_ids: &'a [String],
    pub editor: EditorInfo,
}

/// Replace `remove_node_ids` with a new `SubGraph` node and wire it up
pub(crate) fn insert_inline_subgraph(
    state: &mut GraphState,
    library: &NodeLibrary,
    config: &EngineConfig,
    request: InlineSubgraph<'_>,
) -> Result<String> {
    for id in request.remove_node_ids {
        state.remove_node(id)?;
    }

    let body = SubgraphBody::from_snapshot(request.subgraph_id.clone(), request.graph, library, config)?;
    let node_id = match request.id {
        Some(id) => id,
        None => state.unique_id(request.subgraph_id.as_deref().unwrap_or("subgraph")),
    };
    state.add_node(NodeEntry::subgraph(&node_id, body, config)?.with_editor(request.editor))?;

    for connection in request.inbound {
        let proxy = PadRef::new(
            &node_id,
            proxy_pad_id(&connection.connected_node, &connection.connected_pad),
        );
        state.connect(&connection.first(), &proxy)?;
    }
    for connection in request.outbound {
        let proxy = PadRef::new(&node_id, proxy_pad_id(&connection.node, &connection.pad));
        state.connect(&proxy, &connection.second())?;
    }

    log::debug!(
        "Collapsed {} node(s) into subgraph '{}'",
        request.remove_node_ids.len(),
        node_id
    );
    Ok(node_id)
}

/// Move a subgraph's inner nodes into `state`, re-wiring links through its proxies
pub(crate) fn dissolve_subgraph(state: &mut GraphState, node_id: &str) -> Result<()> {
    if !state.node(node_id).map(NodeEntry::is_subgraph).unwrap_or(false) {
        return match state.node(node_id) {
            Some(_) => Err(PadflowError::SubgraphNotFound(format!(
                "node '{}' is not a subgraph",
                node_id
            ))),
            None => Err(PadflowError::NodeNotFound(node_id.to_string())),
        };
    }

    let outer_links: Vec<(PadRef, PadRef)> = state
        .links()
        .filter(|(source, sink)| source.node == node_id || sink.node == node_id)
        .map(|(source, sink)| (source.clone(), sink.clone()))
        .collect();

    let removed = state.remove_node(node_id)?;
    let NodeBody::Subgraph(body) = removed.body else {
        return Err(PadflowError::SubgraphNotFound(node_id.to_string()));
    };

    let mut renames = HashMap::new();
    for inner in body.inner.nodes() {
        let new_id = state.unique_id(&inner.id);
        let mut entry = inner.clone();
        entry.id = new_id.clone();
        state.add_node(entry)?;
        renames.insert(inner.id.clone(), new_id);
    }

    let rename = |pad: &PadRef| -> Result<PadRef> {
        let node = renames
            .get(&pad.node)
            .ok_or_else(|| PadflowError::NodeNotFound(pad.node.clone()))?;
        Ok(PadRef::new(node, &pad.pad))
    };
    let through_proxy = |pad: &PadRef| -> Result<PadRef> {
        if pad.node != node_id {
            return Ok(pad.clone());
        }
        let inner = parse_proxy_pad_id(&pad.pad).ok_or_else(|| PadflowError::PadNotFound(pad.clone()))?;
        rename(&inner)
    };

    for (source, sink) in body.inner.links() {
        state.link_unchecked(rename(source)?, rename(sink)?)?;
    }
    for (source, sink) in &outer_links {
        state.link_unchecked(through_proxy(source)?, through_proxy(sink)?)?;
    }

    log::debug!(
        "Dissolved subgraph '{}' into {} node(s)",
        node_id,
        renames.len()
    );
    Ok(())
}
