//! Structural graph state: nodes, pads and the connection table
//!
//! Connections live in one table keyed by sink pad, which enforces the
//! single-upstream rule. Pads never point at each other.
//!
//! `reconcile` brings the whole state to a consistent fixed point:
//! every node re-declares its pads in dependency order until nothing
//! changes, dangling links are pruned, and effective constraints are
//! narrowed across every link.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;

use crate::config::EngineConfig;
use crate::constraint::{accepts_value, describe, intersect, is_incompatible, Constraints};
use crate::error::{PadflowError, Result};
use crate::node::{Node, NodeState, NodeView, PeerView};
use crate::pad::{PadDirection, PadRef, PadSpec, PadState};
use crate::registry::NodeLibrary;
use crate::snapshot::{GraphSnapshot, NodeSnapshot, PadSnapshot, SubgraphSnapshot};
use crate::subgraph::{SubgraphBody, SUBGRAPH_NODE_TYPE};

use super::GraphNote;

/// Editor-only presentation data
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditorInfo {
    pub name: Option<String>,
    pub position: Option<[f64; 2]>,
    pub dimensions: Option<[f64; 2]>,
}

/// What a node is made of
#[derive(Clone)]
pub enum NodeBody {
    Plugin(Arc<dyn Node>),
    Subgraph(Box<SubgraphBody>),
}

#[derive(Clone)]
pub struct NodeEntry {
    pub id: String,
    pub node_type: String,
    pub editor: EditorInfo,
    pub pads: Vec<PadState>,
    pub state: NodeState,
    pub body: NodeBody,
}

impl NodeEntry {
    pub fn plugin(id: impl Into<String>, node_type: impl Into<String>, node: Arc<dyn Node>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            editor: EditorInfo::default(),
            pads: Vec::new(),
            state: NodeState::Unresolved,
            body: NodeBody::Plugin(node),
        }
    }

    /// Subgraph node whose proxies already reflect the resolved inner graph
    pub(crate) fn subgraph(id: impl Into<String>, mut body: SubgraphBody, config: &EngineConfig) -> Result<Self> {
        let id = id.into();
        body.inner
            .reconcile(&HashMap::new(), config)
            .map_err(|e| resolution_error(&id, e))?;
        let pads = body.exposed_pads().into_iter().map(PadState::from_spec).collect();
        Ok(Self {
            id,
            node_type: SUBGRAPH_NODE_TYPE.to_string(),
            editor: EditorInfo::default(),
            pads,
            state: NodeState::Unresolved,
            body: NodeBody::Subgraph(Box::new(body)),
        })
    }

    pub fn with_editor(mut self, editor: EditorInfo) -> Self {
        self.editor = editor;
        self
    }

    pub fn pad(&self, id: &str) -> Option<&PadState> {
        self.pads.iter().find(|p| p.id == id)
    }

    pub fn is_subgraph(&self) -> bool {
        matches!(self.body, NodeBody::Subgraph(_))
    }
}

/// A plugin node of a flattened graph
#[derive(Clone)]
pub struct FlatNode {
    pub id: String,
    pub node_type: String,
    pub node: Arc<dyn Node>,
    pub pads: Vec<PadState>,
}

/// Graph with every subgraph inlined, ready to run
#[derive(Clone, Default)]
pub struct FlatGraph {
    pub nodes: Vec<FlatNode>,
    /// `(source, sink)` pairs
    pub links: Vec<(PadRef, PadRef)>,
}

#[derive(Clone, Default)]
pub struct GraphState {
    nodes: Vec<NodeEntry>,
    /// sink -> source
    links: BTreeMap<PadRef, PadRef>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[NodeEntry] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&NodeEntry> {
        self.nodes.iter().find(|n| n.id == id)
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.nodes
            .iter()
            .position(|n| n.id == id)
            .ok_or_else(|| PadflowError::NodeNotFound(id.to_string()))
    }

    pub fn pad(&self, pad: &PadRef) -> Option<&PadState> {
        self.node(&pad.node).and_then(|n| n.pad(&pad.pad))
    }

    fn pad_mut(&mut self, pad: &PadRef) -> Option<&mut PadState> {
        self.nodes
            .iter_mut()
            .find(|n| n.id == pad.node)
            .and_then(|n| n.pads.iter_mut().find(|p| p.id == pad.pad))
    }

    /// Every link as `(source, sink)`, ordered by sink
    pub fn links(&self) -> impl Iterator<Item = (&PadRef, &PadRef)> {
        self.links.iter().map(|(sink, source)| (source, sink))
    }

    pub fn upstream(&self, sink: &PadRef) -> Option<&PadRef> {
        self.links.get(sink)
    }

    pub fn downstream(&self, source: &PadRef) -> Vec<PadRef> {
        self.links
            .iter()
            .filter(|(_, s)| *s == source)
            .map(|(sink, _)| sink.clone())
            .collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node(id).is_some()
    }

    /// `base` if free, otherwise the first free `base_N`
    pub fn unique_id(&self, base: &str) -> String {
        let base: String = base
            .chars()
            .map(|c| if c == ':' || c == '/' { '_' } else { c })
            .collect();
        let base = if base.is_empty() { "node".to_string() } else { base };
        if !self.contains(&base) {
            return base;
        }
        (1..)
            .map(|n| format!("{}_{}", base, n))
            .find(|candidate| !self.contains(candidate))
            .unwrap_or(base)
    }

    pub fn add_node(&mut self, entry: NodeEntry) -> Result<()> {
        validate_node_id(&entry.id)?;
        if self.contains(&entry.id) {
            return Err(PadflowError::DuplicateNodeId(entry.id));
        }
        self.nodes.push(entry);
        Ok(())
    }

    /// Remove a node and every link touching it
    pub fn remove_node(&mut self, id: &str) -> Result<NodeEntry> {
        let index = self.index_of(id)?;
        let entry = self.nodes.remove(index);
        let touched: Vec<String> = self
            .links
            .iter()
            .filter(|(sink, source)| sink.node == id || source.node == id)
            .map(|(sink, source)| if sink.node == id { source.node.clone() } else { sink.node.clone() })
            .collect();
        self.links.retain(|sink, source| sink.node != id && source.node != id);
        for node in touched {
            self.mark_unresolved(&node);
        }
        Ok(entry)
    }

    pub fn rename_node(&mut self, old: &str, new: &str) -> Result<()> {
        if old == new {
            return Ok(());
        }
        validate_node_id(new)?;
        if self.contains(new) {
            return Err(PadflowError::DuplicateNodeId(new.to_string()));
        }
        let index = self.index_of(old)?;
        self.nodes[index].id = new.to_string();

        let rename = |pad: &PadRef| {
            if pad.node == old {
                PadRef::new(new, &pad.pad)
            } else {
                pad.clone()
            }
        };
        self.links = self
            .links
            .iter()
            .map(|(sink, source)| (rename(sink), rename(source)))
            .collect();
        Ok(())
    }

    pub fn update_editor(&mut self, id: &str, update: impl FnOnce(&mut EditorInfo)) -> Result<()> {
        let index = self.index_of(id)?;
        update(&mut self.nodes[index].editor);
        Ok(())
    }

    pub fn mark_unresolved(&mut self, id: &str) {
        if let Some(entry) = self.nodes.iter_mut().find(|n| n.id == id) {
            entry.state = NodeState::Unresolved;
        }
    }

    /// Order two pads as `(source, sink)`
    fn orient(&self, a: &PadRef, b: &PadRef) -> Result<(PadRef, PadRef)> {
        let pad_a = self.pad(a).ok_or_else(|| PadflowError::PadNotFound(a.clone()))?;
        let pad_b = self.pad(b).ok_or_else(|| PadflowError::PadNotFound(b.clone()))?;
        match (pad_a.direction(), pad_b.direction()) {
            (PadDirection::Source, PadDirection::Sink) => Ok((a.clone(), b.clone())),
            (PadDirection::Sink, PadDirection::Source) => Ok((b.clone(), a.clone())),
            (PadDirection::Source, PadDirection::Source) => Err(PadflowError::InvalidConnection(
                format!("{} and {} are both sources", a, b),
            )),
            (PadDirection::Sink, PadDirection::Sink) => Err(PadflowError::InvalidConnection(
                format!("{} and {} are both sinks", a, b),
            )),
        }
    }

    /// Link two pads, in either order.
    ///
    /// Replaces the sink's previous upstream. Fails without mutation when
    /// the pads share no type.
    pub fn connect(&mut self, a: &PadRef, b: &PadRef) -> Result<(PadRef, PadRef)> {
        let (source, sink) = self.orient(a, b)?;

        if let (Some(source_pad), Some(sink_pad)) = (self.pad(&source), self.pad(&sink)) {
            // Proxies carry narrowing from their current upstream; reconcile checks them
            if sink_pad.proxy.is_none() {
                let merged = intersect(&source_pad.effective, &sink_pad.declared);
                if is_incompatible(&merged) {
                    return Err(PadflowError::TypeConstraintViolation {
                        source_pad: source.clone(),
                        sink_pad: sink.clone(),
                        detail: format!(
                            "{} has nothing in common with {}",
                            describe(&source_pad.effective),
                            describe(&sink_pad.declared)
                        ),
                    });
                }
            }
        }

        if let Some(previous) = self.links.insert(sink.clone(), source.clone()) {
            if previous != source {
                log::debug!("Replaced upstream {} of {} with {}", previous, sink, source);
                self.mark_unresolved(&previous.node);
            }
        }
        self.mark_unresolved(&source.node);
        self.mark_unresolved(&sink.node);
        Ok((source, sink))
    }

    /// Record a link without checking constraints; reconcile validates it
    pub(crate) fn link_unchecked(&mut self, source: PadRef, sink: PadRef) -> Result<()> {
        let (source, sink) = self.orient(&source, &sink)?;
        if let Some(existing) = self.links.get(&sink) {
            if *existing != source {
                return Err(PadflowError::InvalidConnection(format!(
                    "{} has two upstream pads: {} and {}",
                    sink, existing, source
                )));
            }
        }
        self.links.insert(sink, source);
        Ok(())
    }

    pub fn disconnect(&mut self, a: &PadRef, b: &PadRef) -> Result<()> {
        let (source, sink) = self.orient(a, b)?;
        if self.links.get(&sink) != Some(&source) {
            return Err(PadflowError::InvalidConnection(format!(
                "{} is not connected to {}",
                source, sink
            )));
        }
        self.links.remove(&sink);
        self.mark_unresolved(&source.node);
        self.mark_unresolved(&sink.node);
        Ok(())
    }

    /// Set a property pad's value; proxies write through to the inner pad
    pub fn set_value(&mut self, target: &PadRef, value: Value) -> Result<()> {
        let index = self.index_of(&target.node)?;
        let entry = &mut self.nodes[index];
        let pad = entry
            .pads
            .iter_mut()
            .find(|p| p.id == target.pad)
            .ok_or_else(|| PadflowError::PadNotFound(target.clone()))?;

        if !pad.is_property() {
            return Err(PadflowError::NotAPropertyPad(target.clone()));
        }
        if !accepts_value(&pad.effective, &value) {
            return Err(PadflowError::InvalidPadValue {
                pad: target.clone(),
                message: format!("{} is not {}", value, describe(&pad.effective)),
            });
        }

        pad.value = Some(value.clone());
        let proxy = pad.proxy.clone();
        if let (Some(inner), NodeBody::Subgraph(body)) = (proxy, &mut entry.body) {
            body.inner.set_value(&inner, value)?;
        }
        entry.state = NodeState::Unresolved;
        Ok(())
    }

    /// Resolve every node to a fixed point, prune dangling links and narrow constraints.
    ///
    /// `external` holds constraints seen from outside for pads exposed through a
    /// subgraph boundary; it is empty for a top-level graph.
    pub(crate) fn reconcile(
        &mut self,
        external: &HashMap<PadRef, Constraints>,
        config: &EngineConfig,
    ) -> Result<()> {
        let limit = config.resolve_pass_limit(self.nodes.len());
        let order = self.dependency_order();

        let mut settled = false;
        for pass in 0..limit {
            let mut changed = false;
            for &index in &order {
                changed |= self.resolve_node(index, external, config)?;
            }
            changed |= self.prune_links();
            if !changed {
                log::trace!("Pads settled after {} pass(es)", pass + 1);
                settled = true;
                break;
            }
        }

        if !settled {
            let node_id = order
                .first()
                .map(|&i| self.nodes[i].id.clone())
                .unwrap_or_default();
            return Err(PadflowError::resolution(
                node_id,
                format!("pads did not settle after {} passes", limit),
            ));
        }

        self.narrow(external)?;
        for entry in &mut self.nodes {
            entry.state = NodeState::Resolved;
        }
        Ok(())
    }

    fn resolve_node(
        &mut self,
        index: usize,
        external: &HashMap<PadRef, Constraints>,
        config: &EngineConfig,
    ) -> Result<bool> {
        let peers = self.peer_views(index, external);
        let entry = &mut self.nodes[index];

        let specs = match &mut entry.body {
            NodeBody::Plugin(node) => {
                let view = NodeView::new(&entry.id, &entry.pads, peers);
                node.resolve_pads(&view)
                    .map_err(|e| resolution_error(&entry.id, e))?
            }
            NodeBody::Subgraph(body) => body
                .resolve(&entry.pads, &peers, config)
                .map_err(|e| resolution_error(&entry.id, e))?,
        };

        apply_specs(entry, specs)
    }

    /// What each pad of node `index` sees across its connections
    fn peer_views(
        &self,
        index: usize,
        external: &HashMap<PadRef, Constraints>,
    ) -> HashMap<String, PeerView> {
        let entry = &self.nodes[index];
        entry
            .pads
            .iter()
            .map(|pad| {
                let here = PadRef::new(&entry.id, &pad.id);
                let view = if pad.is_source() {
                    let sinks: Vec<&PadState> = self
                        .links
                        .iter()
                        .filter(|(_, source)| **source == here)
                        .filter_map(|(sink, _)| self.pad(sink))
                        .collect();
                    if sinks.is_empty() {
                        external_view(external, &here)
                    } else {
                        PeerView {
                            connected: true,
                            constraints: sinks
                                .iter()
                                .fold(None, |acc, sink| intersect(&acc, &sink.declared)),
                        }
                    }
                } else {
                    match self.links.get(&here).and_then(|source| self.pad(source)) {
                        Some(source) => PeerView {
                            connected: true,
                            constraints: source.declared.clone(),
                        },
                        None => external_view(external, &here),
                    }
                };
                (pad.id.clone(), view)
            })
            .collect()
    }

    /// Drop links whose endpoints vanished or changed direction
    fn prune_links(&mut self) -> bool {
        let dangling: Vec<PadRef> = self
            .links
            .iter()
            .filter(|(sink, source)| {
                let sink_ok = self.pad(sink).map(|p| !p.is_source()).unwrap_or(false);
                let source_ok = self.pad(source).map(|p| p.is_source()).unwrap_or(false);
                !(sink_ok && source_ok)
            })
            .map(|(sink, _)| sink.clone())
            .collect();

        for sink in &dangling {
            if let Some(source) = self.links.remove(sink) {
                log::debug!("Dropped dangling link {} -> {}", source, sink);
            }
        }
        !dangling.is_empty()
    }

    /// Recompute effective constraints from declarations and links
    fn narrow(&mut self, external: &HashMap<PadRef, Constraints>) -> Result<()> {
        for entry in &mut self.nodes {
            for pad in &mut entry.pads {
                pad.effective = pad.declared.clone();
                if let Some(outer) = external.get(&PadRef::new(&entry.id, &pad.id)) {
                    let merged = intersect(&pad.declared, outer);
                    // An outer mismatch is reported on the outer link
                    if !is_incompatible(&merged) {
                        pad.effective = merged;
                    }
                }
            }
        }

        let links: Vec<(PadRef, PadRef)> = self
            .links
            .iter()
            .map(|(sink, source)| (source.clone(), sink.clone()))
            .collect();

        loop {
            let mut changed = false;
            for (source, sink) in &links {
                let (Some(source_pad), Some(sink_pad)) = (self.pad(source), self.pad(sink)) else {
                    continue;
                };
                let merged = intersect(&source_pad.effective, &sink_pad.effective);
                if is_incompatible(&merged) {
                    return Err(PadflowError::TypeConstraintViolation {
                        source_pad: source.clone(),
                        sink_pad: sink.clone(),
                        detail: format!(
                            "{} has nothing in common with {}",
                            describe(&source_pad.effective),
                            describe(&sink_pad.effective)
                        ),
                    });
                }
                let source_changed = merged != source_pad.effective;
                let sink_changed = merged != sink_pad.effective;

                if source_changed {
                    if let Some(pad) = self.pad_mut(source) {
                        pad.effective = merged.clone();
                    }
                }
                if sink_changed {
                    if let Some(pad) = self.pad_mut(sink) {
                        pad.effective = merged;
                    }
                }
                changed |= source_changed || sink_changed;
            }
            if !changed {
                return Ok(());
            }
        }
    }

    /// Node indices with upstream nodes first (Kahn's algorithm).
    ///
    /// Nodes on cycles follow in insertion order; repeated passes settle them.
    fn dependency_order(&self) -> Vec<usize> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        let mut seen = HashSet::new();
        for (sink, source) in &self.links {
            if let (Some(&from), Some(&to)) =
                (index.get(source.node.as_str()), index.get(sink.node.as_str()))
            {
                if from != to && seen.insert((from, to)) {
                    edges[from].push(to);
                    in_degree[to] += 1;
                }
            }
        }

        let mut queue: VecDeque<usize> = (0..self.nodes.len()).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(current) = queue.pop_front() {
            order.push(current);
            for &next in &edges[current] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push_back(next);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let placed: HashSet<usize> = order.iter().copied().collect();
            order.extend((0..self.nodes.len()).filter(|i| !placed.contains(i)));
        }
        order
    }

    /// Node notes plus structural checks
    pub fn notes(&self) -> Vec<GraphNote> {
        let mut notes = Vec::new();
        self.collect_notes("", true, &mut notes);
        notes
    }

    fn collect_notes(&self, prefix: &str, structural: bool, notes: &mut Vec<GraphNote>) {
        let no_external = HashMap::new();
        for (index, entry) in self.nodes.iter().enumerate() {
            let node_id = format!("{}{}", prefix, entry.id);
            match &entry.body {
                NodeBody::Plugin(node) => {
                    let view = NodeView::new(&entry.id, &entry.pads, self.peer_views(index, &no_external));
                    notes.extend(node.notes(&view).into_iter().map(|note| GraphNote {
                        node_id: node_id.clone(),
                        note,
                    }));
                }
                NodeBody::Subgraph(body) => {
                    for pad in &entry.pads {
                        if let Some(target) = &pad.proxy {
                            if body.inner.pad(target).is_none() {
                                notes.push(GraphNote::error(
                                    &node_id,
                                    format!("proxy target {} is missing", target),
                                    &pad.id,
                                ));
                            }
                        }
                    }
                    body.inner
                        .collect_notes(&format!("{}/", node_id), false, notes);
                }
            }

            if structural {
                for pad in entry.pads.iter().filter(|p| p.is_source()) {
                    if self.downstream(&PadRef::new(&entry.id, &pad.id)).is_empty() {
                        notes.push(GraphNote::info(&node_id, "source pad has no connections", &pad.id));
                    }
                }
            }
        }
    }

    /// Build an unresolved state from a snapshot
    pub(crate) fn from_snapshot(
        snapshot: &GraphSnapshot,
        library: &NodeLibrary,
        config: &EngineConfig,
    ) -> Result<Self> {
        let mut state = Self::new();
        for node in &snapshot.nodes {
            let editor = EditorInfo {
                name: node.editor_name.clone(),
                position: node.editor_position,
                dimensions: node.editor_dimensions,
            };

            let mut entry = if node.node_type == SUBGRAPH_NODE_TYPE {
                let inner = node.subgraph.as_ref().ok_or_else(|| {
                    PadflowError::SubgraphNotFound(format!("node '{}' has no inner graph", node.id))
                })?;
                let body = SubgraphBody::from_snapshot(inner.subgraph_id.clone(), &inner.graph, library, config)?;
                NodeEntry::subgraph(&node.id, body, config)?
            } else {
                NodeEntry::plugin(&node.id, &node.node_type, library.create(&node.node_type)?)
            };
            entry.editor = editor;

            // Seed pads so stored properties and links survive until the node re-declares them
            for pad in &node.pads {
                if entry.pad(&pad.id).is_some() {
                    // Proxy values come from the inner graph
                    continue;
                }
                let mut seeded = PadState::from_spec(PadSpec::new(&pad.id, pad.pad_type, None));
                if seeded.is_property() {
                    seeded.value = pad.value.clone().filter(|v| !v.is_null());
                }
                entry.pads.push(seeded);
            }

            // A link may be written on one end only, so the other end's
            // declared pads must exist before links are wired
            if let NodeBody::Plugin(node) = &entry.body {
                let view = NodeView::new(&entry.id, &entry.pads, HashMap::new());
                let specs = node
                    .resolve_pads(&view)
                    .map_err(|e| resolution_error(&entry.id, e))?;
                for spec in specs {
                    if entry.pad(&spec.id).is_none() {
                        entry.pads.push(PadState::from_spec(spec));
                    }
                }
            }

            state.add_node(entry)?;
        }

        for (source, sink) in snapshot.links() {
            state.link_unchecked(source, sink)?;
        }
        Ok(state)
    }

    /// Serialize the current state
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let nodes = self
            .nodes
            .iter()
            .map(|entry| {
                let pads = entry
                    .pads
                    .iter()
                    .map(|pad| {
                        let here = PadRef::new(&entry.id, &pad.id);
                        PadSnapshot {
                            id: pad.id.clone(),
                            group: pad.group.clone(),
                            pad_type: pad.pad_type,
                            value: pad.value.clone(),
                            next_pads: if pad.is_source() { self.downstream(&here) } else { Vec::new() },
                            previous_pad: if pad.is_source() { None } else { self.links.get(&here).cloned() },
                            allowed_types: pad.effective.clone(),
                        }
                    })
                    .collect();

                let (description, metadata, subgraph) = match &entry.body {
                    NodeBody::Plugin(node) => (node.description(), node.metadata(), None),
                    NodeBody::Subgraph(body) => (
                        body.description(),
                        body.metadata(),
                        Some(SubgraphSnapshot {
                            subgraph_id: body.subgraph_id.clone(),
                            graph: body.inner.to_snapshot(),
                        }),
                    ),
                };

                NodeSnapshot {
                    id: entry.id.clone(),
                    node_type: entry.node_type.clone(),
                    editor_name: entry.editor.name.clone(),
                    editor_position: entry.editor.position,
                    editor_dimensions: entry.editor.dimensions,
                    pads,
                    description,
                    metadata,
                    subgraph,
                }
            })
            .collect();
        GraphSnapshot { nodes }
    }

    /// Inline every subgraph; inner nodes become `"{subgraph}/{inner}"`
    pub fn flatten(&self) -> FlatGraph {
        let mut flat = FlatGraph::default();
        self.flatten_into("", &mut flat);
        flat
    }

    fn flatten_into(&self, prefix: &str, flat: &mut FlatGraph) {
        for entry in &self.nodes {
            let id = format!("{}{}", prefix, entry.id);
            match &entry.body {
                NodeBody::Plugin(node) => flat.nodes.push(FlatNode {
                    id,
                    node_type: entry.node_type.clone(),
                    node: node.clone(),
                    pads: entry.pads.clone(),
                }),
                NodeBody::Subgraph(body) => body.inner.flatten_into(&format!("{}/", id), flat),
            }
        }

        for (sink, source) in &self.links {
            match (self.flat_address(prefix, source), self.flat_address(prefix, sink)) {
                (Some(source), Some(sink)) => flat.links.push((source, sink)),
                _ => log::warn!("Link {} -> {} has no runnable endpoint", source, sink),
            }
        }
    }

    /// Follow proxies down to a plugin pad and return its flattened address
    fn flat_address(&self, prefix: &str, pad: &PadRef) -> Option<PadRef> {
        let entry = self.node(&pad.node)?;
        match &entry.body {
            NodeBody::Plugin(_) => Some(PadRef::new(format!("{}{}", prefix, pad.node), &pad.pad)),
            NodeBody::Subgraph(body) => {
                let target = entry.pad(&pad.pad)?.proxy.as_ref()?;
                body.inner
                    .flat_address(&format!("{}{}/", prefix, pad.node), target)
            }
        }
    }
}

fn external_view(external: &HashMap<PadRef, Constraints>, pad: &PadRef) -> PeerView {
    match external.get(pad) {
        Some(constraints) => PeerView {
            connected: true,
            constraints: constraints.clone(),
        },
        None => PeerView::default(),
    }
}

/// Replace a node's pads with a fresh declaration; true when anything changed
fn apply_specs(entry: &mut NodeEntry, specs: Vec<PadSpec>) -> Result<bool> {
    {
        let mut seen = HashSet::new();
        if let Some(duplicate) = specs.iter().find(|s| !seen.insert(s.id.as_str())) {
            return Err(PadflowError::resolution(
                &entry.id,
                format!("pad '{}' declared twice", duplicate.id),
            ));
        }
    }

    let pads: Vec<PadState> = specs
        .into_iter()
        .map(|spec| match entry.pad(&spec.id) {
            Some(existing) => existing.merge_spec(spec),
            None => PadState::from_spec(spec),
        })
        .collect();

    let changed = !same_declaration(&entry.pads, &pads);
    entry.pads = pads;
    Ok(changed)
}

/// Equality that ignores effective constraints
fn same_declaration(old: &[PadState], new: &[PadState]) -> bool {
    old.len() == new.len()
        && old.iter().zip(new).all(|(a, b)| {
            a.id == b.id
                && a.group == b.group
                && a.pad_type == b.pad_type
                && a.declared == b.declared
                && a.value == b.value
                && a.proxy == b.proxy
        })
}

fn resolution_error(node_id: &str, error: PadflowError) -> PadflowError {
    match error {
        e @ (PadflowError::NodeResolution { .. } | PadflowError::TypeConstraintViolation { .. }) => e,
        other => PadflowError::resolution(node_id, other.to_string()),
    }
}

pub(crate) fn validate_node_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(':') || id.contains('/') {
        return Err(PadflowError::InvalidNodeId(id.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::TypeConstraint;
    use crate::testing;
    use serde_json::json;

    fn config() -> EngineConfig {
        EngineConfig::default()
    }

    fn state_with(nodes: &[(&str, &str)]) -> GraphState {
        let library = testing::library();
        let mut state = GraphState::new();
        for (id, node_type) in nodes {
            let node = library.create(node_type).unwrap();
            state.add_node(NodeEntry::plugin(*id, *node_type, node)).unwrap();
        }
        state.reconcile(&HashMap::new(), &config()).unwrap();
        state
    }

    #[test]
    fn test_connect_narrows_both_ends() {
        let mut state = state_with(&[("a", "Constant"), ("b", "Bounded")]);
        state
            .connect(&PadRef::new("a", "value"), &PadRef::new("b", "input"))
            .unwrap();
        state.reconcile(&HashMap::new(), &config()).unwrap();

        let expected = Some(vec![TypeConstraint::integer_range(Some(5), Some(10))]);
        assert_eq!(state.pad(&PadRef::new("a", "value")).unwrap().effective, expected);
        assert_eq!(state.pad(&PadRef::new("b", "input")).unwrap().effective, expected);
    }

    #[test]
    fn test_connect_rejects_without_mutation() {
        let mut state = state_with(&[("a", "Constant"), ("t", "Text")]);
        let before = state.to_snapshot();

        let result = state.connect(&PadRef::new("t", "input"), &PadRef::new("a", "value"));
        assert!(matches!(result, Err(PadflowError::TypeConstraintViolation { .. })));
        assert_eq!(state.to_snapshot(), before);
    }

    #[test]
    fn test_sink_accepts_one_upstream() {
        let mut state = state_with(&[
            ("a", "Constant"),
            ("b", "Constant"),
            ("r", "Relay"),
        ]);
        state.connect(&PadRef::new("a", "value"), &PadRef::new("r", "input")).unwrap();
        state.connect(&PadRef::new("b", "value"), &PadRef::new("r", "input")).unwrap();

        assert_eq!(
            state.upstream(&PadRef::new("r", "input")),
            Some(&PadRef::new("b", "value"))
        );
        assert!(state.downstream(&PadRef::new("a", "value")).is_empty());
    }

    #[test]
    fn test_same_direction_is_invalid() {
        let mut state = state_with(&[("a", "Constant"), ("b", "Constant")]);
        assert!(matches!(
            state.connect(&PadRef::new("a", "value"), &PadRef::new("b", "value")),
            Err(PadflowError::InvalidConnection(_))
        ));
    }

    #[test]
    fn test_inference_follows_dependency_order() {
        // Inserted downstream-first so a single pass in insertion order would not settle
        let mut state = state_with(&[("r2", "Relay"), ("r1", "Relay"), ("a", "Constant")]);
        state.connect(&PadRef::new("a", "value"), &PadRef::new("r1", "input")).unwrap();
        state.connect(&PadRef::new("r1", "output"), &PadRef::new("r2", "input")).unwrap();
        state.reconcile(&HashMap::new(), &config()).unwrap();

        assert_eq!(
            state.pad(&PadRef::new("r2", "output")).unwrap().declared,
            Some(vec![TypeConstraint::integer_range(Some(0), None)])
        );
        assert_eq!(
            state.dependency_order(),
            vec![2, 1, 0],
            "constant, then r1, then r2"
        );
    }

    #[test]
    fn test_dynamic_pads_keep_links_and_values() {
        let mut state = state_with(&[("a", "Constant"), ("f", "Fanin")]);
        state.set_value(&PadRef::new("f", "count"), json!(3)).unwrap();
        state.reconcile(&HashMap::new(), &config()).unwrap();
        state.connect(&PadRef::new("a", "value"), &PadRef::new("f", "input_2")).unwrap();
        state.reconcile(&HashMap::new(), &config()).unwrap();

        let ids: Vec<_> = state.node("f").unwrap().pads.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["count", "input_0", "input_1", "input_2"]);

        // Shrinking removes the pad and its link
        state.set_value(&PadRef::new("f", "count"), json!(1)).unwrap();
        state.reconcile(&HashMap::new(), &config()).unwrap();
        assert!(state.pad(&PadRef::new("f", "input_2")).is_none());
        assert!(state.downstream(&PadRef::new("a", "value")).is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut state = state_with(&[("a", "Constant"), ("r", "Relay")]);
        state.connect(&PadRef::new("a", "value"), &PadRef::new("r", "input")).unwrap();
        state.reconcile(&HashMap::new(), &config()).unwrap();
        let first: Vec<_> = state.nodes().iter().map(|n| n.pads.clone()).collect();

        state.reconcile(&HashMap::new(), &config()).unwrap();
        let second: Vec<_> = state.nodes().iter().map(|n| n.pads.clone()).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_set_value_validates() {
        let mut state = state_with(&[("f", "Fanin"), ("r", "Relay")]);
        assert!(matches!(
            state.set_value(&PadRef::new("f", "count"), json!(99)),
            Err(PadflowError::InvalidPadValue { .. })
        ));
        assert!(matches!(
            state.set_value(&PadRef::new("r", "input"), json!(1)),
            Err(PadflowError::NotAPropertyPad(_))
        ));
    }

    #[test]
    fn test_rename_rewrites_links() {
        let mut state = state_with(&[("a", "Constant"), ("r", "Relay")]);
        state.connect(&PadRef::new("a", "value"), &PadRef::new("r", "input")).unwrap();
        state.rename_node("a", "source").unwrap();

        assert_eq!(
            state.upstream(&PadRef::new("r", "input")),
            Some(&PadRef::new("source", "value"))
        );
        assert!(matches!(
            state.rename_node("r", "bad/id"),
            Err(PadflowError::InvalidNodeId(_))
        ));
    }

    #[test]
    fn test_unique_id() {
        let state = state_with(&[("relay", "Relay"), ("relay_1", "Relay")]);
        assert_eq!(state.unique_id("relay"), "relay_2");
        assert_eq!(state.unique_id("fresh"), "fresh");
        assert_eq!(state.unique_id("a:b"), "a_b");
    }

    #[test]
    fn test_structural_notes() {
        let state = state_with(&[("a", "Constant"), ("r", "Relay")]);
        let notes = state.notes();
        assert!(notes
            .iter()
            .any(|n| n.node_id == "a" && n.note.message == "source pad has no connections"));
        assert!(notes.iter().any(|n| n.node_id == "r" && n.note.pad.as_deref() == Some("input")));
    }
}
