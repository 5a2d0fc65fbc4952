//! Fluent construction of graph snapshots
//!
//! Handy for hosts and tests that want a graph without writing JSON:
//!
//! ```ignore
//! let snapshot = SnapshotBuilder::new()
//!     .add_node("count", "IntegerProperty")
//!     .with_value("value", json!(3))
//!     .add_node("show", "Display")
//!     .at(240.0, 0.0)
//!     .connect("count", "value", "show", "value")
//!     .build();
//! ```
//!
//! Pad types written here are provisional; loading the snapshot resolves
//! every node and replaces them with what the node declares.

use serde_json::Value;

use crate::pad::{PadDirection, PadKind, PadRef, PadType};
use crate::snapshot::{GraphSnapshot, NodeSnapshot, PadSnapshot, SubgraphSnapshot};
use crate::subgraph::SUBGRAPH_NODE_TYPE;

/// Builder for [`GraphSnapshot`]s
///
/// Node-level methods (`at`, `named`, `with_value`) apply to the most
/// recently added node.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    nodes: Vec<NodeSnapshot>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node of `node_type`
    pub fn add_node(mut self, id: impl Into<String>, node_type: impl Into<String>) -> Self {
        self.nodes.push(NodeSnapshot::new(id, node_type));
        self
    }

    /// Add a subgraph node wrapping `graph`
    pub fn add_subgraph(
        mut self,
        id: impl Into<String>,
        subgraph_id: Option<String>,
        graph: GraphSnapshot,
    ) -> Self {
        let mut node = NodeSnapshot::new(id, SUBGRAPH_NODE_TYPE);
        node.subgraph = Some(SubgraphSnapshot { subgraph_id, graph });
        self.nodes.push(node);
        self
    }

    /// Set the editor position of the last node
    pub fn at(mut self, x: f64, y: f64) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.editor_position = Some([x, y]);
        }
        self
    }

    /// Set the editor name of the last node
    pub fn named(mut self, name: impl Into<String>) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            node.editor_name = Some(name.into());
        }
        self
    }

    /// Set a property value on the last node
    pub fn with_value(mut self, pad: &str, value: Value) -> Self {
        if let Some(node) = self.nodes.last_mut() {
            let entry = pad_entry(node, pad, PadType::PropertySink);
            entry.pad_type = PadType::new(entry.pad_type.direction(), PadKind::Property);
            entry.value = Some(value);
        }
        self
    }

    /// Link a source pad to a sink pad; both nodes must already be added
    pub fn connect(mut self, source_node: &str, source_pad: &str, sink_node: &str, sink_pad: &str) -> Self {
        let source = PadRef::new(source_node, source_pad);
        let sink = PadRef::new(sink_node, sink_pad);

        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == source_node) {
            let entry = pad_entry(node, source_pad, PadType::StatelessSource);
            entry.pad_type = PadType::new(PadDirection::Source, entry.pad_type.kind());
            if !entry.next_pads.contains(&sink) {
                entry.next_pads.push(sink.clone());
            }
        }
        if let Some(node) = self.nodes.iter_mut().find(|n| n.id == sink_node) {
            let entry = pad_entry(node, sink_pad, PadType::StatelessSink);
            entry.pad_type = PadType::new(PadDirection::Sink, entry.pad_type.kind());
            entry.previous_pad = Some(source);
        }
        self
    }

    pub fn build(self) -> GraphSnapshot {
        GraphSnapshot { nodes: self.nodes }
    }
}

fn pad_entry<'a>(node: &'a mut NodeSnapshot, pad: &str, pad_type: PadType) -> &'a mut PadSnapshot {
    let index = match node.pads.iter().position(|p| p.id == pad) {
        Some(index) => index,
        None => {
            node.pads.push(PadSnapshot::new(pad, pad_type));
            node.pads.len() - 1
        }
    };
    &mut node.pads[index]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;

    #[test]
    fn test_builder_records_both_link_ends() {
        let snapshot = SnapshotBuilder::new()
            .add_node("a", "Constant")
            .with_value("value", json!(7))
            .at(10.0, 20.0)
            .add_node("r", "Relay")
            .named("relay")
            .connect("a", "value", "r", "input")
            .build();

        let a = snapshot.node("a").unwrap();
        assert_eq!(a.editor_position, Some([10.0, 20.0]));
        let value = a.pad("value").unwrap();
        assert_eq!(value.pad_type, PadType::PropertySource);
        assert_eq!(value.next_pads, vec![PadRef::new("r", "input")]);

        let input = snapshot.node("r").unwrap().pad("input").unwrap();
        assert_eq!(input.previous_pad, Some(PadRef::new("a", "value")));
        assert_eq!(snapshot.links().len(), 1);
    }

    #[test]
    fn test_built_snapshot_loads() {
        let snapshot = SnapshotBuilder::new()
            .add_node("a", "Constant")
            .with_value("value", json!(7))
            .add_node("r", "Relay")
            .add_node("b", "Bounded")
            .connect("a", "value", "r", "input")
            .connect("r", "output", "b", "input")
            .build();

        let mut graph = testing::graph();
        let loaded = graph.load_from_snapshot(&snapshot).unwrap();

        assert_eq!(
            loaded.node("a").unwrap().pad("value").unwrap().value,
            Some(json!(7))
        );
        assert_eq!(loaded.links().len(), 2);
    }

    #[test]
    fn test_link_to_missing_node_fails_on_load() {
        let snapshot = SnapshotBuilder::new()
            .add_node("a", "Constant")
            .connect("a", "value", "ghost", "input")
            .build();

        let mut graph = testing::graph();
        assert!(graph.load_from_snapshot(&snapshot).is_err());
        assert!(graph.to_snapshot().nodes.is_empty());
    }
}
