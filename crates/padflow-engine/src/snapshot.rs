//! Declarative JSON form of a graph
//!
//! Connections are written on both ends (`next_pads` on sources,
//! `previous_pad` on sinks); loading accepts either.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraint::Constraints;
use crate::node::NodeMetadata;
use crate::pad::{PadRef, PadType};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    #[serde(default)]
    pub nodes: Vec<NodeSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_position: Option<[f64; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_dimensions: Option<[f64; 2]>,
    #[serde(default)]
    pub pads: Vec<PadSnapshot>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub metadata: NodeMetadata,
    /// Inner graph of a `SubGraph` node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<SubgraphSnapshot>,
}

impl NodeSnapshot {
    /// Bare node of `node_type`, as a caller would hand-write it
    pub fn new(id: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            editor_name: None,
            editor_position: None,
            editor_dimensions: None,
            pads: Vec::new(),
            description: String::new(),
            metadata: NodeMetadata::default(),
            subgraph: None,
        }
    }

    pub fn pad(&self, id: &str) -> Option<&PadSnapshot> {
        self.pads.iter().find(|p| p.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph_id: Option<String>,
    pub graph: GraphSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PadSnapshot {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(rename = "type")]
    pub pad_type: PadType,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub next_pads: Vec<PadRef>,
    #[serde(default)]
    pub previous_pad: Option<PadRef>,
    /// Effective constraints; informational when loading
    #[serde(default)]
    pub allowed_types: Constraints,
}

impl PadSnapshot {
    pub fn new(id: impl Into<String>, pad_type: PadType) -> Self {
        Self {
            id: id.into(),
            group: None,
            pad_type,
            value: None,
            next_pads: Vec::new(),
            previous_pad: None,
            allowed_types: None,
        }
    }
}

impl GraphSnapshot {
    pub fn node(&self, id: &str) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Every `(source, sink)` link named by either end, deduplicated and sorted
    pub fn links(&self) -> Vec<(PadRef, PadRef)> {
        let mut links = Vec::new();
        for node in &self.nodes {
            for pad in &node.pads {
                let here = PadRef::new(&node.id, &pad.id);
                for next in &pad.next_pads {
                    links.push((here.clone(), next.clone()));
                }
                if let Some(previous) = &pad.previous_pad {
                    links.push((previous.clone(), here.clone()));
                }
            }
        }
        links.sort();
        links.dedup();
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_snapshot() {
        let snapshot: GraphSnapshot = serde_json::from_value(json!({
            "nodes": [
                {"id": "a", "type": "IntegerProperty", "pads": [
                    {"id": "value", "type": "property_source", "value": 3,
                     "next_pads": [{"node": "b", "pad": "input"}]}
                ]},
                {"id": "b", "type": "Passthrough", "pads": [
                    {"id": "input", "type": "stateless_sink",
                     "previous_pad": {"node": "a", "pad": "value"},
                     "allowed_types": [{"type": "Integer"}]}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.node("a").unwrap().pad("value").unwrap().value, Some(json!(3)));
        // Both ends name the same link
        assert_eq!(
            snapshot.links(),
            vec![(PadRef::new("a", "value"), PadRef::new("b", "input"))]
        );
    }

    #[test]
    fn test_subgraph_field_is_optional() {
        let node = NodeSnapshot::new("x", "Display");
        let json = serde_json::to_value(&node).unwrap();
        assert!(json.get("subgraph").is_none());
        assert_eq!(json["type"], "Display");
    }
}
