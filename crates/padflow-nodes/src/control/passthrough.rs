//! Passthrough node
//!
//! Forwards `input` to `output` unchanged. `output` takes on whatever type
//! feeds `input`, and falls back to unconstrained once `input` is
//! disconnected.

use std::sync::Arc;

use async_trait::async_trait;
use padflow_engine::{Node, NodeIo, NodeMetadata, NodeView, PadSpec, Result};

pub struct Passthrough;

impl Passthrough {
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Node for Passthrough {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Passthrough").tags(["control"])
    }

    fn description(&self) -> String {
        "Forwards items unchanged".to_string()
    }

    fn resolve_pads(&self, view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![
            PadSpec::stateless_sink(Self::PORT_INPUT, None),
            PadSpec::stateless_source(Self::PORT_OUTPUT, view.peer_constraints(Self::PORT_INPUT)),
        ])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let mut input = io.take_sink(Self::PORT_INPUT)?;
        let output = io.source(Self::PORT_OUTPUT)?;
        while let Some(item) = input.next().await {
            output.push_item(item.value, &item.ctx);
            item.ctx.complete();
        }
        log::debug!("{}: input ended", io.node_id());
        Ok(())
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "Passthrough",
    create: Passthrough::create,
});

#[cfg(test)]
mod tests {
    use super::*;
    use padflow_engine::{PeerView, TypeConstraint};
    use std::collections::HashMap;

    #[test]
    fn test_output_mirrors_upstream() {
        let mut peers = HashMap::new();
        peers.insert(
            "input".to_string(),
            PeerView {
                connected: true,
                constraints: Some(vec![TypeConstraint::String]),
            },
        );
        let pads = Passthrough.resolve_pads(&NodeView::new("p", &[], peers)).unwrap();
        assert_eq!(pads[1].constraints, Some(vec![TypeConstraint::String]));

        let pads = Passthrough
            .resolve_pads(&NodeView::new("p", &[], HashMap::new()))
            .unwrap();
        assert_eq!(pads[1].constraints, None);
    }
}
