//! Gate node
//!
//! Forwards `input` to `output` only while the `open` property is true.
//! Items arriving while closed are acknowledged and discarded.

use std::sync::Arc;

use async_trait::async_trait;
use padflow_engine::{Node, NodeIo, NodeMetadata, NodeView, PadSpec, Result, TypeConstraint};
use serde_json::json;
use tokio::task::JoinSet;

pub struct Gate;

impl Gate {
    pub const PORT_INPUT: &'static str = "input";
    pub const PORT_OPEN: &'static str = "open";
    pub const PORT_OUTPUT: &'static str = "output";

    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Node for Gate {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Gate").tags(["control"])
    }

    fn description(&self) -> String {
        "Passes items through while open".to_string()
    }

    fn resolve_pads(&self, view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![
            PadSpec::stateless_sink(Self::PORT_INPUT, None),
            PadSpec::property_sink(Self::PORT_OPEN, Some(vec![TypeConstraint::Boolean]))
                .with_default(json!(false)),
            PadSpec::stateless_source(Self::PORT_OUTPUT, view.peer_constraints(Self::PORT_INPUT)),
        ])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let mut input = io.take_sink(Self::PORT_INPUT)?;
        let output = io.source(Self::PORT_OUTPUT)?;

        let mut background = JoinSet::new();
        background.spawn(io.take_sink(Self::PORT_OPEN)?.drain());

        while let Some(item) = input.next().await {
            let open = io.property_as::<bool>(Self::PORT_OPEN)?.unwrap_or(false);
            if open {
                output.push_item(item.value, &item.ctx);
            } else {
                log::trace!("{}: closed, discarding item", io.node_id());
            }
            item.ctx.complete();
        }
        Ok(())
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "Gate",
    create: Gate::create,
});

#[cfg(test)]
mod tests {
    use super::*;
    use padflow_engine::PadType;
    use std::collections::HashMap;

    #[test]
    fn test_gate_starts_closed() {
        let pads = Gate.resolve_pads(&NodeView::new("g", &[], HashMap::new())).unwrap();
        let open = pads.iter().find(|p| p.id == "open").unwrap();
        assert_eq!(open.pad_type, PadType::PropertySink);
        assert_eq!(open.default_value, Some(json!(false)));
    }
}
