//! Display node
//!
//! Retains whatever arrives on `value` and logs it. Clients read the
//! retained value back with a data-plane `get_value`.

use std::sync::Arc;

use async_trait::async_trait;
use padflow_engine::{Node, NodeIo, NodeMetadata, NodeView, Note, PadSpec, Result};

pub struct Display;

impl Display {
    pub const PORT_VALUE: &'static str = "value";

    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Node for Display {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Display").tags(["output"])
    }

    fn description(&self) -> String {
        "Shows the latest value it received".to_string()
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![PadSpec::property_sink(Self::PORT_VALUE, None)])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let mut value = io.take_sink(Self::PORT_VALUE)?;
        // The retained value is updated at push time; the item only needs acknowledging
        while let Some(item) = value.next().await {
            log::info!("{}: {}", io.node_id(), item.value);
            item.ctx.complete();
        }
        Ok(())
    }

    fn notes(&self, view: &NodeView<'_>) -> Vec<Note> {
        if view.is_connected(Self::PORT_VALUE) {
            Vec::new()
        } else {
            vec![Note::warning("nothing to display").on_pad(Self::PORT_VALUE)]
        }
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "Display",
    create: Display::create,
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_unconnected_note() {
        let view = NodeView::new("d", &[], HashMap::new());
        let notes = Display.notes(&view);
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].pad.as_deref(), Some("value"));
    }
}
