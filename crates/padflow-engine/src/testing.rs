//! Small nodes shared by the unit tests

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::config::EngineConfig;
use crate::constraint::TypeConstraint;
use crate::error::{PadflowError, Result};
use crate::graph::Graph;
use crate::io::NodeIo;
use crate::node::{Node, NodeMetadata, NodeView, Note};
use crate::pad::PadSpec;
use crate::registry::NodeLibrary;

/// Property source `value`: Integer >= 0
pub struct Constant;

#[async_trait]
impl Node for Constant {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Constant")
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![PadSpec::property_source(
            "value",
            Some(vec![TypeConstraint::integer_range(Some(0), None)]),
        )
        .with_default(json!(0))])
    }

    async fn run(&self, _io: NodeIo) -> Result<()> {
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Stateless sink `input`: Integer in [5, 10]
pub struct Bounded;

#[async_trait]
impl Node for Bounded {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Bounded")
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![PadSpec::stateless_sink(
            "input",
            Some(vec![TypeConstraint::integer_range(Some(5), Some(10))]),
        )])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let mut input = io.take_sink("input")?;
        while let Some(item) = input.next().await {
            item.ctx.complete();
        }
        Ok(())
    }
}

/// Stateless sink `input`: String
pub struct Text;

#[async_trait]
impl Node for Text {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Text")
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![PadSpec::stateless_sink(
            "input",
            Some(vec![TypeConstraint::String]),
        )])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let mut input = io.take_sink("input")?;
        while let Some(item) = input.next().await {
            item.ctx.complete();
        }
        Ok(())
    }
}

/// Forwards `input` to `output`; `output` mirrors the upstream type
pub struct Relay;

#[async_trait]
impl Node for Relay {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Relay")
    }

    fn resolve_pads(&self, view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![
            PadSpec::stateless_sink("input", None),
            PadSpec::stateless_source("output", view.peer_constraints("input")),
        ])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let mut input = io.take_sink("input")?;
        let output = io.source("output")?;
        while let Some(item) = input.next().await {
            output.push_item(item.value, &item.ctx);
            item.ctx.complete();
        }
        Ok(())
    }

    fn notes(&self, view: &NodeView<'_>) -> Vec<Note> {
        if view.is_connected("input") {
            Vec::new()
        } else {
            vec![Note::warning("nothing to relay").on_pad("input")]
        }
    }
}

/// Property `count` drives sinks `input_0..input_{count-1}`
pub struct Fanin;

#[async_trait]
impl Node for Fanin {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Fanin")
    }

    fn resolve_pads(&self, view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        let count = view.property_as::<usize>("count").unwrap_or(2);
        let mut pads = vec![PadSpec::property_sink(
            "count",
            Some(vec![TypeConstraint::integer_range(Some(0), Some(8))]),
        )
        .with_default(json!(2))];
        for i in 0..count {
            pads.push(PadSpec::stateless_sink(format!("input_{}", i), None).in_group("inputs"));
        }
        Ok(pads)
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        // Only input_0 is read; the others stay open and fill up
        let mut inputs = io.take_sinks_with_prefix("input_");
        if let Some(input) = inputs.first_mut() {
            while let Some(item) = input.next().await {
                item.ctx.complete();
            }
        }
        std::future::pending::<()>().await;
        Ok(())
    }
}

/// Property `mode`; resolution fails while it is "broken"
pub struct Picky;

#[async_trait]
impl Node for Picky {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Picky")
    }

    fn resolve_pads(&self, view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        if view.property_as::<String>("mode").as_deref() == Some("broken") {
            return Err(PadflowError::resolution(view.node_id(), "mode 'broken' is unsupported"));
        }
        Ok(vec![PadSpec::property_sink("mode", Some(vec![TypeConstraint::String]))
            .with_default(json!("ok"))])
    }

    async fn run(&self, _io: NodeIo) -> Result<()> {
        Ok(())
    }
}

/// Stores the last `input` value on property source `last`
pub struct Collector;

#[async_trait]
impl Node for Collector {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Collector")
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(vec![
            PadSpec::stateless_sink("input", None),
            PadSpec::property_source("last", None),
        ])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let mut input = io.take_sink("input")?;
        let last = io.source("last")?;
        while let Some(item) = input.next().await {
            last.set_value(item.value)?;
            item.ctx.complete();
        }
        Ok(())
    }
}

/// Fails its run task as soon as it starts
pub struct Failing;

#[async_trait]
impl Node for Failing {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Failing")
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(Vec::new())
    }

    async fn run(&self, io: NodeIo) -> Result<()> {
        Err(PadflowError::runtime(io.node_id(), "boom"))
    }
}

pub fn library() -> Arc<NodeLibrary> {
    let mut library = NodeLibrary::new();
    library.register("Constant", || Arc::new(Constant));
    library.register("Bounded", || Arc::new(Bounded));
    library.register("Text", || Arc::new(Text));
    library.register("Relay", || Arc::new(Relay));
    library.register("Fanin", || Arc::new(Fanin));
    library.register("Picky", || Arc::new(Picky));
    library.register("Collector", || Arc::new(Collector));
    library.register("Failing", || Arc::new(Failing));
    Arc::new(library)
}

pub fn graph() -> Graph {
    Graph::new(library(), EngineConfig::default())
}
