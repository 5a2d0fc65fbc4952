//! Property constants
//!
//! Each node holds one value on property source `value`. The value is set
//! from the editor (`update_pad`) and emitted downstream whenever a client
//! pushes through the data plane.

use std::sync::Arc;

use async_trait::async_trait;
use padflow_engine::{Node, NodeIo, NodeMetadata, NodeView, PadSpec, Result, TypeConstraint};
use serde_json::{json, Value};

/// Port ID shared by every property node
pub const PORT_VALUE: &str = "value";

fn value_pad(constraint: TypeConstraint, default: Value) -> Vec<PadSpec> {
    vec![PadSpec::property_source(PORT_VALUE, Some(vec![constraint])).with_default(default)]
}

/// Property nodes have no inputs; pushes arrive through the runtime handle.
async fn hold(io: NodeIo) -> Result<()> {
    log::debug!("{}: holding {:?}", io.node_id(), io.property(PORT_VALUE));
    std::future::pending::<()>().await;
    Ok(())
}

fn metadata(primary: &str) -> NodeMetadata {
    NodeMetadata::new(primary).tags(["input", "property"])
}

pub struct StringProperty;

impl StringProperty {
    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Node for StringProperty {
    fn metadata(&self) -> NodeMetadata {
        metadata("String")
    }

    fn description(&self) -> String {
        "Holds a text value".to_string()
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(value_pad(TypeConstraint::String, json!("")))
    }

    async fn run(&self, io: NodeIo) -> Result<()> {
        hold(io).await
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "StringProperty",
    create: StringProperty::create,
});

pub struct IntegerProperty;

impl IntegerProperty {
    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Node for IntegerProperty {
    fn metadata(&self) -> NodeMetadata {
        metadata("Integer")
    }

    fn description(&self) -> String {
        "Holds a whole number".to_string()
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(value_pad(TypeConstraint::integer(), json!(0)))
    }

    async fn run(&self, io: NodeIo) -> Result<()> {
        hold(io).await
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "IntegerProperty",
    create: IntegerProperty::create,
});

pub struct FloatProperty;

impl FloatProperty {
    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Node for FloatProperty {
    fn metadata(&self) -> NodeMetadata {
        metadata("Float")
    }

    fn description(&self) -> String {
        "Holds a decimal number".to_string()
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(value_pad(TypeConstraint::float(), json!(0.0)))
    }

    async fn run(&self, io: NodeIo) -> Result<()> {
        hold(io).await
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "FloatProperty",
    create: FloatProperty::create,
});

pub struct BooleanProperty;

impl BooleanProperty {
    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }
}

#[async_trait]
impl Node for BooleanProperty {
    fn metadata(&self) -> NodeMetadata {
        metadata("Boolean")
    }

    fn description(&self) -> String {
        "Holds a true/false flag".to_string()
    }

    fn resolve_pads(&self, _view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        Ok(value_pad(TypeConstraint::Boolean, json!(false)))
    }

    async fn run(&self, io: NodeIo) -> Result<()> {
        hold(io).await
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "BooleanProperty",
    create: BooleanProperty::create,
});
