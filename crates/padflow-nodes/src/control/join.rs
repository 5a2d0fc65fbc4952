//! Join node
//!
//! Concatenates the latest text seen on each input. The number of inputs
//! follows the `num_inputs` property, so the pad list is rebuilt whenever
//! that property changes.

use std::sync::Arc;

use async_trait::async_trait;
use padflow_engine::{Node, NodeIo, NodeMetadata, NodeView, Note, PadSpec, Result, TypeConstraint};
use serde_json::{json, Value};
use tokio::task::JoinSet;

use crate::fanin::merge_sinks;

/// Upper bound on `num_inputs`
pub const MAX_INPUTS: i64 = 16;
const DEFAULT_INPUTS: i64 = 2;
const DEFAULT_SEPARATOR: &str = " ";

/// Join
///
/// # Pads
/// - `num_inputs` (property sink, Integer 1..=16)
/// - `separator` (property sink, String)
/// - `input_0 .. input_{n-1}` (sinks, String, group `inputs`)
/// - `output` (source, String) - emitted after every input item
pub struct Join;

impl Join {
    pub const PORT_NUM_INPUTS: &'static str = "num_inputs";
    pub const PORT_SEPARATOR: &'static str = "separator";
    pub const PORT_OUTPUT: &'static str = "output";
    pub const INPUT_PREFIX: &'static str = "input_";

    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }

    fn input_pad(index: usize) -> String {
        format!("{}{}", Self::INPUT_PREFIX, index)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Node for Join {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Join").tags(["control", "text"])
    }

    fn description(&self) -> String {
        "Joins the latest text of every input".to_string()
    }

    fn resolve_pads(&self, view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        let count = view
            .property_as::<i64>(Self::PORT_NUM_INPUTS)
            .unwrap_or(DEFAULT_INPUTS)
            .clamp(1, MAX_INPUTS) as usize;

        let mut pads = vec![
            PadSpec::property_sink(
                Self::PORT_NUM_INPUTS,
                Some(vec![TypeConstraint::integer_range(Some(1), Some(MAX_INPUTS))]),
            )
            .with_default(json!(DEFAULT_INPUTS)),
            PadSpec::property_sink(Self::PORT_SEPARATOR, Some(vec![TypeConstraint::String]))
                .with_default(json!(DEFAULT_SEPARATOR)),
        ];
        for index in 0..count {
            pads.push(
                PadSpec::stateless_sink(Self::input_pad(index), Some(vec![TypeConstraint::String]))
                    .in_group("inputs"),
            );
        }
        pads.push(PadSpec::stateless_source(
            Self::PORT_OUTPUT,
            Some(vec![TypeConstraint::String]),
        ));
        Ok(pads)
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let output = io.source(Self::PORT_OUTPUT)?;
        let inputs = io.take_sinks_with_prefix(Self::INPUT_PREFIX);
        let mut latest: Vec<Option<String>> = vec![None; inputs.len()];

        // Property values are read from their cells; the items only need acknowledging
        let mut background = JoinSet::new();
        background.spawn(io.take_sink(Self::PORT_NUM_INPUTS)?.drain());
        background.spawn(io.take_sink(Self::PORT_SEPARATOR)?.drain());

        let (mut items, _readers) = merge_sinks(inputs);
        while let Some((index, item)) = items.recv().await {
            latest[index] = Some(text(&item.value));

            let separator = io
                .property_as::<String>(Self::PORT_SEPARATOR)?
                .unwrap_or_else(|| DEFAULT_SEPARATOR.to_string());
            let joined = latest
                .iter()
                .flatten()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(separator.as_str());

            output.push_item(Value::String(joined), &item.ctx);
            item.ctx.complete();
        }
        Ok(())
    }

    fn notes(&self, view: &NodeView<'_>) -> Vec<Note> {
        let any_connected = view
            .pads()
            .iter()
            .any(|p| p.id.starts_with(Self::INPUT_PREFIX) && view.is_connected(&p.id));
        if any_connected {
            Vec::new()
        } else {
            vec![Note::warning("no inputs connected")]
        }
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "Join",
    create: Join::create,
});

#[cfg(test)]
mod tests {
    use super::*;
    use padflow_engine::PadState;
    use std::collections::HashMap;

    fn resolve_with(num_inputs: Value) -> Vec<PadSpec> {
        let mut pad = PadState::from_spec(PadSpec::property_sink("num_inputs", None));
        pad.value = Some(num_inputs);
        let pads = vec![pad];
        Join.resolve_pads(&NodeView::new("j", &pads, HashMap::new())).unwrap()
    }

    fn input_ids(pads: &[PadSpec]) -> Vec<&str> {
        pads.iter()
            .filter(|p| p.group.as_deref() == Some("inputs"))
            .map(|p| p.id.as_str())
            .collect()
    }

    #[test]
    fn test_default_has_two_inputs() {
        let pads = Join.resolve_pads(&NodeView::new("j", &[], HashMap::new())).unwrap();
        assert_eq!(input_ids(&pads), vec!["input_0", "input_1"]);
    }

    #[test]
    fn test_num_inputs_drives_pads() {
        let pads = resolve_with(json!(4));
        assert_eq!(input_ids(&pads), vec!["input_0", "input_1", "input_2", "input_3"]);
        // Fixed pads stay in place
        assert_eq!(pads.first().unwrap().id, "num_inputs");
        assert_eq!(pads.last().unwrap().id, "output");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        assert_eq!(resolve_with(json!(3)), resolve_with(json!(3)));
    }

    #[test]
    fn test_text_of_non_strings() {
        assert_eq!(text(&json!("a")), "a");
        assert_eq!(text(&json!(3)), "3");
    }
}
