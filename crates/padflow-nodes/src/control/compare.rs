//! Compare node
//!
//! Compares the latest values on `a` and `b` and emits a Boolean on
//! `result`. Both operands share one type: whatever feeds one side
//! constrains the other. The `operator` menu depends on that type and is
//! only offered once it has resolved to exactly one variant.

use std::sync::Arc;

use async_trait::async_trait;
use padflow_engine::constraint::{intersect, single, ConstraintKind};
use padflow_engine::{
    Constraints, Node, NodeIo, NodeMetadata, NodeView, Note, PadSpec, Result, TypeConstraint,
};
use serde_json::{json, Value};
use tokio::task::JoinSet;

use crate::fanin::merge_sinks;

const NUMERIC_OPERATORS: &[&str] = &["==", "!=", "<", "<=", ">", ">="];
const STRING_OPERATORS: &[&str] = &["==", "!=", "contains", "starts_with", "ends_with"];
const BOOLEAN_OPERATORS: &[&str] = &["==", "!="];

pub struct Compare;

impl Compare {
    pub const PORT_A: &'static str = "a";
    pub const PORT_B: &'static str = "b";
    pub const PORT_OPERATOR: &'static str = "operator";
    pub const PORT_RESULT: &'static str = "result";

    pub fn create() -> Arc<dyn Node> {
        Arc::new(Self)
    }

    /// Value kinds that can be compared at all
    fn comparable() -> Constraints {
        Some(vec![
            TypeConstraint::String,
            TypeConstraint::integer(),
            TypeConstraint::float(),
            TypeConstraint::Boolean,
        ])
    }

    /// Operand type as seen from both connections
    fn operand(view: &NodeView<'_>) -> Constraints {
        let a = intersect(&Self::comparable(), &view.peer_constraints(Self::PORT_A));
        intersect(&a, &view.peer_constraints(Self::PORT_B))
    }
}

/// Operators offered for a resolved operand kind
pub fn operators_for(kind: ConstraintKind) -> &'static [&'static str] {
    match kind {
        ConstraintKind::Integer | ConstraintKind::Float => NUMERIC_OPERATORS,
        ConstraintKind::String => STRING_OPERATORS,
        ConstraintKind::Boolean => BOOLEAN_OPERATORS,
        _ => &[],
    }
}

fn equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Apply `operator`; `None` when it does not fit the operands
pub fn evaluate(operator: &str, a: &Value, b: &Value) -> Option<bool> {
    match operator {
        "==" => Some(equal(a, b)),
        "!=" => Some(!equal(a, b)),
        "<" | "<=" | ">" | ">=" => {
            let (x, y) = (a.as_f64()?, b.as_f64()?);
            Some(match operator {
                "<" => x < y,
                "<=" => x <= y,
                ">" => x > y,
                _ => x >= y,
            })
        }
        "contains" => Some(a.as_str()?.contains(b.as_str()?)),
        "starts_with" => Some(a.as_str()?.starts_with(b.as_str()?)),
        "ends_with" => Some(a.as_str()?.ends_with(b.as_str()?)),
        _ => None,
    }
}

#[async_trait]
impl Node for Compare {
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::new("Compare").tags(["control", "logic"])
    }

    fn description(&self) -> String {
        "Compares two values of the same type".to_string()
    }

    fn resolve_pads(&self, view: &NodeView<'_>) -> Result<Vec<PadSpec>> {
        let operand = Self::operand(view);
        let options = single(&operand)
            .map(|c| operators_for(c.kind()))
            .unwrap_or(&[]);

        let mut operator = PadSpec::property_sink(
            Self::PORT_OPERATOR,
            Some(vec![TypeConstraint::enumeration(options.iter().copied())]),
        );
        if let Some(first) = options.first() {
            operator = operator.with_default(json!(first));
        }

        Ok(vec![
            // Each side accepts what the other side is fed
            PadSpec::stateless_sink(
                Self::PORT_A,
                intersect(&Self::comparable(), &view.peer_constraints(Self::PORT_B)),
            ),
            PadSpec::stateless_sink(
                Self::PORT_B,
                intersect(&Self::comparable(), &view.peer_constraints(Self::PORT_A)),
            ),
            operator,
            PadSpec::stateless_source(Self::PORT_RESULT, Some(vec![TypeConstraint::Boolean])),
        ])
    }

    async fn run(&self, mut io: NodeIo) -> Result<()> {
        let result = io.source(Self::PORT_RESULT)?;
        let operands = vec![io.take_sink(Self::PORT_A)?, io.take_sink(Self::PORT_B)?];

        let mut background = JoinSet::new();
        background.spawn(io.take_sink(Self::PORT_OPERATOR)?.drain());

        let mut latest: [Option<Value>; 2] = [None, None];
        let (mut items, _readers) = merge_sinks(operands);
        while let Some((index, item)) = items.recv().await {
            latest[index] = Some(item.value);

            if let [Some(a), Some(b)] = &latest {
                let operator = io.property_as::<String>(Self::PORT_OPERATOR).ok().flatten();
                match operator.as_deref().and_then(|op| evaluate(op, a, b)) {
                    Some(outcome) => {
                        result.push_item(json!(outcome), &item.ctx);
                    }
                    None => log::debug!(
                        "{}: cannot compare {} and {} with {:?}",
                        io.node_id(),
                        a,
                        b,
                        operator
                    ),
                }
            }
            item.ctx.complete();
        }
        Ok(())
    }

    fn notes(&self, view: &NodeView<'_>) -> Vec<Note> {
        if single(&Self::operand(view)).is_some() {
            Vec::new()
        } else {
            vec![Note::error("operands must resolve to exactly one type").on_pad(Self::PORT_OPERATOR)]
        }
    }
}

inventory::submit!(padflow_engine::NodeFactory {
    node_type: "Compare",
    create: Compare::create,
});

#[cfg(test)]
mod tests {
    use super::*;
    use padflow_engine::PeerView;
    use std::collections::HashMap;

    fn view_with(a: Constraints) -> Vec<PadSpec> {
        let mut peers = HashMap::new();
        peers.insert(
            "a".to_string(),
            PeerView {
                connected: true,
                constraints: a,
            },
        );
        Compare.resolve_pads(&NodeView::new("c", &[], peers)).unwrap()
    }

    fn operator(pads: &[PadSpec]) -> &PadSpec {
        pads.iter().find(|p| p.id == "operator").unwrap()
    }

    #[test]
    fn test_disabled_until_resolved() {
        let pads = Compare.resolve_pads(&NodeView::new("c", &[], HashMap::new())).unwrap();
        let op = operator(&pads);
        assert_eq!(op.constraints, Some(vec![TypeConstraint::enumeration(Vec::<String>::new())]));
        assert_eq!(op.default_value, None);

        let notes = Compare.notes(&NodeView::new("c", &[], HashMap::new()));
        assert_eq!(notes[0].pad.as_deref(), Some("operator"));
    }

    #[test]
    fn test_operators_follow_operand_type() {
        let pads = view_with(Some(vec![TypeConstraint::String]));
        assert_eq!(
            operator(&pads).constraints,
            Some(vec![TypeConstraint::enumeration(STRING_OPERATORS.iter().copied())])
        );
        assert_eq!(operator(&pads).default_value, Some(json!("==")));

        // The other side is narrowed to the same type
        let b = pads.iter().find(|p| p.id == "b").unwrap();
        assert_eq!(b.constraints, Some(vec![TypeConstraint::String]));
    }

    #[test]
    fn test_unresolved_peer_keeps_compare_disabled() {
        let pads = view_with(None);
        assert_eq!(operator(&pads).default_value, None);
    }

    #[test]
    fn test_evaluate() {
        assert_eq!(evaluate("<", &json!(1), &json!(2.5)), Some(true));
        assert_eq!(evaluate("==", &json!(2), &json!(2.0)), Some(true));
        assert_eq!(evaluate("contains", &json!("padflow"), &json!("flow")), Some(true));
        assert_eq!(evaluate("<", &json!("a"), &json!("b")), None);
        assert_eq!(evaluate("??", &json!(1), &json!(1)), None);
    }
}
