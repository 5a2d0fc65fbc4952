//! Pad identities and structural pad state
//!
//! Pads are addressed by `(node, pad)` pairs. Connection adjacency is kept
//! by the graph, never inside the pads themselves.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constraint::{accepts_value, Constraints};

/// Address of a pad inside a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PadRef {
    pub node: String,
    pub pad: String,
}

impl PadRef {
    pub fn new(node: impl Into<String>, pad: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            pad: pad.into(),
        }
    }
}

impl fmt::Display for PadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.pad)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadDirection {
    /// Produces items; may fan out to many sinks
    Source,
    /// Consumes items; at most one upstream source
    Sink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadKind {
    /// Transient items only
    Stateless,
    /// Retains its current value across items
    Property,
}

/// Combined direction and kind, as written in snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PadType {
    PropertySource,
    PropertySink,
    StatelessSource,
    StatelessSink,
}

impl PadType {
    pub fn new(direction: PadDirection, kind: PadKind) -> Self {
        match (direction, kind) {
            (PadDirection::Source, PadKind::Property) => Self::PropertySource,
            (PadDirection::Sink, PadKind::Property) => Self::PropertySink,
            (PadDirection::Source, PadKind::Stateless) => Self::StatelessSource,
            (PadDirection::Sink, PadKind::Stateless) => Self::StatelessSink,
        }
    }

    pub fn direction(&self) -> PadDirection {
        match self {
            Self::PropertySource | Self::StatelessSource => PadDirection::Source,
            Self::PropertySink | Self::StatelessSink => PadDirection::Sink,
        }
    }

    pub fn kind(&self) -> PadKind {
        match self {
            Self::PropertySource | Self::PropertySink => PadKind::Property,
            Self::StatelessSource | Self::StatelessSink => PadKind::Stateless,
        }
    }

    pub fn is_source(&self) -> bool {
        self.direction() == PadDirection::Source
    }

    pub fn is_property(&self) -> bool {
        self.kind() == PadKind::Property
    }
}

/// A pad as declared by its node's `resolve_pads`
///
/// # Example
///
/// ```ignore
/// let spec = PadSpec::property_sink("num_inputs", Some(vec![TypeConstraint::integer_range(Some(1), Some(16))]))
///     .with_default(serde_json::json!(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct PadSpec {
    pub id: String,
    pub group: Option<String>,
    pub pad_type: PadType,
    pub constraints: Constraints,
    /// Initial value for newly created property pads
    pub default_value: Option<Value>,
    /// Aliased pad for proxies; the proxy's value mirrors `default_value`
    pub proxy: Option<PadRef>,
}

impl PadSpec {
    pub fn new(id: impl Into<String>, pad_type: PadType, constraints: Constraints) -> Self {
        Self {
            id: id.into(),
            group: None,
            pad_type,
            constraints,
            default_value: None,
            proxy: None,
        }
    }

    pub fn property_source(id: impl Into<String>, constraints: Constraints) -> Self {
        Self::new(id, PadType::PropertySource, constraints)
    }

    pub fn property_sink(id: impl Into<String>, constraints: Constraints) -> Self {
        Self::new(id, PadType::PropertySink, constraints)
    }

    pub fn stateless_source(id: impl Into<String>, constraints: Constraints) -> Self {
        Self::new(id, PadType::StatelessSource, constraints)
    }

    pub fn stateless_sink(id: impl Into<String>, constraints: Constraints) -> Self {
        Self::new(id, PadType::StatelessSink, constraints)
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub(crate) fn proxy_for(mut self, target: PadRef, value: Option<Value>) -> Self {
        self.proxy = Some(target);
        self.default_value = value;
        self
    }
}

/// Structural state of one pad inside a graph
#[derive(Debug, Clone, PartialEq)]
pub struct PadState {
    pub id: String,
    pub group: Option<String>,
    pub pad_type: PadType,
    /// Constraints declared by the owning node
    pub declared: Constraints,
    /// Declared constraints narrowed by every connection
    pub effective: Constraints,
    /// Retained value; always `None` for stateless pads
    pub value: Option<Value>,
    pub proxy: Option<PadRef>,
}

impl PadState {
    pub fn from_spec(spec: PadSpec) -> Self {
        let value = if spec.pad_type.is_property() {
            spec.default_value
        } else {
            None
        };
        Self {
            id: spec.id,
            group: spec.group,
            pad_type: spec.pad_type,
            effective: spec.constraints.clone(),
            declared: spec.constraints,
            value,
            proxy: spec.proxy,
        }
    }

    /// Merge a freshly declared spec into this pad.
    ///
    /// Existing property values survive unless the pad was stateless or the
    /// new declaration rejects them. Proxies always mirror their target.
    pub(crate) fn merge_spec(&self, spec: PadSpec) -> Self {
        let value = if !spec.pad_type.is_property() {
            None
        } else if spec.proxy.is_some() {
            spec.default_value.clone()
        } else if !self.is_property() {
            spec.default_value.clone()
        } else {
            match &self.value {
                Some(value) if !accepts_value(&spec.constraints, value) => {
                    log::debug!(
                        "Pad '{}' value {} no longer fits its declaration; resetting",
                        self.id,
                        value
                    );
                    spec.default_value.clone()
                }
                Some(value) => Some(value.clone()),
                None => spec.default_value.clone(),
            }
        };

        Self {
            id: spec.id,
            group: spec.group,
            pad_type: spec.pad_type,
            effective: spec.constraints.clone(),
            declared: spec.constraints,
            value,
            proxy: spec.proxy,
        }
    }

    pub fn direction(&self) -> PadDirection {
        self.pad_type.direction()
    }

    pub fn kind(&self) -> PadKind {
        self.pad_type.kind()
    }

    pub fn is_source(&self) -> bool {
        self.pad_type.is_source()
    }

    pub fn is_property(&self) -> bool {
        self.pad_type.is_property()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::TypeConstraint;
    use serde_json::json;

    #[test]
    fn test_pad_type_roundtrip() {
        for pad_type in [
            PadType::PropertySource,
            PadType::PropertySink,
            PadType::StatelessSource,
            PadType::StatelessSink,
        ] {
            assert_eq!(PadType::new(pad_type.direction(), pad_type.kind()), pad_type);
        }
        assert_eq!(
            serde_json::to_value(PadType::PropertySink).unwrap(),
            json!("property_sink")
        );
    }

    #[test]
    fn test_from_spec_drops_stateless_defaults() {
        let pad = PadState::from_spec(PadSpec::stateless_sink("input", None).with_default(json!(1)));
        assert_eq!(pad.value, None);

        let pad = PadState::from_spec(PadSpec::property_sink("count", None).with_default(json!(1)));
        assert_eq!(pad.value, Some(json!(1)));
    }

    #[test]
    fn test_merge_keeps_existing_value() {
        let spec = PadSpec::property_sink("count", Some(vec![TypeConstraint::integer()]))
            .with_default(json!(1));
        let mut pad = PadState::from_spec(spec.clone());
        pad.value = Some(json!(7));

        let merged = pad.merge_spec(spec);
        assert_eq!(merged.value, Some(json!(7)));
    }

    #[test]
    fn test_merge_resets_rejected_value() {
        let mut pad = PadState::from_spec(
            PadSpec::property_sink("op", Some(vec![TypeConstraint::enumeration(["<", ">"])]))
                .with_default(json!("<")),
        );
        pad.value = Some(json!(">"));

        let narrowed =
            PadSpec::property_sink("op", Some(vec![TypeConstraint::enumeration(["==", "<"])]))
                .with_default(json!("=="));
        assert_eq!(pad.merge_spec(narrowed).value, Some(json!("==")));
    }

    #[test]
    fn test_pad_ref_display() {
        assert_eq!(PadRef::new("join_1", "input_0").to_string(), "join_1.input_0");
    }
}
