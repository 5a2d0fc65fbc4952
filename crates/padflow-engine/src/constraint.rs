//! Type constraints for pads
//!
//! A pad's type is a list of permitted value shapes. Connecting two pads
//! intersects their lists; an empty intersection means the pads are
//! incompatible. `None` stands for "unconstrained" and is the identity of
//! the intersection.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A pad's effective constraint list. `None` accepts anything.
pub type Constraints = Option<Vec<TypeConstraint>>;

/// One permitted value shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TypeConstraint {
    String,
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    Float {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        maximum: Option<f64>,
    },
    Boolean,
    Enum {
        options: Vec<String>,
    },
    Audio,
    Video,
    AudioClip,
    VideoClip,
    #[serde(rename = "AVClip")]
    AvClip,
    ContextMessage,
    TextStream,
    Trigger,
    Object {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object_schema: Option<serde_json::Value>,
    },
    List {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_type_constraints: Option<Vec<TypeConstraint>>,
    },
    NodeReference {
        /// Allowed node types; empty allows any node
        #[serde(default)]
        node_types: Vec<String>,
    },
    Secret,
    Schema,
}

/// Discriminant of a [`TypeConstraint`], ordered for canonical output
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstraintKind {
    String,
    Integer,
    Float,
    Boolean,
    Enum,
    Audio,
    Video,
    AudioClip,
    VideoClip,
    AvClip,
    ContextMessage,
    TextStream,
    Trigger,
    Object,
    List,
    NodeReference,
    Secret,
    Schema,
}

impl TypeConstraint {
    /// Unbounded integer
    pub fn integer() -> Self {
        Self::Integer {
            minimum: None,
            maximum: None,
        }
    }

    /// Integer within `[minimum, maximum]`
    pub fn integer_range(minimum: Option<i64>, maximum: Option<i64>) -> Self {
        Self::Integer { minimum, maximum }
    }

    /// Unbounded float
    pub fn float() -> Self {
        Self::Float {
            minimum: None,
            maximum: None,
        }
    }

    /// Enum with the given options
    pub fn enumeration<I, S>(options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Enum {
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    /// List whose items satisfy `items`
    pub fn list(items: Constraints) -> Self {
        Self::List {
            item_type_constraints: items,
        }
    }

    pub fn kind(&self) -> ConstraintKind {
        match self {
            Self::String => ConstraintKind::String,
            Self::Integer { .. } => ConstraintKind::Integer,
            Self::Float { .. } => ConstraintKind::Float,
            Self::Boolean => ConstraintKind::Boolean,
            Self::Enum { .. } => ConstraintKind::Enum,
            Self::Audio => ConstraintKind::Audio,
            Self::Video => ConstraintKind::Video,
            Self::AudioClip => ConstraintKind::AudioClip,
            Self::VideoClip => ConstraintKind::VideoClip,
            Self::AvClip => ConstraintKind::AvClip,
            Self::ContextMessage => ConstraintKind::ContextMessage,
            Self::TextStream => ConstraintKind::TextStream,
            Self::Trigger => ConstraintKind::Trigger,
            Self::Object { .. } => ConstraintKind::Object,
            Self::List { .. } => ConstraintKind::List,
            Self::NodeReference { .. } => ConstraintKind::NodeReference,
            Self::Secret => ConstraintKind::Secret,
            Self::Schema => ConstraintKind::Schema,
        }
    }

    /// Intersect two variants. Returns `None` when kinds differ or the
    /// parameters leave nothing in common.
    pub fn intersect(&self, other: &TypeConstraint) -> Option<TypeConstraint> {
        if self.kind() != other.kind() {
            return None;
        }

        match (self, other) {
            (
                Self::Integer {
                    minimum: a_min,
                    maximum: a_max,
                },
                Self::Integer {
                    minimum: b_min,
                    maximum: b_max,
                },
            ) => {
                let minimum = tighter(*a_min, *b_min, |a, b| a.max(b));
                let maximum = tighter(*a_max, *b_max, |a, b| a.min(b));
                match (minimum, maximum) {
                    (Some(lo), Some(hi)) if lo > hi => None,
                    _ => Some(Self::Integer { minimum, maximum }),
                }
            }
            (
                Self::Float {
                    minimum: a_min,
                    maximum: a_max,
                },
                Self::Float {
                    minimum: b_min,
                    maximum: b_max,
                },
            ) => {
                let minimum = tighter(*a_min, *b_min, f64::max);
                let maximum = tighter(*a_max, *b_max, f64::min);
                match (minimum, maximum) {
                    (Some(lo), Some(hi)) if lo > hi => None,
                    _ => Some(Self::Float { minimum, maximum }),
                }
            }
            (Self::Enum { options: a }, Self::Enum { options: b }) => {
                let options: Vec<String> = a.iter().filter(|o| b.contains(o)).cloned().collect();
                if options.is_empty() {
                    None
                } else {
                    Some(Self::Enum { options })
                }
            }
            (
                Self::Object { object_schema: a },
                Self::Object { object_schema: b },
            ) => match (a, b) {
                (None, other) | (other, None) => Some(Self::Object {
                    object_schema: other.clone(),
                }),
                (Some(a), Some(b)) if a == b => Some(Self::Object {
                    object_schema: Some(a.clone()),
                }),
                _ => None,
            },
            (
                Self::List {
                    item_type_constraints: a,
                },
                Self::List {
                    item_type_constraints: b,
                },
            ) => {
                let items = intersect(a, b);
                if is_incompatible(&items) {
                    None
                } else {
                    Some(Self::List {
                        item_type_constraints: items,
                    })
                }
            }
            (Self::NodeReference { node_types: a }, Self::NodeReference { node_types: b }) => {
                if a.is_empty() {
                    return Some(Self::NodeReference {
                        node_types: b.clone(),
                    });
                }
                if b.is_empty() {
                    return Some(Self::NodeReference {
                        node_types: a.clone(),
                    });
                }
                let node_types: Vec<String> =
                    a.iter().filter(|t| b.contains(t)).cloned().collect();
                if node_types.is_empty() {
                    None
                } else {
                    Some(Self::NodeReference { node_types })
                }
            }
            // Non-parametric kinds pass through unchanged
            _ => Some(self.clone()),
        }
    }

    /// Whether a concrete value has this shape.
    ///
    /// `null` is accepted everywhere (unset property). Media kinds carry
    /// opaque payloads and accept any value.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        if value.is_null() {
            return true;
        }

        match self {
            Self::String | Self::Secret => value.is_string(),
            Self::Integer { minimum, maximum } => match value.as_i64() {
                Some(v) => minimum.map_or(true, |m| v >= m) && maximum.map_or(true, |m| v <= m),
                None => false,
            },
            Self::Float { minimum, maximum } => match value.as_f64() {
                Some(v) => minimum.map_or(true, |m| v >= m) && maximum.map_or(true, |m| v <= m),
                None => false,
            },
            Self::Boolean => value.is_boolean(),
            Self::Enum { options } => value
                .as_str()
                .map(|s| options.iter().any(|o| o == s))
                .unwrap_or(false),
            Self::Object { .. } | Self::Schema => value.is_object(),
            Self::List {
                item_type_constraints,
            } => match value {
                Value::Array(items) => items
                    .iter()
                    .all(|item| accepts_value(item_type_constraints, item)),
                _ => false,
            },
            Self::NodeReference { .. } => value.is_string(),
            Self::Trigger => true,
            Self::Audio
            | Self::Video
            | Self::AudioClip
            | Self::VideoClip
            | Self::AvClip
            | Self::ContextMessage
            | Self::TextStream => true,
        }
    }
}

impl fmt::Display for TypeConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer { minimum, maximum } => {
                write!(f, "Integer[{}, {}]", bound(minimum), bound(maximum))
            }
            Self::Float { minimum, maximum } => {
                write!(f, "Float[{}, {}]", bound(minimum), bound(maximum))
            }
            Self::Enum { options } => write!(f, "Enum[{}]", options.join(", ")),
            Self::List {
                item_type_constraints,
            } => write!(f, "List<{}>", describe(item_type_constraints)),
            Self::NodeReference { node_types } if !node_types.is_empty() => {
                write!(f, "NodeReference[{}]", node_types.join(", "))
            }
            other => write!(f, "{:?}", other.kind()),
        }
    }
}

fn bound<T: fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "*".to_string())
}

fn tighter<T: Copy>(a: Option<T>, b: Option<T>, pick: impl Fn(T, T) -> T) -> Option<T> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Intersect two constraint lists.
///
/// `None` on either side yields the other side unchanged. Otherwise each
/// pair of same-kind variants is intersected and the survivors are returned
/// in canonical kind order. Parametric results (enum options, node types)
/// keep the ordering of `a`.
pub fn intersect(a: &Constraints, b: &Constraints) -> Constraints {
    match (a, b) {
        (None, None) => None,
        (None, Some(other)) | (Some(other), None) => Some(other.clone()),
        (Some(a), Some(b)) => {
            let mut out = Vec::new();
            for x in a {
                for y in b {
                    if let Some(c) = x.intersect(y) {
                        out.push(c);
                    }
                }
            }
            Some(canonicalize(out))
        }
    }
}

/// Sort by kind (then by rendering) and drop exact duplicates
pub fn canonicalize(mut list: Vec<TypeConstraint>) -> Vec<TypeConstraint> {
    list.sort_by(|a, b| match a.kind().cmp(&b.kind()) {
        Ordering::Equal => format!("{:?}", a).cmp(&format!("{:?}", b)),
        other => other,
    });
    list.dedup();
    list
}

/// An empty list after intersection means no type satisfies both sides
pub fn is_incompatible(constraints: &Constraints) -> bool {
    matches!(constraints, Some(list) if list.is_empty())
}

/// The single resolved variant, if the list has exactly one entry
pub fn single(constraints: &Constraints) -> Option<&TypeConstraint> {
    match constraints {
        Some(list) if list.len() == 1 => list.first(),
        _ => None,
    }
}

/// Whether any variant of the list accepts `value` (always true when unconstrained)
pub fn accepts_value(constraints: &Constraints, value: &serde_json::Value) -> bool {
    match constraints {
        None => true,
        Some(list) => list.iter().any(|c| c.accepts(value)),
    }
}

/// Set-wise equality that ignores ordering
pub fn equivalent(a: &Constraints, b: &Constraints) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => canonicalize(a.clone()) == canonicalize(b.clone()),
        _ => false,
    }
}

/// Human-readable rendering for logs and notes
pub fn describe(constraints: &Constraints) -> String {
    match constraints {
        None => "Any".to_string(),
        Some(list) if list.is_empty() => "Nothing".to_string(),
        Some(list) => list
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(" | "),
    }
}
