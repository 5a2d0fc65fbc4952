//! Input nodes
//!
//! Nodes that hold constants or generate items on their own.

mod properties;
mod ticker;

pub use properties::{BooleanProperty, FloatProperty, IntegerProperty, StringProperty};
pub use ticker::Ticker;
