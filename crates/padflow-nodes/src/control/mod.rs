//! Control nodes
//!
//! Nodes that route, combine or compare items.

mod compare;
mod gate;
mod join;
mod passthrough;

pub use compare::Compare;
pub use gate::Gate;
pub use join::Join;
pub use passthrough::Passthrough;
