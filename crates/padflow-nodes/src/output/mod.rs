//! Output nodes
//!
//! Nodes that retain or report results.

mod display;

pub use display::Display;
