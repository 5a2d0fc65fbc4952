//! Padflow Nodes
//!
//! Built-in node plugins for the padflow engine.
//! Each node registers itself at link time. Build the library with
//! [`library()`]: it names every factory, so the crate is linked and the
//! registrations are collected even when nothing else references it.
//!
//! # Categories
//!
//! - **Input**: property constants and periodic triggers
//! - **Control**: nodes that route, combine or compare items
//! - **Output**: nodes that retain or report results

pub mod control;
pub mod input;
pub mod output;

mod fanin;

// Re-export all nodes for convenience
pub use control::*;
pub use input::*;
pub use output::*;

use std::sync::Arc;

use padflow_engine::{Node, NodeLibrary};

const BUILTINS: &[(&str, fn() -> Arc<dyn Node>)] = &[
    ("StringProperty", StringProperty::create),
    ("IntegerProperty", IntegerProperty::create),
    ("FloatProperty", FloatProperty::create),
    ("BooleanProperty", BooleanProperty::create),
    ("Ticker", Ticker::create),
    ("Passthrough", Passthrough::create),
    ("Join", Join::create),
    ("Compare", Compare::create),
    ("Gate", Gate::create),
    ("Display", Display::create),
];

/// Library of every built-in node type plus anything else submitted
/// through `inventory`
pub fn library() -> NodeLibrary {
    let mut library = NodeLibrary::with_builtins();
    for (node_type, create) in BUILTINS {
        if !library.contains(node_type) {
            log::debug!("Registering '{}' explicitly", node_type);
            library.register(*node_type, *create);
        }
    }
    library
}

#[cfg(test)]
mod tests {
    use padflow_engine::NodeLibrary;

    #[test]
    fn test_inventory_collects_all_builtins() {
        let library = NodeLibrary::with_builtins();
        assert_eq!(library.node_types().len(), 10, "Expected 10 built-in nodes");
        assert_eq!(super::library().node_types(), library.node_types());

        // Spot-check known types
        assert!(library.contains("StringProperty"));
        assert!(library.contains("IntegerProperty"));
        assert!(library.contains("Passthrough"));
        assert!(library.contains("Join"));
        assert!(library.contains("Compare"));
        assert!(library.contains("Ticker"));
    }

    #[test]
    fn test_entries_carry_descriptions() {
        let library = super::library();
        for entry in library.entries() {
            assert!(!entry.description.is_empty(), "{} has no description", entry.node_type);
        }
    }
}
