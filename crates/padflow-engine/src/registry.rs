//! Node library: maps node type names to factories
//!
//! Plugins register themselves at link time:
//!
//! ```ignore
//! inventory::submit!(padflow_engine::NodeFactory {
//!     node_type: "Passthrough",
//!     create: Passthrough::create,
//! });
//! ```
//!
//! `NodeLibrary::with_builtins()` collects every submitted factory. Hosts
//! and tests can add more with `register`.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PadflowError, Result};
use crate::node::{Node, NodeMetadata};
use crate::subgraph::{SubgraphRepository, SUBGRAPH_NODE_TYPE};

/// Link-time registration of a node type.
pub struct NodeFactory {
    /// Type name used in snapshots and `insert_node` edits
    pub node_type: &'static str,
    /// Creates a fresh node instance
    pub create: fn() -> Arc<dyn Node>,
}

inventory::collect!(NodeFactory);

type Constructor = Arc<dyn Fn() -> Arc<dyn Node> + Send + Sync>;

/// One node type as listed to editors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryEntry {
    pub node_type: String,
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub description: String,
}

/// Registry of instantiable node types
#[derive(Clone, Default)]
pub struct NodeLibrary {
    constructors: BTreeMap<String, Constructor>,
    subgraphs: Option<Arc<dyn SubgraphRepository>>,
}

impl NodeLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Library holding every factory submitted through `inventory`
    pub fn with_builtins() -> Self {
        let mut library = Self::new();
        for factory in inventory::iter::<NodeFactory> {
            if library.contains(factory.node_type) {
                log::warn!("Node type '{}' registered twice; keeping the first", factory.node_type);
                continue;
            }
            let create = factory.create;
            library.register(factory.node_type, move || create());
        }
        log::debug!("Collected {} built-in node types", library.constructors.len());
        library
    }

    /// Register a node type, replacing any previous registration
    pub fn register<F>(&mut self, node_type: impl Into<String>, create: F)
    where
        F: Fn() -> Arc<dyn Node> + Send + Sync + 'static,
    {
        self.constructors.insert(node_type.into(), Arc::new(create));
    }

    /// Attach the repository consulted by `insert_subgraph`
    pub fn with_subgraph_repository(mut self, repository: Arc<dyn SubgraphRepository>) -> Self {
        self.subgraphs = Some(repository);
        self
    }

    pub fn subgraph_repository(&self) -> Option<&Arc<dyn SubgraphRepository>> {
        self.subgraphs.as_ref()
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.constructors.contains_key(node_type)
    }

    /// Instantiate a node of the given type
    pub fn create(&self, node_type: &str) -> Result<Arc<dyn Node>> {
        if node_type == SUBGRAPH_NODE_TYPE {
            return Err(PadflowError::SubgraphNotFound(format!(
                "'{}' nodes need a subgraph definition",
                SUBGRAPH_NODE_TYPE
            )));
        }
        self.constructors
            .get(node_type)
            .map(|create| create())
            .ok_or_else(|| PadflowError::UnknownNodeType(node_type.to_string()))
    }

    pub fn node_types(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Metadata and description of every registered type, sorted by name
    pub fn entries(&self) -> Vec<LibraryEntry> {
        self.constructors
            .iter()
            .map(|(node_type, create)| {
                let node = create();
                LibraryEntry {
                    node_type: node_type.clone(),
                    metadata: node.metadata(),
                    description: node.description(),
                }
            })
            .collect()
    }

    /// Merge another library into this one; entries from `other` win
    pub fn merge(&mut self, other: NodeLibrary) {
        self.constructors.extend(other.constructors);
        if other.subgraphs.is_some() {
            self.subgraphs = other.subgraphs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Constant, Relay};

    #[test]
    fn test_register_and_create() {
        let mut library = NodeLibrary::new();
        library.register("Constant", || Arc::new(Constant));

        assert!(library.contains("Constant"));
        assert!(library.create("Constant").is_ok());
        assert!(matches!(
            library.create("Missing"),
            Err(PadflowError::UnknownNodeType(_))
        ));
    }

    #[test]
    fn test_subgraph_type_is_not_constructible() {
        let library = NodeLibrary::new();
        assert!(library.create(SUBGRAPH_NODE_TYPE).is_err());
    }

    #[test]
    fn test_entries_sorted_with_metadata() {
        let mut library = NodeLibrary::new();
        library.register("Relay", || Arc::new(Relay));
        library.register("Constant", || Arc::new(Constant));

        let entries = library.entries();
        let types: Vec<_> = entries.iter().map(|e| e.node_type.as_str()).collect();
        assert_eq!(types, vec!["Constant", "Relay"]);
        assert_eq!(entries[0].metadata.primary, "Constant");
    }

    #[test]
    fn test_merge_override() {
        let mut first = NodeLibrary::new();
        first.register("Node", || Arc::new(Constant));

        let mut second = NodeLibrary::new();
        second.register("Node", || Arc::new(Relay));
        second.register("Other", || Arc::new(Relay));

        first.merge(second);
        assert_eq!(first.node_types(), vec!["Node", "Other"]);
        assert_eq!(first.entries()[0].metadata.primary, "Relay");
    }
}
