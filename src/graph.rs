//! Dependency Graph - in-memory adjacency over stored relationships
//!
//! Analyses load the dependency edges once and traverse them by entity id, so a
//! traversal never re-queries the store per node and terminates on cyclic input via
//! explicit visited sets.

use std::collections::HashMap;

use crate::Result;
use crate::relationship::{Relationship, RelationshipType};
use crate::storage::{Database, RelationshipStore};

/// One end of a dependency edge as seen from the other end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub entity_id: String,
    pub rel_type: RelationshipType,
}

/// Dependency edges (calls, imports, extends, implements) keyed by entity id.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// source → targets
    outgoing: HashMap<String, Vec<Link>>,
    /// target → sources
    incoming: HashMap<String, Vec<Link>>,
    /// Every node in first-seen order
    nodes: Vec<String>,
    edges: usize,
}

impl DependencyGraph {
    /// Create a new empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every dependency edge from the store
    pub fn load(db: &Database) -> Result<Self> {
        let relationships =
            RelationshipStore::new(db).find_by_types(RelationshipType::dependencies())?;
        Ok(Self::from_relationships(relationships))
    }

    /// Build from relationships, skipping structural ones
    pub fn from_relationships(relationships: impl IntoIterator<Item = Relationship>) -> Self {
        let mut graph = Self::new();
        for rel in relationships {
            graph.add_edge(&rel.source_id, &rel.target_id, rel.rel_type);
        }
        graph
    }

    /// Add an edge. `contains` edges are ignored.
    pub fn add_edge(&mut self, source_id: &str, target_id: &str, rel_type: RelationshipType) {
        if !rel_type.is_dependency() {
            return;
        }

        for id in [source_id, target_id] {
            if !self.outgoing.contains_key(id) && !self.incoming.contains_key(id) {
                self.nodes.push(id.to_string());
            }
            // Reserve both maps so the first-seen check above stays accurate
            self.outgoing.entry(id.to_string()).or_default();
            self.incoming.entry(id.to_string()).or_default();
        }

        if let Some(links) = self.outgoing.get_mut(source_id) {
            links.push(Link {
                entity_id: target_id.to_string(),
                rel_type,
            });
        }
        if let Some(links) = self.incoming.get_mut(target_id) {
            links.push(Link {
                entity_id: source_id.to_string(),
                rel_type,
            });
        }
        self.edges += 1;
    }

    /// Entities `id` depends on
    pub fn dependencies(&self, id: &str) -> &[Link] {
        self.outgoing.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Entities that depend on `id`
    pub fn dependents(&self, id: &str) -> &[Link] {
        self.incoming.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Nodes in first-seen order
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjacency_both_directions() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("a", "b", RelationshipType::Calls);
        graph.add_edge("c", "b", RelationshipType::Imports);

        assert_eq!(graph.dependencies("a").len(), 1);
        assert_eq!(graph.dependents("b").len(), 2);
        assert_eq!(graph.dependents("b")[1].entity_id, "c");
        assert!(graph.dependencies("missing").is_empty());
        assert_eq!(graph.nodes(), ["a", "b", "c"]);
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn test_contains_is_skipped() {
        let mut graph = DependencyGraph::new();
        graph.add_edge("class", "method", RelationshipType::Contains);
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.edge_count(), 0);
    }
}
