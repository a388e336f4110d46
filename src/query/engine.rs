//! Query engine implementation
//!
//! Provides read-only query operations:
//! - Entity lookup (by name pattern, by file)
//! - Call graph lookups (what calls / what does it call)
//! - Graph statistics
//!
//! The graph analyses (blast radius, cycles, dead code) live in sibling modules and
//! extend [`QueryEngine`] with their own `impl` blocks.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::Result;
use crate::entity::{Entity, EntityType};
use crate::relationship::{Relationship, RelationshipType};
use crate::storage::{Database, EntityStore, FileLedger, RelationshipStore};

/// Query engine for code intelligence operations
pub struct QueryEngine<'a> {
    pub(crate) db: &'a Database,
}

impl<'a> QueryEngine<'a> {
    /// Create a new query engine
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub(crate) fn entities(&self) -> EntityStore<'a> {
        EntityStore::new(self.db)
    }

    pub(crate) fn relationships(&self) -> RelationshipStore<'a> {
        RelationshipStore::new(self.db)
    }

    /// Entities that call any entity named `name`
    pub fn what_calls(&self, name: &str) -> Result<Vec<Entity>> {
        self.db.snapshot(|| {
            self.traverse_calls(name, TraversalDirection::Incoming)
        })
    }

    /// Entities called by any entity named `name`
    pub fn what_does_call(&self, name: &str) -> Result<Vec<Entity>> {
        self.db.snapshot(|| {
            self.traverse_calls(name, TraversalDirection::Outgoing)
        })
    }

    fn traverse_calls(&self, name: &str, direction: TraversalDirection) -> Result<Vec<Entity>> {
        let entities = self.entities();
        let relationships = self.relationships();
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for start in entities.find_by_name(name)? {
            let edges: Vec<Relationship> = match direction {
                TraversalDirection::Outgoing => relationships.find_by_source(&start.id)?,
                TraversalDirection::Incoming => relationships.find_by_target(&start.id)?,
            };

            for edge in edges.iter().filter(|e| e.rel_type == RelationshipType::Calls) {
                let next_id = match direction {
                    TraversalDirection::Outgoing => &edge.target_id,
                    TraversalDirection::Incoming => &edge.source_id,
                };
                if seen.insert(next_id.clone()) {
                    if let Some(entity) = entities.find_by_id(next_id)? {
                        results.push(entity);
                    }
                }
            }
        }

        Ok(results)
    }

    /// Entities of a file, optionally restricted to one type
    pub fn list_file_entities(
        &self,
        file_path: &str,
        entity_type: Option<EntityType>,
    ) -> Result<Vec<Entity>> {
        let entities = self.entities().find_by_file(file_path)?;
        Ok(match entity_type {
            Some(kind) => entities.into_iter().filter(|e| e.entity_type == kind).collect(),
            None => entities,
        })
    }

    /// Entities whose name contains `pattern`
    pub fn find_entities(&self, pattern: &str, limit: usize) -> Result<Vec<Entity>> {
        self.entities().search_by_name(pattern, limit)
    }

    /// Get statistics about the stored graph
    pub fn stats(&self) -> Result<GraphStats> {
        self.db.snapshot(|| {
            let entities = self.entities();
            let relationships = self.relationships();
            Ok(GraphStats {
                entities: entities.count()?,
                relationships: relationships.count()?,
                files: FileLedger::new(self.db).count()?,
                entities_by_type: entities.count_by_type()?,
                relationships_by_type: relationships.count_by_type()?,
            })
        })
    }
}

/// Direction for edge traversal
#[derive(Debug, Clone, Copy)]
enum TraversalDirection {
    Outgoing,
    Incoming,
}

/// Statistics about the stored graph
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub entities: usize,
    pub relationships: usize,
    pub files: usize,
    pub entities_by_type: BTreeMap<EntityType, usize>,
    pub relationships_by_type: BTreeMap<RelationshipType, usize>,
}

impl std::fmt::Display for GraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Code Graph Statistics:")?;
        writeln!(f, "  Files: {}", self.files)?;
        writeln!(f, "  Entities: {}", self.entities)?;
        for (kind, count) in &self.entities_by_type {
            writeln!(f, "    {}: {}", kind, count)?;
        }
        writeln!(f, "  Relationships: {}", self.relationships)?;
        for (kind, count) in &self.relationships_by_type {
            writeln!(f, "    {}: {}", kind, count)?;
        }
        Ok(())
    }
}
