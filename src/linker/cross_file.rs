use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use crate::Result;
use crate::entity::{Entity, NewEntity};
use crate::relationship::{ExtractedRelationship, NewRelationship, Relationship};
use crate::storage::{Database, EntityStore, RelationshipStore};

/// Two entities claimed the same `(file, name)` key; the later one won
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NameCollision {
    pub file_path: String,
    pub name: String,
    pub shadowed_id: String,
    pub winner_id: String,
}

/// Outcome of one resolver batch
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    /// Relationships whose endpoints both resolved
    pub resolved: usize,
    /// Resolved relationships that already existed
    pub duplicates: usize,
    /// Relationships dropped because an endpoint did not resolve
    pub dropped: usize,
    pub collisions: Vec<NameCollision>,
}

impl fmt::Display for ResolutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Cross-File Resolver:")?;
        writeln!(f, "  Entities inserted: {}", self.entities.len())?;
        writeln!(f, "  Relationships resolved: {}", self.resolved)?;
        writeln!(f, "  Relationships inserted: {}", self.relationships.len())?;
        writeln!(f, "  Duplicates ignored: {}", self.duplicates)?;
        writeln!(f, "  Unresolved (dropped): {}", self.dropped)?;
        writeln!(f, "  Name collisions: {}", self.collisions.len())
    }
}

/// `file path → (name → entity id)` lookup table
#[derive(Debug, Default)]
pub struct EntityCache {
    by_file: HashMap<String, HashMap<String, String>>,
}

impl EntityCache {
    /// Build the cache from every stored entity, in insertion order
    pub fn load(db: &Database) -> Result<Self> {
        let mut cache = Self::default();
        let mut stmt = db
            .conn()
            .prepare_cached("SELECT id, name, file_path FROM entities ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        for row in rows {
            let (id, name, file_path) = row?;
            cache.insert(file_path, name, id);
        }
        Ok(cache)
    }

    /// Cache an entity. Returns the id it displaced, if any.
    pub fn insert(&mut self, file_path: String, name: String, id: String) -> Option<String> {
        self.by_file.entry(file_path).or_default().insert(name, id)
    }

    /// Resolve a name within a file. An unknown file never resolves.
    pub fn lookup(&self, file_path: Option<&str>, name: &str) -> Option<&str> {
        self.by_file
            .get(file_path?)
            .and_then(|names| names.get(name))
            .map(String::as_str)
    }

    pub fn files(&self) -> usize {
        self.by_file.len()
    }
}

/// Turns name-addressed relationships into id-addressed graph edges.
pub struct CrossFileResolver<'a> {
    db: &'a Database,
}

impl<'a> CrossFileResolver<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert `entities` and the resolvable subset of `relationships` in one transaction.
    ///
    /// Endpoints are looked up by `(file path, name)`: first among stored entities, then
    /// among the entities of this batch, the most recently inserted one winning. A
    /// relationship with an endpoint that does not resolve is dropped, not an error.
    pub fn resolve(
        &self,
        entities: &[NewEntity],
        relationships: &[ExtractedRelationship],
    ) -> Result<ResolutionReport> {
        self.db
            .transaction(|| self.resolve_in_transaction(entities, relationships))
            .map_err(|e| {
                crate::Error::in_transaction(
                    format!(
                        "resolver batch of {} entities, {} relationships",
                        entities.len(),
                        relationships.len()
                    ),
                    e,
                )
            })
    }

    fn resolve_in_transaction(
        &self,
        entities: &[NewEntity],
        relationships: &[ExtractedRelationship],
    ) -> Result<ResolutionReport> {
        let mut report = ResolutionReport::default();

        // --- Step 1: Pre-load ---
        let mut cache = EntityCache::load(self.db)?;
        tracing::debug!("Resolver cache covers {} files", cache.files());

        // --- Step 2: Insert entities, caching each ---
        let inserted = EntityStore::new(self.db).create_batch(entities)?;
        for entity in &inserted {
            if let Some(shadowed) =
                cache.insert(entity.file_path.clone(), entity.name.clone(), entity.id.clone())
            {
                tracing::warn!(
                    "Name collision: '{}' in {} defined more than once, resolving to the latest",
                    entity.name,
                    entity.file_path
                );
                report.collisions.push(NameCollision {
                    file_path: entity.file_path.clone(),
                    name: entity.name.clone(),
                    shadowed_id: shadowed,
                    winner_id: entity.id.clone(),
                });
            }
        }
        report.entities = inserted;

        // --- Step 3: Resolve endpoints ---
        let mut pending = Vec::with_capacity(relationships.len());
        for rel in relationships {
            let source = cache.lookup(rel.source_file_path.as_deref(), &rel.source_name);
            let target = cache.lookup(rel.target_file_path.as_deref(), &rel.target_name);

            match (source, target) {
                (Some(source_id), Some(target_id)) => {
                    let mut new = NewRelationship::new(source_id, target_id, rel.rel_type);
                    new.metadata = rel.metadata.clone();
                    pending.push(new);
                }
                _ => {
                    tracing::trace!(
                        "Dropping unresolved {} {} -> {}",
                        rel.rel_type,
                        rel.source_name,
                        rel.target_name
                    );
                    report.dropped += 1;
                }
            }
        }
        report.resolved = pending.len();

        // --- Step 4: Insert edges, duplicates ignored ---
        let created = RelationshipStore::new(self.db).create_batch(&pending)?;
        report.duplicates = pending.len() - created.len();
        report.relationships = created;

        Ok(report)
    }
}
