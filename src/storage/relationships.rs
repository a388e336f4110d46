//! Relationship store

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{Params, Row, params};
use uuid::Uuid;

use super::sqlite::{Database, constraint_error};
use crate::metadata;
use crate::relationship::{NewRelationship, Relationship, RelationshipType};
use crate::{Error, Result};

const RELATIONSHIP_COLUMNS: &str = "id, source_id, target_id, type, metadata, created_at";

const INSERT_RELATIONSHIP: &str = r#"
INSERT INTO relationships (id, source_id, target_id, type, metadata, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
"#;

const INSERT_RELATIONSHIP_IGNORE_DUPLICATE: &str = r#"
INSERT INTO relationships (id, source_id, target_id, type, metadata, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(source_id, target_id, type) DO NOTHING
"#;

/// CRUD and indexed lookups over the `relationships` table
pub struct RelationshipStore<'a> {
    db: &'a Database,
}

impl<'a> RelationshipStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert a relationship.
    ///
    /// Fails with [`Error::Constraint`] if either endpoint is missing or the
    /// `(source, target, type)` triple already exists.
    pub fn create(&self, new: &NewRelationship) -> Result<Relationship> {
        new.validate()?;
        let relationship = Self::materialize(new);
        self.execute_insert(INSERT_RELATIONSHIP, &relationship)
            .map_err(|e| {
                constraint_error(
                    e,
                    &format!(
                        "insert {} relationship {} -> {}",
                        new.rel_type, new.source_id, new.target_id
                    ),
                )
            })?;
        Ok(relationship)
    }

    /// Insert many relationships atomically, skipping triples that already exist.
    ///
    /// Returns only the relationships actually inserted. A missing endpoint still
    /// fails the whole batch.
    pub fn create_batch(&self, relationships: &[NewRelationship]) -> Result<Vec<Relationship>> {
        for new in relationships {
            new.validate()?;
        }

        self.db
            .transaction(|| {
                let mut created = Vec::with_capacity(relationships.len());
                for new in relationships {
                    let relationship = Self::materialize(new);
                    let inserted = self
                        .execute_insert(INSERT_RELATIONSHIP_IGNORE_DUPLICATE, &relationship)
                        .map_err(|e| {
                            constraint_error(
                                e,
                                &format!(
                                    "insert {} relationship {} -> {}",
                                    new.rel_type, new.source_id, new.target_id
                                ),
                            )
                        })?;
                    if inserted > 0 {
                        created.push(relationship);
                    }
                }
                Ok(created)
            })
            .map_err(|e| {
                Error::in_transaction(format!("relationship batch of {}", relationships.len()), e)
            })
    }

    fn materialize(new: &NewRelationship) -> Relationship {
        Relationship {
            id: Uuid::new_v4().to_string(),
            source_id: new.source_id.clone(),
            target_id: new.target_id.clone(),
            rel_type: new.rel_type,
            metadata: new.metadata.clone(),
            created_at: Utc::now(),
        }
    }

    fn execute_insert(&self, sql: &str, relationship: &Relationship) -> rusqlite::Result<usize> {
        let encoded = metadata::encode(relationship.metadata.as_ref())
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        self.db.conn().prepare_cached(sql)?.execute(params![
            relationship.id,
            relationship.source_id,
            relationship.target_id,
            relationship.rel_type.as_str(),
            encoded,
            relationship.created_at,
        ])
    }

    fn select<P: Params>(&self, clause: &str, params: P) -> Result<Vec<Relationship>> {
        let sql = format!("SELECT {} FROM relationships {}", RELATIONSHIP_COLUMNS, clause);
        let mut stmt = self.db.conn().prepare_cached(&sql)?;
        let relationships = stmt
            .query_map(params, relationship_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(relationships)
    }

    /// Get a relationship by id
    pub fn find_by_id(&self, id: &str) -> Result<Option<Relationship>> {
        Ok(self.select("WHERE id = ?1", [id])?.into_iter().next())
    }

    /// Outgoing relationships of an entity
    pub fn find_by_source(&self, source_id: &str) -> Result<Vec<Relationship>> {
        self.select("WHERE source_id = ?1 ORDER BY rowid", [source_id])
    }

    /// Incoming relationships of an entity
    pub fn find_by_target(&self, target_id: &str) -> Result<Vec<Relationship>> {
        self.select("WHERE target_id = ?1 ORDER BY rowid", [target_id])
    }

    /// Relationships of one type
    pub fn find_by_type(&self, rel_type: RelationshipType) -> Result<Vec<Relationship>> {
        self.select("WHERE type = ?1 ORDER BY rowid", [rel_type.as_str()])
    }

    /// Relationships of any of the given types
    pub fn find_by_types(&self, types: &[RelationshipType]) -> Result<Vec<Relationship>> {
        let mut relationships = Vec::new();
        for rel_type in types {
            relationships.extend(self.find_by_type(*rel_type)?);
        }
        Ok(relationships)
    }

    /// Relationships from `source_id` to `target_id` (this direction only)
    pub fn find_between(&self, source_id: &str, target_id: &str) -> Result<Vec<Relationship>> {
        self.select(
            "WHERE source_id = ?1 AND target_id = ?2 ORDER BY rowid",
            [source_id, target_id],
        )
    }

    /// Delete a relationship
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .db
            .conn()
            .execute("DELETE FROM relationships WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Delete every relationship where the entity is source or target
    pub fn delete_by_entity(&self, entity_id: &str) -> Result<usize> {
        let removed = self.db.conn().execute(
            "DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1",
            [entity_id],
        )?;
        Ok(removed)
    }

    /// Count all relationships
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM relationships", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Relationship counts for every type, absent types reported as 0
    pub fn count_by_type(&self) -> Result<BTreeMap<RelationshipType, usize>> {
        let mut counts: BTreeMap<RelationshipType, usize> =
            RelationshipType::all().iter().map(|t| (*t, 0)).collect();

        let mut stmt = self
            .db
            .conn()
            .prepare_cached("SELECT type, COUNT(*) FROM relationships GROUP BY type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            counts.insert(kind.parse()?, count as usize);
        }
        Ok(counts)
    }
}

fn relationship_from_row(row: &Row) -> rusqlite::Result<Relationship> {
    let id: String = row.get(0)?;
    let kind_str: String = row.get(3)?;
    let rel_type: RelationshipType = kind_str.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let metadata = metadata::decode(row.get(4)?, &format!("relationship {}", id));

    Ok(Relationship {
        id,
        source_id: row.get(1)?,
        target_id: row.get(2)?,
        rel_type,
        metadata,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityType, NewEntity};
    use crate::storage::EntityStore;

    fn entity(db: &Database, name: &str) -> Entity {
        EntityStore::new(db)
            .create(&NewEntity::new(EntityType::Function, name, "/src/main.ts", 1, 2, "typescript"))
            .unwrap()
    }

    #[test]
    fn test_relationship_crud() {
        let db = Database::open_in_memory().unwrap();
        let store = RelationshipStore::new(&db);
        let a = entity(&db, "a");
        let b = entity(&db, "b");

        let rel = store
            .create(&NewRelationship::new(&a.id, &b.id, RelationshipType::Calls))
            .unwrap();

        assert_eq!(store.find_by_id(&rel.id).unwrap().unwrap(), rel);
        assert_eq!(store.find_by_source(&a.id).unwrap().len(), 1);
        assert_eq!(store.find_by_target(&b.id).unwrap().len(), 1);
        assert_eq!(store.find_between(&a.id, &b.id).unwrap().len(), 1);
        assert!(store.find_between(&b.id, &a.id).unwrap().is_empty());
        assert_eq!(store.find_by_type(RelationshipType::Calls).unwrap().len(), 1);

        assert!(store.delete(&rel.id).unwrap());
        assert!(!store.delete(&rel.id).unwrap());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_strict_insert_rejects_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let store = RelationshipStore::new(&db);
        let a = entity(&db, "a");
        let b = entity(&db, "b");
        let new = NewRelationship::new(&a.id, &b.id, RelationshipType::Calls);

        store.create(&new).unwrap();
        assert!(matches!(store.create(&new), Err(Error::Constraint(_))));
        assert_eq!(store.count().unwrap(), 1);

        // Same pair, different type is a distinct edge
        store
            .create(&NewRelationship::new(&a.id, &b.id, RelationshipType::Imports))
            .unwrap();
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_strict_insert_rejects_missing_endpoint() {
        let db = Database::open_in_memory().unwrap();
        let store = RelationshipStore::new(&db);
        let a = entity(&db, "a");

        let err = store
            .create(&NewRelationship::new(&a.id, "missing", RelationshipType::Calls))
            .unwrap_err();
        assert!(matches!(err, Error::Constraint(_)));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_batch_ignores_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let store = RelationshipStore::new(&db);
        let a = entity(&db, "a");
        let b = entity(&db, "b");
        let c = entity(&db, "c");

        store
            .create(&NewRelationship::new(&a.id, &b.id, RelationshipType::Calls))
            .unwrap();

        let created = store
            .create_batch(&[
                NewRelationship::new(&a.id, &b.id, RelationshipType::Calls),
                NewRelationship::new(&b.id, &c.id, RelationshipType::Calls),
                NewRelationship::new(&b.id, &c.id, RelationshipType::Calls),
            ])
            .unwrap();

        assert_eq!(created.len(), 1);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_batch_with_missing_endpoint_writes_nothing() {
        let db = Database::open_in_memory().unwrap();
        let store = RelationshipStore::new(&db);
        let a = entity(&db, "a");
        let b = entity(&db, "b");

        let err = store
            .create_batch(&[
                NewRelationship::new(&a.id, &b.id, RelationshipType::Calls),
                NewRelationship::new(&a.id, "ghost", RelationshipType::Calls),
            ])
            .unwrap_err();

        assert!(matches!(err, Error::Transaction { .. }));
        assert!(err.is_constraint());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_entity_delete_cascades_both_directions() {
        let db = Database::open_in_memory().unwrap();
        let store = RelationshipStore::new(&db);
        let a = entity(&db, "a");
        let b = entity(&db, "b");
        let c = entity(&db, "c");

        store
            .create(&NewRelationship::new(&a.id, &b.id, RelationshipType::Calls))
            .unwrap();
        store
            .create(&NewRelationship::new(&b.id, &c.id, RelationshipType::Calls))
            .unwrap();
        store
            .create(&NewRelationship::new(&a.id, &c.id, RelationshipType::Calls))
            .unwrap();

        assert!(EntityStore::new(&db).delete(&b.id).unwrap());
        assert!(EntityStore::new(&db).find_by_id(&b.id).unwrap().is_none());
        assert!(store.find_by_source(&b.id).unwrap().is_empty());
        assert!(store.find_by_target(&b.id).unwrap().is_empty());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_by_entity() {
        let db = Database::open_in_memory().unwrap();
        let store = RelationshipStore::new(&db);
        let w = entity(&db, "w");
        let x = entity(&db, "x");
        let y = entity(&db, "y");

        store
            .create(&NewRelationship::new(&x.id, &y.id, RelationshipType::Calls))
            .unwrap();
        store
            .create(&NewRelationship::new(&w.id, &x.id, RelationshipType::Imports))
            .unwrap();

        assert_eq!(store.delete_by_entity(&x.id).unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_count_by_type_reports_every_type() {
        let db = Database::open_in_memory().unwrap();
        let store = RelationshipStore::new(&db);
        let a = entity(&db, "a");
        let b = entity(&db, "b");

        store
            .create(&NewRelationship::new(&a.id, &b.id, RelationshipType::Extends))
            .unwrap();

        let counts = store.count_by_type().unwrap();
        assert_eq!(counts.len(), RelationshipType::all().len());
        assert_eq!(counts[&RelationshipType::Extends], 1);
        assert_eq!(counts[&RelationshipType::Calls], 0);
    }
}
