//! Entity store

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{Params, Row, params};
use uuid::Uuid;

use super::sqlite::{Database, constraint_error};
use crate::entity::{Entity, EntityType, NewEntity};
use crate::metadata;
use crate::{Error, Result};

pub(crate) const ENTITY_COLUMNS: &str =
    "id, type, name, file_path, start_line, end_line, language, metadata, created_at, updated_at";

/// CRUD and indexed lookups over the `entities` table
pub struct EntityStore<'a> {
    db: &'a Database,
}

impl<'a> EntityStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert an entity, assigning its id and timestamps
    pub fn create(&self, new: &NewEntity) -> Result<Entity> {
        new.validate()?;
        self.insert(new)
    }

    fn insert(&self, new: &NewEntity) -> Result<Entity> {
        let now = Utc::now();
        let entity = Entity {
            id: Uuid::new_v4().to_string(),
            entity_type: new.entity_type,
            name: new.name.clone(),
            file_path: new.file_path.clone(),
            start_line: new.start_line,
            end_line: new.end_line,
            language: new.language.clone(),
            metadata: new.metadata.clone(),
            created_at: now,
            updated_at: now,
        };

        let encoded = metadata::encode(entity.metadata.as_ref())?;
        self.db
            .conn()
            .prepare_cached(
                r#"
                INSERT INTO entities (id, type, name, file_path, start_line, end_line, language, metadata, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?
            .execute(params![
                entity.id,
                entity.entity_type.as_str(),
                entity.name,
                entity.file_path,
                entity.start_line,
                entity.end_line,
                entity.language,
                encoded,
                entity.created_at,
                entity.updated_at,
            ])
            .map_err(|e| constraint_error(e, &format!("insert entity '{}'", entity.name)))?;

        Ok(entity)
    }

    /// Insert many entities atomically. Input is validated before anything is written.
    pub fn create_batch(&self, entities: &[NewEntity]) -> Result<Vec<Entity>> {
        for new in entities {
            new.validate()?;
        }

        self.db
            .transaction(|| entities.iter().map(|new| self.insert(new)).collect())
            .map_err(|e| Error::in_transaction(format!("entity batch of {}", entities.len()), e))
    }

    fn select<P: Params>(&self, clause: &str, params: P) -> Result<Vec<Entity>> {
        let sql = format!("SELECT {} FROM entities {}", ENTITY_COLUMNS, clause);
        let mut stmt = self.db.conn().prepare_cached(&sql)?;
        let entities = stmt
            .query_map(params, entity_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entities)
    }

    /// Get an entity by id
    pub fn find_by_id(&self, id: &str) -> Result<Option<Entity>> {
        Ok(self.select("WHERE id = ?1", [id])?.into_iter().next())
    }

    /// Find entities by exact name
    pub fn find_by_name(&self, name: &str) -> Result<Vec<Entity>> {
        self.select("WHERE name = ?1 ORDER BY file_path, start_line", [name])
    }

    /// Find entities whose name contains `pattern` (ASCII case-insensitive).
    ///
    /// `%` and `_` in the pattern match literally.
    pub fn search_by_name(&self, pattern: &str, limit: usize) -> Result<Vec<Entity>> {
        let like = format!("%{}%", escape_like(pattern));
        self.select(
            r"WHERE name LIKE ?1 ESCAPE '\' ORDER BY name, file_path, start_line LIMIT ?2",
            params![like, limit as i64],
        )
    }

    /// Find entities of a type
    pub fn find_by_type(&self, entity_type: EntityType) -> Result<Vec<Entity>> {
        self.select(
            "WHERE type = ?1 ORDER BY file_path, start_line",
            [entity_type.as_str()],
        )
    }

    /// Find all entities in a file (exact path match)
    pub fn find_by_file(&self, file_path: &str) -> Result<Vec<Entity>> {
        self.select("WHERE file_path = ?1 ORDER BY start_line, rowid", [file_path])
    }

    /// All entities in insertion order
    pub fn get_all(&self) -> Result<Vec<Entity>> {
        self.select("ORDER BY rowid", [])
    }

    /// Delete an entity and, by cascade, every relationship touching it
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self.db.conn().execute("DELETE FROM entities WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Delete every entity of a file. Returns how many were removed.
    pub fn delete_by_file(&self, file_path: &str) -> Result<usize> {
        let removed = self
            .db
            .conn()
            .execute("DELETE FROM entities WHERE file_path = ?1", [file_path])?;
        Ok(removed)
    }

    /// Count all entities
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Entity counts for every type, absent types reported as 0
    pub fn count_by_type(&self) -> Result<BTreeMap<EntityType, usize>> {
        let mut counts: BTreeMap<EntityType, usize> =
            EntityType::all().iter().map(|t| (*t, 0)).collect();

        let mut stmt = self
            .db
            .conn()
            .prepare_cached("SELECT type, COUNT(*) FROM entities GROUP BY type")?;
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

/// Helper to convert a row selected with [`ENTITY_COLUMNS`] to an Entity
pub(crate) fn entity_from_row(row: &Row) -> rusqlite::Result<Entity> {
    let id: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let entity_type: EntityType = kind_str.parse().map_err(|e: Error| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let metadata = metadata::decode(row.get(7)?, &format!("entity {}", id));

    Ok(Entity {
        id,
        entity_type,
        name: row.get(2)?,
        file_path: row.get(3)?,
        start_line: row.get(4)?,
        end_line: row.get(5)?,
        language: row.get(6)?,
        metadata,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// Escape LIKE wildcards so they match themselves
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, file: &str, line: u32) -> NewEntity {
        NewEntity::new(EntityType::Function, name, file, line, line + 4, "typescript")
    }

    #[test]
    fn test_entity_crud() {
        let db = Database::open_in_memory().unwrap();
        let store = EntityStore::new(&db);

        let created = store
            .create(&sample("my_func", "/src/a.ts", 10).with_meta("exported", true))
            .unwrap();
        assert!(!created.id.is_empty());

        let retrieved = store.find_by_id(&created.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "my_func");
        assert_eq!(retrieved.start_line, 10);
        assert!(retrieved.is_exported());

        assert!(store.delete(&created.id).unwrap());
        assert!(store.find_by_id(&created.id).unwrap().is_none());
        assert!(!store.delete(&created.id).unwrap());
    }

    #[test]
    fn test_lookups() {
        let db = Database::open_in_memory().unwrap();
        let store = EntityStore::new(&db);

        store.create(&sample("foo", "/src/a.ts", 10)).unwrap();
        store.create(&sample("bar", "/src/a.ts", 20)).unwrap();
        store.create(&sample("foo", "/src/b.ts", 30)).unwrap();
        store
            .create(&NewEntity::new(EntityType::Class, "Repo", "/src/b.ts", 1, 50, "typescript"))
            .unwrap();

        assert_eq!(store.find_by_name("foo").unwrap().len(), 2);
        assert_eq!(store.find_by_file("/src/a.ts").unwrap().len(), 2);
        assert!(store.find_by_file("src/a.ts").unwrap().is_empty());
        assert_eq!(store.find_by_type(EntityType::Class).unwrap().len(), 1);
        assert_eq!(store.get_all().unwrap().len(), 4);
        assert_eq!(store.search_by_name("o", 10).unwrap().len(), 3);

        let counts = store.count_by_type().unwrap();
        assert_eq!(counts[&EntityType::Function], 3);
        assert_eq!(counts[&EntityType::Module], 0);
        assert_eq!(counts.len(), EntityType::all().len());
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let db = Database::open_in_memory().unwrap();
        let store = EntityStore::new(&db);

        store.create(&sample("__init__", "/src/pkg/__init__.py", 1)).unwrap();
        store.create(&sample("initialize", "/src/pkg/setup.py", 1)).unwrap();
        store.create(&sample("load_config", "/src/pkg/setup.py", 10)).unwrap();
        store.create(&sample("loadXconfig", "/src/pkg/setup.py", 20)).unwrap();
        store.create(&sample("ratio_100%", "/src/pkg/setup.py", 30)).unwrap();

        let names = |pattern: &str| -> Vec<String> {
            store
                .search_by_name(pattern, 10)
                .unwrap()
                .into_iter()
                .map(|e| e.name)
                .collect()
        };
        assert_eq!(names("__init"), vec!["__init__"]);
        assert_eq!(names("load_"), vec!["load_config"]);
        assert_eq!(names("100%"), vec!["ratio_100%"]);
        assert_eq!(names("INIT").len(), 2);
        assert_eq!(escape_like(r"a\_%"), r"a\\\_\%");
    }

    #[test]
    fn test_validation_rejects_before_write() {
        let db = Database::open_in_memory().unwrap();
        let store = EntityStore::new(&db);

        let mut bad = sample("broken", "/src/a.ts", 10);
        bad.end_line = 1;
        assert!(matches!(store.create(&bad), Err(Error::Validation(_))));

        let batch = vec![sample("ok", "/src/a.ts", 1), bad];
        assert!(matches!(store.create_batch(&batch), Err(Error::Validation(_))));
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_batch_insert() {
        let db = Database::open_in_memory().unwrap();
        let store = EntityStore::new(&db);

        let created = store
            .create_batch(&[sample("a", "/src/a.ts", 1), sample("b", "/src/a.ts", 10)])
            .unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(store.count().unwrap(), 2);
        assert_eq!(store.get_all().unwrap()[0].name, "a");
    }

    #[test]
    fn test_corrupt_metadata_degrades() {
        let db = Database::open_in_memory().unwrap();
        let store = EntityStore::new(&db);

        let created = store
            .create(&sample("legacy", "/src/a.ts", 1).with_meta("exported", true))
            .unwrap();
        db.conn()
            .execute(
                "UPDATE entities SET metadata = '{broken' WHERE id = ?1",
                [&created.id],
            )
            .unwrap();

        let read = store.find_by_id(&created.id).unwrap().unwrap();
        assert_eq!(read.name, "legacy");
        assert!(read.metadata.is_none());
        assert_eq!(store.find_by_file("/src/a.ts").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_by_file() {
        let db = Database::open_in_memory().unwrap();
        let store = EntityStore::new(&db);

        store.create(&sample("a", "/src/a.ts", 1)).unwrap();
        store.create(&sample("b", "/src/a.ts", 10)).unwrap();
        store.create(&sample("c", "/src/c.ts", 1)).unwrap();

        assert_eq!(store.delete_by_file("/src/a.ts").unwrap(), 2);
        assert_eq!(store.count().unwrap(), 1);
    }
}
