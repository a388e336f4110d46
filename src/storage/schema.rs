//! Database schema definitions
//!
//! The schema evolves through an ordered list of migrations. Each carries the SQL to
//! apply it and the SQL to revert it; the list itself is static configuration, only the
//! ledger of applied versions lives in the database.

/// A single schema migration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    /// Strictly increasing version number
    pub version: i64,
    pub name: &'static str,
    /// Forward operation
    pub up: &'static str,
    /// Reverse operation
    pub down: &'static str,
}

/// SQL to create the migration ledger. Not itself a migration.
pub const CREATE_MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL
)
"#;

/// SQL to create the entities table
pub const CREATE_ENTITIES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS entities (
    id TEXT PRIMARY KEY,
    type TEXT NOT NULL CHECK (type IN ('function', 'class', 'method', 'module', 'file', 'type')),
    name TEXT NOT NULL,
    file_path TEXT NOT NULL,
    start_line INTEGER NOT NULL CHECK (start_line >= 1),
    end_line INTEGER NOT NULL,
    language TEXT NOT NULL,
    metadata TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (end_line >= start_line)
);
CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(type);
CREATE INDEX IF NOT EXISTS idx_entities_name ON entities(name);
CREATE INDEX IF NOT EXISTS idx_entities_file_path ON entities(file_path);
"#;

const DROP_ENTITIES_TABLE: &str = r#"
DROP INDEX IF EXISTS idx_entities_file_path;
DROP INDEX IF EXISTS idx_entities_name;
DROP INDEX IF EXISTS idx_entities_type;
DROP TABLE IF EXISTS entities;
"#;

/// SQL to create the relationships table
///
/// Both endpoints cascade so no edge outlives either of its entities.
pub const CREATE_RELATIONSHIPS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS relationships (
    id TEXT PRIMARY KEY,
    source_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
    type TEXT NOT NULL CHECK (type IN ('calls', 'imports', 'extends', 'implements', 'contains')),
    metadata TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_relationships_source ON relationships(source_id);
CREATE INDEX IF NOT EXISTS idx_relationships_target ON relationships(target_id);
CREATE INDEX IF NOT EXISTS idx_relationships_type ON relationships(type);
CREATE UNIQUE INDEX IF NOT EXISTS idx_relationships_unique
    ON relationships(source_id, target_id, type);
"#;

const DROP_RELATIONSHIPS_TABLE: &str = r#"
DROP INDEX IF EXISTS idx_relationships_unique;
DROP INDEX IF EXISTS idx_relationships_type;
DROP INDEX IF EXISTS idx_relationships_target;
DROP INDEX IF EXISTS idx_relationships_source;
DROP TABLE IF EXISTS relationships;
"#;

/// SQL to create the file ledger
pub const CREATE_FILES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_path TEXT NOT NULL UNIQUE,
    content_hash TEXT NOT NULL,
    language TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

const DROP_FILES_TABLE: &str = "DROP TABLE IF EXISTS files;";

/// All migrations, ascending by version
pub fn migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create_entities",
            up: CREATE_ENTITIES_TABLE,
            down: DROP_ENTITIES_TABLE,
        },
        Migration {
            version: 2,
            name: "create_relationships",
            up: CREATE_RELATIONSHIPS_TABLE,
            down: DROP_RELATIONSHIPS_TABLE,
        },
        Migration {
            version: 3,
            name: "create_files",
            up: CREATE_FILES_TABLE,
            down: DROP_FILES_TABLE,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_versions_strictly_increase() {
        let versions: Vec<i64> = migrations().iter().map(|m| m.version).collect();
        assert!(versions.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(versions.first(), Some(&1));
    }

    #[test]
    fn test_forward_operations_are_repeatable() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        for _ in 0..2 {
            for migration in migrations() {
                conn.execute_batch(migration.up).unwrap();
            }
        }
    }
}
