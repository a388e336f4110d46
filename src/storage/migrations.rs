//! Schema migration manager
//!
//! Applies pending migrations in ascending version order, one transaction each, and
//! reverts the most recent one on request. The `schema_migrations` table is the ledger.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::Serialize;

use super::schema::{self, Migration};
use super::sqlite::Database;
use crate::{Error, Result};

/// A ledger entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedMigration {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub struct MigrationManager<'a> {
    db: &'a Database,
    migrations: Vec<Migration>,
}

impl<'a> MigrationManager<'a> {
    /// Manager over the built-in schema migrations
    pub fn new(db: &'a Database) -> Self {
        Self::with_migrations(db, schema::migrations())
    }

    /// Manager over a custom migration list
    pub fn with_migrations(db: &'a Database, mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self { db, migrations }
    }

    /// The configured migrations, ascending by version
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    fn ensure_ledger(&self) -> Result<()> {
        self.db.conn().execute_batch(schema::CREATE_MIGRATIONS_TABLE)?;
        Ok(())
    }

    fn check_definitions(&self) -> Result<()> {
        if let Some(pair) = self
            .migrations
            .windows(2)
            .find(|w| w[0].version == w[1].version)
        {
            return Err(Error::Validation(format!(
                "migration version {} is defined twice ({} and {})",
                pair[0].version, pair[0].name, pair[1].name
            )));
        }
        Ok(())
    }

    /// Migrations recorded in the ledger, ascending by version
    pub fn applied(&self) -> Result<Vec<AppliedMigration>> {
        self.ensure_ledger()?;
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT version, name, applied_at FROM schema_migrations ORDER BY version")?;
        let applied = stmt
            .query_map([], |row| {
                Ok(AppliedMigration {
                    version: row.get(0)?,
                    name: row.get(1)?,
                    applied_at: row.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(applied)
    }

    fn applied_versions(&self) -> Result<HashSet<i64>> {
        Ok(self.applied()?.into_iter().map(|m| m.version).collect())
    }

    /// Migrations not yet applied, ascending by version
    pub fn pending(&self) -> Result<Vec<Migration>> {
        let applied = self.applied_versions()?;
        Ok(self
            .migrations
            .iter()
            .filter(|m| !applied.contains(&m.version))
            .copied()
            .collect())
    }

    /// Apply every pending migration. Returns how many were applied.
    ///
    /// Each migration commits on its own. The first failure rolls that migration back
    /// and stops the run; later migrations are not attempted.
    pub fn run(&self) -> Result<usize> {
        self.check_definitions()?;
        let pending = self.pending()?;
        if pending.is_empty() {
            tracing::debug!("Schema up to date");
            return Ok(0);
        }

        for migration in &pending {
            tracing::debug!("Applying migration {} ({})", migration.version, migration.name);
            self.db
                .transaction(|| {
                    self.db.conn().execute_batch(migration.up)?;
                    self.db.conn().execute(
                        "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                        params![migration.version, migration.name, Utc::now()],
                    )?;
                    Ok(())
                })
                .map_err(|e| Error::Migration {
                    version: migration.version,
                    name: migration.name.to_string(),
                    source: Box::new(e),
                })?;
            tracing::info!("Applied migration {} ({})", migration.version, migration.name);
        }

        Ok(pending.len())
    }

    /// Revert the most recently applied migration. Returns false if nothing was applied.
    pub fn rollback(&self) -> Result<bool> {
        let Some(latest) = self.applied()?.pop() else {
            return Ok(false);
        };

        let Some(migration) = self.migrations.iter().find(|m| m.version == latest.version) else {
            return Err(Error::Migration {
                version: latest.version,
                name: latest.name,
                source: Box::new(Error::Validation(
                    "no reverse operation is defined for this version".to_string(),
                )),
            });
        };

        self.db
            .transaction(|| {
                self.db.conn().execute_batch(migration.down)?;
                self.db.conn().execute(
                    "DELETE FROM schema_migrations WHERE version = ?1",
                    [migration.version],
                )?;
                Ok(())
            })
            .map_err(|e| Error::Migration {
                version: migration.version,
                name: migration.name.to_string(),
                source: Box::new(e),
            })?;

        tracing::info!("Rolled back migration {} ({})", migration.version, migration.name);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_exists(db: &Database, table: &str) -> bool {
        db.conn()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get::<_, i64>(0),
            )
            .unwrap()
            == 1
    }

    fn versions(manager: &MigrationManager) -> Vec<i64> {
        manager.applied().unwrap().iter().map(|m| m.version).collect()
    }

    #[test]
    fn test_run_applies_all_then_nothing() {
        let db = Database::connect_in_memory().unwrap();
        let manager = MigrationManager::new(&db);

        assert_eq!(manager.pending().unwrap().len(), 3);
        assert_eq!(manager.run().unwrap(), 3);
        assert_eq!(manager.run().unwrap(), 0);
        assert!(manager.pending().unwrap().is_empty());
        assert_eq!(versions(&manager), vec![1, 2, 3]);
        assert!(table_exists(&db, "entities"));
        assert!(table_exists(&db, "relationships"));
        assert!(table_exists(&db, "files"));
    }

    #[test]
    fn test_rollback_removes_latest_only() {
        let db = Database::connect_in_memory().unwrap();
        let manager = MigrationManager::new(&db);
        manager.run().unwrap();

        assert!(manager.rollback().unwrap());
        assert_eq!(versions(&manager), vec![1, 2]);
        assert!(!table_exists(&db, "files"));
        assert!(table_exists(&db, "relationships"));

        let pending: Vec<i64> = manager.pending().unwrap().iter().map(|m| m.version).collect();
        assert_eq!(pending, vec![3]);
    }

    #[test]
    fn test_rollback_all_empties_ledger() {
        let db = Database::connect_in_memory().unwrap();
        let manager = MigrationManager::new(&db);
        manager.run().unwrap();

        for _ in 0..manager.migrations().len() {
            assert!(manager.rollback().unwrap());
        }
        assert!(versions(&manager).is_empty());
        assert!(!manager.rollback().unwrap());
        assert!(!table_exists(&db, "entities"));
    }

    #[test]
    fn test_rollback_on_empty_ledger() {
        let db = Database::connect_in_memory().unwrap();
        assert!(!MigrationManager::new(&db).rollback().unwrap());
    }

    #[test]
    fn test_failed_migration_stops_run() {
        let db = Database::connect_in_memory().unwrap();
        let manager = MigrationManager::with_migrations(
            &db,
            vec![
                Migration {
                    version: 3,
                    name: "never_reached",
                    up: "CREATE TABLE late (id INTEGER)",
                    down: "DROP TABLE late",
                },
                Migration {
                    version: 1,
                    name: "create_a",
                    up: "CREATE TABLE a (id INTEGER)",
                    down: "DROP TABLE a",
                },
                Migration {
                    version: 2,
                    name: "broken",
                    up: "CREATE TABLE b (id INTEGER); THIS IS NOT SQL",
                    down: "DROP TABLE b",
                },
            ],
        );

        let err = manager.run().unwrap_err();
        match err {
            Error::Migration { version, name, .. } => {
                assert_eq!(version, 2);
                assert_eq!(name, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(versions(&manager), vec![1]);
        assert!(table_exists(&db, "a"));
        assert!(!table_exists(&db, "b"));
        assert!(!table_exists(&db, "late"));
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let db = Database::connect_in_memory().unwrap();
        let twice = Migration {
            version: 1,
            name: "twice",
            up: "SELECT 1",
            down: "SELECT 1",
        };
        let manager = MigrationManager::with_migrations(&db, vec![twice, twice]);
        assert!(matches!(manager.run(), Err(Error::Validation(_))));
    }
}
