//! SQLite database handle

use std::cell::Cell;
use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, Transaction, TransactionBehavior};

use super::migrations::MigrationManager;
use crate::{Error, Result};

/// Explicit handle to the graph database.
///
/// Construct one per process (or per test) and pass it to the stores. Every
/// graph-mutating operation goes through [`Database::transaction`], which nests
/// via savepoints so a store batch running inside a larger write shares its fate.
pub struct Database {
    conn: Connection,
    savepoint_depth: Cell<u32>,
}

impl Database {
    /// Open a database file (creates if doesn't exist) and apply pending migrations
    pub fn open(path: &Path) -> Result<Self> {
        let db = Self::connect(path)?;
        MigrationManager::new(&db).run()?;
        Ok(db)
    }

    /// Open an in-memory database with the full schema (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let db = Self::connect_in_memory()?;
        MigrationManager::new(&db).run()?;
        Ok(db)
    }

    /// Open a database file without touching the schema
    pub fn connect(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::configure_pragmas(&conn, true)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an empty in-memory database without touching the schema
    pub fn connect_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure_pragmas(&conn, false)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            savepoint_depth: Cell::new(0),
        }
    }

    /// Foreign keys carry the cascade; WAL lets readers proceed while a writer commits.
    fn configure_pragmas(conn: &Connection, file_backed: bool) -> Result<()> {
        conn.pragma_update(None, "foreign_keys", true)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        if file_backed {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!("SQLite journal mode: {}", mode);
            conn.pragma_update(None, "synchronous", "NORMAL")?;
        }
        Ok(())
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// True while a transaction opened by this handle is in progress
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Run `f` atomically.
    ///
    /// At top level this is a `BEGIN IMMEDIATE` transaction; inside another
    /// transaction it becomes a savepoint. Any error rolls back everything `f` wrote
    /// and is returned unchanged.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.in_transaction() {
            return self.savepoint(f);
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;
        match f() {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    tracing::warn!("Rollback failed after '{}': {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    fn savepoint<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let depth = self.savepoint_depth.get() + 1;
        let name = format!("codegraph_sp_{}", depth);
        self.conn.execute_batch(&format!("SAVEPOINT {}", name))?;
        self.savepoint_depth.set(depth);

        let result = f();
        self.savepoint_depth.set(depth - 1);

        match result {
            Ok(value) => {
                self.conn.execute_batch(&format!("RELEASE {}", name))?;
                Ok(value)
            }
            Err(e) => {
                let undo = format!("ROLLBACK TO {name}; RELEASE {name}");
                if let Err(rollback_err) = self.conn.execute_batch(&undo) {
                    tracing::warn!("Savepoint rollback failed after '{}': {}", e, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Run read-only work against one consistent snapshot.
    pub fn snapshot<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        if self.in_transaction() {
            return f();
        }

        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Deferred)?;
        let result = f();
        // Nothing was written, ending the read transaction either way is enough
        tx.rollback()?;
        result
    }

    /// Close the handle, surfacing any error SQLite reports while closing
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Storage(e))
    }
}

/// Map a SQLite constraint failure to [`Error::Constraint`], naming the operation
pub(crate) fn constraint_error(err: rusqlite::Error, operation: &str) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(e, msg) if e.code == ErrorCode::ConstraintViolation => {
            Error::Constraint(format!(
                "{}: {}",
                operation,
                msg.as_deref().unwrap_or("constraint failed")
            ))
        }
        _ => Error::Storage(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_table(db: &Database) {
        db.conn()
            .execute_batch("CREATE TABLE scratch (v INTEGER NOT NULL UNIQUE)")
            .unwrap();
    }

    fn count(db: &Database) -> i64 {
        db.conn()
            .query_row("SELECT COUNT(*) FROM scratch", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_transaction_commits() {
        let db = Database::connect_in_memory().unwrap();
        scratch_table(&db);

        db.transaction(|| {
            db.conn().execute("INSERT INTO scratch (v) VALUES (1)", [])?;
            db.conn().execute("INSERT INTO scratch (v) VALUES (2)", [])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(count(&db), 2);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::connect_in_memory().unwrap();
        scratch_table(&db);

        let result: Result<()> = db.transaction(|| {
            db.conn().execute("INSERT INTO scratch (v) VALUES (1)", [])?;
            db.conn().execute("INSERT INTO scratch (v) VALUES (1)", [])?;
            Ok(())
        });

        assert!(result.is_err());
        assert_eq!(count(&db), 0);
        assert!(!db.in_transaction());
    }

    #[test]
    fn test_nested_failure_rolls_back_outer() {
        let db = Database::connect_in_memory().unwrap();
        scratch_table(&db);

        let result: Result<()> = db.transaction(|| {
            db.conn().execute("INSERT INTO scratch (v) VALUES (1)", [])?;
            db.transaction(|| {
                db.conn().execute("INSERT INTO scratch (v) VALUES (2)", [])?;
                Err(Error::Validation("inner".into()))
            })
        });

        assert!(result.is_err());
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_nested_failure_can_be_recovered() {
        let db = Database::connect_in_memory().unwrap();
        scratch_table(&db);

        db.transaction(|| {
            db.conn().execute("INSERT INTO scratch (v) VALUES (1)", [])?;
            let inner: Result<()> = db.transaction(|| {
                db.conn().execute("INSERT INTO scratch (v) VALUES (2)", [])?;
                Err(Error::Validation("inner".into()))
            });
            assert!(inner.is_err());
            Ok(())
        })
        .unwrap();

        assert_eq!(count(&db), 1);
    }

    #[test]
    fn test_constraint_error_mapping() {
        let db = Database::connect_in_memory().unwrap();
        scratch_table(&db);
        db.conn().execute("INSERT INTO scratch (v) VALUES (1)", []).unwrap();

        let err = db
            .conn()
            .execute("INSERT INTO scratch (v) VALUES (1)", [])
            .unwrap_err();
        let mapped = constraint_error(err, "insert scratch");
        assert!(matches!(mapped, Error::Constraint(ref msg) if msg.starts_with("insert scratch")));
    }

    #[test]
    fn test_file_database_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.db");

        let db = Database::connect(&path).unwrap();
        scratch_table(&db);
        db.conn().execute("INSERT INTO scratch (v) VALUES (7)", []).unwrap();
        db.close().unwrap();

        let db = Database::connect(&path).unwrap();
        assert_eq!(count(&db), 1);
    }
}
