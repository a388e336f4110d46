//! File ledger - per-file content hashes for change detection

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;

use super::sqlite::Database;
use crate::Result;

/// Provenance of the entities currently stored for one file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: i64,
    pub file_path: String,
    pub content_hash: String,
    pub language: String,
    pub updated_at: DateTime<Utc>,
}

pub struct FileLedger<'a> {
    db: &'a Database,
}

impl<'a> FileLedger<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Get the record for a file
    pub fn get(&self, file_path: &str) -> Result<Option<FileRecord>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, file_path, content_hash, language, updated_at FROM files WHERE file_path = ?1",
                [file_path],
                file_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Insert or refresh the record for a file
    pub fn upsert(&self, file_path: &str, content_hash: &str, language: &str) -> Result<FileRecord> {
        self.db.conn().execute(
            r#"
            INSERT INTO files (file_path, content_hash, language, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(file_path) DO UPDATE SET
                content_hash = excluded.content_hash,
                language = excluded.language,
                updated_at = excluded.updated_at
            "#,
            params![file_path, content_hash, language, Utc::now()],
        )?;

        self.get(file_path)?.ok_or_else(|| {
            crate::Error::Storage(rusqlite::Error::QueryReturnedNoRows)
        })
    }

    /// Remove the record for a file
    pub fn delete(&self, file_path: &str) -> Result<bool> {
        let removed = self
            .db
            .conn()
            .execute("DELETE FROM files WHERE file_path = ?1", [file_path])?;
        Ok(removed > 0)
    }

    /// All records, ordered by path
    pub fn all(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.db.conn().prepare_cached(
            "SELECT id, file_path, content_hash, language, updated_at FROM files ORDER BY file_path",
        )?;
        let records = stmt
            .query_map([], file_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Count tracked files
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn file_from_row(row: &Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        file_path: row.get(1)?,
        content_hash: row.get(2)?,
        language: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_and_get() {
        let db = Database::open_in_memory().unwrap();
        let ledger = FileLedger::new(&db);

        assert!(ledger.get("/src/a.ts").unwrap().is_none());

        let first = ledger.upsert("/src/a.ts", "abc", "typescript").unwrap();
        assert_eq!(first.content_hash, "abc");

        let second = ledger.upsert("/src/a.ts", "def", "typescript").unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.content_hash, "def");
        assert_eq!(ledger.count().unwrap(), 1);
    }

    #[test]
    fn test_delete_and_list() {
        let db = Database::open_in_memory().unwrap();
        let ledger = FileLedger::new(&db);

        ledger.upsert("/src/b.ts", "1", "typescript").unwrap();
        ledger.upsert("/src/a.py", "2", "python").unwrap();

        let paths: Vec<String> = ledger.all().unwrap().into_iter().map(|r| r.file_path).collect();
        assert_eq!(paths, vec!["/src/a.py", "/src/b.ts"]);

        assert!(ledger.delete("/src/a.py").unwrap());
        assert!(!ledger.delete("/src/a.py").unwrap());
        assert_eq!(ledger.count().unwrap(), 1);
    }
}
