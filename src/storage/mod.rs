//! Storage Layer - SQLite-backed persistence
//!
//! System of record is SQLite with tables:
//! - entities(id, type, name, file_path, start_line, end_line, language, metadata, ...)
//! - relationships(id, source_id, target_id, type, metadata, created_at)
//! - files(file_path, content_hash, language, updated_at)
//! - schema_migrations(version, name, applied_at)

pub mod schema;
pub mod sqlite;
pub mod migrations;
pub mod entities;
pub mod relationships;
pub mod files;

pub use sqlite::Database;
pub use migrations::{AppliedMigration, MigrationManager};
pub use schema::Migration;
pub use entities::EntityStore;
pub use relationships::RelationshipStore;
pub use files::{FileLedger, FileRecord};
