//! # Codegraph - persistent code knowledge graph
//!
//! Codegraph stores entities (functions, classes, methods, modules, files, types) and the
//! typed relationships between them, and keeps that graph consistent as files change.
//!
//! Codegraph provides:
//! - A SQLite-backed entity/relationship store with referential integrity and cascade delete
//! - Versioned schema migrations with rollback
//! - A content-hash driven incremental indexer fed by pluggable extractors
//! - A cross-file resolver turning name-addressed references into graph edges
//! - Graph analyses: blast radius, circular dependencies, dead code

pub mod metadata;
pub mod entity;
pub mod relationship;
pub mod storage;
pub mod indexer;
pub mod graph;
pub mod linker;
pub mod query;
pub mod ignore;
pub mod config;

// Re-exports for convenient access
pub use entity::{Entity, EntityType, NewEntity};
pub use metadata::{Metadata, MetadataValue};
pub use relationship::{NewRelationship, Relationship, RelationshipType};
pub use storage::{Database, EntityStore, FileLedger, MigrationManager, RelationshipStore};
pub use indexer::{EntityExtractor, Extraction, IncrementalIndexer, IndexAction};
pub use graph::DependencyGraph;
pub use linker::CrossFileResolver;
pub use query::{CycleOptions, DeadCodeOptions, QueryEngine};

/// Result type alias for Codegraph operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Codegraph operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Transaction failed ({context}): {source}")]
    Transaction {
        context: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Migration {version} ({name}) failed: {source}")]
    Migration {
        version: i64,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Unknown kind: {0}")]
    InvalidKind(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Wrap an error raised inside a multi-step write with the batch it belongs to
    pub fn in_transaction(context: impl Into<String>, source: Error) -> Self {
        match source {
            // Keep migration failures typed, they carry their own context
            err @ Error::Migration { .. } => err,
            err => Error::Transaction {
                context: context.into(),
                source: Box::new(err),
            },
        }
    }

    /// True for uniqueness/foreign-key failures, wrapped or not
    pub fn is_constraint(&self) -> bool {
        match self {
            Error::Constraint(_) => true,
            Error::Transaction { source, .. } => source.is_constraint(),
            Error::Storage(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::ConstraintViolation
            }
            _ => false,
        }
    }
}
