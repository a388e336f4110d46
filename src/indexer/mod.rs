//! Incremental Indexer
//!
//! Decides per file whether the graph needs to change, using the file ledger's
//! content hashes:
//! - no ledger record → `created`
//! - hash differs (or hash checks disabled) → `updated`, the file's entities are replaced
//! - hash matches → `skipped`, nothing is written
//! - unreadable file, unknown language or extractor failure → `error`, nothing is written
//!
//! Parsing is delegated to an [`EntityExtractor`]; the indexer only sees the normalized
//! entity/relationship stream it yields.

pub mod language;

use std::collections::HashSet;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use language::{content_hash, detect_language, normalize_path, normalize_path_str};

use crate::entity::{Entity, NewEntity};
use crate::ignore::IgnoreFilter;
use crate::linker::CrossFileResolver;
use crate::relationship::ExtractedRelationship;
use crate::storage::{Database, EntityStore, FileLedger};
use crate::{Error, Result};

/// Entities and name-addressed relationships extracted from one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub entities: Vec<NewEntity>,
    pub relationships: Vec<ExtractedRelationship>,
}

/// Port to the language-specific parser.
///
/// Implemented by whatever produces the graph for a file: an in-process tree-sitter
/// parser, a subprocess-based indexer, or a test stub.
pub trait EntityExtractor {
    fn extract(&self, file_path: &str, content: &str, language: &str) -> Result<Extraction>;
}

impl<F> EntityExtractor for F
where
    F: Fn(&str, &str, &str) -> Result<Extraction>,
{
    fn extract(&self, file_path: &str, content: &str, language: &str) -> Result<Extraction> {
        self(file_path, content, language)
    }
}

/// What the indexer did with a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexAction {
    Created,
    Updated,
    Skipped,
    Error,
}

impl IndexAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexAction::Created => "created",
            IndexAction::Updated => "updated",
            IndexAction::Skipped => "skipped",
            IndexAction::Error => "error",
        }
    }
}

impl fmt::Display for IndexAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Result of indexing one file
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOutcome {
    pub file_path: String,
    pub action: IndexAction,
    pub language: Option<String>,
    /// Entities stored for the file after this call
    pub entities: Vec<Entity>,
    pub relationships_created: usize,
    pub relationships_dropped: usize,
    pub error: Option<String>,
}

impl IndexOutcome {
    fn failed(file_path: String, language: Option<&str>, reason: impl Into<String>) -> Self {
        Self {
            file_path,
            action: IndexAction::Error,
            language: language.map(str::to_string),
            entities: Vec::new(),
            relationships_created: 0,
            relationships_dropped: 0,
            error: Some(reason.into()),
        }
    }
}

/// A file removed from the graph by a stale-file sweep
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionRecord {
    pub file_path: String,
    pub entities_removed: usize,
}

/// Summary of a directory sweep
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub errors: usize,
    pub deleted: Vec<DeletionRecord>,
    pub outcomes: Vec<IndexOutcome>,
}

impl SyncReport {
    fn record(&mut self, outcome: IndexOutcome) {
        match outcome.action {
            IndexAction::Created => self.created += 1,
            IndexAction::Updated => self.updated += 1,
            IndexAction::Skipped => self.skipped += 1,
            IndexAction::Error => self.errors += 1,
        }
        self.outcomes.push(outcome);
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index Sweep:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Skipped: {}", self.skipped)?;
        writeln!(f, "  Errors: {}", self.errors)?;
        writeln!(f, "  Deleted: {}", self.deleted.len())
    }
}

/// Indexer behaviour switches
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerOptions {
    /// Skip files whose content hash matches the ledger
    pub use_hash_check: bool,
    /// Extra gitignore-style patterns excluded from sweeps
    pub exclude: Vec<String>,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self {
            use_hash_check: true,
            exclude: Vec::new(),
        }
    }
}

pub struct IncrementalIndexer<'a> {
    db: &'a Database,
    options: IndexerOptions,
}

impl<'a> IncrementalIndexer<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self::with_options(db, IndexerOptions::default())
    }

    pub fn with_options(db: &'a Database, options: IndexerOptions) -> Self {
        Self { db, options }
    }

    /// Read a file from disk and index it
    pub fn index_file(&self, path: &Path, extractor: &dyn EntityExtractor) -> Result<IndexOutcome> {
        let file_path = normalize_path(path).to_string_lossy().into_owned();
        match std::fs::read_to_string(path) {
            Ok(content) => self.index_content(&file_path, &content, extractor),
            Err(e) => {
                tracing::debug!("Cannot read {}: {}", file_path, e);
                Ok(IndexOutcome::failed(file_path, None, format!("unreadable file: {}", e)))
            }
        }
    }

    /// Index a file given its current content
    pub fn index_content(
        &self,
        path: &str,
        content: &str,
        extractor: &dyn EntityExtractor,
    ) -> Result<IndexOutcome> {
        let file_path = normalize_path_str(path);
        let Some(language) = detect_language(Path::new(&file_path)) else {
            return Ok(IndexOutcome::failed(file_path, None, "unsupported language"));
        };

        let hash = content_hash(content.as_bytes());
        let previous = FileLedger::new(self.db).get(&file_path)?;

        let unchanged = previous
            .as_ref()
            .is_some_and(|record| record.content_hash == hash);
        if unchanged && self.options.use_hash_check {
            tracing::debug!("Unchanged: {}", file_path);
            let entities = EntityStore::new(self.db).find_by_file(&file_path)?;
            return Ok(IndexOutcome {
                file_path,
                action: IndexAction::Skipped,
                language: Some(language.to_string()),
                entities,
                relationships_created: 0,
                relationships_dropped: 0,
                error: None,
            });
        }

        let extraction = match extractor.extract(&file_path, content, language) {
            Ok(extraction) => extraction,
            Err(e) => {
                tracing::warn!("Extraction failed for {}: {}", file_path, e);
                return Ok(IndexOutcome::failed(file_path, Some(language), e.to_string()));
            }
        };
        let (entities, relationships) = Self::anchor(&file_path, extraction);
        if let Err(e) = entities.iter().try_for_each(NewEntity::validate) {
            tracing::warn!("Rejected extraction for {}: {}", file_path, e);
            return Ok(IndexOutcome::failed(file_path, Some(language), e.to_string()));
        }

        let action = if previous.is_some() {
            IndexAction::Updated
        } else {
            IndexAction::Created
        };

        let report = self
            .db
            .transaction(|| {
                if previous.is_some() {
                    let removed = EntityStore::new(self.db).delete_by_file(&file_path)?;
                    tracing::debug!("Replacing {} entities of {}", removed, file_path);
                }
                let report = CrossFileResolver::new(self.db).resolve(&entities, &relationships)?;
                FileLedger::new(self.db).upsert(&file_path, &hash, language)?;
                Ok(report)
            })
            .map_err(|e| Error::in_transaction(format!("index {}", file_path), e))?;

        tracing::debug!(
            "{} {}: {} entities, {} relationships ({} unresolved)",
            action,
            file_path,
            report.entities.len(),
            report.relationships.len(),
            report.dropped
        );

        Ok(IndexOutcome {
            file_path,
            action,
            language: Some(language.to_string()),
            entities: report.entities,
            relationships_created: report.relationships.len(),
            relationships_dropped: report.dropped,
            error: None,
        })
    }

    /// Pin an extraction to the file it came from.
    ///
    /// Entities belong to the indexed file. Relationship endpoints without a file are
    /// assumed local; explicit endpoint paths are normalized like the file path.
    fn anchor(file_path: &str, extraction: Extraction) -> (Vec<NewEntity>, Vec<ExtractedRelationship>) {
        let entities = extraction
            .entities
            .into_iter()
            .map(|mut entity| {
                entity.file_path = file_path.to_string();
                entity
            })
            .collect();

        let relationships = extraction
            .relationships
            .into_iter()
            .map(|mut rel| {
                rel.source_file_path = Some(
                    rel.source_file_path
                        .as_deref()
                        .map(normalize_path_str)
                        .unwrap_or_else(|| file_path.to_string()),
                );
                rel.target_file_path = Some(
                    rel.target_file_path
                        .as_deref()
                        .map(normalize_path_str)
                        .unwrap_or_else(|| file_path.to_string()),
                );
                rel
            })
            .collect();

        (entities, relationships)
    }

    /// Remove every ledgered file that is not in `current_paths`, with its entities.
    pub fn remove_stale_files<I, P>(&self, current_paths: I) -> Result<Vec<DeletionRecord>>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let current: HashSet<String> = current_paths
            .into_iter()
            .map(|p| normalize_path(p.as_ref()).to_string_lossy().into_owned())
            .collect();

        let stale: Vec<String> = FileLedger::new(self.db)
            .all()?
            .into_iter()
            .map(|record| record.file_path)
            .filter(|path| !current.contains(path))
            .collect();

        self.remove_files(&stale)
    }

    fn remove_files(&self, paths: &[String]) -> Result<Vec<DeletionRecord>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let deleted = self
            .db
            .transaction(|| {
                let entities = EntityStore::new(self.db);
                let ledger = FileLedger::new(self.db);
                let mut deleted = Vec::with_capacity(paths.len());
                for path in paths {
                    let entities_removed = entities.delete_by_file(path)?;
                    ledger.delete(path)?;
                    deleted.push(DeletionRecord {
                        file_path: path.clone(),
                        entities_removed,
                    });
                }
                Ok(deleted)
            })
            .map_err(|e| Error::in_transaction(format!("remove {} stale files", paths.len()), e))?;

        tracing::info!("Removed {} stale files from the graph", deleted.len());
        Ok(deleted)
    }

    /// Files under `root` the sweep would index
    pub fn discover(&self, root: &Path) -> Vec<std::path::PathBuf> {
        let root = normalize_path(root);
        let filter = IgnoreFilter::new(&root, &self.options.exclude);

        ignore::WalkBuilder::new(&root)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                !filter.is_ignored(entry.path(), is_dir)
            })
            .build()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Walk error: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| detect_language(path).is_some())
            .collect()
    }

    /// Drop ledgered files under `root` that the sweep would no longer index, without
    /// re-indexing anything.
    pub fn prune(&self, root: &Path) -> Result<Vec<DeletionRecord>> {
        let root = normalize_path(root);
        let present: HashSet<String> = self
            .discover(&root)
            .iter()
            .map(|path| normalize_path(path).to_string_lossy().into_owned())
            .collect();
        let stale = self.stale_under(&root, &present)?;
        self.remove_files(&stale)
    }

    fn stale_under(&self, root: &Path, present: &HashSet<String>) -> Result<Vec<String>> {
        Ok(FileLedger::new(self.db)
            .all()?
            .into_iter()
            .map(|record| record.file_path)
            .filter(|path| Path::new(path).starts_with(root) && !present.contains(path))
            .collect())
    }

    /// Index every supported file under `root`, then drop ledgered files under `root`
    /// that no longer exist.
    pub fn sync(&self, root: &Path, extractor: &dyn EntityExtractor) -> Result<SyncReport> {
        let root = normalize_path(root);
        let mut report = SyncReport::default();
        let mut seen = HashSet::new();

        for path in self.discover(&root) {
            let outcome = self.index_file(&path, extractor)?;
            seen.insert(outcome.file_path.clone());
            report.record(outcome);
        }

        let stale = self.stale_under(&root, &seen)?;
        report.deleted = self.remove_files(&stale)?;

        tracing::info!(
            "Indexed {}: {} created, {} updated, {} skipped, {} errors, {} deleted",
            root.display(),
            report.created,
            report.updated,
            report.skipped,
            report.errors,
            report.deleted.len()
        );
        Ok(report)
    }
}
