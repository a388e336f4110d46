//! Relationship types - the edges of the code graph
//!
//! All code relationships reduce to five edge types:
//! - `Calls`: callable → callable
//! - `Imports`: module/file → module/entity
//! - `Extends`: class → class
//! - `Implements`: class → type/interface
//! - `Contains`: structural parent → child (not a dependency)

use crate::metadata::Metadata;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Relationship kinds stored in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipType {
    Calls,
    Imports,
    Extends,
    Implements,
    Contains,
}

impl RelationshipType {
    /// Get the string representation of the relationship type
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::Calls => "calls",
            RelationshipType::Imports => "imports",
            RelationshipType::Extends => "extends",
            RelationshipType::Implements => "implements",
            RelationshipType::Contains => "contains",
        }
    }

    /// Get all relationship types
    pub fn all() -> &'static [RelationshipType] {
        &[
            RelationshipType::Calls,
            RelationshipType::Imports,
            RelationshipType::Extends,
            RelationshipType::Implements,
            RelationshipType::Contains,
        ]
    }

    /// Dependency edges. `Contains` is structural and never counts.
    pub fn dependencies() -> &'static [RelationshipType] {
        &[
            RelationshipType::Calls,
            RelationshipType::Imports,
            RelationshipType::Extends,
            RelationshipType::Implements,
        ]
    }

    /// Check if this relationship type implies a dependency
    pub fn is_dependency(&self) -> bool {
        !matches!(self, RelationshipType::Contains)
    }

    /// Edge types that count as a use of their target for dead-code purposes
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            RelationshipType::Calls | RelationshipType::Extends | RelationshipType::Implements
        )
    }
}

impl FromStr for RelationshipType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "calls" => Ok(RelationshipType::Calls),
            "imports" => Ok(RelationshipType::Imports),
            "extends" => Ok(RelationshipType::Extends),
            "implements" => Ok(RelationshipType::Implements),
            "contains" => Ok(RelationshipType::Contains),
            _ => Err(Error::InvalidKind(format!("Unknown relationship type: {}", s))),
        }
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An id-addressed relationship ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRelationship {
    pub source_id: String,
    pub target_id: String,
    pub rel_type: RelationshipType,
    pub metadata: Option<Metadata>,
}

impl NewRelationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        rel_type: RelationshipType,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            rel_type,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.source_id.is_empty() || self.target_id.is_empty() {
            return Err(Error::Validation(format!(
                "{} relationship needs both a source and a target id",
                self.rel_type
            )));
        }
        Ok(())
    }
}

/// A stored relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
}

impl PartialEq for Relationship {
    fn eq(&self, other: &Self) -> bool {
        self.source_id == other.source_id
            && self.target_id == other.target_id
            && self.rel_type == other.rel_type
    }
}

impl Eq for Relationship {}

impl std::hash::Hash for Relationship {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.source_id.hash(state);
        self.target_id.hash(state);
        self.rel_type.hash(state);
    }
}

/// A name-addressed relationship as produced by an extractor.
///
/// Endpoints are resolved to entity ids by the cross-file resolver. A missing file path
/// means the endpoint location is unknown to the resolver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedRelationship {
    #[serde(rename = "type")]
    pub rel_type: RelationshipType,
    pub source_name: String,
    pub target_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl ExtractedRelationship {
    pub fn new(
        rel_type: RelationshipType,
        source_name: impl Into<String>,
        target_name: impl Into<String>,
    ) -> Self {
        Self {
            rel_type,
            source_name: source_name.into(),
            target_name: target_name.into(),
            source_file_path: None,
            target_file_path: None,
            metadata: None,
        }
    }

    pub fn from_file(mut self, path: impl Into<String>) -> Self {
        self.source_file_path = Some(path.into());
        self
    }

    pub fn to_file(mut self, path: impl Into<String>) -> Self {
        self.target_file_path = Some(path.into());
        self
    }
}
