//! Entity types - the nodes of the code graph
//!
//! Every extracted code element maps to one of six entity types:
//! - `Function`, `Method`: executable code
//! - `Class`, `Type`: type definitions
//! - `Module`, `File`: organizational units

use crate::metadata::Metadata;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Entity kinds stored in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Function,
    Class,
    Method,
    Module,
    File,
    Type,
}

impl EntityType {
    /// Get the string representation of the entity type
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Function => "function",
            EntityType::Class => "class",
            EntityType::Method => "method",
            EntityType::Module => "module",
            EntityType::File => "file",
            EntityType::Type => "type",
        }
    }

    /// Get all entity types
    pub fn all() -> &'static [EntityType] {
        &[
            EntityType::Function,
            EntityType::Class,
            EntityType::Method,
            EntityType::Module,
            EntityType::File,
            EntityType::Type,
        ]
    }

    /// Types that dead-code analysis considers
    pub fn is_code_unit(&self) -> bool {
        matches!(self, EntityType::Function | EntityType::Class | EntityType::Method)
    }
}

impl FromStr for EntityType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "function" => Ok(EntityType::Function),
            "class" => Ok(EntityType::Class),
            "method" => Ok(EntityType::Method),
            "module" => Ok(EntityType::Module),
            "file" => Ok(EntityType::File),
            "type" => Ok(EntityType::Type),
            _ => Err(Error::InvalidKind(format!("Unknown entity type: {}", s))),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An entity as handed to the store, before it has an id.
///
/// This is also the normalized shape the extractors produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEntity {
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub file_path: String,
    /// Starting line number (1-indexed)
    pub start_line: u32,
    /// Ending line number (1-indexed, inclusive)
    pub end_line: u32,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl NewEntity {
    pub fn new(
        entity_type: EntityType,
        name: impl Into<String>,
        file_path: impl Into<String>,
        start_line: u32,
        end_line: u32,
        language: impl Into<String>,
    ) -> Self {
        Self {
            entity_type,
            name: name.into(),
            file_path: file_path.into(),
            start_line,
            end_line,
            language: language.into(),
            metadata: None,
        }
    }

    /// Attach a metadata entry
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<crate::MetadataValue>) -> Self {
        self.metadata
            .get_or_insert_with(Metadata::new)
            .insert(key.into(), value.into());
        self
    }

    /// Reject input the store must never persist
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("entity name is required".to_string()));
        }
        if self.file_path.trim().is_empty() {
            return Err(Error::Validation(format!("entity '{}' has no file path", self.name)));
        }
        if self.start_line == 0 {
            return Err(Error::Validation(format!(
                "entity '{}' start line must be 1-based",
                self.name
            )));
        }
        if self.end_line < self.start_line {
            return Err(Error::Validation(format!(
                "entity '{}' ends (line {}) before it starts (line {})",
                self.name, self.end_line, self.start_line
            )));
        }
        Ok(())
    }
}

/// A stored entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub name: String,
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Look up a metadata value
    pub fn meta(&self, key: &str) -> Option<&crate::MetadataValue> {
        self.metadata.as_ref().and_then(|m| m.get(key))
    }

    /// Whether the extractor marked this entity as part of its module's public surface
    pub fn is_exported(&self) -> bool {
        ["exported", "isExported"]
            .iter()
            .any(|key| self.meta(key).and_then(|v| v.as_bool()).unwrap_or(false))
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl std::hash::Hash for Entity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_roundtrip() {
        for kind in EntityType::all() {
            let parsed: EntityType = kind.as_str().parse().unwrap();
            assert_eq!(*kind, parsed);
        }
    }

    #[test]
    fn test_unknown_entity_type_rejected() {
        assert!(matches!(EntityType::from_str("struct"), Err(Error::InvalidKind(_))));
    }

    #[test]
    fn test_validation() {
        let ok = NewEntity::new(EntityType::Function, "run", "/src/a.ts", 3, 3, "typescript");
        assert!(ok.validate().is_ok());

        let mut bad = ok.clone();
        bad.name = "  ".to_string();
        assert!(matches!(bad.validate(), Err(Error::Validation(_))));

        let mut bad = ok.clone();
        bad.end_line = 2;
        assert!(matches!(bad.validate(), Err(Error::Validation(_))));

        let mut bad = ok;
        bad.start_line = 0;
        bad.end_line = 0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_extractor_json_shape() {
        let raw = r#"{"type":"method","name":"save","filePath":"/src/repo.ts","startLine":4,"endLine":9,"language":"typescript","metadata":{"exported":true}}"#;
        let entity: NewEntity = serde_json::from_str(raw).unwrap();
        assert_eq!(entity.entity_type, EntityType::Method);
        assert_eq!(entity.file_path, "/src/repo.ts");
        assert_eq!(entity.metadata.unwrap()["exported"].as_bool(), Some(true));
    }
}
